pub mod feedback;
pub mod providers;
pub mod selector;
pub mod synthesizer;

pub use feedback::FeedbackOps;
pub use selector::Selector;
pub use synthesizer::Synthesizer;
