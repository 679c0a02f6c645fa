/// Language model provider abstraction
///
/// The synthesizer treats the model as an optional capability: when no
/// provider is configured it falls back to the deterministic ranker. A
/// provider makes exactly one synchronous call per prompt and hands back the
/// raw completion text; parsing is the synthesizer's concern.
use crate::error::AppResult;

pub mod openai;

pub use openai::OpenAiModel;

/// Trait for language model providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends one prompt and returns the raw completion text
    ///
    /// No retry and no caller-disconnect cancellation: the request suspends
    /// for the full round trip and a transport failure surfaces as-is.
    async fn complete(&self, prompt: &str) -> AppResult<String>;
}
