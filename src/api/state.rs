use std::sync::Arc;

use crate::db::{Ledger, MemoryLedger};
use crate::services::{providers::LanguageModel, FeedbackOps, Selector, Synthesizer};

/// Shared application state
///
/// Holds the three core services wired to one ledger. The model capability
/// is optional: without it the synthesizer runs its fallback strategy.
#[derive(Clone)]
pub struct AppState {
    pub synthesizer: Arc<Synthesizer>,
    pub selector: Arc<Selector>,
    pub feedback: Arc<FeedbackOps>,
}

impl AppState {
    /// Creates application state over the given ledger and optional model
    pub fn new(ledger: Arc<dyn Ledger>, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            synthesizer: Arc::new(Synthesizer::new(ledger.clone(), model)),
            selector: Arc::new(Selector::new(ledger.clone())),
            feedback: Arc::new(FeedbackOps::new(ledger)),
        }
    }

    /// Creates state backed by the in-memory ledger with no model configured
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedger::new()), None)
    }
}
