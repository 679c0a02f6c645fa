use std::collections::HashSet;
use std::sync::Arc;

use tracing::instrument;

use crate::{
    db::Ledger,
    error::{AppError, AppResult},
    models::{Feedback, RecommendationRecord, ServedRecommendation, ServingMode},
};

/// Ranks and filters stored recommendations for serving
///
/// Works purely from ledger state and never calls the model. Ranking happens
/// before deduplication so that the record kept for each neighbor is the
/// top-ranked one rather than whichever the store returned first.
pub struct Selector {
    ledger: Arc<dyn Ledger>,
}

impl Selector {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Serves up to `amount` recommendations for `user_id` anchored at
    /// `anchor_item`
    ///
    /// A shorter or empty list is a normal result, never an error.
    #[instrument(skip(self, ignore), fields(user_id = %user_id, anchor = %anchor_item))]
    pub async fn select(
        &self,
        user_id: &str,
        anchor_item: &str,
        amount: i64,
        mode: ServingMode,
        ignore: &[String],
    ) -> AppResult<Vec<ServedRecommendation>> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
        }
        if anchor_item.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "anchor_item must not be empty".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(AppError::InvalidInput("amount must be positive".to_string()));
        }
        let amount = amount as usize;
        let ignored: HashSet<&str> = ignore.iter().map(String::as_str).collect();

        let records = self.ledger.find_incident(user_id, anchor_item).await?;

        // Pair each record with its neighbor endpoint, dropping self-edges
        let mut candidates: Vec<(&str, &RecommendationRecord)> = records
            .iter()
            .filter_map(|r| r.neighbor_of(anchor_item).map(|neighbor| (neighbor, r)))
            .filter(|(neighbor, _)| !ignored.contains(neighbor))
            .collect();

        if mode == ServingMode::Unfed {
            candidates.retain(|(_, r)| r.feedback == Feedback::Unset);
        }

        // Rank first, then dedupe keeping the top-ranked record per neighbor
        candidates.sort_by(|a, b| {
            a.1.feedback
                .tier()
                .cmp(&b.1.feedback.tier())
                .then_with(|| {
                    b.1.confidence
                        .partial_cmp(&a.1.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });

        let mut seen: HashSet<&str> = HashSet::new();
        let mut served = Vec::new();

        for (neighbor, record) in candidates {
            if served.len() >= amount {
                break;
            }
            if !seen.insert(neighbor) {
                continue;
            }
            if mode == ServingMode::Feedbacked && record.feedback == Feedback::Negative {
                continue;
            }
            served.push(ServedRecommendation {
                item: neighbor.to_string(),
                display_name: record.display_name.clone(),
                reasoning: record.reasoning.clone(),
                confidence: record.confidence,
            });
        }

        Ok(served)
    }
}
