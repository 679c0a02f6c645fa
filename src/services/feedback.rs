use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::Ledger,
    error::{AppError, AppResult},
    models::Feedback,
};

/// Feedback lifecycle operations: judge, delete, clear
///
/// Thin mutations over the ledger; the synthesizer consumes their effects
/// indirectly through the feedback-history projection.
pub struct FeedbackOps {
    ledger: Arc<dyn Ledger>,
}

impl FeedbackOps {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Records the user's judgment of a recommended item
    ///
    /// Idempotent: reapplying the same judgment leaves one state and never
    /// duplicates records. NotFound when the pair was never recommended.
    #[instrument(skip(self))]
    pub async fn apply_feedback(
        &self,
        user_id: &str,
        recommended_item: &str,
        positive: bool,
    ) -> AppResult<()> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
        }
        if recommended_item.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "recommended_item must not be empty".to_string(),
            ));
        }
        let feedback = if positive {
            Feedback::Positive
        } else {
            Feedback::Negative
        };
        self.ledger
            .update_feedback(user_id, recommended_item, feedback)
            .await?;
        tracing::info!(feedback = feedback.as_str(), "Applied feedback");
        Ok(())
    }

    /// Deletes a single recommendation record by id
    #[instrument(skip(self))]
    pub async fn delete_recommendation(&self, id: Uuid) -> AppResult<()> {
        self.ledger.delete_by_id(id).await
    }

    /// Clears all records for one user, or every record when `user_id` is
    /// omitted; succeeds even with zero matches
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Option<&str>) -> AppResult<u64> {
        let removed = self.ledger.delete_for_user(user_id).await?;
        tracing::info!(removed, "Cleared recommendations");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryLedger;
    use crate::models::RecommendationRecord;

    async fn ops_with(records: Vec<RecommendationRecord>) -> (FeedbackOps, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_batch(&records).await.unwrap();
        (FeedbackOps::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn test_apply_feedback_is_idempotent() {
        let (ops, ledger) = ops_with(vec![RecommendationRecord::new(
            "u1", "a", "b", "B", "r", 0.5,
        )])
        .await;

        ops.apply_feedback("u1", "b", true).await.unwrap();
        ops.apply_feedback("u1", "b", true).await.unwrap();

        let records = ledger.find_incident("u1", "b").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].feedback, Feedback::Positive);
    }

    #[tokio::test]
    async fn test_apply_feedback_refreshes_created_at() {
        let (ops, ledger) = ops_with(vec![RecommendationRecord::new(
            "u1", "a", "b", "B", "r", 0.5,
        )])
        .await;
        let before = ledger.find_incident("u1", "b").await.unwrap()[0].created_at;

        ops.apply_feedback("u1", "b", false).await.unwrap();
        let after = ledger.find_incident("u1", "b").await.unwrap()[0].created_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_apply_feedback_unknown_pair_is_not_found() {
        let (ops, _) = ops_with(vec![]).await;
        let result = ops.apply_feedback("u1", "ghost", true).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_succeeds_with_zero_matches() {
        let (ops, _) = ops_with(vec![]).await;
        assert_eq!(ops.clear(Some("nobody")).await.unwrap(), 0);
        assert_eq!(ops.clear(None).await.unwrap(), 0);
    }
}
