use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Feedback, FeedbackHistoryEntry, RecommendationRecord};

/// Durable store for recommendation records
///
/// Pure storage abstraction: no ranking or generation logic lives here.
/// Neighbor lookup is bidirectional even though the synthesizer only ever
/// populates the source role, which keeps the store symmetric and testable.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Persists a batch of records; an empty batch is a no-op
    ///
    /// The batch is all-or-nothing: either every record lands or none do.
    async fn insert_batch(&self, records: &[RecommendationRecord]) -> AppResult<()>;

    /// Returns every record where `anchor_item` is either endpoint
    async fn find_incident(
        &self,
        user_id: &str,
        anchor_item: &str,
    ) -> AppResult<Vec<RecommendationRecord>>;

    /// Updates every record for `(user_id, recommended_item)` regardless of
    /// source item, refreshing `created_at`; NotFound when nothing matches
    async fn update_feedback(
        &self,
        user_id: &str,
        recommended_item: &str,
        feedback: Feedback,
    ) -> AppResult<()>;

    /// Removes exactly one record; NotFound if absent
    async fn delete_by_id(&self, id: Uuid) -> AppResult<()>;

    /// Removes all of a user's records, or every record when `user_id` is
    /// omitted; returns the number removed
    async fn delete_for_user(&self, user_id: Option<&str>) -> AppResult<u64>;

    /// Projection of records with feedback set, for prompting and exclusion
    async fn feedback_history(&self, user_id: &str) -> AppResult<Vec<FeedbackHistoryEntry>>;
}

/// In-memory ledger used when no database is configured, and by tests
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<RwLock<Vec<RecommendationRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn insert_batch(&self, records: &[RecommendationRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut store = self.records.write().await;
        store.extend_from_slice(records);
        Ok(())
    }

    async fn find_incident(
        &self,
        user_id: &str,
        anchor_item: &str,
    ) -> AppResult<Vec<RecommendationRecord>> {
        let store = self.records.read().await;
        Ok(store
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && (r.source_item == anchor_item || r.recommended_item == anchor_item)
            })
            .cloned()
            .collect())
    }

    async fn update_feedback(
        &self,
        user_id: &str,
        recommended_item: &str,
        feedback: Feedback,
    ) -> AppResult<()> {
        let mut store = self.records.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for record in store
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.recommended_item == recommended_item)
        {
            record.feedback = feedback;
            record.created_at = now;
            updated += 1;
        }
        if updated == 0 {
            return Err(AppError::NotFound(format!(
                "no recommendation of {recommended_item} for user {user_id}"
            )));
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<()> {
        let mut store = self.records.write().await;
        let before = store.len();
        store.retain(|r| r.id != id);
        if store.len() == before {
            return Err(AppError::NotFound(format!("no recommendation with id {id}")));
        }
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Option<&str>) -> AppResult<u64> {
        let mut store = self.records.write().await;
        let before = store.len();
        match user_id {
            Some(user_id) => store.retain(|r| r.user_id != user_id),
            None => store.clear(),
        }
        Ok((before - store.len()) as u64)
    }

    async fn feedback_history(&self, user_id: &str) -> AppResult<Vec<FeedbackHistoryEntry>> {
        let store = self.records.read().await;
        Ok(store
            .iter()
            .filter(|r| r.user_id == user_id && r.feedback != Feedback::Unset)
            .map(|r| FeedbackHistoryEntry {
                recommended_item: r.recommended_item.clone(),
                feedback: r.feedback,
                reasoning: r.reasoning.clone(),
                source_item: r.source_item.clone(),
            })
            .collect())
    }
}
