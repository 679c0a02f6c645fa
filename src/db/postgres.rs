use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Feedback, FeedbackHistoryEntry, RecommendationRecord};

use super::ledger::Ledger;

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    user_id: String,
    source_item: String,
    recommended_item: String,
    display_name: String,
    reasoning: String,
    confidence: f64,
    feedback: String,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> AppResult<RecommendationRecord> {
        let feedback = Feedback::from_str(&self.feedback).map_err(AppError::Internal)?;
        Ok(RecommendationRecord {
            id: self.id,
            user_id: self.user_id,
            source_item: self.source_item,
            recommended_item: self.recommended_item,
            display_name: self.display_name,
            reasoning: self.reasoning,
            confidence: self.confidence,
            feedback,
            created_at: self.created_at,
        })
    }
}

#[async_trait::async_trait]
impl Ledger for PgLedger {
    async fn insert_batch(&self, records: &[RecommendationRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        // One transaction so a failing write never leaves a partial batch
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO recommendations
                    (id, user_id, source_item, recommended_item, display_name,
                     reasoning, confidence, feedback, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.source_item)
            .bind(&record.recommended_item)
            .bind(&record.display_name)
            .bind(&record.reasoning)
            .bind(record.confidence)
            .bind(record.feedback.as_str())
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_incident(
        &self,
        user_id: &str,
        anchor_item: &str,
    ) -> AppResult<Vec<RecommendationRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, user_id, source_item, recommended_item, display_name,
                   reasoning, confidence, feedback, created_at
            FROM recommendations
            WHERE user_id = $1 AND (source_item = $2 OR recommended_item = $2)
            "#,
        )
        .bind(user_id)
        .bind(anchor_item)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn update_feedback(
        &self,
        user_id: &str,
        recommended_item: &str,
        feedback: Feedback,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE recommendations
            SET feedback = $3, created_at = $4
            WHERE user_id = $1 AND recommended_item = $2
            "#,
        )
        .bind(user_id)
        .bind(recommended_item)
        .bind(feedback.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "no recommendation of {recommended_item} for user {user_id}"
            )));
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM recommendations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("no recommendation with id {id}")));
        }
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Option<&str>) -> AppResult<u64> {
        let result = match user_id {
            Some(user_id) => {
                sqlx::query("DELETE FROM recommendations WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM recommendations")
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn feedback_history(&self, user_id: &str) -> AppResult<Vec<FeedbackHistoryEntry>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, user_id, source_item, recommended_item, display_name,
                   reasoning, confidence, feedback, created_at
            FROM recommendations
            WHERE user_id = $1 AND feedback <> 'unset'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let record = row.into_record()?;
                Ok(FeedbackHistoryEntry {
                    recommended_item: record.recommended_item,
                    feedback: record.feedback,
                    reasoning: record.reasoning,
                    source_item: record.source_item,
                })
            })
            .collect()
    }
}
