use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::Result,
    repository::WebhookEventRepository,
};

/// Processed gateway event ids. A row is claimed before any effect is
/// applied, so a replayed or concurrently delivered event is seen as a
/// duplicate by every caller but the first.
pub struct SqliteWebhookEventRepository {
    pool: SqlitePool,
}

impl SqliteWebhookEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for SqliteWebhookEventRepository {
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, result, received_at)
            VALUES (?, ?, 'processing', ?)
            ON CONFLICT (event_id) DO NOTHING
            "#
        )
        .bind(event_id)
        .bind(event_type)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish(&self, event_id: &str, result: &str, error_message: Option<&str>) -> Result<()> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE webhook_events
            SET result = ?, error_message = ?, processed_at = ?
            WHERE event_id = ?
            "#
        )
        .bind(result)
        .bind(error_message)
        .bind(now)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
