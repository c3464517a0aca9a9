use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{ReconciliationKind, ReconciliationTask},
    error::{AppError, Result},
    repository::ReconciliationRepository,
};

#[derive(FromRow)]
struct TaskRow {
    id: String,
    kind: String,
    booking_id: Option<String>,
    payment_intent_id: Option<String>,
    detail: String,
    created_at: NaiveDateTime,
    resolved_at: Option<NaiveDateTime>,
}

pub struct SqliteReconciliationRepository {
    pool: SqlitePool,
}

impl SqliteReconciliationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: TaskRow) -> Result<ReconciliationTask> {
        let booking_id = row.booking_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(ReconciliationTask {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            kind: ReconciliationKind::from_str(&row.kind)
                .ok_or_else(|| AppError::Database(format!("Invalid reconciliation kind: {}", row.kind)))?,
            booking_id,
            payment_intent_id: row.payment_intent_id,
            detail: row.detail,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            resolved_at: row.resolved_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

#[async_trait]
impl ReconciliationRepository for SqliteReconciliationRepository {
    async fn enqueue(
        &self,
        kind: ReconciliationKind,
        booking_id: Option<Uuid>,
        payment_intent_id: Option<&str>,
        detail: &str,
    ) -> Result<ReconciliationTask> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reconciliation_tasks (
                id, kind, booking_id, payment_intent_id, detail, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(kind.as_str())
        .bind(booking_id.map(|b| b.to_string()))
        .bind(payment_intent_id)
        .bind(detail)
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(ReconciliationTask {
            id,
            kind,
            booking_id,
            payment_intent_id: payment_intent_id.map(str::to_string),
            detail: detail.to_string(),
            created_at: now,
            resolved_at: None,
        })
    }

    async fn list_open(&self) -> Result<Vec<ReconciliationTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, kind, booking_id, payment_intent_id, detail, created_at, resolved_at
            FROM reconciliation_tasks
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Self::row_to_task)
            .collect()
    }

    async fn resolve_for_intent(&self, kind: ReconciliationKind, payment_intent_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_tasks
            SET resolved_at = ?
            WHERE kind = ? AND payment_intent_id = ? AND resolved_at IS NULL
            "#
        )
        .bind(Utc::now().naive_utc())
        .bind(kind.as_str())
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
