use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{NewTransaction, Transaction, TransactionStatus},
    error::{AppError, Result},
    repository::TransactionRepository,
};

#[derive(FromRow)]
pub(crate) struct TransactionRow {
    id: String,
    booking_id: String,
    gross_amount: i64,
    platform_fee: i64,
    host_payout: i64,
    payment_intent_id: String,
    status: String,
    refund_amount: Option<i64>,
    refund_id: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub(crate) const TRANSACTION_COLUMNS: &str = r#"
    id, booking_id, gross_amount, platform_fee, host_payout,
    payment_intent_id, status, refund_amount, refund_id,
    created_at, updated_at
"#;

pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

impl SqliteTransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn row_to_transaction(row: TransactionRow) -> Result<Transaction> {
        Ok(Transaction {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            booking_id: Uuid::parse_str(&row.booking_id).map_err(|e| AppError::Database(e.to_string()))?,
            gross_amount: row.gross_amount,
            platform_fee: row.platform_fee,
            host_payout: row.host_payout,
            payment_intent_id: row.payment_intent_id,
            status: TransactionStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid transaction status: {}", row.status)))?,
            refund_amount: row.refund_amount,
            refund_id: row.refund_id,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch_one_where(&self, column: &str, value: String) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {} FROM transactions WHERE {} = ?", TRANSACTION_COLUMNS, column);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_transaction).transpose()
    }
}

#[async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn create(&self, transaction: NewTransaction) -> Result<Transaction> {
        if transaction.platform_fee + transaction.host_payout != transaction.gross_amount {
            return Err(AppError::Internal(format!(
                "Ledger split {} + {} does not equal gross {}",
                transaction.platform_fee, transaction.host_payout, transaction.gross_amount
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, booking_id, gross_amount, platform_fee, host_payout,
                payment_intent_id, status, refund_amount, refund_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(transaction.booking_id.to_string())
        .bind(transaction.gross_amount)
        .bind(transaction.platform_fee)
        .bind(transaction.host_payout)
        .bind(&transaction.payment_intent_id)
        .bind(transaction.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Booking already has a ledger entry".to_string())
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created transaction".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn find_by_booking(&self, booking_id: Uuid) -> Result<Option<Transaction>> {
        self.fetch_one_where("booking_id", booking_id.to_string()).await
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Transaction>> {
        self.fetch_one_where("payment_intent_id", payment_intent_id.to_string()).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(AppError::Internal(format!(
                "Illegal ledger transition {} -> {}",
                from, to
            )));
        }

        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            "UPDATE transactions SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
