use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    domain::{BookingStatus, Settlement, TransactionStatus},
    error::{AppError, Result},
    repository::SettlementRepository,
};

/// Booking and ledger writes that share one SQLite transaction, so a
/// refund or payment failure is never recorded on only one side.
pub struct SqliteSettlementRepository {
    pool: SqlitePool,
}

impl SqliteSettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementRepository for SqliteSettlementRepository {
    async fn apply_payment_failure(&self, payment_intent_id: &str) -> Result<Settlement> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let ledger_status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM transactions WHERE payment_intent_id = ?"
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let ledger_updated = match ledger_status.as_deref().map(TransactionStatus::from_str) {
            Some(Some(TransactionStatus::Pending)) => {
                let result = sqlx::query(
                    r#"
                    UPDATE transactions
                    SET status = ?, updated_at = ?
                    WHERE payment_intent_id = ? AND status = ?
                    "#
                )
                .bind(TransactionStatus::Failed.as_str())
                .bind(now)
                .bind(payment_intent_id)
                .bind(TransactionStatus::Pending.as_str())
                .execute(&mut *tx)
                .await?;
                result.rows_affected() == 1
            }
            // Completed, refunded or already failed: a late failure changes nothing.
            Some(Some(_)) => {
                tx.rollback().await?;
                return Ok(Settlement::default());
            }
            Some(None) => {
                return Err(AppError::Database(format!(
                    "Invalid transaction status for {}",
                    payment_intent_id
                )));
            }
            None => false,
        };

        let booking = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, updated_at = ?
            WHERE payment_intent_id = ? AND status = ?
            "#
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(now)
        .bind(payment_intent_id)
        .bind(BookingStatus::Confirmed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Settlement {
            ledger_updated,
            booking_cancelled: booking.rows_affected() == 1,
        })
    }

    async fn apply_refund(
        &self,
        payment_intent_id: &str,
        refund_amount: i64,
        refund_id: Option<&str>,
    ) -> Result<Settlement> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let ledger = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                refund_amount = ?,
                refund_id = COALESCE(?, refund_id),
                updated_at = ?
            WHERE payment_intent_id = ?
              AND (status IN (?, ?) OR (status = ? AND COALESCE(refund_amount, 0) < ?))
            "#
        )
        .bind(TransactionStatus::Refunded.as_str())
        .bind(refund_amount)
        .bind(refund_id)
        .bind(now)
        .bind(payment_intent_id)
        .bind(TransactionStatus::Pending.as_str())
        .bind(TransactionStatus::Completed.as_str())
        // The refunded total only grows; a later partial refund raises it.
        .bind(TransactionStatus::Refunded.as_str())
        .bind(refund_amount)
        .execute(&mut *tx)
        .await?;

        let booking = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, updated_at = ?
            WHERE payment_intent_id = ? AND status IN (?, ?)
            "#
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(now)
        .bind(payment_intent_id)
        .bind(BookingStatus::Pending.as_str())
        .bind(BookingStatus::Confirmed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Settlement {
            ledger_updated: ledger.rows_affected() == 1,
            booking_cancelled: booking.rows_affected() == 1,
        })
    }

    async fn cancel_confirmed(
        &self,
        booking_id: Uuid,
        ledger_status: TransactionStatus,
        refund_amount: Option<i64>,
        refund_id: Option<&str>,
    ) -> Result<Settlement> {
        if !matches!(ledger_status, TransactionStatus::Refunded | TransactionStatus::Failed) {
            return Err(AppError::Internal(format!(
                "Cancellation cannot leave the ledger {}",
                ledger_status
            )));
        }

        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let booking = sqlx::query(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(now)
        .bind(booking_id.to_string())
        .bind(BookingStatus::Confirmed.as_str())
        .execute(&mut *tx)
        .await?;

        if booking.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Settlement::default());
        }

        let ledger = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                refund_amount = COALESCE(?, refund_amount),
                refund_id = COALESCE(?, refund_id),
                updated_at = ?
            WHERE booking_id = ? AND status IN (?, ?)
            "#
        )
        .bind(ledger_status.as_str())
        .bind(refund_amount)
        .bind(refund_id)
        .bind(now)
        .bind(booking_id.to_string())
        .bind(TransactionStatus::Pending.as_str())
        .bind(TransactionStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Settlement {
            ledger_updated: ledger.rows_affected() == 1,
            booking_cancelled: true,
        })
    }
}
