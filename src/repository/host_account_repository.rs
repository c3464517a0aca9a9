use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::HostAccount,
    error::{AppError, Result},
    repository::HostAccountRepository,
};

#[derive(FromRow)]
struct HostAccountRow {
    host_id: String,
    stripe_account_id: String,
    charges_enabled: i32,
    payouts_enabled: i32,
    verified: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteHostAccountRepository {
    pool: SqlitePool,
}

impl SqliteHostAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: HostAccountRow) -> Result<HostAccount> {
        Ok(HostAccount {
            host_id: Uuid::parse_str(&row.host_id).map_err(|e| AppError::Database(e.to_string()))?,
            stripe_account_id: row.stripe_account_id,
            charges_enabled: row.charges_enabled != 0,
            payouts_enabled: row.payouts_enabled != 0,
            verified: row.verified != 0,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl HostAccountRepository for SqliteHostAccountRepository {
    async fn create(&self, host_id: Uuid, stripe_account_id: &str) -> Result<HostAccount> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO host_accounts (
                host_id, stripe_account_id, charges_enabled, payouts_enabled,
                verified, created_at, updated_at
            ) VALUES (?, ?, 0, 0, 0, ?, ?)
            "#
        )
        .bind(host_id.to_string())
        .bind(stripe_account_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Host already has a payment account".to_string())
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_host(host_id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created host account".to_string())
        })
    }

    async fn find_by_host(&self, host_id: Uuid) -> Result<Option<HostAccount>> {
        let row = sqlx::query_as::<_, HostAccountRow>(
            r#"
            SELECT host_id, stripe_account_id, charges_enabled, payouts_enabled,
                   verified, created_at, updated_at
            FROM host_accounts
            WHERE host_id = ?
            "#
        )
        .bind(host_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_account).transpose()
    }

    async fn find_by_stripe_account(&self, stripe_account_id: &str) -> Result<Option<HostAccount>> {
        let row = sqlx::query_as::<_, HostAccountRow>(
            r#"
            SELECT host_id, stripe_account_id, charges_enabled, payouts_enabled,
                   verified, created_at, updated_at
            FROM host_accounts
            WHERE stripe_account_id = ?
            "#
        )
        .bind(stripe_account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_account).transpose()
    }

    async fn update_capabilities(
        &self,
        stripe_account_id: &str,
        charges_enabled: bool,
        payouts_enabled: bool,
    ) -> Result<Option<HostAccount>> {
        let verified = charges_enabled && payouts_enabled;
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE host_accounts
            SET charges_enabled = ?,
                payouts_enabled = ?,
                verified = ?,
                updated_at = ?
            WHERE stripe_account_id = ?
            "#
        )
        .bind(charges_enabled as i32)
        .bind(payouts_enabled as i32)
        .bind(verified as i32)
        .bind(now)
        .bind(stripe_account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_stripe_account(stripe_account_id).await
    }
}
