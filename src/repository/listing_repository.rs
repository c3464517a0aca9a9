use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::Listing,
    error::{AppError, Result},
    repository::ListingRepository,
};

#[derive(FromRow)]
struct ListingRow {
    id: String,
    host_id: String,
    title: String,
    price: i64,
    duration_minutes: i32,
    venues: String,
    is_active: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteListingRepository {
    pool: SqlitePool,
}

impl SqliteListingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_listing(row: ListingRow) -> Result<Listing> {
        let venues: Vec<String> = serde_json::from_str(&row.venues)
            .map_err(|e| AppError::Database(format!("Invalid venues for listing {}: {}", row.id, e)))?;

        Ok(Listing {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            host_id: Uuid::parse_str(&row.host_id).map_err(|e| AppError::Database(e.to_string()))?,
            title: row.title,
            price: row.price,
            duration_minutes: row.duration_minutes,
            venues,
            is_active: row.is_active != 0,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl ListingRepository for SqliteListingRepository {
    async fn create(&self, listing: Listing) -> Result<Listing> {
        let venues = serde_json::to_string(&listing.venues)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO listings (
                id, host_id, title, price, duration_minutes,
                venues, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(listing.id.to_string())
        .bind(listing.host_id.to_string())
        .bind(&listing.title)
        .bind(listing.price)
        .bind(listing.duration_minutes)
        .bind(&venues)
        .bind(listing.is_active as i32)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(listing.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created listing".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, host_id, title, price, duration_minutes,
                   venues, is_active, created_at, updated_at
            FROM listings
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_listing).transpose()
    }

    async fn list_by_host(&self, host_id: Uuid) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, host_id, title, price, duration_minutes,
                   venues, is_active, created_at, updated_at
            FROM listings
            WHERE host_id = ?
            ORDER BY created_at DESC
            "#
        )
        .bind(host_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Self::row_to_listing)
            .collect()
    }
}
