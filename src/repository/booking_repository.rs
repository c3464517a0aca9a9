use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Booking, BookingFilter, BookingRole, BookingStatus, NewBooking},
    error::{AppError, Result},
    repository::BookingRepository,
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    listing_id: String,
    guest_id: String,
    host_id: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    venue_id: String,
    note: Option<String>,
    status: String,
    checkin_code: String,
    payment_intent_id: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    id, listing_id, guest_id, host_id, date, start_time, end_time,
    venue_id, note, status, checkin_code, payment_intent_id,
    created_at, updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        let status = BookingStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Database(format!("Invalid booking status: {}", row.status)))?;
        if status.holds_payment_intent() && row.payment_intent_id.is_none() {
            tracing::error!(booking_id = %row.id, status = %status, "Booking row has no payment intent");
            return Err(AppError::Database(format!(
                "Booking {} is {} without a payment intent",
                row.id, status
            )));
        }

        Ok(Booking {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            listing_id: Uuid::parse_str(&row.listing_id).map_err(|e| AppError::Database(e.to_string()))?,
            guest_id: Uuid::parse_str(&row.guest_id).map_err(|e| AppError::Database(e.to_string()))?,
            host_id: Uuid::parse_str(&row.host_id).map_err(|e| AppError::Database(e.to_string()))?,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            venue_id: row.venue_id,
            note: row.note,
            status,
            checkin_code: row.checkin_code,
            payment_intent_id: row.payment_intent_id,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn fetch_one_where(&self, clause: &str, value: String) -> Result<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE {} = ?", BOOKING_COLUMNS, clause);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking).transpose()
    }
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create(&self, booking: NewBooking) -> Result<Option<Booking>> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, listing_id, guest_id, host_id, date, start_time, end_time,
                venue_id, note, status, checkin_code, payment_intent_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT (host_id, date, checkin_code) DO NOTHING
            "#
        )
        .bind(booking.id.to_string())
        .bind(booking.listing_id.to_string())
        .bind(booking.guest_id.to_string())
        .bind(booking.host_id.to_string())
        .bind(booking.date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(&booking.venue_id)
        .bind(&booking.note)
        .bind(BookingStatus::Pending.as_str())
        .bind(&booking.checkin_code)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(booking.id).await?.map(Some).ok_or_else(|| {
            AppError::Database("Failed to retrieve created booking".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Booking>> {
        self.fetch_one_where("payment_intent_id", payment_intent_id.to_string()).await
    }

    async fn find_for_checkin(&self, segment: &str, host_id: Uuid) -> Result<Option<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE checkin_code = ? AND host_id = ? AND status = ?",
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(segment)
            .bind(host_id.to_string())
            .bind(BookingStatus::Confirmed.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking).transpose()
    }

    async fn list(&self, filter: &BookingFilter) -> Result<Vec<Booking>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM bookings WHERE ", BOOKING_COLUMNS));

        match filter.role {
            BookingRole::Guest => query.push("guest_id = "),
            BookingRole::Host => query.push("host_id = "),
        };
        query.push_bind(filter.viewer.to_string());

        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }

        query.push(" ORDER BY date DESC, start_time DESC");

        let rows = query
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_booking)
            .collect()
    }

    async fn confirm(&self, id: Uuid, payment_intent_id: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, payment_intent_id = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
        .bind(BookingStatus::Confirmed.as_str())
        .bind(payment_intent_id)
        .bind(now)
        .bind(id.to_string())
        .bind(BookingStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(AppError::Internal(format!(
                "Illegal booking transition {} -> {}",
                from, to
            )));
        }

        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
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
