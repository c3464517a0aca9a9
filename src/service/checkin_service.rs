use chrono::{FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    service::Repositories,
};

/// Host-side check-in: verify a presented code, then walk the booking
/// through `confirmed -> in_progress -> completed`.
pub struct CheckinService {
    repos: Repositories,
    utc_offset_hours: i32,
}

impl CheckinService {
    pub fn new(repos: Repositories, utc_offset_hours: i32) -> Self {
        Self { repos, utc_offset_hours }
    }

    /// Today's date in the marketplace's time zone.
    pub fn today(&self) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => {
                tracing::warn!(offset = self.utc_offset_hours, "Invalid UTC offset, using UTC");
                Utc::now().date_naive()
            }
        }
    }

    pub async fn verify(&self, code: &str, host_id: Uuid) -> Result<CheckinSummary> {
        self.verify_on(code, host_id, self.today()).await
    }

    /// Read-only. Malformed codes are rejected before any lookup.
    pub async fn verify_on(&self, code: &str, host_id: Uuid, today: NaiveDate) -> Result<CheckinSummary> {
        let code = CheckinCode::parse(code)?;

        let booking = self
            .repos
            .bookings
            .find_for_checkin(code.segment(), host_id)
            .await?
            .ok_or(AppError::NotFoundOrUsed)?;

        if booking.date != today {
            tracing::info!(booking_id = %booking.id, date = %booking.date, today = %today, "Check-in on wrong date");
            return Err(AppError::WrongDate);
        }

        let guest = self
            .repos
            .users
            .find_by_id(booking.guest_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Guest not found".to_string()))?;
        let listing = self
            .repos
            .listings
            .find_by_id(booking.listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

        Ok(CheckinSummary {
            booking_id: booking.id,
            guest_name: guest.display_name,
            listing_title: listing.title,
            date: booking.date,
            start_time: booking.start_time,
            end_time: booking.end_time,
        })
    }

    async fn advance(
        &self,
        booking_id: Uuid,
        host_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        on: Option<NaiveDate>,
    ) -> Result<Booking> {
        let booking = self
            .repos
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if booking.host_id != host_id {
            return Err(AppError::Forbidden);
        }

        if let Some(today) = on {
            if booking.date != today {
                tracing::info!(booking_id = %booking.id, date = %booking.date, today = %today, "Session start on wrong date");
                return Err(AppError::WrongDate);
            }
        }

        if booking.status != from
            || !self.repos.bookings.transition(booking.id, from, to).await?
        {
            let current = self
                .repos
                .bookings
                .find_by_id(booking_id)
                .await?
                .map(|b| b.status)
                .unwrap_or(booking.status);
            return Err(AppError::Conflict(format!(
                "Booking is {}, expected {}",
                current, from
            )));
        }

        tracing::info!(booking_id = %booking.id, from = %from, to = %to, "Session status changed");

        self.repos
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    pub async fn start_session(&self, booking_id: Uuid, host_id: Uuid) -> Result<Booking> {
        self.start_session_on(booking_id, host_id, self.today()).await
    }

    /// Sessions only start on the booked date.
    pub async fn start_session_on(&self, booking_id: Uuid, host_id: Uuid, today: NaiveDate) -> Result<Booking> {
        self.advance(
            booking_id,
            host_id,
            BookingStatus::Confirmed,
            BookingStatus::InProgress,
            Some(today),
        )
        .await
    }

    pub async fn complete_session(&self, booking_id: Uuid, host_id: Uuid) -> Result<Booking> {
        self.advance(booking_id, host_id, BookingStatus::InProgress, BookingStatus::Completed, None)
            .await
    }
}
