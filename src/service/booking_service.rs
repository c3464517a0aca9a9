use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use qrcode::{render::svg, QrCode};
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::PaymentOrchestrator,
    service::Repositories,
};

const MAX_CODE_ATTEMPTS: usize = 5;

/// Where a host finishes payment onboarding.
pub const ONBOARDING_PATH: &str = "/api/host-account/onboarding-link";

/// The booking lifecycle. Every status change goes through a conditional
/// write, so concurrent requests settle on exactly one winner.
pub struct BookingService {
    repos: Repositories,
    payments: Arc<PaymentOrchestrator>,
    checkin_secret: String,
}

impl BookingService {
    pub fn new(repos: Repositories, payments: Arc<PaymentOrchestrator>, checkin_secret: String) -> Self {
        Self {
            repos,
            payments,
            checkin_secret,
        }
    }

    async fn find(&self, id: Uuid) -> Result<Booking> {
        self.repos
            .bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    pub async fn create(&self, guest_id: Uuid, request: CreateBookingRequest) -> Result<Booking> {
        request.validate()?;

        let listing = self
            .repos
            .listings
            .find_by_id(request.listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

        if !listing.is_active {
            return Err(AppError::InvalidInput("Listing is not accepting bookings".to_string()));
        }
        if listing.host_id == guest_id {
            return Err(AppError::InvalidInput("You cannot book your own listing".to_string()));
        }

        let date = NaiveDate::parse_from_str(&request.date, "%Y-%m-%d")
            .map_err(|_| AppError::InvalidInput(format!("Invalid date: {}", request.date)))?;
        let start_time = NaiveTime::parse_from_str(&request.start_time, "%H:%M")
            .map_err(|_| AppError::InvalidInput(format!("Invalid start time: {}", request.start_time)))?;

        if !listing.offers_venue(&request.venue_id) {
            return Err(AppError::InvalidInput(format!(
                "Venue {} is not offered for this listing",
                request.venue_id
            )));
        }

        let end_time = session_end(start_time, listing.duration_minutes)?;

        let note = request
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut new_booking = NewBooking {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            guest_id,
            host_id: listing.host_id,
            date,
            start_time,
            end_time,
            venue_id: request.venue_id,
            note,
            checkin_code: String::new(),
        };

        // A code is unique per host and date; the insert is the check.
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            new_booking.checkin_code =
                CheckinCode::generate(&self.checkin_secret, listing.id, date)?.into_segment();

            if let Some(booking) = self.repos.bookings.create(new_booking.clone()).await? {
                tracing::info!(
                    booking_id = %booking.id,
                    listing_id = %listing.id,
                    guest_id = %guest_id,
                    date = %date,
                    "Booking requested"
                );
                return Ok(booking);
            }

            tracing::warn!(
                alarm = "checkin_code_collision",
                attempt,
                host_id = %listing.host_id,
                date = %date,
                "Check-in code collision"
            );
        }

        tracing::error!(
            alarm = "checkin_code_exhausted",
            host_id = %listing.host_id,
            date = %date,
            "Could not generate a unique check-in code"
        );
        Err(AppError::Internal("Could not generate a unique check-in code".to_string()))
    }

    pub async fn accept(&self, booking_id: Uuid, host_id: Uuid) -> Result<DecisionOutcome> {
        let booking = self.find(booking_id).await?;
        if booking.host_id != host_id {
            return Err(AppError::Forbidden);
        }
        if booking.status != BookingStatus::Pending {
            return Ok(DecisionOutcome::AlreadyDecided { current: booking.status });
        }

        let account = match self.repos.host_accounts.find_by_host(host_id).await? {
            Some(account) if account.is_ready() => account,
            _ => {
                tracing::info!(booking_id = %booking.id, host_id = %host_id, "Host payment account not ready");
                return Ok(DecisionOutcome::PaymentAccountNotReady {
                    remediation: ONBOARDING_PATH.to_string(),
                });
            }
        };

        let listing = self
            .repos
            .listings
            .find_by_id(booking.listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?;

        let (intent, fees) = self
            .payments
            .create_payment_intent(listing.price, &account.stripe_account_id, booking.id)
            .await?;

        if !self.repos.bookings.confirm(booking.id, &intent.id).await? {
            return self.resolve_lost_accept(booking.id, &intent.id).await;
        }

        let new_transaction = NewTransaction {
            booking_id: booking.id,
            gross_amount: listing.price,
            platform_fee: fees.platform_fee,
            host_payout: fees.host_payout,
            payment_intent_id: intent.id.clone(),
            status: TransactionStatus::Pending,
        };

        let transaction = match self.repos.transactions.create(new_transaction).await {
            Ok(transaction) => transaction,
            Err(err) => {
                self.record_ledger_failure(booking.id, &intent.id, listing.price, fees, &err)
                    .await;
                return Err(AppError::Internal(format!(
                    "Booking {} confirmed but its ledger entry could not be written",
                    booking.id
                )));
            }
        };

        let booking = self.find(booking.id).await?;
        tracing::info!(
            booking_id = %booking.id,
            payment_intent_id = %intent.id,
            "Booking accepted"
        );

        Ok(DecisionOutcome::Accepted { booking, transaction })
    }

    /// Another request changed the booking between our read and our write.
    async fn resolve_lost_accept(&self, booking_id: Uuid, intent_id: &str) -> Result<DecisionOutcome> {
        let current = self.find(booking_id).await?;

        if current.status == BookingStatus::Cancelled && current.payment_intent_id.is_none() {
            // Rejected or withdrawn while we were talking to the gateway.
            if let Err(err) = self.payments.cancel_payment_intent(intent_id).await {
                tracing::error!(
                    alarm = "orphan_payment_intent",
                    booking_id = %booking_id,
                    payment_intent_id = %intent_id,
                    error = %err,
                    "Could not cancel payment intent for a cancelled booking"
                );
            }
        }

        tracing::info!(booking_id = %booking_id, status = %current.status, "Accept lost the race");
        Ok(DecisionOutcome::AlreadyDecided { current: current.status })
    }

    async fn record_ledger_failure(
        &self,
        booking_id: Uuid,
        intent_id: &str,
        gross: i64,
        fees: Fees,
        err: &AppError,
    ) {
        tracing::error!(
            alarm = "ledger_write_failed",
            booking_id = %booking_id,
            payment_intent_id = %intent_id,
            gross,
            platform_fee = fees.platform_fee,
            host_payout = fees.host_payout,
            error = %err,
            "Payment intent exists without a ledger entry"
        );

        let detail = format!(
            "gross={} platform_fee={} host_payout={} error={}",
            gross, fees.platform_fee, fees.host_payout, err
        );
        if let Err(enqueue_err) = self
            .repos
            .reconciliation
            .enqueue(
                ReconciliationKind::LedgerWriteFailed,
                Some(booking_id),
                Some(intent_id),
                &detail,
            )
            .await
        {
            tracing::error!(
                alarm = "reconciliation_enqueue_failed",
                booking_id = %booking_id,
                payment_intent_id = %intent_id,
                error = %enqueue_err,
                "Could not queue ledger repair"
            );
        }
    }

    pub async fn reject(&self, booking_id: Uuid, host_id: Uuid) -> Result<DecisionOutcome> {
        let booking = self.find(booking_id).await?;
        if booking.host_id != host_id {
            return Err(AppError::Forbidden);
        }
        if booking.status != BookingStatus::Pending {
            return Ok(DecisionOutcome::AlreadyDecided { current: booking.status });
        }

        if !self
            .repos
            .bookings
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await?
        {
            let current = self.find(booking.id).await?;
            return Ok(DecisionOutcome::AlreadyDecided { current: current.status });
        }

        tracing::info!(booking_id = %booking.id, "Booking rejected");
        Ok(DecisionOutcome::Rejected {
            booking: self.find(booking.id).await?,
        })
    }

    /// Guest withdrawal or host cancellation. A paid booking is refunded in
    /// full; an unpaid intent is cancelled at the gateway.
    pub async fn cancel(&self, booking_id: Uuid, actor: Uuid) -> Result<Booking> {
        let booking = self.find(booking_id).await?;
        if !booking.is_participant(actor) {
            return Err(AppError::Forbidden);
        }

        match booking.status {
            BookingStatus::Pending => {
                if !self
                    .repos
                    .bookings
                    .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled)
                    .await?
                {
                    let current = self.find(booking.id).await?;
                    return Err(AppError::Conflict(format!(
                        "Booking is now {} and was not cancelled",
                        current.status
                    )));
                }
                tracing::info!(booking_id = %booking.id, actor = %actor, "Pending booking cancelled");
                self.find(booking.id).await
            }
            BookingStatus::Confirmed => self.cancel_confirmed(booking, actor).await,
            other => Err(AppError::Conflict(format!(
                "A {} booking cannot be cancelled",
                other
            ))),
        }
    }

    async fn cancel_confirmed(&self, booking: Booking, actor: Uuid) -> Result<Booking> {
        let intent_id = booking.payment_intent_id.clone().ok_or_else(|| {
            AppError::Internal(format!("Confirmed booking {} has no payment intent", booking.id))
        })?;
        let ledger = self.repos.transactions.find_by_booking(booking.id).await?;

        let (ledger_status, refund_amount, refund_id) = match ledger.as_ref().map(|t| t.status) {
            Some(TransactionStatus::Completed) => {
                let gross = ledger.as_ref().map(|t| t.gross_amount);
                let refund_id = self.payments.refund(&intent_id, None).await?;
                (TransactionStatus::Refunded, gross, Some(refund_id))
            }
            Some(TransactionStatus::Pending) | None => {
                self.payments.cancel_payment_intent(&intent_id).await?;
                (TransactionStatus::Failed, None, None)
            }
            Some(settled) => (settled, None, None),
        };

        let settlement = self
            .repos
            .settlements
            .cancel_confirmed(booking.id, ledger_status, refund_amount, refund_id.as_deref())
            .await;

        match settlement {
            Ok(settlement) if settlement.booking_cancelled => {
                tracing::info!(
                    booking_id = %booking.id,
                    actor = %actor,
                    ledger_status = %ledger_status,
                    refund_id = ?refund_id,
                    "Confirmed booking cancelled"
                );
                self.find(booking.id).await
            }
            Ok(_) => {
                let current = self.find(booking.id).await?;
                if current.status == BookingStatus::Cancelled {
                    return Ok(current);
                }
                self.record_cancellation_failure(&booking, &intent_id, refund_id.as_deref(), "booking moved on")
                    .await;
                Err(AppError::Conflict(format!(
                    "Booking is now {} and was not cancelled",
                    current.status
                )))
            }
            Err(err) => {
                self.record_cancellation_failure(&booking, &intent_id, refund_id.as_deref(), &err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    async fn record_cancellation_failure(
        &self,
        booking: &Booking,
        intent_id: &str,
        refund_id: Option<&str>,
        reason: &str,
    ) {
        tracing::error!(
            alarm = "cancellation_write_failed",
            booking_id = %booking.id,
            payment_intent_id = %intent_id,
            refund_id = ?refund_id,
            reason,
            "Gateway settled a cancellation the booking does not reflect"
        );

        let detail = format!("refund_id={:?} reason={}", refund_id, reason);
        if let Err(err) = self
            .repos
            .reconciliation
            .enqueue(
                ReconciliationKind::CancellationWriteFailed,
                Some(booking.id),
                Some(intent_id),
                &detail,
            )
            .await
        {
            tracing::error!(
                alarm = "reconciliation_enqueue_failed",
                booking_id = %booking.id,
                error = %err,
                "Could not queue cancellation repair"
            );
        }
    }

    /// Visible only to the booking's guest and host.
    pub async fn get(&self, booking_id: Uuid, viewer: Uuid) -> Result<Booking> {
        let booking = self.find(booking_id).await?;
        if !booking.is_participant(viewer) {
            return Err(AppError::NotFound("Booking not found".to_string()));
        }
        Ok(booking)
    }

    pub async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>> {
        self.repos.bookings.list(&filter).await
    }

    async fn find_for_guest(&self, booking_id: Uuid, guest_id: Uuid) -> Result<Booking> {
        let booking = self.get(booking_id, guest_id).await?;
        if booking.guest_id != guest_id {
            return Err(AppError::Forbidden);
        }
        Ok(booking)
    }

    pub async fn payment_details(&self, booking_id: Uuid, guest_id: Uuid) -> Result<PaymentDetails> {
        let booking = self.find_for_guest(booking_id, guest_id).await?;

        let intent_id = match (&booking.status, &booking.payment_intent_id) {
            (BookingStatus::Confirmed, Some(intent_id)) => intent_id.clone(),
            _ => {
                return Err(AppError::Conflict(format!(
                    "Nothing to pay for a {} booking",
                    booking.status
                )))
            }
        };

        let ledger = self.repos.transactions.find_by_booking(booking.id).await?;
        let amount = match ledger {
            Some(entry) if entry.status == TransactionStatus::Pending => entry.gross_amount,
            Some(_) => return Err(AppError::Conflict("Booking is already settled".to_string())),
            None => {
                self.repos
                    .listings
                    .find_by_id(booking.listing_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Listing not found".to_string()))?
                    .price
            }
        };

        let client_secret = self.payments.client_secret(&intent_id).await?;

        Ok(PaymentDetails {
            booking_id: booking.id,
            payment_intent_id: intent_id,
            client_secret,
            amount,
        })
    }

    /// The guest's check-in code as an SVG QR image.
    pub async fn checkin_qr(&self, booking_id: Uuid, guest_id: Uuid) -> Result<String> {
        let booking = self.find_for_guest(booking_id, guest_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::Conflict(format!(
                "No check-in code for a {} booking",
                booking.status
            )));
        }

        let code = QrCode::new(booking.display_code().as_bytes())
            .map_err(|e| AppError::Internal(format!("QR encoding failed: {}", e)))?;

        Ok(code
            .render::<svg::Color>()
            .min_dimensions(240, 240)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }
}

fn session_end(start: NaiveTime, duration_minutes: i32) -> Result<NaiveTime> {
    if duration_minutes <= 0 {
        return Err(AppError::Internal(format!(
            "Listing duration must be positive, got {}",
            duration_minutes
        )));
    }

    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(duration_minutes.into()));
    if wrapped != 0 {
        return Err(AppError::InvalidInput("Session would run past midnight".to_string()));
    }
    Ok(end)
}
