use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{CheckinCode, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Derived from `start_time` and the listing duration at creation; never updated.
    pub end_time: NaiveTime,
    pub venue_id: String,
    pub note: Option<String>,
    pub status: BookingStatus,
    /// The 16-character segment of the check-in code. See [`CheckinCode`].
    pub checkin_code: String,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.guest_id == user_id || self.host_id == user_id
    }

    /// The code the guest presents at check-in, e.g. `PL-0A1B2C3D4E5F6789-JP`.
    pub fn display_code(&self) -> String {
        CheckinCode::from_segment(self.checkin_code.clone()).to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "in_progress" => Some(BookingStatus::InProgress),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// The transition graph. Status only moves forward; the two
    /// cancellation edges are the only side branches.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (InProgress, Completed)
        )
    }

    /// Whether a payment intent reference is required in this state.
    pub fn holds_payment_intent(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::InProgress | BookingStatus::Completed
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a guest's booking request. Date and time arrive as strings and
/// are parsed strictly by the service so malformed input is reported as
/// `InvalidInput` rather than a framework rejection.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, 24-hour clock
    pub start_time: String,
    #[validate(length(min = 1, max = 64))]
    pub venue_id: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Row payload for a new booking; always inserted as `pending`.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub host_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub venue_id: String,
    pub note: Option<String>,
    pub checkin_code: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingRole {
    #[default]
    Guest,
    Host,
}

/// Ownership-scoped listing query. A viewer only ever sees bookings where
/// they are the guest (role `Guest`) or the host (role `Host`).
#[derive(Debug, Clone)]
pub struct BookingFilter {
    pub viewer: Uuid,
    pub role: BookingRole,
    pub status: Option<BookingStatus>,
}

/// Result of a host's accept/reject decision.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    Accepted {
        booking: Booking,
        transaction: Transaction,
    },
    Rejected {
        booking: Booking,
    },
    /// Another decision won the race, or the booking had already left `pending`.
    AlreadyDecided {
        current: BookingStatus,
    },
    /// The host must finish payment onboarding first.
    PaymentAccountNotReady {
        remediation: String,
    },
}

/// What a guest needs to pay a confirmed booking client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub booking_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: String,
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 5] = [Pending, Confirmed, InProgress, Completed, Cancelled];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Completed, Cancelled] {
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Confirmed));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_forward_edges() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ALL {
            assert_eq!(BookingStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::from_str("Confirmed"), None);
    }
}
