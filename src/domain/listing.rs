use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable session offered by a host. Read-only from the booking
/// core's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    /// Gross price in minor currency units (whole yen).
    pub price: i64,
    pub duration_minutes: i32,
    /// Venue identifiers the host offers. Empty means any venue is accepted.
    pub venues: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn offers_venue(&self, venue_id: &str) -> bool {
        self.venues.is_empty() || self.venues.iter().any(|v| v == venue_id)
    }
}
