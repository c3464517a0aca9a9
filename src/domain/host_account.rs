use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A host's connected account at the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostAccount {
    pub host_id: Uuid,
    pub stripe_account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostAccount {
    /// Whether bookings may be accepted against this account.
    pub fn is_ready(&self) -> bool {
        self.verified && self.charges_enabled && self.payouts_enabled
    }
}
