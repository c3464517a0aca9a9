use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const CODE_PREFIX: &str = "PL";
pub const CODE_SUFFIX: &str = "JP";
pub const SEGMENT_LEN: usize = 16;

/// One-time check-in code shown to the guest as a QR code.
///
/// Only the segment is stored; the display form is
/// `PL-<16 uppercase alphanumerics>-JP`. The segment is the truncated
/// HMAC-SHA256 of listing, date, creation time and a random salt under a
/// server-held key, so it cannot be recomputed from public listing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinCode {
    segment: String,
}

impl CheckinCode {
    /// Wraps a segment read back from storage.
    pub fn from_segment(segment: String) -> Self {
        Self { segment }
    }

    /// Parses a scanned display code. Anything other than the exact
    /// `PL-XXXXXXXXXXXXXXXX-JP` shape is `InvalidFormat`.
    pub fn parse(display: &str) -> Result<Self> {
        let segment = display
            .strip_prefix(CODE_PREFIX)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(CODE_SUFFIX))
            .and_then(|rest| rest.strip_suffix('-'))
            .ok_or(AppError::InvalidFormat)?;

        let well_formed = segment.len() == SEGMENT_LEN
            && segment
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());

        if !well_formed {
            return Err(AppError::InvalidFormat);
        }

        Ok(Self {
            segment: segment.to_string(),
        })
    }

    /// Derives a code from its inputs. Deterministic for a given salt.
    pub fn derive(
        secret: &str,
        listing_id: Uuid,
        date: NaiveDate,
        created_at: DateTime<Utc>,
        salt: &[u8],
    ) -> Result<Self> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("Check-in key rejected: {}", e)))?;
        mac.update(listing_id.as_bytes());
        mac.update(date.to_string().as_bytes());
        mac.update(
            &created_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| created_at.timestamp_micros())
                .to_be_bytes(),
        );
        mac.update(salt);

        let digest = hex::encode_upper(mac.finalize().into_bytes());
        Ok(Self {
            segment: digest[..SEGMENT_LEN].to_string(),
        })
    }

    /// Derives a fresh code with a random 16-byte salt.
    pub fn generate(secret: &str, listing_id: Uuid, date: NaiveDate) -> Result<Self> {
        use rand::RngCore;
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive(secret, listing_id, date, Utc::now(), &salt)
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn into_segment(self) -> String {
        self.segment
    }
}

impl fmt::Display for CheckinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", CODE_PREFIX, self.segment, CODE_SUFFIX)
    }
}

/// What the host sees after scanning a valid code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinSummary {
    pub booking_id: Uuid,
    pub guest_name: String,
    pub listing_title: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Uuid {
        Uuid::parse_str("7d0f7f0e-2c55-4d4b-9d0b-4a7a3c8f9e21").unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_parse_accepts_exact_shape() {
        let code = CheckinCode::parse("PL-ABCDEF0123456789-JP").unwrap();
        assert_eq!(code.segment(), "ABCDEF0123456789");
        assert_eq!(code.to_string(), "PL-ABCDEF0123456789-JP");
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        for bad in [
            "",
            "PL-ABCDEF0123456789",
            "ABCDEF0123456789-JP",
            "PL-abcdef0123456789-JP",
            "PL-ABCDEF012345678-JP",
            "PL-ABCDEF01234567890-JP",
            "XX-ABCDEF0123456789-JP",
            "PL-ABCDEF01234567_9-JP",
            "PL--ABCDEF012345678-JP",
            " PL-ABCDEF0123456789-JP",
            "PL-ABCDEF0123456789-JP\n",
        ] {
            assert!(
                matches!(CheckinCode::parse(bad), Err(AppError::InvalidFormat)),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_derive_is_deterministic_for_same_salt() {
        let at = Utc::now();
        let a = CheckinCode::derive("secret", listing(), date(), at, b"salt").unwrap();
        let b = CheckinCode::derive("secret", listing(), date(), at, b"salt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_depends_on_secret_and_salt() {
        let at = Utc::now();
        let base = CheckinCode::derive("secret", listing(), date(), at, b"salt").unwrap();
        let other_key = CheckinCode::derive("other", listing(), date(), at, b"salt").unwrap();
        let other_salt = CheckinCode::derive("secret", listing(), date(), at, b"pepper").unwrap();
        assert_ne!(base, other_key);
        assert_ne!(base, other_salt);
    }

    #[test]
    fn test_generated_code_round_trips_through_display_format() {
        let code = CheckinCode::generate("secret", listing(), date()).unwrap();
        assert_eq!(code.segment().len(), SEGMENT_LEN);
        let parsed = CheckinCode::parse(&code.to_string()).unwrap();
        assert_eq!(parsed, code);
    }
}
