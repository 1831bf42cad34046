use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Mint and validate tracking identifiers

const SUFFIX_LEN: usize = 9;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// Ids are ~25 chars; anything past this is not one of ours.
const MAX_TRACKING_ID_LEN: usize = 64;

/// Produce a new tracking identifier: `track_<unix-millis>_<random suffix>`.
///
/// The suffix draws 9 characters from a 36-symbol alphabet (~46 bits), enough
/// that concurrent senders never collide without coordination, and the token
/// stays URL-safe with no enumerable structure.
pub fn mint_tracking_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();

    format!("track_{}_{}", now.timestamp_millis(), suffix)
}

#[derive(Clone, Debug, PartialEq)]
pub enum InvalidTrackingId {
    Empty,
    TooLong,
    NotAscii,
    NullByte,
}

impl InvalidTrackingId {
    pub fn reason(&self) -> &str {
        match *self {
            Self::Empty => "empty",
            Self::TooLong => "too_long",
            Self::NotAscii => "not_ascii",
            Self::NullByte => "null_byte",
        }
    }
}

impl Display for InvalidTrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl Error for InvalidTrackingId {
    fn description(&self) -> &str {
        self.reason()
    }
}

/// Check that a tracking id is the right shape. It may still be an id we
/// never minted; opens for unknown ids are recorded and simply never joined
/// to a sent message.
pub fn validate_tracking_id(id: &str) -> Result<(), InvalidTrackingId> {
    if id.is_empty() {
        return Err(InvalidTrackingId::Empty);
    }

    if id.len() > MAX_TRACKING_ID_LEN {
        return Err(InvalidTrackingId::TooLong);
    }

    if !id.is_ascii() {
        return Err(InvalidTrackingId::NotAscii);
    }

    // We refuse ids with null bytes
    if id.contains('\0') {
        return Err(InvalidTrackingId::NullByte);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use crate::token::{mint_tracking_id, validate_tracking_id, InvalidTrackingId};

    #[test]
    fn minted_ids_carry_timestamp_and_suffix() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let id = mint_tracking_id(now);

        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "track");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn minted_ids_are_valid_and_distinct() {
        let now = Utc::now();
        let first = mint_tracking_id(now);
        let second = mint_tracking_id(now);

        assert!(validate_tracking_id(&first).is_ok());
        assert!(validate_tracking_id(&second).is_ok());
        // Same millisecond, still distinct thanks to the random suffix.
        assert_ne!(first, second);
    }

    #[test]
    fn blocks_empty_ids() {
        let valid = validate_tracking_id("");

        assert!(valid.is_err());
        assert_eq!(valid.unwrap_err(), InvalidTrackingId::Empty);
    }

    #[test]
    fn blocks_overlong_ids() {
        let valid = validate_tracking_id(&"x".repeat(65));

        assert!(valid.is_err());
        assert_eq!(valid.unwrap_err(), InvalidTrackingId::TooLong);
    }

    #[test]
    fn blocks_non_ascii_ids() {
        let valid = validate_tracking_id("track_🦀");

        assert!(valid.is_err());
        assert_eq!(valid.unwrap_err(), InvalidTrackingId::NotAscii);
    }

    #[test]
    fn blocks_null_bytes() {
        let valid = validate_tracking_id("track_123\0456");

        assert!(valid.is_err());
        assert_eq!(valid.unwrap_err(), InvalidTrackingId::NullByte);
    }
}
