use chrono::{DateTime, Utc};

/// Earliest instant a PostgreSQL `timestamptz` holds: 4714-11-24 BC 00:00 UTC
/// (Julian day 0), in microseconds since the Unix epoch. The upper bound of
/// `timestamptz` lies beyond chrono's own range.
pub const MIN_STORABLE_MICROS: i64 = -210_866_803_200_000_000;

/// Converts a client epoch-millisecond value into an aware UTC datetime.
///
/// Fractional milliseconds (as produced by `performance.now()` offsets) are
/// kept down to the microsecond, the precision PostgreSQL stores. Returns
/// `None` for NaN, infinities and instants the store cannot hold.
pub fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    let micros = (millis * 1000.0).round();
    if micros < MIN_STORABLE_MICROS as f64 || micros > i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_micros(micros as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_whole_millis() {
        let dt = from_epoch_millis(1_623_168_480_123.0).unwrap();
        assert_eq!(
            dt,
            Utc.with_ymd_and_hms(2021, 6, 8, 16, 8, 0).unwrap() + chrono::Duration::milliseconds(123)
        );
        assert_eq!(dt.timestamp_millis(), 1_623_168_480_123);
    }

    #[test]
    fn test_fractional_millis_keep_microseconds() {
        let dt = from_epoch_millis(1_623_168_480_123.456).unwrap();
        assert_eq!(dt.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_epoch_and_negative_values() {
        assert_eq!(from_epoch_millis(0.0).unwrap().timestamp(), 0);
        assert_eq!(from_epoch_millis(-1000.0).unwrap().timestamp(), -1);
    }

    #[test]
    fn test_unrepresentable_values() {
        assert!(from_epoch_millis(f64::NAN).is_none());
        assert!(from_epoch_millis(f64::INFINITY).is_none());
        assert!(from_epoch_millis(1e300).is_none());
    }

    #[test]
    fn test_lower_bound_matches_timestamptz() {
        let earliest = from_epoch_millis(MIN_STORABLE_MICROS as f64 / 1000.0).unwrap();
        assert_eq!(earliest, Utc.with_ymd_and_hms(-4713, 11, 24, 0, 0, 0).unwrap());

        assert!(from_epoch_millis(MIN_STORABLE_MICROS as f64 / 1000.0 - 1.0).is_none());
        assert!(from_epoch_millis(-3.0e14).is_none());
    }
}
