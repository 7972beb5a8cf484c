//! Timestamp utilities
//!
//! Positions travel as floating-point seconds and timestamps as integer epoch
//! milliseconds. The player facade works in integer milliseconds, so the
//! conversions live here in one place.

use chrono::Utc;

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a playback position in milliseconds to seconds
pub fn ms_to_sec(position_ms: i64) -> f64 {
    position_ms as f64 / 1000.0
}

/// Convert a playback position in seconds to milliseconds (rounded to nearest)
pub fn sec_to_ms(position_sec: f64) -> i64 {
    (position_sec * 1000.0).round() as i64
}

/// Seconds elapsed between a remote timestamp and `now_ms`
///
/// Negative when the remote clock runs ahead of ours; callers treat the
/// value as-is since wall clocks are assumed to be close. Saturates on
/// out-of-range timestamps.
pub fn elapsed_sec(now_ms: i64, since_ms: i64) -> f64 {
    now_ms.saturating_sub(since_ms) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_recent() {
        let now = now_ms();
        // After 2020-01-01, before 2100-01-01
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }

    #[test]
    fn test_ms_to_sec() {
        assert_eq!(ms_to_sec(0), 0.0);
        assert_eq!(ms_to_sec(1500), 1.5);
        assert_eq!(ms_to_sec(-250), -0.25);
    }

    #[test]
    fn test_sec_to_ms_rounds() {
        assert_eq!(sec_to_ms(12.0), 12_000);
        assert_eq!(sec_to_ms(0.0004), 0);
        assert_eq!(sec_to_ms(0.0006), 1);
        // 100.4 is not exactly representable; rounding keeps the millisecond
        assert_eq!(sec_to_ms(100.4), 100_400);
    }

    #[test]
    fn test_elapsed_sec() {
        assert_eq!(elapsed_sec(10_400, 10_000), 0.4);
        assert_eq!(elapsed_sec(10_000, 10_000), 0.0);
        assert_eq!(elapsed_sec(9_000, 10_000), -1.0);
    }

    #[test]
    fn test_elapsed_sec_saturates() {
        assert_eq!(elapsed_sec(10_000, i64::MIN), i64::MAX as f64 / 1000.0);
        assert_eq!(elapsed_sec(-10_000, i64::MAX), i64::MIN as f64 / 1000.0);
    }
}
