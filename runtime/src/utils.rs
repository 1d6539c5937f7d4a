//! Utility functions for interacting with any runtime.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts bytes to a hexadecimal string.
pub fn hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes.iter() {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Extension trait to add methods to `std::time::SystemTime`
pub trait SystemTimeExt {
    /// Returns the duration since the Unix epoch.
    ///
    /// Panics if the system time is before the Unix epoch.
    fn epoch(&self) -> Duration;

    /// Adds `delay`, clamping to a time close to the latest representable one on overflow.
    ///
    /// The result is never earlier than `self` and is within a factor of two of the largest
    /// delay that fits.
    fn saturating_add(&self, delay: Duration) -> SystemTime;

    /// Returns the signed number of nanoseconds from `self` until `other`.
    ///
    /// Negative if `other` is before `self`. Saturates at the bounds of `i64`.
    fn nanos_until(&self, other: SystemTime) -> i64;
}

impl SystemTimeExt for SystemTime {
    fn epoch(&self) -> Duration {
        self.duration_since(UNIX_EPOCH)
            .expect("failed to calculate time since epoch")
    }

    fn saturating_add(&self, delay: Duration) -> SystemTime {
        let mut delay = delay;
        loop {
            if let Some(time) = self.checked_add(delay) {
                return time;
            }
            delay /= 2;
        }
    }

    fn nanos_until(&self, other: SystemTime) -> i64 {
        match other.duration_since(*self) {
            Ok(ahead) => i64::try_from(ahead.as_nanos()).unwrap_or(i64::MAX),
            Err(behind) => i64::try_from(behind.duration().as_nanos())
                .map(|nanos| -nanos)
                .unwrap_or(i64::MIN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "");
        assert_eq!(hex(&[0x01, 0xab, 0xff]), "01abff");
    }

    #[test]
    fn test_epoch() {
        let time = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(time.epoch(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_saturating_add() {
        let time = UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(
            time.saturating_add(Duration::from_nanos(5)),
            time + Duration::from_nanos(5)
        );
        assert_eq!(time.saturating_add(Duration::ZERO), time);

        let far = time.saturating_add(Duration::MAX);
        assert!(far > time + Duration::from_secs(1_000 * 365 * 24 * 60 * 60));
        assert_eq!(time.nanos_until(far), i64::MAX);
    }

    #[test]
    fn test_nanos_until() {
        let earlier = UNIX_EPOCH + Duration::from_nanos(30);
        let later = UNIX_EPOCH + Duration::from_nanos(80);
        assert_eq!(earlier.nanos_until(later), 50);
        assert_eq!(later.nanos_until(earlier), -50);
        assert_eq!(later.nanos_until(later), 0);
    }
}
