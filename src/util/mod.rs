//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library.

use std::time::Duration;

/// Converts a duration to whole milliseconds, saturating at u64::MAX
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts a number of milliseconds to a duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_conversion() {
        let duration = Duration::from_millis(150);
        let millis = duration_to_millis(duration);
        assert_eq!(millis, 150);
        assert_eq!(millis_to_duration(millis), duration);
    }

    #[test]
    fn test_millis_conversion_saturates() {
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }
}
