//! Identifier types for aggregation windows
//!
//! A window is identified by the instant it closes, in Unix nanoseconds.
//! Keys are totally ordered so stores can iterate chronologically.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an aggregation window: its end instant in Unix nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowKey(i64);

impl WindowKey {
    /// Create from a Unix nanosecond instant
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Window end instant in Unix nanoseconds
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Wall-clock label of the window end (`HH:MM:SS`, UTC).
    pub fn label(&self) -> String {
        DateTime::from_timestamp_nanos(self.0)
            .format("%H:%M:%S")
            .to_string()
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_ordering() {
        let a = WindowKey::from_nanos(30_000_000_000);
        let b = WindowKey::from_nanos(60_000_000_000);
        assert!(a < b);
        assert_eq!(b.as_nanos(), 60_000_000_000);
    }

    #[test]
    fn test_window_key_label() {
        // 1970-01-01T01:02:03Z
        let key = WindowKey::from_nanos((3600 + 2 * 60 + 3) * 1_000_000_000);
        assert_eq!(key.label(), "01:02:03");
    }
}
