//! UTC timestamps.

use chrono::{DateTime, Local, Utc};
use std::fmt;

/// A point in time, stored as UTC milliseconds since the Unix epoch.
///
/// Entities persist timestamps in UTC; [`Timestamp::local`] is the
/// projection callers display.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Creates a timestamp from UTC milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns UTC milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the UTC date-time.
    #[must_use]
    pub fn utc(self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Returns the local-time projection.
    #[must_use]
    pub fn local(self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.utc().to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.utc().to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_roundtrip() {
        let ts = Timestamp::from_millis(1_700_000_000_123);
        assert_eq!(ts.as_millis(), 1_700_000_000_123);
        assert_eq!(Timestamp::from(ts.utc()), ts);
    }

    #[test]
    fn local_projection_is_same_instant() {
        let ts = Timestamp::now();
        assert_eq!(ts.local().timestamp_millis(), ts.as_millis());
    }

    #[test]
    fn ordering() {
        assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
    }
}
