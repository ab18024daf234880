//! Whole-second UNIX timestamps used as pass versions.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A UNIX timestamp in whole seconds.
///
/// Pass versions and the `lastUpdated` tag exchanged with devices are both
/// expressed in this unit. Comparisons in change detection are strict, so the
/// resolution here defines what "changed since" means on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTime(i64);

impl UnixTime {
    /// Version of a pass that has never been written.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from seconds since the epoch.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Current wall-clock time, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Seconds since the epoch.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// The version issued after `self`, the newest version the store has
    /// handed out to any pass.
    ///
    /// Normally `now`, but never less than one second past `self`. Stores keep
    /// one such clock for all passes, so a version issued later is greater than
    /// every version (and every `lastUpdated` tag) issued before it, even when
    /// a burst of writes has pushed the clock ahead of wall time.
    #[must_use]
    pub fn next_version(self, now: Self) -> Self {
        Self(now.0.max(self.0.saturating_add(1)))
    }

    /// Parse the `lastUpdated` query value sent by devices.
    ///
    /// Returns `None` for anything that is not a non-negative integer.
    #[must_use]
    pub fn parse_tag(s: &str) -> Option<Self> {
        s.trim().parse::<i64>().ok().filter(|v| *v >= 0).map(Self)
    }

    /// Convert to a `chrono` date time.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// Format as an IMF-fixdate for `Last-Modified` headers.
    #[must_use]
    pub fn to_http_date(&self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }

    /// Parse an HTTP date (`If-Modified-Since`).
    #[must_use]
    pub fn parse_http_date(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc2822(s.trim())
            .ok()
            .map(|dt| Self(dt.timestamp()))
    }
}

impl fmt::Display for UnixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for UnixTime {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for UnixTime {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for UnixTime {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_uses_clock() {
        let prev = UnixTime::from_secs(100);
        assert_eq!(
            prev.next_version(UnixTime::from_secs(500)),
            UnixTime::from_secs(500)
        );
    }

    #[test]
    fn test_next_version_same_second_moves_forward() {
        let prev = UnixTime::from_secs(100);
        assert_eq!(
            prev.next_version(UnixTime::from_secs(100)),
            UnixTime::from_secs(101)
        );
    }

    #[test]
    fn test_next_version_clock_behind() {
        let prev = UnixTime::from_secs(100);
        assert_eq!(
            prev.next_version(UnixTime::from_secs(50)),
            UnixTime::from_secs(101)
        );
    }

    #[test]
    fn test_next_version_from_zero() {
        let now = UnixTime::from_secs(1_700_000_000);
        assert_eq!(UnixTime::ZERO.next_version(now), now);
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(UnixTime::parse_tag("1700000000"), Some(UnixTime::from_secs(1_700_000_000)));
        assert_eq!(UnixTime::parse_tag(" 5 "), Some(UnixTime::from_secs(5)));
        assert_eq!(UnixTime::parse_tag("-1"), None);
        assert_eq!(UnixTime::parse_tag("yesterday"), None);
        assert_eq!(UnixTime::parse_tag(""), None);
    }

    #[test]
    fn test_http_date_roundtrip() {
        let t = UnixTime::from_secs(784_111_777);
        let formatted = t.to_http_date();
        assert_eq!(formatted.as_deref(), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(UnixTime::parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(t));
    }

    #[test]
    fn test_parse_http_date_garbage() {
        assert_eq!(UnixTime::parse_http_date("not a date"), None);
    }
}
