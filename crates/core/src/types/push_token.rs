//! APNs device push token.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PushToken`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PushTokenError {
    /// The input has the wrong number of characters.
    #[error("push token must be exactly {expected} characters (got {actual})")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length of the rejected input.
        actual: usize,
    },
    /// The input contains a character outside `[0-9a-fA-F]`.
    #[error("push token must contain only hexadecimal digits")]
    NotHex,
}

/// A device push token as delivered by `PassKit` during registration.
///
/// ## Constraints
///
/// - Exactly 64 characters
/// - Hexadecimal digits only, case-insensitive
///
/// The original casing is preserved.
///
/// ## Examples
///
/// ```
/// use wallet_core::PushToken;
///
/// assert!(PushToken::parse(&"a".repeat(64)).is_ok());
/// assert!(PushToken::parse(&"A".repeat(64)).is_ok());
///
/// assert!(PushToken::parse(&"g".repeat(64)).is_err()); // not hex
/// assert!(PushToken::parse(&"a".repeat(63)).is_err()); // too short
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PushToken(String);

impl PushToken {
    /// Required length of a push token in characters.
    pub const LENGTH: usize = 64;

    /// Parse a `PushToken` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 64 hexadecimal characters.
    pub fn parse(s: &str) -> Result<Self, PushTokenError> {
        if s.len() != Self::LENGTH {
            return Err(PushTokenError::InvalidLength {
                expected: Self::LENGTH,
                actual: s.chars().count(),
            });
        }

        // 64 hex chars decode to exactly 32 bytes; anything else fails here
        hex::decode(s).map_err(|_| PushTokenError::NotHex)?;

        Ok(Self(s.to_owned()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened form safe to put in logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}…")
    }
}

impl fmt::Display for PushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PushToken {
    type Err = PushTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PushToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PushToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PushToken {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PushToken {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // The column carries a CHECK constraint, so stored values are valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PushToken {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercase_hex() {
        assert!(PushToken::parse(&"a".repeat(64)).is_ok());
        assert!(PushToken::parse(&"0123456789abcdef".repeat(4)).is_ok());
    }

    #[test]
    fn test_parse_uppercase_hex() {
        assert!(PushToken::parse(&"A".repeat(64)).is_ok());
        assert!(PushToken::parse(&"0123456789ABCDEF".repeat(4)).is_ok());
    }

    #[test]
    fn test_parse_non_hex() {
        assert_eq!(
            PushToken::parse(&"g".repeat(64)),
            Err(PushTokenError::NotHex)
        );
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            PushToken::parse(&"a".repeat(63)),
            Err(PushTokenError::InvalidLength { actual: 63, .. })
        ));
    }

    #[test]
    fn test_parse_too_long() {
        assert!(matches!(
            PushToken::parse(&"a".repeat(65)),
            Err(PushTokenError::InvalidLength { actual: 65, .. })
        ));
    }

    #[test]
    fn test_parse_multibyte_input_is_rejected() {
        // 32 two-byte characters are 64 bytes long but not hex
        assert!(PushToken::parse(&"é".repeat(32)).is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(PushToken::parse("").is_err());
    }

    #[test]
    fn test_casing_is_preserved() {
        let upper = PushToken::parse(&"AB".repeat(32)).unwrap();
        assert_eq!(upper.as_str(), "AB".repeat(32));
    }

    #[test]
    fn test_redacted() {
        let token = PushToken::parse(&"0123456789abcdef".repeat(4)).unwrap();
        assert_eq!(token.redacted(), "01234567…");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<PushToken, _> = serde_json::from_str(&format!("\"{}\"", "f".repeat(64)));
        assert!(ok.is_ok());

        let bad: Result<PushToken, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
