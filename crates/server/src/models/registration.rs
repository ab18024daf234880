//! Device registration domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use wallet_core::{PassKey, PushToken, RegistrationId, UnixTime};

/// A device's subscription to push updates for one pass.
///
/// Unique on `(device_library_identifier, pass_type_identifier, serial_number)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Registration {
    /// Surrogate row ID.
    pub id: RegistrationId,
    /// Wallet's per-device library identifier.
    pub device_library_identifier: String,
    /// Pass type the device registered for.
    pub pass_type_identifier: String,
    /// Serial number the device registered for.
    pub serial_number: String,
    /// Where wake-ups for this registration are sent.
    pub push_token: PushToken,
    /// When the device first registered.
    pub registered_at: DateTime<Utc>,
    /// When the registration was last refreshed.
    pub updated_at: DateTime<Utc>,
    /// Last successful wake-up, if any.
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// The key of the pass this registration refers to.
    #[must_use]
    pub fn pass_key(&self) -> PassKey {
        PassKey::new(&self.pass_type_identifier, &self.serial_number)
    }
}

/// Result of an idempotent registration upsert.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UpsertedRegistration {
    #[sqlx(flatten)]
    pub registration: Registration,
    /// False when an existing row was refreshed in place.
    pub created: bool,
}

/// Answer to "which passes changed for this device since `t`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedSerials {
    /// Tag the device sends on its next poll.
    pub last_updated: UnixTime,
    /// Serial numbers whose pass version is newer than the requested tag.
    pub serial_numbers: BTreeSet<String>,
}

impl ChangedSerials {
    /// Build the answer from `(serial, version)` pairs that already passed the
    /// recency filter.
    ///
    /// `floor` is the larger of the requested tag and the store's version
    /// clock read before the query. The returned tag never drops below it, and
    /// any pass written after the query gets a version above it, so the next
    /// poll cannot miss that write.
    #[must_use]
    pub fn from_changed(
        changed: impl IntoIterator<Item = (String, UnixTime)>,
        floor: UnixTime,
    ) -> Self {
        let mut last_updated = floor;
        let mut serial_numbers = BTreeSet::new();

        for (serial, version) in changed {
            last_updated = last_updated.max(version);
            serial_numbers.insert(serial);
        }

        Self {
            last_updated,
            serial_numbers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_changed_takes_max_version() {
        let result = ChangedSerials::from_changed(
            [
                ("s1".to_string(), UnixTime::from_secs(10)),
                ("s2".to_string(), UnixTime::from_secs(30)),
                ("s3".to_string(), UnixTime::from_secs(20)),
            ],
            UnixTime::from_secs(5),
        );

        assert_eq!(result.last_updated, UnixTime::from_secs(30));
        assert_eq!(result.serial_numbers.len(), 3);
    }

    #[test]
    fn test_from_changed_empty_keeps_floor() {
        let result = ChangedSerials::from_changed(Vec::new(), UnixTime::from_secs(40));

        assert!(result.serial_numbers.is_empty());
        assert_eq!(result.last_updated, UnixTime::from_secs(40));
    }

    #[test]
    fn test_from_changed_never_below_floor() {
        let result = ChangedSerials::from_changed(
            [("s1".to_string(), UnixTime::from_secs(10))],
            UnixTime::from_secs(50),
        );

        assert_eq!(result.last_updated, UnixTime::from_secs(50));
    }
}
