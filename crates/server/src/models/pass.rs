//! Pass domain types.

use chrono::{DateTime, Utc};
use serde_json::Value;

use wallet_core::{PassKey, PassRecordId, UnixTime};

/// A pass definition and its logical version.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Pass {
    /// Surrogate row ID.
    pub id: PassRecordId,
    /// Pass type identifier (first half of the natural key).
    pub pass_type_identifier: String,
    /// Serial number (second half of the natural key).
    pub serial_number: String,
    /// Template tag handed to the pass generator.
    pub template_type: String,
    /// Arbitrary pass payload, passed through to the generator.
    pub data: Value,
    /// Logical version; moves forward on every mutation.
    pub version_updated_at: UnixTime,
    /// When the pass was first created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Pass {
    /// The pass's natural key.
    #[must_use]
    pub fn key(&self) -> PassKey {
        PassKey::new(&self.pass_type_identifier, &self.serial_number)
    }
}

/// Input for `PassStore::create_or_replace`.
#[derive(Debug, Clone)]
pub struct NewPass {
    pub key: PassKey,
    pub template_type: String,
    pub data: Value,
}
