//! Natural key of a pass.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a pass: `(passTypeIdentifier, serialNumber)`, unique together.
///
/// Registrations reference passes through this pair rather than through a
/// foreign key, so it is also the join key for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassKey {
    /// Pass type identifier, e.g. `pass.com.example.loyalty`.
    pub pass_type_identifier: String,
    /// Serial number, unique within the pass type.
    pub serial_number: String,
}

impl PassKey {
    /// Create a new pass key.
    #[must_use]
    pub fn new(pass_type_identifier: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            pass_type_identifier: pass_type_identifier.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Returns true if either component is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pass_type_identifier.trim().is_empty() || self.serial_number.trim().is_empty()
    }
}

impl fmt::Display for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pass_type_identifier, self.serial_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let key = PassKey::new("pass.t", "s1");
        assert_eq!(key.to_string(), "pass.t/s1");
    }

    #[test]
    fn test_is_blank() {
        assert!(!PassKey::new("pass.t", "s1").is_blank());
        assert!(PassKey::new("", "s1").is_blank());
        assert!(PassKey::new("pass.t", "  ").is_blank());
    }

    #[test]
    fn test_serde_uses_protocol_field_names() {
        let json = serde_json::to_value(PassKey::new("pass.t", "s1")).unwrap_or_default();
        assert_eq!(json["passTypeIdentifier"], "pass.t");
        assert_eq!(json["serialNumber"], "s1");
    }
}
