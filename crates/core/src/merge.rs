//! Recursive structural merge for pass data.
//!
//! Pass payloads are schema-less JSON. Updates arrive as partial documents and
//! are merged into the stored document with one rule applied at every depth:
//! the incoming value wins.
//!
//! | stored   | incoming | result                                   |
//! |----------|----------|------------------------------------------|
//! | object   | object   | keys merged recursively, absent keys kept |
//! | anything | non-object | incoming replaces stored (arrays included) |
//! | non-object | object | incoming replaces stored                  |
//!
//! Arrays are treated as scalars: there is no positional merge, an incoming
//! array replaces the stored one wholesale. An explicit `null` replaces the
//! stored value; it does not delete the key.

use serde_json::{Map, Value};

/// Merge `incoming` into `target` in place.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use wallet_core::merge_json;
///
/// let mut stored = json!({"description": "x", "colors": {"fg": "#000", "bg": "#fff"}});
/// merge_json(&mut stored, json!({"description": "y", "colors": {"bg": "#eee"}}));
///
/// assert_eq!(
///     stored,
///     json!({"description": "y", "colors": {"fg": "#000", "bg": "#eee"}})
/// );
/// ```
pub fn merge_json(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(stored), Value::Object(update)) => merge_maps(stored, update),
        (slot, replacement) => *slot = replacement,
    }
}

fn merge_maps(stored: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        match stored.get_mut(&key) {
            Some(existing) => merge_json(existing, value),
            None => {
                stored.insert(key, value);
            }
        }
    }
}
