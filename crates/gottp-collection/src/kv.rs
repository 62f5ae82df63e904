// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered, enable/disable-aware key-value pairs used for query params and headers.

use serde::{Deserialize, Serialize};

/// A single key-value pair, as used for query parameters and headers.
///
/// Ordering is preserved on load and save; disabled entries are carried
/// through persistence but excluded when building the wire request
/// (Invariant 4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KeyValue {
    /// Parameter or header name.
    pub key: String,
    /// Raw value, not yet variable-resolved.
    pub value: String,
    /// Whether this pair should be included on the wire.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl KeyValue {
    /// Create a new enabled key-value pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// Create a disabled key-value pair.
    pub fn disabled(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: false,
        }
    }
}

/// Filter a KV list down to the entries that should reach the wire
/// (Invariant 4: disabled pairs never influence the wire request).
pub fn enabled_pairs(pairs: &[KeyValue]) -> impl Iterator<Item = &KeyValue> {
    pairs.iter().filter(|p| p.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_to_enabled() {
        let kv = KeyValue::new("Accept", "application/json");
        assert!(kv.enabled);
    }

    #[test]
    fn disabled_constructor() {
        let kv = KeyValue::disabled("X-Debug", "1");
        assert!(!kv.enabled);
    }

    #[test]
    fn enabled_pairs_excludes_disabled() {
        let pairs = vec![
            KeyValue::new("a", "1"),
            KeyValue::disabled("b", "2"),
            KeyValue::new("c", "3"),
        ];
        let kept: Vec<_> = enabled_pairs(&pairs).map(|p| p.key.as_str()).collect();
        assert_eq!(kept, vec!["a", "c"]);
    }

    #[test]
    fn deserialize_defaults_enabled_true() {
        let kv: KeyValue = serde_json::from_str(r#"{"key":"k","value":"v"}"#).unwrap();
        assert!(kv.enabled);
    }

    #[test]
    fn order_preserved_in_vec() {
        let pairs = vec![
            KeyValue::new("z", "1"),
            KeyValue::new("a", "2"),
            KeyValue::new("m", "3"),
        ];
        let keys: Vec<_> = pairs.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
