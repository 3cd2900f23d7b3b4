//! Bounded, schema-less metadata attached to alerts.
//!
//! Values are a closed tree of primitives, lists and maps. Every insert and
//! every deserialization is checked against the size bounds below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MetadataError;

/// Maximum entries in any map or list.
pub const MAX_ENTRIES: usize = 32;
/// Maximum key length in characters.
pub const MAX_KEY_LEN: usize = 64;
/// Maximum text value length in characters.
pub const MAX_TEXT_LEN: usize = 2048;
/// Maximum nesting depth, counting top-level values as depth 1.
pub const MAX_DEPTH: usize = 3;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn validate(&self, depth: usize) -> Result<(), MetadataError> {
        if depth > MAX_DEPTH {
            return Err(MetadataError::TooDeep { max: MAX_DEPTH });
        }
        match self {
            MetadataValue::Text(s) if s.chars().count() > MAX_TEXT_LEN => {
                Err(MetadataError::TextTooLong { max: MAX_TEXT_LEN })
            }
            MetadataValue::List(items) => {
                if items.len() > MAX_ENTRIES {
                    return Err(MetadataError::TooManyEntries { max: MAX_ENTRIES });
                }
                items.iter().try_for_each(|v| v.validate(depth + 1))
            }
            MetadataValue::Map(map) => validate_map(map, depth + 1),
            _ => Ok(()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

fn validate_map(map: &BTreeMap<String, MetadataValue>, depth: usize) -> Result<(), MetadataError> {
    if map.len() > MAX_ENTRIES {
        return Err(MetadataError::TooManyEntries { max: MAX_ENTRIES });
    }
    for (key, value) in map {
        if key.chars().count() > MAX_KEY_LEN {
            return Err(MetadataError::KeyTooLong {
                key: key.clone(),
                max: MAX_KEY_LEN,
            });
        }
        value.validate(depth)?;
    }
    Ok(())
}

/// Size-bounded metadata map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, MetadataValue>", into = "BTreeMap<String, MetadataValue>")]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, rejecting anything that would break the bounds.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Result<(), MetadataError> {
        let key = key.into();
        let value = value.into();
        if key.chars().count() > MAX_KEY_LEN {
            return Err(MetadataError::KeyTooLong {
                key,
                max: MAX_KEY_LEN,
            });
        }
        if !self.0.contains_key(&key) && self.0.len() >= MAX_ENTRIES {
            return Err(MetadataError::TooManyEntries { max: MAX_ENTRIES });
        }
        value.validate(1)?;
        self.0.insert(key, value);
        Ok(())
    }

    /// Builder-style insert.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Result<Self, MetadataError> {
        self.insert(key, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }
}

impl TryFrom<BTreeMap<String, MetadataValue>> for Metadata {
    type Error = MetadataError;

    fn try_from(map: BTreeMap<String, MetadataValue>) -> Result<Self, Self::Error> {
        validate_map(&map, 1)?;
        Ok(Self(map))
    }
}

impl From<Metadata> for BTreeMap<String, MetadataValue> {
    fn from(value: Metadata) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let metadata = Metadata::new()
            .with("route", "LHR-JFK")
            .unwrap()
            .with("fare_change_pct", -12.5)
            .unwrap();
        assert_eq!(metadata.get("route").and_then(|v| v.as_str()), Some("LHR-JFK"));
        assert_eq!(
            metadata.get("fare_change_pct").and_then(MetadataValue::as_f64),
            Some(-12.5)
        );
    }

    #[test]
    fn test_entry_limit() {
        let mut metadata = Metadata::new();
        for i in 0..MAX_ENTRIES {
            metadata.insert(format!("k{i}"), i as i64).unwrap();
        }
        assert_eq!(
            metadata.insert("overflow", 1_i64),
            Err(MetadataError::TooManyEntries { max: MAX_ENTRIES })
        );
        // Overwriting an existing key is still allowed
        assert!(metadata.insert("k0", 99_i64).is_ok());
    }

    #[test]
    fn test_text_and_key_limits() {
        let mut metadata = Metadata::new();
        let long_text = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(metadata.insert("note", long_text).is_err());
        let long_key = "k".repeat(MAX_KEY_LEN + 1);
        assert!(metadata.insert(long_key, "v").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let leaf = MetadataValue::Number(1.0);
        let level3 = MetadataValue::List(vec![leaf]);
        let level2 = MetadataValue::Map(BTreeMap::from([("c".to_string(), level3)]));
        let mut metadata = Metadata::new();
        assert!(metadata.insert("ok", level2.clone()).is_ok());

        let too_deep = MetadataValue::List(vec![level2]);
        assert_eq!(
            metadata.insert("deep", too_deep),
            Err(MetadataError::TooDeep { max: MAX_DEPTH })
        );
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"route":"LHR-DXB","delta":4,"flags":[true,null],"nested":{"a":"b"}}"#;
        let metadata: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.len(), 4);
        assert_eq!(metadata.get("delta"), Some(&MetadataValue::Number(4.0)));

        let too_many: BTreeMap<String, i32> = (0..=MAX_ENTRIES).map(|i| (format!("k{i}"), 1)).collect();
        let json = serde_json::to_string(&too_many).unwrap();
        assert!(serde_json::from_str::<Metadata>(&json).is_err());
    }
}
