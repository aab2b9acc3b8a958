//! Arguments bound against a descriptor

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::BindError;

/// Values keyed by parameter name, already type-checked against the
/// operation's descriptor. Absent optional parameters have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    kind: String,
    values: BTreeMap<String, Value>,
}

impl BoundArgs {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Builder-style insert, handy when constructing arguments natively.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BindError> {
        self.values
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| BindError::Convert {
                    kind: self.kind.clone(),
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, BindError> {
        self.optional(key)?.ok_or_else(|| BindError::Missing {
            kind: self.kind.clone(),
            key: key.to_string(),
        })
    }

    pub fn find_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, BindError> {
        Ok(self.optional(key)?.unwrap_or(default))
    }
}
