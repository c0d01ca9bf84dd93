use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::property::PropertyValue;

/// Captured key/value context carried along one match attempt.
///
/// Keys are never removed. Capturing a key that is already present replaces
/// its value. Cloning is cheap: clones share storage until one of them is
/// written to, at which point the writer gets its own copy. Forked branches
/// therefore never observe each other's later captures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    entries: Arc<BTreeMap<String, PropertyValue>>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style capture.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Capture `value` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        Arc::make_mut(&mut self.entries).insert(key.into(), value.into());
    }

    /// Value captured under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Whether anything was captured under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `self[key]` equals `value` under [`PropertyValue`] equality.
    pub fn matches(&self, key: &str, value: &PropertyValue) -> bool {
        self.get(key).is_some_and(|v| v == value)
    }

    /// Number of captured keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// An independent copy for a forked branch.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Whether `self` and `other` still share the same storage.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl<K, V> FromIterator<(K, V)> for GlobalState
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }
}
