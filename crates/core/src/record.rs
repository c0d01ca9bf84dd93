use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::property::{DataProperty, PropertyValue};

/// One captured trace or log occurrence.
///
/// Properties keep insertion order. Names may repeat; lookups return the
/// first property with a matching name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Component that produced the event (logger category, tracing target, ...).
    pub provider: String,
    /// Scope or span the event was emitted in.
    pub scope: String,
    /// Rendered event message.
    pub message: String,
    /// When the event was captured.
    pub timestamp: DateTime<Utc>,
    /// Ordered property list.
    pub properties: Vec<DataProperty>,
}

impl Default for DataRecord {
    fn default() -> Self {
        Self {
            provider: String::new(),
            scope: String::new(),
            message: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            properties: Vec::new(),
        }
    }
}

impl DataRecord {
    /// Create a record with the given identity, stamped with the current time.
    pub fn new(
        provider: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            scope: scope.into(),
            message: message.into(),
            timestamp: Utc::now(),
            properties: Vec::new(),
        }
    }

    /// Append a property, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.push(DataProperty::new(name, value));
        self
    }

    /// Set the timestamp, builder style.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn push(&mut self, property: DataProperty) {
        self.properties.push(property);
    }

    /// First property named `name`.
    pub fn property(&self, name: &str) -> Option<&DataProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Value of the first property named `name`.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.property(name).map(|p| &p.value)
    }

    /// Copy identity, timestamp and properties from `other` into `self`,
    /// reusing `self`'s property storage.
    pub fn copy_from(&mut self, other: &Self) {
        self.provider.clone_from(&other.provider);
        self.scope.clone_from(&other.scope);
        self.message.clone_from(&other.message);
        self.timestamp = other.timestamp;
        self.properties.clear();
        self.properties.extend(other.properties.iter().cloned());
    }

    /// Reset to the empty state while keeping allocated storage.
    pub(crate) fn reset(&mut self) {
        self.provider.clear();
        self.scope.clear();
        self.message.clear();
        self.timestamp = DateTime::<Utc>::UNIX_EPOCH;
        self.properties.clear();
    }

    /// Whether the record is empty and its property storage is within `max_capacity`.
    pub(crate) fn is_reset(&self, max_capacity: usize) -> bool {
        self.properties.is_empty()
            && self.provider.is_empty()
            && self.scope.is_empty()
            && self.message.is_empty()
            && self.properties.capacity() <= max_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_first_match() {
        let record = DataRecord::new("http", "request", "done")
            .with("status", 200)
            .with("status", 500);
        assert_eq!(record.get("status").and_then(PropertyValue::as_integer), Some(200));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn properties_keep_insertion_order() {
        let record = DataRecord::new("p", "s", "m")
            .with("b", 1)
            .with("a", 2)
            .with("c", 3);
        let names: Vec<_> = record.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn reset_keeps_capacity_and_clears_content() {
        let mut record = DataRecord::new("p", "s", "m").with("a", 1).with("b", 2);
        let capacity = record.properties.capacity();
        record.reset();
        assert!(record.is_reset(capacity));
        assert_eq!(record.properties.capacity(), capacity);
        assert!(!record.is_reset(0), "capacity above the bound");
    }

    #[test]
    fn copy_from_replaces_everything() {
        let source = DataRecord::new("p", "s", "m").with("a", "x");
        let mut target = DataRecord::new("q", "t", "n").with("z", 9).with("y", 8);
        target.copy_from(&source);
        assert_eq!(target, source);
    }
}
