use std::fmt;
use std::sync::Arc;

use tracecheck_core::{DataRecord, PropertyValue};

use crate::error::ConditionError;
use crate::ir::condition::AccessorFn;

/// Where a GroupBy reads its key from.
#[derive(Clone)]
pub enum KeySource {
    /// First property with this name.
    Property(String),
    /// Value derived from the whole event.
    Accessor(Arc<AccessorFn>),
}

/// Names and extracts the key a GroupBy partitions events by.
///
/// The extracted value is seeded into each keyed branch's state under
/// [`KeyExtractor::name`].
#[derive(Clone)]
pub struct KeyExtractor {
    name: String,
    source: KeySource,
}

impl KeyExtractor {
    /// Key on property `name`, seeded under the same name.
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: KeySource::Property(name.clone()),
            name,
        }
    }

    /// Key on property `property`, seeded under `name`.
    pub fn property_as(property: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: KeySource::Property(property.into()),
        }
    }

    /// Key on a derived value, seeded under `name`.
    ///
    /// An accessor returning [`PropertyValue::Null`] means "no key".
    pub fn accessor<F>(name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&DataRecord) -> Result<PropertyValue, ConditionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: KeySource::Accessor(Arc::new(accessor)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// The key of `record`, or `None` when the event carries no key.
    pub fn extract(&self, record: &DataRecord) -> Result<Option<PropertyValue>, ConditionError> {
        let value = match &self.source {
            KeySource::Property(property) => record.get(property).cloned(),
            KeySource::Accessor(accessor) => Some(accessor(record)?),
        };
        Ok(value.filter(|v| !v.is_null()))
    }

    pub(crate) fn to_source(&self) -> String {
        match &self.source {
            KeySource::Property(property) if *property == self.name => property.clone(),
            KeySource::Property(property) => format!("{property} as {}", self.name),
            KeySource::Accessor(_) => format!("<derived> as {}", self.name),
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExtractor")
            .field("source", &self.to_source())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_key_extraction() {
        let key = KeyExtractor::property("host");
        let record = DataRecord::new("p", "s", "m").with("host", "abc");
        assert_eq!(key.extract(&record).unwrap(), Some("abc".into()));

        let bare = DataRecord::new("p", "s", "m");
        assert_eq!(key.extract(&bare).unwrap(), None);

        let null = DataRecord::new("p", "s", "m").with("host", PropertyValue::Null);
        assert_eq!(key.extract(&null).unwrap(), None);
    }

    #[test]
    fn accessor_key_extraction() {
        let key = KeyExtractor::accessor("scope", |r| Ok(r.scope.as_str().into()));
        let record = DataRecord::new("p", "db", "m");
        assert_eq!(key.name(), "scope");
        assert_eq!(key.extract(&record).unwrap(), Some("db".into()));
    }

    #[test]
    fn renamed_property_source() {
        let key = KeyExtractor::property_as("host", "server");
        assert_eq!(key.name(), "server");
        assert_eq!(key.to_source(), "host as server");
    }
}
