use std::fmt;
use std::sync::Arc;

use tracecheck_core::{DataRecord, GlobalState, PropertyValue};

use crate::error::ConditionError;

/// Boolean test over an event and the branch's captured state.
pub type PredicateFn =
    dyn Fn(&DataRecord, &GlobalState) -> Result<bool, ConditionError> + Send + Sync;

/// Derives a value from an event.
pub type AccessorFn = dyn Fn(&DataRecord) -> Result<PropertyValue, ConditionError> + Send + Sync;

/// Compares an observed value (left) with an expected one (right).
pub type EqualityFn = dyn Fn(&PropertyValue, &PropertyValue) -> bool + Send + Sync;

/// Extends the captured state after a condition held.
pub type CaptureFn =
    dyn Fn(&DataRecord, &mut GlobalState) -> Result<(), ConditionError> + Send + Sync;

/// The test a [`Condition`] performs.
#[derive(Clone)]
pub enum ConditionKind {
    /// Arbitrary predicate over the event and captured state.
    Predicate(Arc<PredicateFn>),
    /// First property named `property` compared with `expected`.
    /// A missing property does not hold.
    EqualsProperty {
        property: String,
        expected: PropertyValue,
    },
    /// Value derived by `accessor` compared with `expected`.
    EqualsDerived {
        accessor: Arc<AccessorFn>,
        expected: PropertyValue,
    },
    /// Always holds. With an accessor, the derived value is what
    /// [`Condition::capture_as`] records.
    AlwaysTrue { accessor: Option<Arc<AccessorFn>> },
}

/// A predicate with an optional capture side effect.
///
/// Evaluation never mutates the event. When the test holds, the compared or
/// derived value is stored under the `capture_as` key (if any), then the
/// custom capture runs (if any). Both run exactly once per successful
/// evaluation and never when the test fails.
#[derive(Clone)]
pub struct Condition {
    kind: ConditionKind,
    equality: Option<Arc<EqualityFn>>,
    capture_as: Option<String>,
    capture: Option<Arc<CaptureFn>>,
    label: Option<String>,
}

impl Condition {
    fn from_kind(kind: ConditionKind) -> Self {
        Self {
            kind,
            equality: None,
            capture_as: None,
            capture: None,
            label: None,
        }
    }

    /// Fallible predicate over the event and captured state.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&DataRecord, &GlobalState) -> Result<bool, ConditionError> + Send + Sync + 'static,
    {
        Self::from_kind(ConditionKind::Predicate(Arc::new(f)))
    }

    /// Infallible predicate over the event alone.
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&DataRecord) -> bool + Send + Sync + 'static,
    {
        Self::predicate(move |record, _| Ok(f(record)))
    }

    /// Holds when the first property named `property` equals `expected`.
    pub fn property_eq(property: impl Into<String>, expected: impl Into<PropertyValue>) -> Self {
        Self::from_kind(ConditionKind::EqualsProperty {
            property: property.into(),
            expected: expected.into(),
        })
    }

    /// Holds when the value derived by `accessor` equals `expected`.
    pub fn derived_eq<F>(accessor: F, expected: impl Into<PropertyValue>) -> Self
    where
        F: Fn(&DataRecord) -> Result<PropertyValue, ConditionError> + Send + Sync + 'static,
    {
        Self::from_kind(ConditionKind::EqualsDerived {
            accessor: Arc::new(accessor),
            expected: expected.into(),
        })
    }

    pub fn always() -> Self {
        Self::from_kind(ConditionKind::AlwaysTrue { accessor: None })
    }

    /// Never rejects; records the derived value under `key`.
    pub fn tap<F>(accessor: F, key: impl Into<String>) -> Self
    where
        F: Fn(&DataRecord) -> Result<PropertyValue, ConditionError> + Send + Sync + 'static,
    {
        Self::from_kind(ConditionKind::AlwaysTrue {
            accessor: Some(Arc::new(accessor)),
        })
        .capture_as(key)
    }

    /// Never rejects; records property `property` (or null when absent) under `key`.
    pub fn tap_property(property: impl Into<String>, key: impl Into<String>) -> Self {
        let property = property.into();
        let label = format!("tap({property})");
        Self::tap(
            move |record| Ok(record.get(&property).cloned().unwrap_or(PropertyValue::Null)),
            key,
        )
        .labeled(label)
    }

    /// Store the compared or derived value under `key` when the condition holds.
    #[must_use]
    pub fn capture_as(mut self, key: impl Into<String>) -> Self {
        self.capture_as = Some(key.into());
        self
    }

    /// Run `capture` after the condition holds.
    #[must_use]
    pub fn with_capture<F>(mut self, capture: F) -> Self
    where
        F: Fn(&DataRecord, &mut GlobalState) -> Result<(), ConditionError> + Send + Sync + 'static,
    {
        self.capture = Some(Arc::new(capture));
        self
    }

    /// Replace the equality used by the `Equals*` kinds.
    #[must_use]
    pub fn with_equality<F>(mut self, equality: F) -> Self
    where
        F: Fn(&PropertyValue, &PropertyValue) -> bool + Send + Sync + 'static,
    {
        self.equality = Some(Arc::new(equality));
        self
    }

    /// Human-readable name used in branch positions and diagnostics.
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    pub fn capture_key(&self) -> Option<&str> {
        self.capture_as.as_deref()
    }

    fn equal(&self, observed: &PropertyValue, expected: &PropertyValue) -> bool {
        match &self.equality {
            Some(eq) => eq(observed, expected),
            None => observed == expected,
        }
    }

    /// Evaluate against `record`, extending `state` when the condition holds.
    pub fn evaluate(
        &self,
        record: &DataRecord,
        state: &mut GlobalState,
    ) -> Result<bool, ConditionError> {
        let wants_value = self.capture_as.is_some();
        let (holds, value) = match &self.kind {
            ConditionKind::Predicate(f) => (f(record, state)?, None),
            ConditionKind::EqualsProperty { property, expected } => match record.get(property) {
                Some(observed) => (
                    self.equal(observed, expected),
                    wants_value.then(|| observed.clone()),
                ),
                None => (false, None),
            },
            ConditionKind::EqualsDerived { accessor, expected } => {
                let observed = accessor(record)?;
                (self.equal(&observed, expected), Some(observed))
            }
            ConditionKind::AlwaysTrue { accessor } => {
                let value = match accessor {
                    Some(accessor) if wants_value => Some(accessor(record)?),
                    _ => None,
                };
                (true, value)
            }
        };

        if !holds {
            return Ok(false);
        }
        if let (Some(key), Some(value)) = (&self.capture_as, value) {
            state.insert(key.clone(), value);
        }
        if let Some(capture) = &self.capture {
            capture(record, state)?;
        }
        Ok(true)
    }

    /// Pseudo-code rendering.
    pub fn to_source(&self) -> String {
        let body = match (&self.label, &self.kind) {
            (Some(label), _) => label.clone(),
            (None, ConditionKind::Predicate(_)) => "<predicate>".to_owned(),
            (None, ConditionKind::EqualsProperty { property, expected }) => {
                format!("{property} == {expected}")
            }
            (None, ConditionKind::EqualsDerived { expected, .. }) => {
                format!("<derived> == {expected}")
            }
            (None, ConditionKind::AlwaysTrue { .. }) => "true".to_owned(),
        };
        match &self.capture_as {
            Some(key) => format!("{body} as {key}"),
            None => body,
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("source", &self.to_source())
            .field("custom_equality", &self.equality.is_some())
            .field("custom_capture", &self.capture.is_some())
            .finish()
    }
}

/// Look up a property an accessor cannot do without.
pub fn require<'a>(record: &'a DataRecord, name: &str) -> Result<&'a PropertyValue, ConditionError> {
    record
        .get(name)
        .ok_or_else(|| ConditionError::MissingProperty(name.to_owned()))
}

/// Look up a string property an accessor cannot do without.
pub fn require_str<'a>(record: &'a DataRecord, name: &str) -> Result<&'a str, ConditionError> {
    let value = require(record, name)?;
    value.as_str().ok_or_else(|| {
        ConditionError::TypeError(format!("property '{name}' is {}, not string", value.tag()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(host: &str, path: &str) -> DataRecord {
        DataRecord::new("http", "request", "handled")
            .with("host", host)
            .with("path", path)
    }

    #[test]
    fn property_eq_holds_and_captures() {
        let condition = Condition::property_eq("host", "def").capture_as("host");
        let mut state = GlobalState::new();

        assert!(!condition.evaluate(&event("abc", "/1"), &mut state).unwrap());
        assert!(state.is_empty(), "no capture when the test fails");

        assert!(condition.evaluate(&event("def", "/1"), &mut state).unwrap());
        assert!(state.matches("host", &"def".into()));
    }

    #[test]
    fn missing_property_does_not_hold() {
        let condition = Condition::property_eq("user", "bob");
        let mut state = GlobalState::new();
        assert!(!condition.evaluate(&event("abc", "/1"), &mut state).unwrap());
    }

    #[test]
    fn property_eq_does_not_coerce_tags() {
        let condition = Condition::property_eq("status", "200");
        let record = DataRecord::new("p", "s", "m").with("status", 200);
        assert!(!condition.evaluate(&record, &mut GlobalState::new()).unwrap());
    }

    #[test]
    fn custom_equality_is_used() {
        let condition = Condition::property_eq("path", "/API")
            .with_equality(|observed, expected| match (observed.as_str(), expected.as_str()) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            });
        let mut state = GlobalState::new();
        assert!(condition.evaluate(&event("h", "/api"), &mut state).unwrap());
    }

    #[test]
    fn derived_eq_captures_the_derived_value() {
        let condition = Condition::derived_eq(
            |record| Ok(PropertyValue::Integer(require_str(record, "path")?.len() as i64)),
            2,
        )
        .capture_as("len");
        let mut state = GlobalState::new();
        assert!(condition.evaluate(&event("h", "/1"), &mut state).unwrap());
        assert_eq!(state.get("len"), Some(&PropertyValue::Integer(2)));
    }

    #[test]
    fn accessor_errors_propagate() {
        let condition = Condition::derived_eq(|record| require(record, "nope").cloned(), 1);
        let err = condition
            .evaluate(&event("h", "/1"), &mut GlobalState::new())
            .unwrap_err();
        assert_eq!(err, ConditionError::MissingProperty("nope".into()));
    }

    #[test]
    fn tap_never_rejects() {
        let condition = Condition::tap_property("host", "host2");
        let mut state = GlobalState::new();
        assert!(condition.evaluate(&event("ghi", "/9"), &mut state).unwrap());
        assert!(state.matches("host2", &"ghi".into()));

        let bare = DataRecord::new("p", "s", "m");
        assert!(condition.evaluate(&bare, &mut state).unwrap());
        assert_eq!(state.get("host2"), Some(&PropertyValue::Null));
    }

    #[test]
    fn custom_capture_runs_only_on_success() {
        let condition = Condition::when(|r| r.get("path") == Some(&"/1".into()))
            .with_capture(|record, state| {
                state.insert("seen", record.message.clone());
                Ok(())
            });
        let mut state = GlobalState::new();
        assert!(!condition.evaluate(&event("h", "/2"), &mut state).unwrap());
        assert!(!state.contains_key("seen"));
        assert!(condition.evaluate(&event("h", "/1"), &mut state).unwrap());
        assert!(state.matches("seen", &"handled".into()));
    }

    #[test]
    fn predicate_sees_captured_state() {
        let condition = Condition::predicate(|record, state| {
            Ok(state.get("host").is_some_and(|h| record.get("host") == Some(h)))
        });
        let state = GlobalState::new().with("host", "abc");
        assert!(condition.evaluate(&event("abc", "/1"), &mut state.fork()).unwrap());
        assert!(!condition.evaluate(&event("def", "/1"), &mut state.fork()).unwrap());
    }

    #[test]
    fn source_rendering() {
        assert_eq!(
            Condition::property_eq("host", "def").capture_as("host").to_source(),
            "host == \"def\" as host"
        );
        assert_eq!(Condition::always().to_source(), "true");
        assert_eq!(Condition::tap_property("host", "h2").to_source(), "tap(host) as h2");
    }
}
