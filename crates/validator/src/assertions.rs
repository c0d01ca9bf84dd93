//! Assertion helpers for verifying validator paths in tests.

use tracecheck_core::PropertyValue;

use crate::engine::{FinishState, Outcome, ValidatorPath};

/// Pretty JSON rendering of the path, for panic messages.
pub fn describe(path: &ValidatorPath) -> String {
    serde_json::to_string_pretty(&path.report())
        .unwrap_or_else(|err| format!("<unrenderable path report: {err}>"))
}

/// Assertion helpers for validator paths.
pub struct PathAssertions;

impl PathAssertions {
    /// Assert how many branches have finished, whatever their outcome.
    ///
    /// # Panics
    ///
    /// Panics if the count differs.
    pub fn assert_finished_count(path: &ValidatorPath, expected: usize) {
        let finished = path.list_finished();
        assert_eq!(
            finished.len(),
            expected,
            "expected {expected} finished branches, got {}: {}",
            finished.len(),
            describe(path)
        );
    }

    /// Assert how many branches are running.
    ///
    /// # Panics
    ///
    /// Panics if the count differs.
    pub fn assert_running_count(path: &ValidatorPath, expected: usize) {
        let running = path.list_running();
        assert_eq!(
            running.len(),
            expected,
            "expected {expected} running branches, got {}: {}",
            running.len(),
            describe(path)
        );
    }

    /// Assert that a branch finished successfully with `key == value`.
    ///
    /// # Panics
    ///
    /// Panics if no such branch exists or it did not succeed.
    pub fn assert_succeeded_with(
        path: &ValidatorPath,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> FinishState {
        let value = value.into();
        match path.find_finished(key, &value) {
            Some(finished) => {
                assert_eq!(
                    finished.outcome,
                    Outcome::Successful,
                    "branch with {key} = {value} finished as {}",
                    finished.outcome
                );
                finished
            }
            None => panic!(
                "expected a finished branch with {key} = {value}, got {}",
                describe(path)
            ),
        }
    }

    /// Assert that no finished branch has `key == value`.
    ///
    /// # Panics
    ///
    /// Panics if such a branch exists.
    pub fn assert_not_finished_with(path: &ValidatorPath, key: &str, value: impl Into<PropertyValue>) {
        let value = value.into();
        if let Some(finished) = path.find_finished(key, &value) {
            panic!("expected no finished branch with {key} = {value}, got {finished:?}");
        }
    }

    /// Assert that a running branch has `key == value`.
    ///
    /// # Panics
    ///
    /// Panics if no running branch matches.
    pub fn assert_running_with(path: &ValidatorPath, key: &str, value: impl Into<PropertyValue>) {
        let value = value.into();
        assert!(
            path.get_running(key, &value).is_some(),
            "expected a running branch with {key} = {value}, got {}",
            describe(path)
        );
    }

    /// Assert that a branch failed and its error mentions `fragment`.
    ///
    /// # Panics
    ///
    /// Panics if no failed branch carries a matching error.
    pub fn assert_failed_with(path: &ValidatorPath, fragment: &str) -> FinishState {
        let failed = path.get_finished(|f| {
            f.outcome == Outcome::Failed && f.error.as_deref().is_some_and(|e| e.contains(fragment))
        });
        match failed {
            Some(finished) => finished,
            None => panic!(
                "expected a failed branch mentioning '{fragment}', got {}",
                describe(path)
            ),
        }
    }
}
