use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracecheck_core::{DataRecord, GlobalState, PooledRecord};
use tracing::{debug, instrument};

use crate::config::ValidatorConfig;
use crate::engine::path::ValidatorPath;
use crate::error::ValidatorError;
use crate::ir::{Expr, validate};

type PathMap = DashMap<u64, Arc<ValidatorPath>>;

/// Registry of validator paths and the fan-out point for incoming events.
///
/// `on_trace` may be called from any number of threads. Each call snapshots
/// the registered paths before evaluating, so registering or disposing a
/// path never waits on an in-flight broadcast.
pub struct Validator {
    paths: Arc<PathMap>,
    next_id: AtomicU64,
    config: ValidatorConfig,
}

impl Validator {
    /// Validator with no paths registered.
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            paths: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `tree` and start matching it from `initial`.
    pub fn add(&self, tree: Expr, initial: GlobalState) -> Result<PathHandle, ValidatorError> {
        self.register(None, tree, initial)
    }

    /// Like [`add`](Self::add), naming the path in logs.
    pub fn add_named(
        &self,
        name: impl Into<String>,
        tree: Expr,
        initial: GlobalState,
    ) -> Result<PathHandle, ValidatorError> {
        self.register(Some(name.into()), tree, initial)
    }

    #[instrument(skip_all, fields(path = name.as_deref().unwrap_or("")))]
    fn register(
        &self,
        name: Option<String>,
        tree: Expr,
        initial: GlobalState,
    ) -> Result<PathHandle, ValidatorError> {
        validate(&tree)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = Arc::new(ValidatorPath::new(
            id,
            name,
            tree,
            initial,
            self.config.default_wait_timeout(),
        ));
        self.paths.insert(id, Arc::clone(&path));
        debug!(path_id = id, running = path.list_running().len(), "path registered");
        Ok(PathHandle {
            path,
            registry: Arc::clone(&self.paths),
        })
    }

    /// Broadcast a pooled event. The handle's holder count is left untouched.
    pub fn on_trace(&self, is_public: bool, record: &PooledRecord) {
        let guard = record.read();
        self.on_event(is_public, &guard);
    }

    /// Broadcast a borrowed event to every registered path.
    pub fn on_event(&self, is_public: bool, record: &DataRecord) {
        if !is_public && !self.config.accept_private {
            return;
        }
        let paths: Vec<Arc<ValidatorPath>> = self
            .paths
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for path in paths {
            path.on_trace(record);
        }
    }

    /// Paths currently registered.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

/// Owning handle to a registered path. Dropping it unregisters the path.
pub struct PathHandle {
    path: Arc<ValidatorPath>,
    registry: Arc<PathMap>,
}

impl PathHandle {
    /// Unregister the path. Waiters on it return `None`.
    pub fn dispose(self) {
        drop(self);
    }

    /// Shared reference to the path that outlives the registration.
    pub fn path(&self) -> Arc<ValidatorPath> {
        Arc::clone(&self.path)
    }
}

impl Deref for PathHandle {
    type Target = ValidatorPath;

    fn deref(&self) -> &ValidatorPath {
        &self.path
    }
}

impl Drop for PathHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.path.id());
        self.path.close();
        debug!(path_id = self.path.id(), "path disposed");
    }
}

impl std::fmt::Debug for PathHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PathHandle").field(&self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Condition;

    fn event() -> DataRecord {
        DataRecord::new("p", "s", "m").with("path", "/1")
    }

    #[test]
    fn add_rejects_malformed_tree() {
        let validator = Validator::default();
        let err = validator
            .add(Expr::sequence(Vec::<Expr>::new()), GlobalState::new())
            .unwrap_err();
        assert!(err.to_string().contains("sequence has no children"));
        assert_eq!(validator.path_count(), 0);
    }

    #[test]
    fn dispose_unregisters() {
        let validator = Validator::default();
        let handle = validator
            .add(Expr::matches(Condition::always()), GlobalState::new())
            .unwrap();
        let path = handle.path();
        assert_eq!(validator.path_count(), 1);

        handle.dispose();
        assert_eq!(validator.path_count(), 0);
        assert!(path.is_closed());

        validator.on_event(true, &event());
        assert!(path.list_finished().is_empty());
    }

    #[test]
    fn private_events_respect_config() {
        let strict = Validator::new(ValidatorConfig {
            accept_private: false,
            ..ValidatorConfig::default()
        });
        let handle = strict
            .add(Expr::matches(Condition::always()), GlobalState::new())
            .unwrap();
        strict.on_event(false, &event());
        assert!(handle.list_finished().is_empty());
        strict.on_event(true, &event());
        assert_eq!(handle.list_finished().len(), 1);

        let lenient = Validator::default();
        let handle = lenient
            .add(Expr::matches(Condition::always()), GlobalState::new())
            .unwrap();
        lenient.on_event(false, &event());
        assert_eq!(handle.list_finished().len(), 1);
    }
}
