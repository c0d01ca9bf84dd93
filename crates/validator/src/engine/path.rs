use std::pin::pin;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracecheck_core::{DataRecord, GlobalState, PropertyValue};
use tracing::{debug, instrument};

use crate::engine::branch::{self, Advance, Branch};
use crate::engine::state::{FinishState, Outcome, PathReport, PathStats, RunningState};
use crate::ir::Expr;

struct PathInner {
    running: Vec<Branch>,
    finished: Vec<FinishState>,
    next_branch_id: u64,
    stats: PathStats,
    closed: bool,
}

/// One registered expression tree and the branches currently matching it.
///
/// Events are applied under the path's lock, one at a time, in the order
/// callers acquire it. Waiters are woken after every applied event.
pub struct ValidatorPath {
    id: u64,
    name: Option<String>,
    tree: Expr,
    default_timeout: Duration,
    inner: Mutex<PathInner>,
    changed: Notify,
}

impl ValidatorPath {
    /// Start `tree` with `initial` as the root state. Filters are entered
    /// immediately, so their branches are running before the first event.
    pub(crate) fn new(
        id: u64,
        name: Option<String>,
        tree: Expr,
        initial: GlobalState,
        default_timeout: Duration,
    ) -> Self {
        let mut spawns = Vec::new();
        branch::enter(&tree, Vec::new(), initial, &mut spawns);
        let mut adv = Advance::new(id, 0);
        adv.start(spawns);

        let stats = PathStats {
            branches_spawned: adv.spawned,
            ..PathStats::default()
        };
        Self {
            id,
            name,
            tree,
            default_timeout,
            inner: Mutex::new(PathInner {
                running: adv.running,
                finished: Vec::new(),
                next_branch_id: adv.next_id,
                stats,
                closed: false,
            }),
            changed: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn tree(&self) -> &Expr {
        &self.tree
    }

    /// Advance every running branch with `record`.
    #[instrument(skip_all, fields(path_id = self.id, path = self.name.as_deref().unwrap_or("")))]
    pub fn on_trace(&self, record: &DataRecord) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        let running = std::mem::take(&mut inner.running);
        let mut adv = Advance::new(self.id, inner.next_branch_id);
        adv.running.reserve(running.len());
        for branch in running {
            branch::step(branch, record, 0, &mut adv);
        }
        adv.running.sort_by_key(|b| b.id);

        let succeeded = adv
            .finished
            .iter()
            .filter(|f| f.outcome == Outcome::Successful)
            .count() as u64;
        let failed = adv.finished.len() as u64 - succeeded;
        if !adv.finished.is_empty() {
            debug!(
                succeeded,
                failed,
                running = adv.running.len(),
                "branches finished"
            );
        }

        inner.running = adv.running;
        inner.finished.extend(adv.finished);
        inner.next_branch_id = adv.next_id;
        inner.stats.events_applied += 1;
        inner.stats.branches_spawned += adv.spawned;
        inner.stats.succeeded += succeeded;
        inner.stats.failed += failed;
        drop(inner);

        self.changed.notify_waiters();
    }

    /// First finished branch satisfying `predicate`.
    pub fn get_finished<P>(&self, predicate: P) -> Option<FinishState>
    where
        P: Fn(&FinishState) -> bool,
    {
        self.inner
            .lock()
            .finished
            .iter()
            .find(|f| predicate(f))
            .cloned()
    }

    /// First finished branch whose state has `key == value`.
    pub fn find_finished(&self, key: &str, value: &PropertyValue) -> Option<FinishState> {
        self.get_finished(|f| f.state.matches(key, value))
    }

    /// Wait up to `timeout` for a finished branch satisfying `predicate`.
    ///
    /// Returns `None` on timeout or when the path is disposed first.
    pub async fn get_finished_async<P>(&self, predicate: P, timeout: Duration) -> Option<FinishState>
    where
        P: Fn(&FinishState) -> bool,
    {
        self.wait_until(timeout, |inner| {
            inner.finished.iter().find(|f| predicate(f)).cloned()
        })
        .await
    }

    /// [`get_finished_async`](Self::get_finished_async) with the configured
    /// default timeout.
    pub async fn wait_for_finished<P>(&self, predicate: P) -> Option<FinishState>
    where
        P: Fn(&FinishState) -> bool,
    {
        self.get_finished_async(predicate, self.default_timeout).await
    }

    /// Snapshots of the running branches in creation order.
    pub fn list_running(&self) -> Vec<RunningState> {
        self.inner
            .lock()
            .running
            .iter()
            .filter(|b| !b.is_router())
            .map(Branch::snapshot)
            .collect()
    }

    pub fn list_finished(&self) -> Vec<FinishState> {
        self.inner.lock().finished.clone()
    }

    /// First running branch whose state has `key == value`.
    pub fn get_running(&self, key: &str, value: &PropertyValue) -> Option<RunningState> {
        find_running(&self.inner.lock(), key, value)
    }

    /// Wait up to `timeout` for a running branch whose state has `key == value`.
    pub async fn get_running_async(
        &self,
        key: &str,
        value: &PropertyValue,
        timeout: Duration,
    ) -> Option<RunningState> {
        self.wait_until(timeout, |inner| find_running(inner, key, value))
            .await
    }

    pub fn stats(&self) -> PathStats {
        self.inner.lock().stats
    }

    /// Everything the path currently knows, in one consistent snapshot.
    pub fn report(&self) -> PathReport {
        let inner = self.inner.lock();
        PathReport {
            id: self.id,
            name: self.name.clone(),
            tree: self.tree.to_source(),
            stats: inner.stats,
            running: inner
                .running
                .iter()
                .filter(|b| !b.is_router())
                .map(Branch::snapshot)
                .collect(),
            finished: inner.finished.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Stop accepting events and release every waiter.
    pub(crate) fn close(&self) {
        self.inner.lock().closed = true;
        self.changed.notify_waiters();
    }

    async fn wait_until<T, F>(&self, timeout: Duration, probe: F) -> Option<T>
    where
        F: Fn(&PathInner) -> Option<T>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();
            {
                let inner = self.inner.lock();
                if let Some(found) = probe(&inner) {
                    return Some(found);
                }
                if inner.closed {
                    return None;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return probe(&self.inner.lock());
            }
        }
    }
}

fn find_running(inner: &PathInner, key: &str, value: &PropertyValue) -> Option<RunningState> {
    inner
        .running
        .iter()
        .filter(|b| !b.is_router())
        .find(|b| b.state.matches(key, value))
        .map(Branch::snapshot)
}

impl std::fmt::Debug for ValidatorPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorPath")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}
