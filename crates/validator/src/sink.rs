//! Destinations for the results a `Record` node reports.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracecheck_core::GlobalState;
use tracing::debug;

use crate::engine::state::Outcome;

/// One terminal result observed by a `Record` node.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResult {
    pub path_id: u64,
    pub branch_id: u64,
    pub outcome: Outcome,
    /// Copy of the branch's state when the inner node finished.
    pub state: GlobalState,
    pub error: Option<String>,
}

/// Receives results from `Record` nodes.
///
/// Called synchronously while the path lock is held, so implementations must
/// not call back into the same path.
pub trait ResultSink: Send + Sync {
    fn push(&self, result: RecordedResult);
}

/// In-memory sink that keeps every result in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<RecordedResult>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<RecordedResult> {
        self.results.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Remove and return everything collected so far.
    pub fn drain(&self) -> Vec<RecordedResult> {
        std::mem::take(&mut *self.results.lock())
    }
}

impl ResultSink for CollectingSink {
    fn push(&self, result: RecordedResult) {
        self.results.lock().push(result);
    }
}

impl ResultSink for mpsc::UnboundedSender<RecordedResult> {
    fn push(&self, result: RecordedResult) {
        if self.send(result).is_err() {
            debug!("result receiver dropped, discarding recorded result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(branch_id: u64) -> RecordedResult {
        RecordedResult {
            path_id: 1,
            branch_id,
            outcome: Outcome::Successful,
            state: GlobalState::new(),
            error: None,
        }
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.push(result(3));
        sink.push(result(1));
        let ids: Vec<_> = sink.results().iter().map(|r| r.branch_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.push(result(7));
        assert_eq!(rx.recv().await.map(|r| r.branch_id), Some(7));

        drop(rx);
        tx.push(result(8));
    }
}
