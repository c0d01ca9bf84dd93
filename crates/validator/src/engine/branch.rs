//! The matching automaton.
//!
//! A branch is a flat stack of frames (the enclosing nodes it is nested in,
//! outermost first) plus a cursor (what it waits for next). Filters and
//! group keys become gate frames that every event must pass before reaching
//! the cursor. Sequences become frames that pick the next child once the
//! cursor succeeds.

use std::collections::HashMap;
use std::any::Any;
use std::hash::{BuildHasher, RandomState};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracecheck_core::{DataRecord, GlobalState, PropertyValue};
use tracing::{debug, error, warn};

use crate::engine::state::{FinishState, Outcome, RunningState};
use crate::error::ConditionError;
use crate::ir::{Condition, Expr, KeyExtractor};
use crate::sink::{RecordedResult, ResultSink};

#[derive(Clone)]
pub(crate) enum Frame {
    /// Child `index` of a sequence is in progress.
    Sequence { children: Arc<[Expr]>, index: usize },
    /// Children of a match that has not matched yet.
    MatchChildren(Arc<[Expr]>),
    /// Filter condition every event must satisfy.
    Gate(Arc<Condition>),
    /// Only events with this group key get through.
    Route {
        key: Arc<KeyExtractor>,
        value: PropertyValue,
    },
    Record(Arc<dyn ResultSink>),
}

impl Frame {
    fn describe(&self) -> String {
        match self {
            Self::Sequence { children, index } => format!("sequence[{index}/{}]", children.len()),
            Self::MatchChildren(children) => format!("then[{}]", children.len()),
            Self::Gate(condition) => format!("filter({})", condition.to_source()),
            Self::Route { key, value } => format!("group_by({}={value})", key.name()),
            Self::Record(_) => "record".to_owned(),
        }
    }
}

pub(crate) enum Cursor {
    Match(Arc<Condition>),
    Router(Router),
}

/// The hidden branch that owns a GroupBy and spawns keyed branches.
pub(crate) struct Router {
    key: Arc<KeyExtractor>,
    template: Arc<Expr>,
    seen: KeySet,
}

/// Keys a router has already spawned a branch for. Keys are compared with
/// [`PropertyValue`] equality, so opaque keys are never found.
#[derive(Default)]
struct KeySet {
    hasher: RandomState,
    buckets: HashMap<u64, Vec<PropertyValue>>,
}

impl KeySet {
    /// Returns `true` if `key` was not present.
    fn insert(&mut self, key: &PropertyValue) -> bool {
        let bucket = self.buckets.entry(self.hasher.hash_one(key)).or_default();
        if bucket.contains(key) {
            return false;
        }
        bucket.push(key.clone());
        true
    }
}

/// A branch produced by entering a node, not yet numbered.
pub(crate) struct Spawn {
    state: GlobalState,
    frames: Vec<Frame>,
    cursor: Cursor,
}

impl Spawn {
    fn into_branch(self, id: u64) -> Branch {
        Branch {
            id,
            state: self.state,
            frames: self.frames,
            cursor: self.cursor,
        }
    }
}

pub(crate) struct Branch {
    pub(crate) id: u64,
    pub(crate) state: GlobalState,
    frames: Vec<Frame>,
    cursor: Cursor,
}

impl Branch {
    /// Routers are bookkeeping and never reported as running.
    pub(crate) fn is_router(&self) -> bool {
        matches!(self.cursor, Cursor::Router(_))
    }

    pub(crate) fn position(&self) -> String {
        let cursor = match &self.cursor {
            Cursor::Match(condition) => format!("match({})", condition.to_source()),
            Cursor::Router(router) => format!("group_by({})", router.key.name()),
        };
        let mut parts: Vec<String> = self.frames.iter().map(Frame::describe).collect();
        parts.push(cursor);
        parts.join(" > ")
    }

    pub(crate) fn snapshot(&self) -> RunningState {
        RunningState {
            id: self.id,
            position: self.position(),
            state: self.state.clone(),
        }
    }
}

/// Expand `expr` into the branches that wait on its first events.
pub(crate) fn enter(expr: &Expr, mut frames: Vec<Frame>, state: GlobalState, out: &mut Vec<Spawn>) {
    match expr {
        Expr::Match {
            condition,
            children,
        } => {
            if let Some(children) = children {
                frames.push(Frame::MatchChildren(Arc::clone(children)));
            }
            out.push(Spawn {
                state,
                frames,
                cursor: Cursor::Match(Arc::clone(condition)),
            });
        }
        Expr::Sequence(children) => enter_child(children, 0, frames, state, out),
        Expr::Filter {
            condition,
            children,
        } => {
            for child in children.iter() {
                let mut forked = frames.clone();
                forked.push(Frame::Gate(Arc::clone(condition)));
                enter(child, forked, state.fork(), out);
            }
        }
        Expr::GroupBy { key, template } => out.push(Spawn {
            state,
            frames,
            cursor: Cursor::Router(Router {
                key: Arc::clone(key),
                template: Arc::clone(template),
                seen: KeySet::default(),
            }),
        }),
        Expr::Record { sink, inner } => {
            frames.push(Frame::Record(Arc::clone(sink)));
            enter(inner, frames, state, out);
        }
    }
}

fn enter_child(
    children: &Arc<[Expr]>,
    index: usize,
    mut frames: Vec<Frame>,
    state: GlobalState,
    out: &mut Vec<Spawn>,
) {
    frames.push(Frame::Sequence {
        children: Arc::clone(children),
        index,
    });
    if let Some(child) = children.get(index) {
        enter(child, frames, state, out);
    }
}

/// Everything one event did to a path's branches.
pub(crate) struct Advance {
    pub(crate) path_id: u64,
    pub(crate) next_id: u64,
    pub(crate) running: Vec<Branch>,
    pub(crate) finished: Vec<FinishState>,
    pub(crate) spawned: u64,
    /// Group keys already extracted from this event.
    keys: Vec<(Arc<KeyExtractor>, Option<PropertyValue>)>,
}

impl Advance {
    pub(crate) fn new(path_id: u64, next_id: u64) -> Self {
        Self {
            path_id,
            next_id,
            running: Vec::new(),
            finished: Vec::new(),
            spawned: 0,
            keys: Vec::new(),
        }
    }

    /// The key of `record` under `key`, extracted at most once per event.
    fn key_for(&mut self, key: &Arc<KeyExtractor>, record: &DataRecord) -> Option<&PropertyValue> {
        let index = match self.keys.iter().position(|(k, _)| Arc::ptr_eq(k, key)) {
            Some(index) => index,
            None => {
                self.keys.push((Arc::clone(key), extract_key(key, record)));
                self.keys.len() - 1
            }
        };
        self.keys[index].1.as_ref()
    }

    pub(crate) fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.spawned += 1;
        id
    }

    /// Number the spawns, reusing `reuse` for the first one.
    fn number(&mut self, spawns: Vec<Spawn>, reuse: Option<u64>) -> Vec<Branch> {
        let mut reuse = reuse;
        spawns
            .into_iter()
            .map(|spawn| {
                let id = match reuse.take() {
                    Some(id) => id,
                    None => self.allocate(),
                };
                spawn.into_branch(id)
            })
            .collect()
    }

    /// Number freshly entered root branches.
    pub(crate) fn start(&mut self, spawns: Vec<Spawn>) {
        let branches = self.number(spawns, None);
        self.running.extend(branches);
    }
}

/// Apply `record` to `branch`. Frames below `gates_from` already passed
/// their gates for this event.
pub(crate) fn step(mut branch: Branch, record: &DataRecord, gates_from: usize, adv: &mut Advance) {
    let mut passed = Ok(true);
    for frame in branch.frames.iter().skip(gates_from) {
        passed = match frame {
            Frame::Gate(condition) => guarded(|| condition.evaluate(record, &mut branch.state)),
            Frame::Route { key, value } => Ok(adv.key_for(key, record) == Some(value)),
            _ => Ok(true),
        };
        if !matches!(passed, Ok(true)) {
            break;
        }
    }
    match passed {
        Ok(true) => {}
        Ok(false) => {
            adv.running.push(branch);
            return;
        }
        Err(err) => {
            fail(branch, &err, adv);
            return;
        }
    }

    match &mut branch.cursor {
        Cursor::Match(condition) => {
            let condition = Arc::clone(condition);
            match guarded(|| condition.evaluate(record, &mut branch.state)) {
                Ok(true) => complete(branch, record, adv),
                Ok(false) => adv.running.push(branch),
                Err(err) => fail(branch, &err, adv),
            }
        }
        Cursor::Router(router) => {
            let Some(key) = adv.key_for(&router.key, record).cloned() else {
                adv.running.push(branch);
                return;
            };
            if !router.seen.insert(&key) {
                adv.running.push(branch);
                return;
            }
            let group = Arc::clone(&router.key);
            let template = Arc::clone(&router.template);
            let mut frames = branch.frames.clone();
            let passed = frames.len() + 1;
            frames.push(Frame::Route {
                key: Arc::clone(&group),
                value: key.clone(),
            });
            let state = branch.state.fork().with(group.name(), key.clone());
            adv.running.push(branch);

            let mut spawns = Vec::new();
            enter(&template, frames, state, &mut spawns);
            for spawned in adv.number(spawns, None) {
                debug!(branch = spawned.id, key = %key, group = group.name(), "group branch spawned");
                step(spawned, record, passed, adv);
            }
        }
    }
}

/// Run user code, turning a panic into an evaluation error.
fn guarded<T>(f: impl FnOnce() -> Result<T, ConditionError>) -> Result<T, ConditionError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(ConditionError::Evaluation(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// A key extraction error leaves the event unrouted.
fn extract_key(key: &KeyExtractor, record: &DataRecord) -> Option<PropertyValue> {
    match guarded(|| key.extract(record)) {
        Ok(value) => value,
        Err(err) => {
            warn!(group = key.name(), error = %err, "group key extraction failed, ignoring event");
            None
        }
    }
}

/// The cursor matched: unwind enclosing frames until one has more to do.
fn complete(mut branch: Branch, record: &DataRecord, adv: &mut Advance) {
    let position = branch.position();
    while let Some(frame) = branch.frames.pop() {
        match frame {
            Frame::Gate(_) | Frame::Route { .. } => {}
            Frame::Record(sink) => report(
                sink.as_ref(),
                RecordedResult {
                    path_id: adv.path_id,
                    branch_id: branch.id,
                    outcome: Outcome::Successful,
                    state: branch.state.clone(),
                    error: None,
                },
            ),
            Frame::Sequence { children, index } => {
                let next = index + 1;
                if next < children.len() {
                    let mut spawns = Vec::new();
                    enter_child(&children, next, branch.frames, branch.state, &mut spawns);
                    let successors = adv.number(spawns, Some(branch.id));
                    adv.running.extend(successors);
                    return;
                }
            }
            Frame::MatchChildren(children) => {
                let passed = branch.frames.len() + 1;
                let mut spawns = Vec::new();
                enter_child(&children, 0, branch.frames, branch.state, &mut spawns);
                for successor in adv.number(spawns, Some(branch.id)) {
                    step(successor, record, passed, adv);
                }
                return;
            }
        }
    }

    debug!(branch = branch.id, "branch succeeded");
    adv.finished.push(FinishState {
        id: branch.id,
        outcome: Outcome::Successful,
        state: branch.state,
        position,
        error: None,
    });
}

/// A panicking sink loses that result only.
fn report(sink: &dyn ResultSink, result: RecordedResult) {
    let branch = result.branch_id;
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sink.push(result))) {
        error!(branch, panic = panic_message(payload.as_ref()), "result sink panicked");
    }
}

fn fail(branch: Branch, err: &ConditionError, adv: &mut Advance) {
    let position = branch.position();
    warn!(branch = branch.id, position = %position, error = %err, "condition failed, branch failed");
    for frame in branch.frames.iter().rev() {
        if let Frame::Record(sink) = frame {
            report(
                sink.as_ref(),
                RecordedResult {
                    path_id: adv.path_id,
                    branch_id: branch.id,
                    outcome: Outcome::Failed,
                    state: branch.state.clone(),
                    error: Some(err.to_string()),
                },
            );
        }
    }
    adv.finished.push(FinishState {
        id: branch.id,
        outcome: Outcome::Failed,
        state: branch.state,
        position,
        error: Some(err.to_string()),
    });
}
