use std::fmt;
use std::sync::Arc;

use crate::ir::condition::Condition;
use crate::ir::key::KeyExtractor;
use crate::sink::ResultSink;

/// A node of a validator expression tree.
///
/// Nodes are immutable once built and share their children through `Arc`,
/// so cloning a tree is cheap. Build them with the associated functions
/// rather than the variants directly.
#[derive(Clone)]
pub enum Expr {
    /// Waits for an event satisfying `condition`. With children, the
    /// matching event is also fed to the first child and the children then
    /// run in order.
    Match {
        condition: Arc<Condition>,
        children: Option<Arc<[Expr]>>,
    },
    /// Children matched in strict order, no backtracking.
    Sequence(Arc<[Expr]>),
    /// One branch per child, created eagerly. Every event must satisfy
    /// `condition` before it reaches any of them.
    Filter {
        condition: Arc<Condition>,
        children: Arc<[Expr]>,
    },
    /// One clone of `template` per distinct key, created on first sight.
    GroupBy {
        key: Arc<KeyExtractor>,
        template: Arc<Expr>,
    },
    /// Reports each terminal result of `inner` to `sink`.
    Record {
        sink: Arc<dyn ResultSink>,
        inner: Arc<Expr>,
    },
}

impl Expr {
    /// Leaf that waits for one event satisfying `condition`.
    pub fn matches(condition: Condition) -> Self {
        Self::Match {
            condition: Arc::new(condition),
            children: None,
        }
    }

    /// A match whose children run in order, starting with the matching event.
    pub fn match_then(condition: Condition, children: impl IntoIterator<Item = Expr>) -> Self {
        Self::Match {
            condition: Arc::new(condition),
            children: Some(children.into_iter().collect()),
        }
    }

    /// Children matched one after another, in order.
    pub fn sequence(children: impl IntoIterator<Item = Expr>) -> Self {
        Self::Sequence(children.into_iter().collect())
    }

    /// Children run side by side, seeing only events that pass `condition`.
    pub fn filter(condition: Condition, children: impl IntoIterator<Item = Expr>) -> Self {
        Self::Filter {
            condition: Arc::new(condition),
            children: children.into_iter().collect(),
        }
    }

    /// One instance of `template` per distinct key value.
    pub fn group_by(key: KeyExtractor, template: Expr) -> Self {
        Self::GroupBy {
            key: Arc::new(key),
            template: Arc::new(template),
        }
    }

    /// Report every terminal result of `inner` to `sink`.
    pub fn record(sink: Arc<dyn ResultSink>, inner: Expr) -> Self {
        Self::Record {
            sink,
            inner: Arc::new(inner),
        }
    }

    /// Match any event, capturing property `property` under `key`.
    pub fn tap(property: impl Into<String>, key: impl Into<String>) -> Self {
        Self::matches(Condition::tap_property(property, key))
    }

    /// Short node name, as used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::Sequence(_) => "sequence",
            Self::Filter { .. } => "filter",
            Self::GroupBy { .. } => "group_by",
            Self::Record { .. } => "record",
        }
    }

    /// Readable pseudo-code for the whole tree.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }

    fn write_source(&self, out: &mut String) {
        match self {
            Self::Match {
                condition,
                children,
            } => {
                out.push_str("match(");
                out.push_str(&condition.to_source());
                out.push(')');
                if let Some(children) = children {
                    write_children(children, out);
                }
            }
            Self::Sequence(children) => {
                out.push_str("sequence");
                write_children(children, out);
            }
            Self::Filter {
                condition,
                children,
            } => {
                out.push_str("filter(");
                out.push_str(&condition.to_source());
                out.push(')');
                write_children(children, out);
            }
            Self::GroupBy { key, template } => {
                out.push_str("group_by(");
                out.push_str(&key.to_source());
                out.push_str(") { ");
                template.write_source(out);
                out.push_str(" }");
            }
            Self::Record { inner, .. } => {
                out.push_str("record { ");
                inner.write_source(out);
                out.push_str(" }");
            }
        }
    }
}

fn write_children(children: &[Expr], out: &mut String) {
    out.push_str(" { ");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        child.write_source(out);
    }
    out.push_str(" }");
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}
