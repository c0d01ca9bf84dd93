//! Pattern matching over captured trace events.
//!
//! Build an expression tree from [`Expr`] nodes, register it with a
//! [`Validator`], feed it events, then query the resulting path for the
//! branches that matched:
//!
//! ```
//! use tracecheck_core::{DataRecord, GlobalState};
//! use tracecheck_validator::{Condition, Expr, KeyExtractor, Validator};
//!
//! let validator = Validator::default();
//! let path = validator
//!     .add(
//!         Expr::group_by(
//!             KeyExtractor::property("host"),
//!             Expr::sequence([
//!                 Expr::matches(Condition::property_eq("path", "/1")),
//!                 Expr::matches(Condition::property_eq("path", "/2")),
//!             ]),
//!         ),
//!         GlobalState::new(),
//!     )
//!     .unwrap();
//!
//! for (host, p) in [("abc", "/1"), ("abc", "/2")] {
//!     let event = DataRecord::new("http", "request", "handled")
//!         .with("host", host)
//!         .with("path", p);
//!     validator.on_event(true, &event);
//! }
//!
//! assert!(path.find_finished("host", &"abc".into()).is_some());
//! ```

pub mod assertions;
pub mod config;
pub mod engine;
pub mod error;
pub mod ir;
pub mod sink;

pub use assertions::PathAssertions;
pub use config::{TracecheckConfig, ValidatorConfig};
pub use engine::{
    FinishState, Outcome, PathHandle, PathReport, PathStats, RunningState, Validator, ValidatorPath,
};
pub use error::{ConditionError, ConfigError, ValidatorError};
pub use ir::{Condition, ConditionKind, Expr, KeyExtractor, KeySource, require, require_str};
pub use sink::{CollectingSink, RecordedResult, ResultSink};
