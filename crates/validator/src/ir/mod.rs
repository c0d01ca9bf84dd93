pub mod condition;
pub mod expr;
pub mod key;
pub mod validate;

pub use condition::{Condition, ConditionKind, require, require_str};
pub use expr::Expr;
pub use key::{KeyExtractor, KeySource};
pub use validate::validate;
