use crate::error::ValidatorError;
use crate::ir::condition::Condition;
use crate::ir::expr::Expr;
use crate::ir::key::KeySource;

/// Deepest nesting accepted by [`validate`].
pub const MAX_DEPTH: usize = 256;

/// Reject trees that cannot be evaluated as written.
pub fn validate(expr: &Expr) -> Result<(), ValidatorError> {
    walk(expr, "root", 0)
}

fn malformed(location: &str, reason: impl Into<String>) -> ValidatorError {
    ValidatorError::MalformedTree {
        location: location.to_owned(),
        reason: reason.into(),
    }
}

fn check_condition(condition: &Condition, location: &str) -> Result<(), ValidatorError> {
    if condition.capture_key().is_some_and(str::is_empty) {
        return Err(malformed(location, "empty capture key"));
    }
    Ok(())
}

fn walk(expr: &Expr, location: &str, depth: usize) -> Result<(), ValidatorError> {
    if depth > MAX_DEPTH {
        return Err(malformed(
            location,
            format!("nesting exceeds {MAX_DEPTH} levels"),
        ));
    }
    let here = format!("{location}.{}", expr.kind_name());
    match expr {
        Expr::Match {
            condition,
            children,
        } => {
            check_condition(condition, &here)?;
            if let Some(children) = children {
                if children.is_empty() {
                    return Err(malformed(&here, "match has an empty child list"));
                }
                walk_children(children, &here, depth)?;
            }
        }
        Expr::Sequence(children) => {
            if children.is_empty() {
                return Err(malformed(&here, "sequence has no children"));
            }
            walk_children(children, &here, depth)?;
        }
        Expr::Filter {
            condition,
            children,
        } => {
            check_condition(condition, &here)?;
            if children.is_empty() {
                return Err(malformed(&here, "filter has no children"));
            }
            walk_children(children, &here, depth)?;
        }
        Expr::GroupBy { key, template } => {
            if key.name().is_empty() {
                return Err(malformed(&here, "empty group key name"));
            }
            if matches!(key.source(), KeySource::Property(p) if p.is_empty()) {
                return Err(malformed(&here, "empty group key property"));
            }
            walk(template, &here, depth + 1)?;
        }
        Expr::Record { inner, .. } => walk(inner, &here, depth + 1)?,
    }
    Ok(())
}

fn walk_children(children: &[Expr], location: &str, depth: usize) -> Result<(), ValidatorError> {
    for (i, child) in children.iter().enumerate() {
        walk(child, &format!("{location}[{i}]"), depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::key::KeyExtractor;

    fn leaf() -> Expr {
        Expr::matches(Condition::always())
    }

    fn reason(expr: &Expr) -> (String, String) {
        match validate(expr) {
            Err(ValidatorError::MalformedTree { location, reason }) => (location, reason),
            Ok(()) => panic!("tree should be rejected: {expr:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_tree() {
        let tree = Expr::filter(
            Condition::property_eq("host", "def"),
            [Expr::sequence([leaf(), leaf()])],
        );
        assert!(validate(&tree).is_ok());
    }

    #[test]
    fn rejects_empty_sequence() {
        let (location, reason) = reason(&Expr::sequence(Vec::<Expr>::new()));
        assert_eq!(location, "root.sequence");
        assert_eq!(reason, "sequence has no children");
    }

    #[test]
    fn rejects_filter_without_children() {
        let (_, reason) = reason(&Expr::filter(Condition::always(), Vec::<Expr>::new()));
        assert_eq!(reason, "filter has no children");
    }

    #[test]
    fn rejects_match_with_empty_children() {
        let tree = Expr::sequence([leaf(), Expr::match_then(Condition::always(), Vec::<Expr>::new())]);
        let (location, reason) = reason(&tree);
        assert_eq!(location, "root.sequence[1].match");
        assert_eq!(reason, "match has an empty child list");
    }

    #[test]
    fn rejects_empty_key_and_capture_names() {
        let (_, reason) = reason(&Expr::group_by(KeyExtractor::property(""), leaf()));
        assert_eq!(reason, "empty group key name");

        let (_, reason) = self::reason(&Expr::matches(Condition::always().capture_as("")));
        assert_eq!(reason, "empty capture key");
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut tree = leaf();
        for _ in 0..=MAX_DEPTH {
            tree = Expr::sequence([tree]);
        }
        let (_, reason) = reason(&tree);
        assert!(reason.starts_with("nesting exceeds"));
    }
}
