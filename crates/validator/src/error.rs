use thiserror::Error;

/// Errors raised while evaluating a condition, accessor or capture.
///
/// A condition error fails only the branch that evaluated it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// A required property was absent from the event.
    #[error("property not found: {0}")]
    MissingProperty(String),

    /// A property had a different tag than the accessor expected.
    #[error("type error: {0}")]
    TypeError(String),

    /// Any other failure raised by user-supplied evaluation code.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Errors raised when registering an expression tree.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// The tree cannot be evaluated as written.
    #[error("malformed expression tree at {location}: {reason}")]
    MalformedTree { location: String, reason: String },
}

/// Errors raised when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = ConditionError::MissingProperty("host".into());
        assert_eq!(err.to_string(), "property not found: host");

        let err = ConditionError::TypeError("expected integer, got string".into());
        assert_eq!(err.to_string(), "type error: expected integer, got string");

        let err = ConditionError::Evaluation("boom".into());
        assert_eq!(err.to_string(), "evaluation error: boom");

        let err = ValidatorError::MalformedTree {
            location: "root.sequence".into(),
            reason: "sequence has no children".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed expression tree at root.sequence: sequence has no children"
        );
    }
}
