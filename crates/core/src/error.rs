use thiserror::Error;

/// Errors raised by the event data model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown property tag: {0}")]
    UnknownTag(String),

    #[error("invalid {tag} value: {value}")]
    InvalidValue { tag: &'static str, value: String },

    #[error("malformed wire entry: {0}")]
    MalformedWire(String),
}

/// Errors raised by the reference-counted record pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A holder released a record whose count was already zero.
    #[error("record slot {index} disposed more times than it was rented or incremented")]
    DoubleDispose { index: usize },

    /// A holder referred to a previous tenancy of a recycled slot.
    #[error("stale handle for slot {index}: generation {held} but slot is at {current}")]
    StaleHandle { index: usize, held: u32, current: u32 },
}
