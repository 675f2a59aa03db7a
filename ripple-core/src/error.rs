//! Error types for the reactive engine.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by reactive containers, watchers, and the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A mutation was attempted on a frozen container.
    #[error("cannot mutate frozen {0}")]
    Frozen(&'static str),

    /// A key was added to or removed from a record used as a root.
    #[error("cannot add or remove key `{key}` on a root-level reactive record")]
    RootMutation { key: String },

    /// A watch path could not be parsed.
    #[error("invalid watch path `{0}`")]
    InvalidPath(String),

    /// A scope was written to before any data was installed.
    #[error("scope `{0}` has no data installed")]
    MissingData(String),

    /// A list index was outside the valid range.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A getter or callback failed.
    #[error("{0}")]
    Computation(String),
}

impl ReactiveError {
    /// Build a computation error from any displayable message.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }
}

impl From<String> for ReactiveError {
    fn from(message: String) -> Self {
        Self::Computation(message)
    }
}

impl From<&str> for ReactiveError {
    fn from(message: &str) -> Self {
        Self::Computation(message.to_string())
    }
}
