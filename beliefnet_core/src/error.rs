//! Error types for the belief recursion core.

use thiserror::Error;

/// Errors raised eagerly at construction or first use.
///
/// Numeric degeneracy (log of zero, zero-sum normalizers) is deliberately
/// NOT an error here: it propagates as `inf`/`nan` through the recursion,
/// and callers treat non-finite belief entries as a degenerate-run signal.
#[derive(Debug, Error)]
pub enum BeliefError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl BeliefError {
    /// Shorthand for [`BeliefError::InvalidConfiguration`] with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        BeliefError::InvalidConfiguration(msg.into())
    }
}
