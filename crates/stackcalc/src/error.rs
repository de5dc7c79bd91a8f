//! Error taxonomy for stack operations

use thiserror::Error;

use crate::operator::Operator;

/// Errors returned by [`StackRegistry`](crate::StackRegistry) operations.
///
/// Every error is scoped to the call that produced it and leaves the
/// affected stack exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    /// The client's stack is absent or has no elements
    #[error("stack is empty for client: {client}")]
    EmptyStack {
        /// Client key that was queried
        client: String,
    },
    /// Operator string is not one of `min`, `max`, `gcd`, `lcm`
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
    /// Reduction result does not fit in an `i32`
    #[error("{operator} result does not fit in a 32-bit integer")]
    Overflow {
        /// Operator that overflowed
        operator: Operator,
    },
    /// Delayed pop was cancelled before its wait completed
    #[error("delayed pop cancelled")]
    Cancelled,
}

impl CalcError {
    pub(crate) fn empty(client: &str) -> Self {
        Self::EmptyStack {
            client: client.to_owned(),
        }
    }
}
