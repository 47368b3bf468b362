//! Error types for bucketsync identity types.

use thiserror::Error;

/// Errors that can occur when constructing identity types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Entity keys must contain at least one character
    #[error("entity key must not be empty")]
    EmptyKey,
}
