//! Convenience result type alias for SecretHub.

use crate::error::AppError;

/// A specialized `Result` type for SecretHub operations.
pub type AppResult<T> = Result<T, AppError>;
