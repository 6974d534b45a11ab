//! Common error types for autoclick-platform.

use thiserror::Error;

/// Platform-level errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("injection failed: {0}")]
    InjectionFailed(String),
    #[error("cursor position unavailable: {0}")]
    CursorUnavailable(String),
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
