//! Listing service error types.

use thiserror::Error;

/// Listing service errors.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl ListingError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ListingError::Cancelled)
    }
}

/// Result type alias using ListingError.
pub type ListingResult<T> = Result<T, ListingError>;
