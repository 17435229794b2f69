//! # Sync Error Types
//!
//! Error types for the historial aggregation layer.
//!
//! Listener failures are mostly absorbed internally (a listener backs off
//! and re-subscribes rather than propagating); what surfaces here is what
//! the caller can actually act on.

use taller_store::StoreError;
use thiserror::Error;

/// Historial aggregation errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An internal channel closed.
    ///
    /// ## When This Occurs
    /// - the aggregator was shut down and a handle is still being used
    /// - the merge loop panicked and its receiver dropped
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A source document could not be normalized into a Movement.
    ///
    /// Malformed documents are skipped by listeners (logged, not fatal);
    /// this variant surfaces only from direct normalization calls.
    #[error("Failed to normalize document: {0}")]
    Normalization(String),

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Normalization(err.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
