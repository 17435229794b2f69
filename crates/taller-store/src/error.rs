//! # Storage Error Types
//!
//! Error types for store and repository operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  CoreError (taller-core, pre-write validation)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← adds store-level guards:                   │
//! │       │                     duplicates, missing docs, lock timeouts,   │
//! │       │                     unavailability                             │
//! │       ▼                                                                 │
//! │  Caller decides: retry (DuplicateInvoice, LockTimeout are surfaced     │
//! │  for user-facing retry decisions), report, or reconcile                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is allowed to crash the process; every failure is a value.

use taller_core::CoreError;
use thiserror::Error;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found.
    ///
    /// ## When This Occurs
    /// - id doesn't exist in the collection
    /// - a batch targets a projection that was never created
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// An invoice with this number already exists.
    ///
    /// Duplicate numbers are not self-healing - the caller must regenerate
    /// a number, never silently overwrite.
    #[error("Invoice number '{invoice_number}' already exists")]
    DuplicateInvoice { invoice_number: String },

    /// The operation gate could not be acquired within its bounded policy.
    #[error("Lock timeout acquiring gate for '{label}' after {attempts} attempts")]
    LockTimeout { label: String, attempts: u32 },

    /// The store is unreachable (network/timeout).
    ///
    /// During a gated write this aborts the critical section; the actual
    /// outcome of the underlying write is unknown to the client, so callers
    /// must treat this as "unknown", not "failed", before retrying a
    /// non-idempotent write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The write conflicts with existing state (already-existing document,
    /// already-reverted entry, already-cancelled invoice).
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Document could not be (de)serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Business rule violation (wraps CoreError).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
