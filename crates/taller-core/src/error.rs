//! # Error Types
//!
//! Domain-specific error types for taller-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  taller-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  taller-store errors (separate crate)                                  │
//! │  └── StoreError       - NotFound, DuplicateInvoice, LockTimeout,       │
//! │                         Unavailable (wraps CoreError)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StoreError → caller               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, entry id, amounts)
//! 3. Errors are enum variants, never String
//! 4. Validation errors are rejected before any write - no partial effects

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These are always detected locally, before any store write, so a caller
/// receiving one of them knows no partial effect exists.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ledger quantity must be strictly positive; direction is carried by
    /// the movement type, never by the sign of the quantity.
    #[error("Invalid quantity {quantity} for product {product_id}: must be > 0")]
    InvalidQuantity { product_id: String, quantity: i64 },

    /// Operation attempted on a movement type that does not support it.
    ///
    /// ## When This Occurs
    /// - `revert` on an `ajuste` or `inicial` entry (only entrada/salida
    ///   have a well-defined opposite)
    #[error("Movement type '{movement_type}' does not support {operation}")]
    UnsupportedType {
        movement_type: String,
        operation: String,
    },

    /// Payment allocation was given no invoice with an outstanding balance.
    ///
    /// ## When This Occurs
    /// - All invoices in the group are already settled
    /// - The caller passed an empty invoice set
    #[error("No outstanding invoices to allocate against")]
    NoOutstandingInvoices,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a draft or parameter doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// A collection that must not be empty is empty.
    #[error("{field} must not be empty")]
    Empty { field: String },

    /// Stored total does not match the sum of its lines.
    #[error("total {total_cents} does not match line sum {line_sum_cents}")]
    TotalMismatch {
        total_cents: i64,
        line_sum_cents: i64,
    },

    /// Invalid format (e.g., unparseable date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidQuantity {
            product_id: "prod-7".to_string(),
            quantity: 0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid quantity 0 for product prod-7: must be > 0"
        );

        let err = CoreError::UnsupportedType {
            movement_type: "ajuste".to_string(),
            operation: "revert".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Movement type 'ajuste' does not support revert"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "invoice_number".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
