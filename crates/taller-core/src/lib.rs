//! # taller-core: Pure Business Logic for Taller POS
//!
//! This crate is the **heart** of the taller-pos billing core. It contains
//! all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Taller POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ taller-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   stamp   │  │ allocator │  │ validation│  │   │
//! │  │   │  Invoice  │  │  resolve  │  │  abonos   │  │   rules   │  │   │
//! │  │   │  Kardex   │  │  instant  │  │  planning │  │   checks  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE ACCESS • NO CHANNELS • PURE FUNCTIONS      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            taller-store (document store + repositories)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            taller-sync (historial aggregation)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (KardexEntry, Invoice, Movement, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`stamp`] - Timestamp envelope and resolution chain
//! - [`allocator`] - Abono distribution across outstanding invoices
//! - [`error`] - Domain error types
//! - [`validation`] - Draft validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic - same input =
//!    same output (`resolve_instant`, `allocate`)
//! 2. **No I/O**: store access, channels and anything async is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod error;
pub mod money;
pub mod stamp;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use taller_core::Money` instead of
// `use taller_core::money::Money`

pub use allocator::{allocate, sorted_oldest_first, Allocation, AllocationPlan};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use stamp::{date_from_reference, epoch, resolve_instant, ServerStamp, Stamp, Stamped};
pub use types::*;
pub use validation::{
    validate_amount, validate_invoice_number, validate_quantity, validate_sale_draft,
};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Gate acquisition policy: attempts × delay before `LockTimeout`.
///
/// ## Why constants?
/// The gate is advisory and process-wide; a fixed bounded policy keeps lock
/// acquisition failures predictable for the retry UI. Configurable via
/// `GatePolicy` in taller-store when a flow needs something else.
pub const GATE_DEFAULT_ATTEMPTS: u32 = 10;

/// Delay between gate acquisition attempts, in milliseconds.
pub const GATE_DEFAULT_RETRY_MS: u64 = 100;
