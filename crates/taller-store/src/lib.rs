//! # taller-store: Storage Layer for Taller POS
//!
//! Document store emulation plus the repositories built on it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Taller POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            taller-core (pure business logic)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ taller-store (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐   │   │
//! │  │   │   store   │  │   gate    │  │      repository         │   │   │
//! │  │   │ documents │  │ serialize │  │  kardex / sale / caja   │   │   │
//! │  │   │  batches  │  │ critical  │  │                         │   │   │
//! │  │   │  streams  │  │ sections  │  │                         │   │   │
//! │  │   └───────────┘  └───────────┘  └─────────────────────────┘   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            taller-sync (historial aggregation)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod gate;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use gate::{GateGuard, GatePolicy, OperationGate};
pub use repository::{CajaRepository, KardexRepository, NewKardexEntry, SaleRepository};
pub use store::{
    ChangeEvent, ChangeKind, MemoryStore, StoreConfig, WriteOp, ABONOS, CONTADORES, INGRESOS,
    KARDEX, PRODUCTOS, RETIROS, VENTAS,
};
