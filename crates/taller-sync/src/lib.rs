//! # taller-sync: Historial Aggregation for Taller POS
//!
//! Real-time fan-in of the four movement collections into one unified,
//! ordered historial timeline.
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
//! │  │            taller-store (document store + repositories)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ taller-sync (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   change streams in → normalize → keyed merge → timeline out   │   │
//! │  │                                                                 │   │
//! │  │   READ ONLY: this crate never writes a document                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```no_run
//! use taller_store::MemoryStore;
//! use taller_sync::{AggregatorConfig, HistoryAggregator};
//!
//! # async fn demo() {
//! let store = MemoryStore::default();
//! let handle = HistoryAggregator::new(store, AggregatorConfig::default()).start();
//!
//! let timeline = handle.timeline(); // newest first
//! let mut updates = handle.subscribe();
//! # let _ = (timeline, updates.changed().await);
//! handle.shutdown();
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregator;
pub mod error;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use aggregator::{
    normalize, AggregatorConfig, HistorialHandle, HistoryAggregator, SourceState, SourceStates,
};
pub use error::{SyncError, SyncResult};
