//! # Repository Module
//!
//! Repositories own all document access for their aggregate:
//!
//! - [`kardex`] - inventory ledger, stock projection, reverts, rebuilds
//! - [`sale`] - invoice lifecycle (submit, abonos, cancel, numbering)
//! - [`caja`] - cash-drawer retiros and ingresos
//!
//! Callers never touch collections directly; the repository is the only
//! place that knows a given aggregate's document shape.

pub mod caja;
pub mod kardex;
pub mod sale;

pub use caja::CajaRepository;
pub use kardex::{KardexRepository, NewKardexEntry};
pub use sale::SaleRepository;
