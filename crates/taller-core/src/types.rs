//! # Domain Types
//!
//! Core domain types for the taller-pos billing core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  KardexEntry    │   │    Invoice      │   │  CajaMovement   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  movement_type  │   │  invoice_number │   │  retiro|ingreso │       │
//! │  │  quantity > 0   │   │  saldo/abonos   │   │  concept        │       │
//! │  └────────┬────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │           │                     │                     │                │
//! │           ▼                     ▼                     ▼                │
//! │  ┌─────────────────┐       ┌───────────────────────────────┐           │
//! │  │  ProductStock   │       │  Movement (unified historial) │           │
//! │  │  (projection)   │       │  keyed by (kind, id)          │           │
//! │  └─────────────────┘       └───────────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Entities carry an immutable UUID `id` for relations plus a human business
//! identifier where one exists (`invoice_number`), which is unique but
//! caller-assigned.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::stamp::{Stamp, Stamped};

// =============================================================================
// Movement Type (kardex)
// =============================================================================

/// The direction/category of an inventory ledger entry.
///
/// Quantity on an entry is always positive; this discriminant carries the
/// sign (with `ajuste` resolved by [`KardexEntry::signed_delta`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Stock received (purchase, return).
    Entrada,
    /// Stock dispatched (sale, consumption).
    Salida,
    /// Manual correction; sign carried by `ajuste_negative`.
    Ajuste,
    /// Opening balance when the product enters the system.
    Inicial,
}

impl MovementType {
    /// Stored discriminant, as written to documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Salida => "salida",
            MovementType::Ajuste => "ajuste",
            MovementType::Inicial => "inicial",
        }
    }

    /// The compensating type for a reversal, where one exists.
    pub fn opposite(&self) -> Option<MovementType> {
        match self {
            MovementType::Entrada => Some(MovementType::Salida),
            MovementType::Salida => Some(MovementType::Entrada),
            MovementType::Ajuste | MovementType::Inicial => None,
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Kardex Entry
// =============================================================================

/// One entry in the append-only inventory movement ledger.
///
/// Immutable once written, except for the `reverted` marker and the
/// back-link set by a reversal. Quantity is always positive.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KardexEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Product this movement applies to.
    pub product_id: String,

    /// Direction/category of the movement.
    pub movement_type: MovementType,

    /// Moved quantity, strictly positive.
    pub quantity: i64,

    /// For `ajuste` only: true when the correction subtracts stock.
    #[serde(default)]
    pub ajuste_negative: bool,

    /// Unit cost in cents at the time of the movement.
    pub unit_cost_cents: i64,

    /// Human-readable reference (invoice number, purchase order, note).
    pub reference: String,

    /// Timestamp envelope (see [`crate::stamp`]).
    #[serde(default)]
    pub stamp: Stamp,

    /// Back-link between an entry and its compensating reversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entry_id: Option<String>,

    /// Set when a compensating entry has been written for this one.
    /// Replay skips reverted entries.
    #[serde(default)]
    pub reverted: bool,

    /// Client-side creation instant (stamp fallback).
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl KardexEntry {
    /// The signed effect of this entry on the stock projection.
    ///
    /// entrada/inicial add, salida subtracts, ajuste follows its flag.
    pub fn signed_delta(&self) -> i64 {
        match self.movement_type {
            MovementType::Entrada | MovementType::Inicial => self.quantity,
            MovementType::Salida => -self.quantity,
            MovementType::Ajuste => {
                if self.ajuste_negative {
                    -self.quantity
                } else {
                    self.quantity
                }
            }
        }
    }
}

impl Stamped for KardexEntry {
    fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn reference(&self) -> Option<&str> {
        Some(&self.reference)
    }
}

// =============================================================================
// Product Stock Projection
// =============================================================================

/// The materialized stock projection for one product.
///
/// ## Invariant
/// `quantity` equals the sum of signed deltas of all non-reverted kardex
/// entries for the product, except during a rebuild window. Only two
/// writers exist: the atomic increment tied 1:1 to an append, and the
/// overwrite performed by a replay.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductStock {
    pub product_id: String,
    pub name: String,
    /// Materialized quantity (see invariant above).
    pub quantity: i64,
    /// Reorder threshold for low-stock reporting.
    pub min_stock: i64,
    pub unit_cost_cents: i64,
    pub price_cents: i64,
}

impl ProductStock {
    /// Returns the sale price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// True when the projection has fallen to or below the threshold.
    #[inline]
    pub fn is_below_min(&self) -> bool {
        self.quantity <= self.min_stock
    }
}

// =============================================================================
// Payment Type
// =============================================================================

/// How the sale was agreed to be paid **at the time of sale**.
///
/// This field is a historical record of original intent and is never
/// rewritten when later abonos settle the balance; settled status is always
/// derived from the balance via [`Invoice::is_settled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Paid in full at the counter.
    Contado,
    /// Outstanding balance to be settled by abonos.
    Pendiente,
}

// =============================================================================
// Abono
// =============================================================================

/// A partial payment applied against an invoice's outstanding balance.
///
/// Every abono written by one allocation batch shares `batch_id` and
/// `paid_at`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Abono {
    pub id: String,
    pub amount_cents: i64,
    pub batch_id: String,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
}

// =============================================================================
// Invoice
// =============================================================================

/// A line item in an invoice.
/// Snapshot pattern: name and price are frozen at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLine {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
}

impl InvoiceLine {
    /// Unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Line total (unit price × quantity).
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price().multiply_quantity(self.quantity).cents()
    }
}

/// A sale invoice.
///
/// Created once by the sale processor; mutated only by appending abonos or
/// by an explicit cancel. Never deleted by normal flow.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Invoice {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Human-assigned business identifier, unique across all invoices.
    pub invoice_number: String,

    /// Billing date (the per-day counter key).
    #[ts(as = "String")]
    pub date: NaiveDate,

    /// Timestamp envelope.
    #[serde(default)]
    pub stamp: Stamp,

    pub client_name: String,

    /// Billable unit (single item or named cluster) this invoice bills.
    pub equipment_id: String,

    pub products: Vec<InvoiceLine>,

    pub total_cents: i64,

    /// Original payment intent; never rewritten (see [`PaymentType`]).
    pub payment_type: PaymentType,

    /// Outstanding balance; invariant `max(total − Σabonos, 0)`.
    pub saldo_pendiente_cents: i64,

    #[serde(default)]
    pub abonos: Vec<Abono>,

    /// Set by the audited cancel operation.
    #[serde(default)]
    pub cancelled: bool,
}

impl Invoice {
    /// Total of all abonos applied so far.
    pub fn abonos_total_cents(&self) -> i64 {
        self.abonos.iter().map(|a| a.amount_cents).sum()
    }

    /// Derived settled status.
    ///
    /// Consumers must use this, not `payment_type`: the stored enum records
    /// the original sale intent and can desync from the balance otherwise.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.saldo_pendiente_cents <= 0
    }

    /// Outstanding balance as Money.
    #[inline]
    pub fn saldo(&self) -> Money {
        Money::from_cents(self.saldo_pendiente_cents)
    }
}

impl Stamped for Invoice {
    fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    fn reference(&self) -> Option<&str> {
        Some(&self.invoice_number)
    }
}

// =============================================================================
// Sale Draft
// =============================================================================

/// The caller-supplied input to sale submission; everything except the
/// store-assigned parts of an [`Invoice`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDraft {
    pub invoice_number: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub client_name: String,
    pub equipment_id: String,
    pub products: Vec<InvoiceLine>,
    pub total_cents: i64,
    pub payment_type: PaymentType,
}

impl SaleDraft {
    /// Sum of line totals, to be checked against `total_cents`.
    pub fn line_sum_cents(&self) -> i64 {
        self.products.iter().map(|l| l.line_total_cents()).sum()
    }
}

// =============================================================================
// Caja Movement (retiros / ingresos)
// =============================================================================

/// A cash-drawer movement: a withdrawal (retiro) or a deposit (ingreso).
///
/// An ingreso whose `categoria` is `"abono"` is a payment recorded through
/// the drawer; the historial aggregator reclassifies it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CajaMovement {
    pub id: String,
    pub amount_cents: i64,
    pub concept: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(default)]
    pub stamp: Stamp,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Stamped for CajaMovement {
    fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

// =============================================================================
// Unified Historial Movement
// =============================================================================

/// Which source collection a historial movement came from.
///
/// Ids are unique only within their origin collection, so the timeline key
/// is `(kind, id)` - the aggregator must not conflate ids across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Venta,
    Abono,
    Retiro,
    Ingreso,
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MovementKind::Venta => "venta",
            MovementKind::Abono => "abono",
            MovementKind::Retiro => "retiro",
            MovementKind::Ingreso => "ingreso",
        };
        f.write_str(s)
    }
}

/// One entry of the unified historial timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Movement {
    pub kind: MovementKind,
    /// Id within the origin collection.
    pub id: String,
    pub description: String,
    /// Signed monetary amount: retiros are negative.
    pub amount_cents: i64,
    /// Instant resolved at normalization time.
    #[ts(as = "String")]
    pub resolved_at: DateTime<Utc>,
}

impl Movement {
    /// Timeline key: ids are scoped within their origin collection.
    pub fn key(&self) -> (MovementKind, String) {
        (self.kind, self.id.clone())
    }
}

// =============================================================================
// Payment Group
// =============================================================================

/// An ordered set of billable units and their outstanding invoices - the
/// input assembled for a bulk abono. A derived view, never persisted.
#[derive(Debug, Clone, Default)]
pub struct PaymentGroup {
    pub equipment_ids: Vec<String>,
    pub invoices: Vec<Invoice>,
}

impl PaymentGroup {
    /// Total outstanding across the group.
    pub fn outstanding_cents(&self) -> i64 {
        self.invoices
            .iter()
            .filter(|i| !i.cancelled)
            .map(|i| i.saldo_pendiente_cents)
            .sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(movement_type: MovementType, quantity: i64, ajuste_negative: bool) -> KardexEntry {
        KardexEntry {
            id: "e1".to_string(),
            product_id: "p1".to_string(),
            movement_type,
            quantity,
            ajuste_negative,
            unit_cost_cents: 100,
            reference: "ref".to_string(),
            stamp: Stamp::default(),
            related_entry_id: None,
            reverted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_delta() {
        assert_eq!(entry(MovementType::Entrada, 5, false).signed_delta(), 5);
        assert_eq!(entry(MovementType::Inicial, 5, false).signed_delta(), 5);
        assert_eq!(entry(MovementType::Salida, 5, false).signed_delta(), -5);
        assert_eq!(entry(MovementType::Ajuste, 5, false).signed_delta(), 5);
        assert_eq!(entry(MovementType::Ajuste, 5, true).signed_delta(), -5);
    }

    #[test]
    fn test_movement_type_opposite() {
        assert_eq!(
            MovementType::Entrada.opposite(),
            Some(MovementType::Salida)
        );
        assert_eq!(
            MovementType::Salida.opposite(),
            Some(MovementType::Entrada)
        );
        assert_eq!(MovementType::Ajuste.opposite(), None);
        assert_eq!(MovementType::Inicial.opposite(), None);
    }

    #[test]
    fn test_settled_is_derived_from_balance() {
        let mut invoice = Invoice {
            id: "i1".to_string(),
            invoice_number: "20260823-0001".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 23).unwrap(),
            stamp: Stamp::default(),
            client_name: "Ana".to_string(),
            equipment_id: "eq-1".to_string(),
            products: vec![],
            total_cents: 5000,
            payment_type: PaymentType::Pendiente,
            saldo_pendiente_cents: 5000,
            abonos: vec![],
            cancelled: false,
        };
        assert!(!invoice.is_settled());

        invoice.saldo_pendiente_cents = 0;
        // payment_type stays pendiente - original intent is never rewritten
        assert!(invoice.is_settled());
        assert_eq!(invoice.payment_type, PaymentType::Pendiente);
    }

    #[test]
    fn test_line_totals_and_draft_sum() {
        let draft = SaleDraft {
            invoice_number: "20260823-0001".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 23).unwrap(),
            client_name: "Ana".to_string(),
            equipment_id: "eq-1".to_string(),
            products: vec![
                InvoiceLine {
                    product_id: "p1".to_string(),
                    name: "Filtro".to_string(),
                    quantity: 2,
                    unit_price_cents: 1500,
                },
                InvoiceLine {
                    product_id: "p2".to_string(),
                    name: "Aceite".to_string(),
                    quantity: 1,
                    unit_price_cents: 2000,
                },
            ],
            total_cents: 5000,
            payment_type: PaymentType::Contado,
        };
        assert_eq!(draft.line_sum_cents(), 5000);
    }

    #[test]
    fn test_movement_keys_do_not_conflate_kinds() {
        let venta = Movement {
            kind: MovementKind::Venta,
            id: "x".to_string(),
            description: String::new(),
            amount_cents: 100,
            resolved_at: Utc::now(),
        };
        let retiro = Movement {
            kind: MovementKind::Retiro,
            id: "x".to_string(),
            description: String::new(),
            amount_cents: -100,
            resolved_at: Utc::now(),
        };
        assert_ne!(venta.key(), retiro.key());
    }
}
