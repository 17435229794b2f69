//! # Payment Allocator
//!
//! Distributes one payment amount across an ordered set of outstanding
//! invoices (abono / bulk abono).
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate(40, [A(saldo 30, oldest), B(saldo 50)])                       │
//! │                                                                         │
//! │  remaining = 40                                                         │
//! │  A: apply min(40, 30) = 30   remaining = 10                             │
//! │  B: apply min(10, 50) = 10   remaining = 0 → stop                       │
//! │                                                                         │
//! │  plan: [A ← 30, B ← 10], applied 40, leftover 0                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Guarantees:
//! - `Σ applied == min(total, Σ saldo)`
//! - no single invoice is ever over-applied (`applied ≤ saldo` at plan time)
//! - a total exceeding the outstanding sum is reported as `leftover_cents`,
//!   never turned into credit records - the caller must cap beforehand
//!
//! Pure and deterministic: the allocator plans, the store layer applies.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::stamp::resolve_instant;
use crate::types::Invoice;

// =============================================================================
// Plan Types
// =============================================================================

/// One planned abono against one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub invoice_id: String,
    /// Carried along for references on the written abonos.
    pub invoice_number: String,
    pub amount_cents: i64,
}

/// The result of planning a payment distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationPlan {
    /// Non-zero applications, oldest invoice first.
    pub allocations: Vec<Allocation>,
    /// `Σ allocations.amount_cents`.
    pub applied_cents: i64,
    /// Amount that could not be applied because every invoice was
    /// exhausted. Non-zero only when the caller passed a total above the
    /// outstanding sum.
    pub leftover_cents: i64,
}

// =============================================================================
// Ordering
// =============================================================================

/// Sorts invoices oldest-first by resolved stamp, ties broken by invoice id
/// for determinism. Allocation input must be in this order.
pub fn sorted_oldest_first(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
    invoices.sort_by(|a, b| {
        resolve_instant(a)
            .cmp(&resolve_instant(b))
            .then_with(|| a.id.cmp(&b.id))
    });
    invoices
}

// =============================================================================
// Allocation
// =============================================================================

/// Plans the distribution of `total_cents` across `invoices`.
///
/// ## Preconditions
/// - `total_cents > 0`
/// - `invoices` sorted oldest-first (see [`sorted_oldest_first`])
///
/// ## Errors
/// - `Validation(MustBePositive)` if the amount is not positive
/// - `NoOutstandingInvoices` if nothing remains after filtering settled and
///   cancelled invoices
pub fn allocate(total_cents: i64, invoices: &[Invoice]) -> CoreResult<AllocationPlan> {
    if total_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "monto".to_string(),
        }
        .into());
    }

    let outstanding: Vec<&Invoice> = invoices
        .iter()
        .filter(|i| !i.cancelled && i.saldo_pendiente_cents > 0)
        .collect();

    if outstanding.is_empty() {
        return Err(CoreError::NoOutstandingInvoices);
    }

    let mut remaining = Money::from_cents(total_cents);
    let mut allocations = Vec::new();

    for invoice in outstanding {
        if !remaining.is_positive() {
            break;
        }
        let applied = remaining.min(invoice.saldo());
        if applied.is_positive() {
            allocations.push(Allocation {
                invoice_id: invoice.id.clone(),
                invoice_number: invoice.invoice_number.clone(),
                amount_cents: applied.cents(),
            });
            remaining -= applied;
        }
    }

    let applied_cents = total_cents - remaining.cents();
    Ok(AllocationPlan {
        allocations,
        applied_cents,
        leftover_cents: remaining.cents(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::Stamp;
    use crate::types::PaymentType;
    use chrono::{DateTime, NaiveDate, Utc};

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn invoice(id: &str, saldo: i64, stamp_at: &str) -> Invoice {
        Invoice {
            id: id.to_string(),
            invoice_number: format!("F-{id}"),
            date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            stamp: Stamp::resolved(dt(stamp_at)),
            client_name: "Cliente".to_string(),
            equipment_id: "eq-1".to_string(),
            products: vec![],
            total_cents: saldo,
            payment_type: PaymentType::Pendiente,
            saldo_pendiente_cents: saldo,
            abonos: vec![],
            cancelled: false,
        }
    }

    #[test]
    fn test_partial_fill_walks_oldest_first() {
        // A(30, oldest), B(50): allocate(40) → A gets 30, B gets 10
        let invoices = vec![
            invoice("a", 3000, "2026-08-01T10:00:00Z"),
            invoice("b", 5000, "2026-08-02T10:00:00Z"),
        ];
        let plan = allocate(4000, &invoices).unwrap();

        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].invoice_id, "a");
        assert_eq!(plan.allocations[0].amount_cents, 3000);
        assert_eq!(plan.allocations[1].invoice_id, "b");
        assert_eq!(plan.allocations[1].amount_cents, 1000);
        assert_eq!(plan.applied_cents, 4000);
        assert_eq!(plan.leftover_cents, 0);
    }

    #[test]
    fn test_overpayment_reports_leftover() {
        // A(30), B(50): allocate(100) applies 80 and reports 20 unapplied
        let invoices = vec![
            invoice("a", 3000, "2026-08-01T10:00:00Z"),
            invoice("b", 5000, "2026-08-02T10:00:00Z"),
        ];
        let plan = allocate(10000, &invoices).unwrap();

        assert_eq!(plan.applied_cents, 8000);
        assert_eq!(plan.leftover_cents, 2000);
        assert_eq!(plan.allocations[0].amount_cents, 3000);
        assert_eq!(plan.allocations[1].amount_cents, 5000);
    }

    #[test]
    fn test_never_over_applies_a_single_invoice() {
        let invoices = vec![
            invoice("a", 3000, "2026-08-01T10:00:00Z"),
            invoice("b", 5000, "2026-08-02T10:00:00Z"),
        ];
        for total in [1, 2999, 3000, 3001, 7999, 8000, 20000] {
            let plan = allocate(total, &invoices).unwrap();
            for alloc in &plan.allocations {
                let saldo = invoices
                    .iter()
                    .find(|i| i.id == alloc.invoice_id)
                    .unwrap()
                    .saldo_pendiente_cents;
                assert!(alloc.amount_cents <= saldo);
            }
            assert!(plan.applied_cents <= total);
            assert_eq!(plan.applied_cents + plan.leftover_cents, total);
        }
    }

    #[test]
    fn test_filters_settled_and_cancelled() {
        let mut settled = invoice("a", 0, "2026-08-01T10:00:00Z");
        settled.saldo_pendiente_cents = 0;
        let mut cancelled = invoice("b", 4000, "2026-08-01T11:00:00Z");
        cancelled.cancelled = true;
        let open = invoice("c", 2000, "2026-08-02T10:00:00Z");

        let plan = allocate(1000, &[settled, cancelled, open]).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].invoice_id, "c");
    }

    #[test]
    fn test_empty_after_filtering_is_an_error() {
        let mut settled = invoice("a", 0, "2026-08-01T10:00:00Z");
        settled.saldo_pendiente_cents = 0;
        assert!(matches!(
            allocate(1000, &[settled]),
            Err(CoreError::NoOutstandingInvoices)
        ));
        assert!(matches!(
            allocate(1000, &[]),
            Err(CoreError::NoOutstandingInvoices)
        ));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let invoices = vec![invoice("a", 3000, "2026-08-01T10:00:00Z")];
        assert!(allocate(0, &invoices).is_err());
        assert!(allocate(-500, &invoices).is_err());
    }

    #[test]
    fn test_sorted_oldest_first_ties_break_by_id() {
        let i1 = invoice("b", 100, "2026-08-01T10:00:00Z");
        let i2 = invoice("a", 100, "2026-08-01T10:00:00Z");
        let i3 = invoice("c", 100, "2026-07-01T10:00:00Z");

        let sorted = sorted_oldest_first(vec![i1, i2, i3]);
        let ids: Vec<&str> = sorted.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
