//! # Sale Repository
//!
//! Serialized sale submission, invoice numbering, bulk abono application,
//! and audited cancellation.
//!
//! ## Submission Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        submit(SaleDraft)                                │
//! │                                                                         │
//! │  1. VALIDATE draft (pure, pre-gate)                                    │
//! │  2. ACQUIRE operation gate          ── at most one sale in flight      │
//! │  3. DUPLICATE CHECK by invoice_number                                  │
//! │  4. COMMIT invoice + per-day counter increment (one batch)             │
//! │  5. APPEND one salida kardex entry per line                            │
//! │                                                                         │
//! │  Steps 4 and 5 are separate batches: a crash between them leaves a     │
//! │  recorded invoice whose stock deductions are incomplete. The kardex    │
//! │  rebuild is the reconciliation path for that window.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map};
use tracing::{debug, info, warn};
use uuid::Uuid;

use taller_core::{
    sorted_oldest_first, validate_sale_draft, Abono, AllocationPlan, Invoice, Money, MovementType,
    PaymentGroup, PaymentType, SaleDraft, Stamp,
};

use crate::error::{StoreError, StoreResult};
use crate::gate::OperationGate;
use crate::repository::kardex::{KardexRepository, NewKardexEntry};
use crate::store::{MemoryStore, WriteOp, ABONOS, CONTADORES, VENTAS};

/// Document id of the per-day sale counter inside [`CONTADORES`].
const SALE_COUNTER_ID: &str = "ventas";

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice lifecycle operations.
#[derive(Clone)]
pub struct SaleRepository {
    store: MemoryStore,
    gate: OperationGate,
    kardex: KardexRepository,
}

impl SaleRepository {
    pub fn new(store: MemoryStore, gate: OperationGate) -> Self {
        let kardex = KardexRepository::new(store.clone());
        SaleRepository {
            store,
            gate,
            kardex,
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Processes one sale end to end under the operation gate.
    ///
    /// ## Errors
    /// - `Validation` if the draft is structurally invalid (pre-gate)
    /// - `LockTimeout` if another critical section holds the gate
    /// - `DuplicateInvoice` if the number is already taken; the caller must
    ///   regenerate, nothing is overwritten
    pub async fn submit(&self, draft: SaleDraft) -> StoreResult<String> {
        validate_sale_draft(&draft).map_err(taller_core::CoreError::from)?;

        let _guard = self.gate.acquire("venta").await?;

        let hits = self
            .store
            .query_eq(VENTAS, "invoice_number", &json!(draft.invoice_number))
            .await?;
        if !hits.is_empty() {
            warn!(invoice_number = %draft.invoice_number, "duplicate invoice rejected");
            return Err(StoreError::DuplicateInvoice {
                invoice_number: draft.invoice_number,
            });
        }

        let saldo = match draft.payment_type {
            PaymentType::Contado => 0,
            PaymentType::Pendiente => draft.total_cents,
        };
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            invoice_number: draft.invoice_number,
            date: draft.date,
            stamp: Stamp::pending(Utc::now()),
            client_name: draft.client_name,
            equipment_id: draft.equipment_id,
            products: draft.products,
            total_cents: draft.total_cents,
            payment_type: draft.payment_type,
            saldo_pendiente_cents: saldo,
            abonos: Vec::new(),
            cancelled: false,
        };

        let invoice_id = invoice.id.clone();
        let day_key = invoice.date.format("%Y%m%d").to_string();
        self.store
            .commit(vec![
                WriteOp::insert_stamped(VENTAS, &invoice_id, serde_json::to_value(&invoice)?),
                WriteOp::increment(CONTADORES, SALE_COUNTER_ID, &day_key, 1, true),
            ])
            .await?;

        // Stock deductions land after the invoice; see module doc for the
        // partial-failure window.
        for line in &invoice.products {
            self.kardex
                .append(NewKardexEntry::new(
                    line.product_id.clone(),
                    MovementType::Salida,
                    line.quantity,
                    line.unit_price_cents,
                    invoice.invoice_number.clone(),
                ))
                .await?;
        }

        info!(
            invoice_number = %invoice.invoice_number,
            total_cents = invoice.total_cents,
            "sale recorded"
        );
        Ok(invoice_id)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Fetches an invoice by its store id.
    pub async fn get(&self, invoice_id: &str) -> StoreResult<Invoice> {
        let doc = self
            .store
            .get(VENTAS, invoice_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Invoice", invoice_id))?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Finds an invoice by its business number.
    pub async fn find_by_invoice_number(&self, number: &str) -> StoreResult<Option<Invoice>> {
        let hits = self
            .store
            .query_eq(VENTAS, "invoice_number", &json!(number))
            .await?;
        match hits.into_iter().next() {
            Some((_, doc)) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Proposes the next invoice number for a date: `YYYYMMDD-NNNN` from the
    /// per-day counter, falling back to counting that day's invoices when
    /// the counter document has no field for the day yet.
    ///
    /// A proposal is not a reservation; the duplicate check on submit is
    /// what actually enforces uniqueness.
    pub async fn next_invoice_number(&self, date: NaiveDate) -> StoreResult<String> {
        let day_key = date.format("%Y%m%d").to_string();

        let count = match self.store.get(CONTADORES, SALE_COUNTER_ID).await? {
            Some(doc) if doc.get(&day_key).is_some() => {
                doc[&day_key].as_i64().unwrap_or(0)
            }
            _ => {
                let day = date.format("%Y-%m-%d").to_string();
                debug!(%day, "counter missing, falling back to counting invoices");
                self.store
                    .query_eq(VENTAS, "date", &json!(day))
                    .await?
                    .len() as i64
            }
        };

        Ok(format!("{day_key}-{:04}", count + 1))
    }

    // =========================================================================
    // Abonos
    // =========================================================================

    /// Outstanding (non-cancelled, unsettled) invoices across a set of
    /// billable units, oldest first.
    pub async fn outstanding_for_equipment(
        &self,
        equipment_ids: &[String],
    ) -> StoreResult<PaymentGroup> {
        let mut invoices = Vec::new();
        for equipment_id in equipment_ids {
            let hits = self
                .store
                .query_eq(VENTAS, "equipment_id", &json!(equipment_id))
                .await?;
            for (_, doc) in hits {
                let invoice: Invoice = serde_json::from_value(doc)?;
                if !invoice.cancelled && !invoice.is_settled() {
                    invoices.push(invoice);
                }
            }
        }

        Ok(PaymentGroup {
            equipment_ids: equipment_ids.to_vec(),
            invoices: sorted_oldest_first(invoices),
        })
    }

    /// Applies a computed allocation plan as one atomic batch under the
    /// gate. Every abono written shares one `batch_id` and one `paid_at`.
    ///
    /// Each allocation is re-clamped against the live saldo at apply time,
    /// so a plan computed from a stale read can never drive a saldo
    /// negative.
    pub async fn apply_plan(&self, plan: &AllocationPlan) -> StoreResult<String> {
        let _guard = self.gate.acquire("abono_multiple").await?;

        let batch_id = Uuid::new_v4().to_string();
        let paid_at = Utc::now();
        let mut ops = Vec::with_capacity(plan.allocations.len() * 2);

        for allocation in &plan.allocations {
            let invoice = self.get(&allocation.invoice_id).await?;
            let applied = Money::from_cents(allocation.amount_cents).min(invoice.saldo());
            if !applied.is_positive() {
                debug!(
                    invoice_number = %invoice.invoice_number,
                    "allocation target already settled, skipping"
                );
                continue;
            }

            let abono = Abono {
                id: Uuid::new_v4().to_string(),
                amount_cents: applied.cents(),
                batch_id: batch_id.clone(),
                paid_at,
            };

            let mut abonos = invoice.abonos.clone();
            abonos.push(abono.clone());
            let mut patch = Map::new();
            patch.insert("abonos".to_string(), serde_json::to_value(&abonos)?);
            patch.insert(
                "saldo_pendiente_cents".to_string(),
                json!(invoice.saldo().saturating_sub_floor(applied).cents()),
            );
            ops.push(WriteOp::merge(VENTAS, &invoice.id, patch));

            // Mirror document so the historial can subscribe to abonos as
            // their own collection.
            ops.push(WriteOp::insert_stamped(
                ABONOS,
                &abono.id,
                json!({
                    "id": abono.id,
                    "invoice_id": invoice.id,
                    "invoice_number": invoice.invoice_number,
                    "amount_cents": abono.amount_cents,
                    "batch_id": abono.batch_id,
                    "created_at": abono.paid_at,
                }),
            ));
        }

        if ops.is_empty() {
            return Err(taller_core::CoreError::NoOutstandingInvoices.into());
        }

        self.store.commit(ops).await?;
        info!(
            batch_id = %batch_id,
            applied_cents = plan.applied_cents,
            leftover_cents = plan.leftover_cents,
            "abono batch applied"
        );
        Ok(batch_id)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels an invoice: reverts its stock deductions through the kardex
    /// and flags the invoice. The invoice document stays; nothing is
    /// deleted.
    pub async fn cancel(&self, invoice_id: &str) -> StoreResult<()> {
        let _guard = self.gate.acquire("anulacion").await?;

        let invoice = self.get(invoice_id).await?;
        if invoice.cancelled {
            return Err(StoreError::conflict(format!(
                "invoice {} already cancelled",
                invoice.invoice_number
            )));
        }

        for line in &invoice.products {
            let entries = self.kardex.entries_for(&line.product_id).await?;
            for entry in entries {
                if entry.movement_type == MovementType::Salida
                    && entry.reference == invoice.invoice_number
                    && !entry.reverted
                {
                    self.kardex.revert(&entry.id).await?;
                }
            }
        }

        let mut patch = Map::new();
        patch.insert("cancelled".to_string(), json!(true));
        self.store.merge(VENTAS, invoice_id, patch).await?;

        info!(invoice_number = %invoice.invoice_number, "invoice cancelled");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use taller_core::{allocate, InvoiceLine, ProductStock};

    fn product(id: &str, quantity: i64) -> ProductStock {
        ProductStock {
            product_id: id.to_string(),
            name: format!("Producto {id}"),
            quantity,
            min_stock: 1,
            unit_cost_cents: 800,
            price_cents: 1500,
        }
    }

    fn draft(number: &str, payment_type: PaymentType) -> SaleDraft {
        SaleDraft {
            invoice_number: number.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 23).unwrap(),
            client_name: "Ana".to_string(),
            equipment_id: "eq-1".to_string(),
            products: vec![InvoiceLine {
                product_id: "p1".to_string(),
                name: "Producto p1".to_string(),
                quantity: 2,
                unit_price_cents: 1500,
            }],
            total_cents: 3000,
            payment_type,
        }
    }

    async fn setup() -> (SaleRepository, KardexRepository) {
        let store = MemoryStore::default();
        let repo = SaleRepository::new(store.clone(), OperationGate::new());
        let kardex = KardexRepository::new(store);
        kardex.create_product(&product("p1", 10)).await.unwrap();
        (repo, kardex)
    }

    #[tokio::test]
    async fn test_submit_records_invoice_and_deducts_stock() {
        let (repo, kardex) = setup().await;

        let id = repo.submit(draft("20260823-0001", PaymentType::Contado)).await.unwrap();
        let invoice = repo.get(&id).await.unwrap();
        assert_eq!(invoice.saldo_pendiente_cents, 0);
        assert!(invoice.is_settled());

        assert_eq!(kardex.stock("p1").await.unwrap().quantity, 8);
        let entries = kardex.entries_for("p1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reference, "20260823-0001");
    }

    #[tokio::test]
    async fn test_pendiente_saldo_equals_total() {
        let (repo, _) = setup().await;
        let id = repo.submit(draft("20260823-0001", PaymentType::Pendiente)).await.unwrap();
        let invoice = repo.get(&id).await.unwrap();
        assert_eq!(invoice.saldo_pendiente_cents, 3000);
        assert!(!invoice.is_settled());
    }

    #[tokio::test]
    async fn test_duplicate_invoice_number_rejected() {
        let (repo, _) = setup().await;
        repo.submit(draft("20260823-0001", PaymentType::Contado)).await.unwrap();

        let result = repo.submit(draft("20260823-0001", PaymentType::Contado)).await;
        assert!(matches!(result, Err(StoreError::DuplicateInvoice { .. })));

        // Exactly one invoice with that number exists
        let hits = repo
            .store
            .query_eq(VENTAS, "invoice_number", &json!("20260823-0001"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_next_invoice_number_counter_and_fallback() {
        let (repo, _) = setup().await;
        let date = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();

        // No counter doc, no invoices: fallback counts zero
        assert_eq!(repo.next_invoice_number(date).await.unwrap(), "20260823-0001");

        repo.submit(draft("20260823-0001", PaymentType::Contado)).await.unwrap();
        // Counter incremented by the submission batch
        assert_eq!(repo.next_invoice_number(date).await.unwrap(), "20260823-0002");

        // Another day has its own sequence
        let other = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(repo.next_invoice_number(other).await.unwrap(), "20260824-0001");
    }

    #[tokio::test]
    async fn test_allocation_round_trip() {
        let (repo, _) = setup().await;
        let a = repo.submit(draft("20260823-0001", PaymentType::Pendiente)).await.unwrap();
        let mut second = draft("20260823-0002", PaymentType::Pendiente);
        second.products[0].quantity = 1;
        second.total_cents = 1500;
        let b = repo.submit(second).await.unwrap();

        let group = repo
            .outstanding_for_equipment(&["eq-1".to_string()])
            .await
            .unwrap();
        assert_eq!(group.invoices.len(), 2);
        assert_eq!(group.outstanding_cents(), 4500);

        // 4000 settles A (3000) and leaves 1000 on B
        let plan = allocate(4000, &group.invoices).unwrap();
        let batch_id = repo.apply_plan(&plan).await.unwrap();

        let first = repo.get(&a).await.unwrap();
        assert!(first.is_settled());
        assert_eq!(first.abonos.len(), 1);
        assert_eq!(first.abonos[0].batch_id, batch_id);
        // Original intent survives settlement
        assert_eq!(first.payment_type, PaymentType::Pendiente);

        let second = repo.get(&b).await.unwrap();
        assert_eq!(second.saldo_pendiente_cents, 500);
        assert_eq!(second.abonos[0].batch_id, batch_id);

        // saldo == max(total − Σabonos, 0) re-derives on both invoices
        for invoice in [&first, &second] {
            assert_eq!(
                invoice.saldo_pendiente_cents,
                (invoice.total_cents - invoice.abonos_total_cents()).max(0)
            );
        }

        // Mirror documents landed in the abonos collection
        let mirrors = repo.store.all(ABONOS).await.unwrap();
        assert_eq!(mirrors.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_plan_clamps_against_live_saldo() {
        let (repo, _) = setup().await;
        let id = repo.submit(draft("20260823-0001", PaymentType::Pendiente)).await.unwrap();

        let group = repo
            .outstanding_for_equipment(&["eq-1".to_string()])
            .await
            .unwrap();
        let plan = allocate(3000, &group.invoices).unwrap();

        // Shrink the saldo out-of-band between plan and apply
        let stale = repo.get(&id).await.unwrap();
        let mut patch = Map::new();
        patch.insert("saldo_pendiente_cents".to_string(), json!(1000));
        repo.store.merge(VENTAS, &stale.id, patch).await.unwrap();

        repo.apply_plan(&plan).await.unwrap();
        let invoice = repo.get(&id).await.unwrap();
        // Clamped to the live saldo, never negative
        assert_eq!(invoice.saldo_pendiente_cents, 0);
        assert_eq!(invoice.abonos[0].amount_cents, 1000);
        assert!(invoice.saldo_pendiente_cents >= 0);
        assert_eq!(invoice.abonos_total_cents(), 1000);
    }

    #[tokio::test]
    async fn test_cancel_reverts_stock_and_flags() {
        let (repo, kardex) = setup().await;
        let id = repo.submit(draft("20260823-0001", PaymentType::Contado)).await.unwrap();
        assert_eq!(kardex.stock("p1").await.unwrap().quantity, 8);

        repo.cancel(&id).await.unwrap();
        assert_eq!(kardex.stock("p1").await.unwrap().quantity, 10);

        let invoice = repo.get(&id).await.unwrap();
        assert!(invoice.cancelled);

        // Cancelling twice conflicts
        assert!(matches!(
            repo.cancel(&id).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_invoices_excluded_from_outstanding() {
        let (repo, _) = setup().await;
        let id = repo.submit(draft("20260823-0001", PaymentType::Pendiente)).await.unwrap();
        repo.cancel(&id).await.unwrap();

        let group = repo
            .outstanding_for_equipment(&["eq-1".to_string()])
            .await
            .unwrap();
        assert!(group.invoices.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_draft_rejected_before_gate() {
        let (repo, _) = setup().await;
        let mut bad = draft("20260823-0001", PaymentType::Contado);
        bad.total_cents = 9999;

        let result = repo.submit(bad).await;
        assert!(matches!(result, Err(StoreError::Core(_))));
    }
}
