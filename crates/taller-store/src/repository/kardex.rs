//! # Kardex Repository
//!
//! The append-only inventory movement ledger and its stock projection.
//!
//! ## Ledger Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex Lifecycle                                 │
//! │                                                                         │
//! │  1. APPEND                                                             │
//! │     └── entry + signed stock increment land in ONE batch               │
//! │         (fail closed: missing projection rejects both)                 │
//! │                                                                         │
//! │  2. (OPTIONAL) REVERT                                                  │
//! │     └── compensating entry of the opposite type, mutual back-refs,     │
//! │         original flagged reverted - never edited, never deleted        │
//! │                                                                         │
//! │  3. (DRIFT) REBUILD                                                    │
//! │     └── full oldest-first replay OVERWRITES the projection             │
//! │         (idempotent; run under the gate or it can race an append)      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariant: the projection equals the sum of signed deltas over all
//! non-reverted entries, except during a rebuild window.

use chrono::Utc;
use serde_json::{json, Map};
use tracing::{debug, info, warn};
use uuid::Uuid;

use taller_core::{resolve_instant, CoreError, KardexEntry, MovementType, ProductStock, Stamp};

use crate::error::{StoreError, StoreResult};
use crate::store::{MemoryStore, WriteOp, KARDEX, PRODUCTOS};

// =============================================================================
// New Entry Input
// =============================================================================

/// Caller-supplied input for an append; everything else is assigned here.
#[derive(Debug, Clone)]
pub struct NewKardexEntry {
    pub product_id: String,
    pub movement_type: MovementType,
    /// Strictly positive; direction comes from the movement type.
    pub quantity: i64,
    /// Only meaningful for `ajuste`: true when the correction subtracts.
    pub ajuste_negative: bool,
    pub unit_cost_cents: i64,
    pub reference: String,
}

impl NewKardexEntry {
    /// Plain entry with the common defaults.
    pub fn new(
        product_id: impl Into<String>,
        movement_type: MovementType,
        quantity: i64,
        unit_cost_cents: i64,
        reference: impl Into<String>,
    ) -> Self {
        NewKardexEntry {
            product_id: product_id.into(),
            movement_type,
            quantity,
            ajuste_negative: false,
            unit_cost_cents,
            reference: reference.into(),
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for ledger and stock-projection operations.
#[derive(Clone)]
pub struct KardexRepository {
    store: MemoryStore,
}

impl KardexRepository {
    pub fn new(store: MemoryStore) -> Self {
        KardexRepository { store }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Registers a product projection document. Fails with `Conflict` if
    /// the product already exists.
    pub async fn create_product(&self, product: &ProductStock) -> StoreResult<()> {
        let doc = serde_json::to_value(product)?;
        self.store.insert(PRODUCTOS, &product.product_id, doc).await
    }

    /// Reads a product's stock projection.
    pub async fn stock(&self, product_id: &str) -> StoreResult<ProductStock> {
        let doc = self
            .store
            .get(PRODUCTOS, product_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;
        Ok(serde_json::from_value(doc)?)
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Appends a ledger entry and applies its signed delta to the stock
    /// projection in one atomic batch.
    ///
    /// ## Errors
    /// - `InvalidQuantity` if `quantity <= 0` (rejected before any write)
    /// - `NotFound` if the product projection does not exist - the batch
    ///   fails closed rather than half-applying
    pub async fn append(&self, new: NewKardexEntry) -> StoreResult<String> {
        if new.quantity <= 0 {
            return Err(CoreError::InvalidQuantity {
                product_id: new.product_id,
                quantity: new.quantity,
            }
            .into());
        }

        let now = Utc::now();
        let entry = KardexEntry {
            id: Uuid::new_v4().to_string(),
            product_id: new.product_id,
            movement_type: new.movement_type,
            quantity: new.quantity,
            ajuste_negative: new.ajuste_negative,
            unit_cost_cents: new.unit_cost_cents,
            reference: new.reference,
            stamp: Stamp::pending(now),
            related_entry_id: None,
            reverted: false,
            created_at: now,
        };
        let delta = entry.signed_delta();

        debug!(
            product_id = %entry.product_id,
            movement_type = %entry.movement_type,
            quantity = entry.quantity,
            delta,
            "appending kardex entry"
        );

        let entry_id = entry.id.clone();
        self.store
            .commit(vec![
                WriteOp::insert_stamped(KARDEX, &entry_id, serde_json::to_value(&entry)?),
                WriteOp::increment(PRODUCTOS, &entry.product_id, "quantity", delta, false),
            ])
            .await?;

        Ok(entry_id)
    }

    // =========================================================================
    // History & Rebuild
    // =========================================================================

    /// All ledger entries for a product, oldest first (resolved stamp,
    /// ties by id).
    pub async fn entries_for(&self, product_id: &str) -> StoreResult<Vec<KardexEntry>> {
        let docs = self
            .store
            .query_eq(KARDEX, "product_id", &json!(product_id))
            .await?;

        let mut entries = Vec::with_capacity(docs.len());
        for (_, doc) in docs {
            entries.push(serde_json::from_value::<KardexEntry>(doc)?);
        }
        entries.sort_by(|a, b| {
            resolve_instant(a)
                .cmp(&resolve_instant(b))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Recomputes a product's quantity from scratch by replaying its full
    /// history, skipping reverted entries, and **overwrites** the
    /// projection (not an increment). Idempotent.
    ///
    /// Run this under the operation gate when appends may be in flight:
    /// an append committing between the replay read and the overwrite
    /// would be silently discarded.
    pub async fn rebuild(&self, product_id: &str) -> StoreResult<i64> {
        let previous = self.stock(product_id).await?.quantity;

        let replayed: i64 = self
            .entries_for(product_id)
            .await?
            .iter()
            .filter(|e| !e.reverted)
            .map(|e| e.signed_delta())
            .sum();

        if replayed != previous {
            warn!(
                product_id,
                previous, replayed, "projection drift corrected by rebuild"
            );
        }

        let mut patch = Map::new();
        patch.insert("quantity".to_string(), json!(replayed));
        self.store.merge(PRODUCTOS, product_id, patch).await?;

        info!(product_id, quantity = replayed, "projection rebuilt");
        Ok(replayed)
    }

    // =========================================================================
    // Revert
    // =========================================================================

    /// Writes a compensating entry of the opposite type for the same
    /// quantity, back-links both entries, and flags the original - all in
    /// one batch. The original is never edited beyond the flag and never
    /// deleted; reversal stays auditable.
    ///
    /// ## Errors
    /// - `NotFound` if the entry does not exist
    /// - `UnsupportedType` unless the entry is entrada/salida
    /// - `Conflict` if the entry was already reverted
    pub async fn revert(&self, entry_id: &str) -> StoreResult<String> {
        let doc = self
            .store
            .get(KARDEX, entry_id)
            .await?
            .ok_or_else(|| StoreError::not_found("KardexEntry", entry_id))?;
        let original: KardexEntry = serde_json::from_value(doc)?;

        if original.reverted {
            return Err(StoreError::conflict(format!(
                "kardex entry {entry_id} already reverted"
            )));
        }

        let Some(opposite) = original.movement_type.opposite() else {
            return Err(CoreError::UnsupportedType {
                movement_type: original.movement_type.to_string(),
                operation: "revert".to_string(),
            }
            .into());
        };

        let now = Utc::now();
        let compensating = KardexEntry {
            id: Uuid::new_v4().to_string(),
            product_id: original.product_id.clone(),
            movement_type: opposite,
            quantity: original.quantity,
            ajuste_negative: false,
            unit_cost_cents: original.unit_cost_cents,
            reference: format!("reverso {}", original.reference),
            stamp: Stamp::pending(now),
            related_entry_id: Some(original.id.clone()),
            reverted: false,
            created_at: now,
        };
        let delta = compensating.signed_delta();

        debug!(
            entry_id,
            compensating_id = %compensating.id,
            movement_type = %opposite,
            "reverting kardex entry"
        );

        let mut patch = Map::new();
        patch.insert("reverted".to_string(), json!(true));
        patch.insert("related_entry_id".to_string(), json!(compensating.id));

        let compensating_id = compensating.id.clone();
        self.store
            .commit(vec![
                WriteOp::insert_stamped(
                    KARDEX,
                    &compensating_id,
                    serde_json::to_value(&compensating)?,
                ),
                WriteOp::increment(PRODUCTOS, &original.product_id, "quantity", delta, false),
                WriteOp::merge(KARDEX, entry_id, patch),
            ])
            .await?;

        Ok(compensating_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str) -> ProductStock {
        ProductStock {
            product_id: id.to_string(),
            name: "Filtro de aceite".to_string(),
            quantity: 0,
            min_stock: 2,
            unit_cost_cents: 800,
            price_cents: 1500,
        }
    }

    async fn repo_with_product(id: &str) -> KardexRepository {
        let repo = KardexRepository::new(MemoryStore::default());
        repo.create_product(&product(id)).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_append_applies_signed_delta() {
        let repo = repo_with_product("p1").await;

        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();
        repo.append(NewKardexEntry::new("p1", MovementType::Entrada, 5, 800, "compra"))
            .await
            .unwrap();
        repo.append(NewKardexEntry::new("p1", MovementType::Salida, 3, 800, "20260823-0001"))
            .await
            .unwrap();

        assert_eq!(repo.stock("p1").await.unwrap().quantity, 12);
    }

    #[tokio::test]
    async fn test_append_rejects_non_positive_quantity() {
        let repo = repo_with_product("p1").await;

        for quantity in [0, -4] {
            let result = repo
                .append(NewKardexEntry::new("p1", MovementType::Entrada, quantity, 800, "x"))
                .await;
            assert!(matches!(
                result,
                Err(StoreError::Core(CoreError::InvalidQuantity { .. }))
            ));
        }
        // Rejected before any write
        assert!(repo.entries_for("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_fails_closed_without_projection() {
        let repo = KardexRepository::new(MemoryStore::default());

        let result = repo
            .append(NewKardexEntry::new("ghost", MovementType::Entrada, 5, 800, "x"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        // The ledger entry must not have landed either
        assert!(repo.entries_for("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ajuste_honours_sign_flag() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();

        let mut ajuste = NewKardexEntry::new("p1", MovementType::Ajuste, 4, 800, "conteo");
        ajuste.ajuste_negative = true;
        repo.append(ajuste).await.unwrap();

        assert_eq!(repo.stock("p1").await.unwrap().quantity, 6);
    }

    #[tokio::test]
    async fn test_replay_matches_projection() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();
        repo.append(NewKardexEntry::new("p1", MovementType::Salida, 4, 800, "venta"))
            .await
            .unwrap();
        repo.append(NewKardexEntry::new("p1", MovementType::Entrada, 2, 800, "compra"))
            .await
            .unwrap();

        // quantity == Σ(entrada,inicial) − Σ(salida)
        let rebuilt = repo.rebuild("p1").await.unwrap();
        assert_eq!(rebuilt, 8);
        assert_eq!(repo.stock("p1").await.unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 7, 800, "alta"))
            .await
            .unwrap();

        let first = repo.rebuild("p1").await.unwrap();
        let second = repo.rebuild("p1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rebuild_corrects_drift() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 7, 800, "alta"))
            .await
            .unwrap();

        // Simulate a corrupted projection (out-of-band writer)
        let mut patch = Map::new();
        patch.insert("quantity".to_string(), json!(99));
        repo.store.merge(PRODUCTOS, "p1", patch).await.unwrap();

        assert_eq!(repo.rebuild("p1").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_revert_is_net_zero_after_rebuild() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();
        let before = repo.stock("p1").await.unwrap().quantity;

        let entry_id = repo
            .append(NewKardexEntry::new("p1", MovementType::Salida, 3, 800, "venta"))
            .await
            .unwrap();
        let compensating_id = repo.revert(&entry_id).await.unwrap();

        // Projection already back via the compensating increment
        assert_eq!(repo.stock("p1").await.unwrap().quantity, before);
        // And the replay agrees: reverted entries are skipped, the
        // compensating entry still counts
        assert_eq!(repo.rebuild("p1").await.unwrap(), before);

        // Mutual back-references, original flagged, never deleted
        let entries = repo.entries_for("p1").await.unwrap();
        let original = entries.iter().find(|e| e.id == entry_id).unwrap();
        let compensating = entries.iter().find(|e| e.id == compensating_id).unwrap();
        assert!(original.reverted);
        assert_eq!(original.related_entry_id.as_deref(), Some(compensating_id.as_str()));
        assert_eq!(compensating.related_entry_id.as_deref(), Some(entry_id.as_str()));
        assert_eq!(compensating.movement_type, MovementType::Entrada);
        assert!(!compensating.reverted);
    }

    #[tokio::test]
    async fn test_revert_missing_entry() {
        let repo = repo_with_product("p1").await;
        assert!(matches!(
            repo.revert("no-such-entry").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_revert_rejects_unsupported_types() {
        let repo = repo_with_product("p1").await;
        let inicial = repo
            .append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();
        let ajuste = repo
            .append(NewKardexEntry::new("p1", MovementType::Ajuste, 1, 800, "conteo"))
            .await
            .unwrap();

        for id in [inicial, ajuste] {
            assert!(matches!(
                repo.revert(&id).await,
                Err(StoreError::Core(CoreError::UnsupportedType { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_revert_twice_conflicts() {
        let repo = repo_with_product("p1").await;
        repo.append(NewKardexEntry::new("p1", MovementType::Inicial, 10, 800, "alta"))
            .await
            .unwrap();
        let entry_id = repo
            .append(NewKardexEntry::new("p1", MovementType::Salida, 3, 800, "venta"))
            .await
            .unwrap();

        repo.revert(&entry_id).await.unwrap();
        assert!(matches!(
            repo.revert(&entry_id).await,
            Err(StoreError::Conflict { .. })
        ));
    }
}
