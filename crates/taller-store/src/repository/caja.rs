//! # Caja Repository
//!
//! Cash-drawer movements: retiros (withdrawals) and ingresos (deposits).
//! Thin compared to the other repositories on purpose; the interesting
//! behavior (signed amounts, abono reclassification) lives in the
//! historial aggregator.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use taller_core::{validate_amount, CajaMovement, CoreError, Stamp};

use crate::error::StoreResult;
use crate::store::{MemoryStore, WriteOp, INGRESOS, RETIROS};

/// Repository for cash-drawer operations.
#[derive(Clone)]
pub struct CajaRepository {
    store: MemoryStore,
}

impl CajaRepository {
    pub fn new(store: MemoryStore) -> Self {
        CajaRepository { store }
    }

    /// Records a cash withdrawal. Amount is stored positive; the historial
    /// signs it negative.
    pub async fn register_retiro(
        &self,
        amount_cents: i64,
        concept: impl Into<String>,
    ) -> StoreResult<String> {
        self.register(RETIROS, amount_cents, concept.into(), None).await
    }

    /// Records a cash deposit. `categoria: Some("abono")` marks a payment
    /// routed through the drawer and is reclassified by the historial.
    pub async fn register_ingreso(
        &self,
        amount_cents: i64,
        concept: impl Into<String>,
        categoria: Option<String>,
    ) -> StoreResult<String> {
        self.register(INGRESOS, amount_cents, concept.into(), categoria).await
    }

    async fn register(
        &self,
        collection: &str,
        amount_cents: i64,
        concept: String,
        categoria: Option<String>,
    ) -> StoreResult<String> {
        validate_amount(amount_cents).map_err(CoreError::from)?;

        let now = Utc::now();
        let movement = CajaMovement {
            id: Uuid::new_v4().to_string(),
            amount_cents,
            concept,
            categoria,
            stamp: Stamp::pending(now),
            created_at: now,
        };

        let id = movement.id.clone();
        self.store
            .commit(vec![WriteOp::insert_stamped(
                collection,
                &id,
                serde_json::to_value(&movement)?,
            )])
            .await?;

        info!(collection, amount_cents, "caja movement recorded");
        Ok(id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_retiro_and_ingreso_land_in_their_collections() {
        let store = MemoryStore::default();
        let repo = CajaRepository::new(store.clone());

        let retiro_id = repo.register_retiro(2000, "compra de insumos").await.unwrap();
        let ingreso_id = repo
            .register_ingreso(5000, "abono Ana", Some("abono".to_string()))
            .await
            .unwrap();

        let retiro = store.get(RETIROS, &retiro_id).await.unwrap().unwrap();
        assert_eq!(retiro["amount_cents"], 2000);
        assert!(retiro.get("categoria").is_none());

        let ingreso = store.get(INGRESOS, &ingreso_id).await.unwrap().unwrap();
        assert_eq!(ingreso["categoria"], "abono");
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let repo = CajaRepository::new(MemoryStore::default());
        for amount in [0, -500] {
            assert!(matches!(
                repo.register_retiro(amount, "x").await,
                Err(StoreError::Core(_))
            ));
        }
    }
}
