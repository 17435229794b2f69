//! # Document Store Emulation
//!
//! In-memory document store exposing the semantics the core is written
//! against: per-collection equality queries, atomic multi-document batches
//! with numeric increments, change subscriptions (initial snapshot +
//! add/modify/remove deltas), and server write-stamps that resolve
//! asynchronously after a write is acknowledged.
//!
//! ## Batch Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     commit(Vec<WriteOp>)                                │
//! │                                                                         │
//! │  1. VALIDATE every op against current state                            │
//! │     └── any failure → whole batch rejected, nothing applied            │
//! │  2. APPLY all ops under one write lock                                 │
//! │  3. EMIT one ChangeEvent per op to that collection's subscribers       │
//! │                                                                         │
//! │  FAIL CLOSED: a pair like (kardex entry + stock increment) either      │
//! │  fully lands or not at all - never a partial apply                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Server Stamps
//! An insert may name a stamp field. Normally the store resolves it at
//! commit time; with `hold_server_stamps` the document lands carrying only
//! its pending local instant and resolution happens later via
//! [`MemoryStore::resolve_held_stamps`], emitting Modified deltas - the
//! same shape as the real round-trip, which tests use to exercise the
//! pending→resolved reconciliation path.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Collection Names
// =============================================================================

/// Sale invoices.
pub const VENTAS: &str = "ventas";
/// Abono mirror documents (one per applied abono).
pub const ABONOS: &str = "abonos";
/// Cash-drawer withdrawals.
pub const RETIROS: &str = "retiros";
/// Cash-drawer deposits.
pub const INGRESOS: &str = "ingresos";
/// Inventory movement ledger.
pub const KARDEX: &str = "kardex";
/// Product stock projections.
pub const PRODUCTOS: &str = "productos";
/// Per-day sale counters.
pub const CONTADORES: &str = "contadores";

// =============================================================================
// Configuration
// =============================================================================

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of each collection's broadcast channel.
    pub channel_capacity: usize,
    /// When true, inserts leave their stamp field unresolved until
    /// [`MemoryStore::resolve_held_stamps`] runs (test switch).
    pub hold_server_stamps: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            channel_capacity: 256,
            hold_server_stamps: false,
        }
    }
}

impl StoreConfig {
    /// Builder-style: hold server stamps until explicitly resolved.
    pub fn hold_server_stamps(mut self) -> Self {
        self.hold_server_stamps = true;
        self
    }

    /// Builder-style: channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

// =============================================================================
// Change Events
// =============================================================================

/// Kind of change delivered on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One delta delivered to a collection's subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: String,
    /// Full document after the change; `None` for removals.
    pub doc: Option<Value>,
}

// =============================================================================
// Write Operations
// =============================================================================

/// One operation inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Inserts a new document; fails if the id already exists.
    /// `stamp_field` names the stamp envelope to receive the server time.
    Insert {
        collection: String,
        id: String,
        doc: Value,
        stamp_field: Option<String>,
    },
    /// Merges top-level fields into an existing document, leaving every
    /// other field untouched. Fails if the document does not exist.
    Merge {
        collection: String,
        id: String,
        patch: Map<String, Value>,
    },
    /// Atomically adds `delta` to a numeric field. With `upsert` the
    /// document (and field) are created as needed; without it a missing
    /// document fails the batch.
    Increment {
        collection: String,
        id: String,
        field: String,
        delta: i64,
        upsert: bool,
    },
    /// Removes a document; fails if it does not exist.
    Delete { collection: String, id: String },
}

impl WriteOp {
    /// Insert with a stamp field named `"stamp"` - the envelope every
    /// movement-like document carries.
    pub fn insert_stamped(
        collection: impl Into<String>,
        id: impl Into<String>,
        doc: Value,
    ) -> Self {
        WriteOp::Insert {
            collection: collection.into(),
            id: id.into(),
            doc,
            stamp_field: Some("stamp".to_string()),
        }
    }

    /// Plain insert without a stamp field.
    pub fn insert(collection: impl Into<String>, id: impl Into<String>, doc: Value) -> Self {
        WriteOp::Insert {
            collection: collection.into(),
            id: id.into(),
            doc,
            stamp_field: None,
        }
    }

    pub fn merge(
        collection: impl Into<String>,
        id: impl Into<String>,
        patch: Map<String, Value>,
    ) -> Self {
        WriteOp::Merge {
            collection: collection.into(),
            id: id.into(),
            patch,
        }
    }

    pub fn increment(
        collection: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        delta: i64,
        upsert: bool,
    ) -> Self {
        WriteOp::Increment {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            delta,
            upsert,
        }
    }

    fn target(&self) -> (&str, &str) {
        match self {
            WriteOp::Insert { collection, id, .. }
            | WriteOp::Merge { collection, id, .. }
            | WriteOp::Increment { collection, id, .. }
            | WriteOp::Delete { collection, id } => (collection, id),
        }
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// A held (unresolved) server stamp: collection, document id, stamp field.
#[derive(Debug, Clone)]
struct HeldStamp {
    collection: String,
    id: String,
    field: String,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: HashMap<String, broadcast::Sender<ChangeEvent>>,
    held: Vec<HeldStamp>,
}

impl Inner {
    fn doc(&self, collection: &str, id: &str) -> Option<&Value> {
        self.collections.get(collection).and_then(|c| c.get(id))
    }

    fn emit(&self, collection: &str, event: ChangeEvent) {
        if let Some(tx) = self.watchers.get(collection) {
            // No subscribers is fine; lagged receivers resync on their own.
            let _ = tx.send(event);
        }
    }
}

/// The in-memory document store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    offline: Arc<AtomicBool>,
    config: StoreConfig,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new(StoreConfig::default())
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(config: StoreConfig) -> Self {
        MemoryStore {
            inner: Arc::new(RwLock::new(Inner::default())),
            offline: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Simulates losing / regaining the connection. While offline every
    /// operation fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Checks whether the store is reachable.
    pub fn health_check(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a document by id.
    pub async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        self.ensure_online()?;
        let inner = self.inner.read().await;
        Ok(inner.doc(collection, id).cloned())
    }

    /// All documents of a collection, ordered by id.
    pub async fn all(&self, collection: &str) -> StoreResult<Vec<(String, Value)>> {
        self.ensure_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    /// Equality query on one top-level indexed field, ordered by id.
    pub async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<(String, Value)>> {
        self.ensure_online()?;
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, doc)| doc.get(field) == Some(value))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Applies a batch atomically: every op is validated against current
    /// state first, and any failure rejects the whole batch with nothing
    /// applied (fail closed).
    pub async fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;

        for op in &ops {
            let (collection, id) = op.target();
            match op {
                WriteOp::Insert { .. } => {
                    if inner.doc(collection, id).is_some() {
                        return Err(StoreError::conflict(format!(
                            "document {collection}/{id} already exists"
                        )));
                    }
                }
                WriteOp::Merge { .. } | WriteOp::Delete { .. } => {
                    if inner.doc(collection, id).is_none() {
                        return Err(StoreError::not_found(collection, id));
                    }
                }
                WriteOp::Increment { upsert, .. } => {
                    if !upsert && inner.doc(collection, id).is_none() {
                        return Err(StoreError::not_found(collection, id));
                    }
                }
            }
        }

        let mut events: Vec<(String, ChangeEvent)> = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::Insert {
                    collection,
                    id,
                    mut doc,
                    stamp_field,
                } => {
                    if let Some(field) = stamp_field {
                        if self.config.hold_server_stamps {
                            inner.held.push(HeldStamp {
                                collection: collection.clone(),
                                id: id.clone(),
                                field,
                            });
                        } else {
                            apply_server_stamp(&mut doc, &field, Utc::now());
                        }
                    }
                    debug!(collection = %collection, id = %id, "insert");
                    inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), doc.clone());
                    events.push((
                        collection,
                        ChangeEvent {
                            kind: ChangeKind::Added,
                            id,
                            doc: Some(doc),
                        },
                    ));
                }
                WriteOp::Merge {
                    collection,
                    id,
                    patch,
                } => {
                    // Existence validated above; a vanished doc would be a
                    // torn batch, so fail loudly rather than skip.
                    let Some(doc) = inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .get_mut(&id)
                    else {
                        return Err(StoreError::not_found(&collection, &id));
                    };
                    if let Value::Object(fields) = doc {
                        for (key, value) in patch {
                            fields.insert(key, value);
                        }
                    }
                    let doc = doc.clone();
                    debug!(collection = %collection, id = %id, "merge");
                    events.push((
                        collection,
                        ChangeEvent {
                            kind: ChangeKind::Modified,
                            id,
                            doc: Some(doc),
                        },
                    ));
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                    ..
                } => {
                    let entry = inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .entry(id.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(fields) = entry {
                        let current = fields.get(&field).and_then(Value::as_i64).unwrap_or(0);
                        fields.insert(field.clone(), json!(current + delta));
                    }
                    let doc = entry.clone();
                    debug!(collection = %collection, id = %id, field = %field, delta, "increment");
                    events.push((
                        collection,
                        ChangeEvent {
                            kind: ChangeKind::Modified,
                            id,
                            doc: Some(doc),
                        },
                    ));
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(c) = inner.collections.get_mut(&collection) {
                        c.remove(&id);
                    }
                    debug!(collection = %collection, id = %id, "delete");
                    events.push((
                        collection,
                        ChangeEvent {
                            kind: ChangeKind::Removed,
                            id,
                            doc: None,
                        },
                    ));
                }
            }
        }

        for (collection, event) in events {
            inner.emit(&collection, event);
        }

        Ok(())
    }

    /// Single-op convenience wrappers.
    pub async fn insert(&self, collection: &str, id: &str, doc: Value) -> StoreResult<()> {
        self.commit(vec![WriteOp::insert(collection, id, doc)]).await
    }

    pub async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> StoreResult<()> {
        self.commit(vec![WriteOp::merge(collection, id, patch)]).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.commit(vec![WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])
        .await
    }

    // =========================================================================
    // Change Subscriptions
    // =========================================================================

    /// Subscribes to a collection.
    ///
    /// Returns the initial snapshot (one Added event per existing document)
    /// plus a receiver for subsequent deltas. Snapshot and subscription are
    /// taken under one lock, so no delta is lost in between.
    pub async fn watch(
        &self,
        collection: &str,
    ) -> StoreResult<(Vec<ChangeEvent>, broadcast::Receiver<ChangeEvent>)> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;

        let capacity = self.config.channel_capacity;
        let rx = inner
            .watchers
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        let snapshot = inner
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, doc)| ChangeEvent {
                        kind: ChangeKind::Added,
                        id: id.clone(),
                        doc: Some(doc.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok((snapshot, rx))
    }

    // =========================================================================
    // Server Stamp Resolution
    // =========================================================================

    /// Resolves every held server stamp, emitting a Modified delta per
    /// document - the store-side half of the pending→resolved round-trip.
    pub async fn resolve_held_stamps(&self) -> StoreResult<usize> {
        self.ensure_online()?;
        let mut inner = self.inner.write().await;
        let held = std::mem::take(&mut inner.held);
        let count = held.len();
        let now = Utc::now();

        for HeldStamp {
            collection,
            id,
            field,
        } in held
        {
            let Some(doc) = inner
                .collections
                .get_mut(&collection)
                .and_then(|c| c.get_mut(&id))
            else {
                // Document deleted before its stamp resolved; nothing to do.
                warn!(collection = %collection, id = %id, "held stamp target gone");
                continue;
            };
            apply_server_stamp(doc, &field, now);
            let doc = doc.clone();
            inner.emit(
                &collection,
                ChangeEvent {
                    kind: ChangeKind::Modified,
                    id,
                    doc: Some(doc),
                },
            );
        }

        Ok(count)
    }
}

/// Writes the server time into a document's stamp envelope, preserving the
/// pending local instant already there.
fn apply_server_stamp(doc: &mut Value, field: &str, now: DateTime<Utc>) {
    let server = json!({
        "seconds": now.timestamp(),
        "nanoseconds": now.timestamp_subsec_nanos(),
    });
    match doc.get_mut(field) {
        Some(Value::Object(stamp)) => {
            stamp.insert("server".to_string(), server);
        }
        _ => {
            if let Value::Object(fields) = doc {
                fields.insert(field.to_string(), json!({ "server": server }));
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
