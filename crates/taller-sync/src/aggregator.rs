//! # Historial Aggregator Module
//!
//! Merges four source collections into one ordered historial timeline and
//! keeps it live as documents are added, modified and removed.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Historial Aggregator                              │
//! │                                                                         │
//! │   ventas ────┐                                                          │
//! │              │  listener per source:                                    │
//! │   abonos ────┤  snapshot + deltas,                                      │
//! │              │  backoff on failure   ┌──────────────────┐               │
//! │   retiros ───┼──────────────────────▶│    Merge Loop    │               │
//! │              │                       │                  │               │
//! │   ingresos ──┘                       │  keyed upsert    │               │
//! │                                      │  (kind, id)      │               │
//! │                                      └────────┬─────────┘               │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                            watch::Receiver<Vec<Movement>>               │
//! │                            (newest first, full timeline)                │
//! │                                                                         │
//! │  Normalization rules:                                                   │
//! │  ────────────────────                                                   │
//! │  • venta   → +total_cents                                               │
//! │  • abono   → +amount_cents                                              │
//! │  • retiro  → −amount_cents (stored positive, signed here)               │
//! │  • ingreso → +amount_cents; categoria "abono" reclassifies the          │
//! │              movement as an abono                                       │
//! │                                                                         │
//! │  A modified document REPLACES its timeline entry (keyed upsert), so     │
//! │  a notification storm for one document never duplicates it.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use taller_core::{resolve_instant, CajaMovement, Invoice, Movement, MovementKind, Stamp, Stamped};
use taller_store::{ChangeEvent, ChangeKind, MemoryStore, ABONOS, INGRESOS, RETIROS, VENTAS};

use crate::error::SyncResult;

// =============================================================================
// Constants
// =============================================================================

/// The four source collections and the kind each one feeds.
const SOURCES: &[(MovementKind, &str)] = &[
    (MovementKind::Venta, VENTAS),
    (MovementKind::Abono, ABONOS),
    (MovementKind::Retiro, RETIROS),
    (MovementKind::Ingreso, INGRESOS),
];

/// Categoria value that reclassifies an ingreso as an abono.
const CATEGORIA_ABONO: &str = "abono";

// =============================================================================
// Configuration
// =============================================================================

/// Aggregator configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Capacity of the internal event channel.
    pub channel_capacity: usize,
    /// First re-subscribe delay after a listener failure; grows
    /// exponentially from here.
    pub initial_backoff: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            channel_capacity: 256,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl AggregatorConfig {
    /// Builder-style: first re-subscribe delay.
    pub fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }
}

// =============================================================================
// Source States
// =============================================================================

/// Lifecycle state of one source listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    /// Not yet subscribed.
    #[default]
    Disconnected,
    /// Subscribed and consuming deltas.
    Listening,
    /// Subscription lost; backing off before re-subscribing. The listener
    /// re-reads the full collection on recovery, so a lagged or dropped
    /// stream heals itself.
    Recovering,
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceState::Disconnected => write!(f, "disconnected"),
            SourceState::Listening => write!(f, "listening"),
            SourceState::Recovering => write!(f, "recovering"),
        }
    }
}

/// Per-source connectivity, published on its own watch channel so a status
/// indicator can render independently of the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceStates {
    pub ventas: SourceState,
    pub abonos: SourceState,
    pub retiros: SourceState,
    pub ingresos: SourceState,
}

impl SourceStates {
    fn set(&mut self, collection: &str, state: SourceState) {
        match collection {
            VENTAS => self.ventas = state,
            ABONOS => self.abonos = state,
            RETIROS => self.retiros = state,
            INGRESOS => self.ingresos = state,
            _ => {}
        }
    }

    /// True when every source is subscribed and consuming.
    pub fn all_listening(&self) -> bool {
        [self.ventas, self.abonos, self.retiros, self.ingresos]
            .iter()
            .all(|s| *s == SourceState::Listening)
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Abono mirror document shape (written by the sale repository).
#[derive(Debug, Deserialize)]
struct AbonoDoc {
    id: String,
    invoice_number: String,
    amount_cents: i64,
    #[serde(default)]
    stamp: Stamp,
    created_at: DateTime<Utc>,
}

impl Stamped for AbonoDoc {
    fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}

/// Normalizes one source document into a timeline movement.
///
/// The returned movement's kind can differ from the source kind: an
/// ingreso whose categoria is `"abono"` comes back as an abono.
pub fn normalize(kind: MovementKind, doc: &Value) -> SyncResult<Movement> {
    match kind {
        MovementKind::Venta => {
            let invoice: Invoice = serde_json::from_value(doc.clone())?;
            let mut description =
                format!("Venta {} - {}", invoice.invoice_number, invoice.client_name);
            if invoice.cancelled {
                description.push_str(" (anulada)");
            }
            Ok(Movement {
                kind,
                id: invoice.id.clone(),
                description,
                amount_cents: invoice.total_cents,
                resolved_at: resolve_instant(&invoice),
            })
        }
        MovementKind::Abono => {
            let abono: AbonoDoc = serde_json::from_value(doc.clone())?;
            Ok(Movement {
                kind,
                id: abono.id.clone(),
                description: format!("Abono a {}", abono.invoice_number),
                amount_cents: abono.amount_cents,
                resolved_at: resolve_instant(&abono),
            })
        }
        MovementKind::Retiro => {
            let movement: CajaMovement = serde_json::from_value(doc.clone())?;
            Ok(Movement {
                kind,
                id: movement.id.clone(),
                description: movement.concept.clone(),
                amount_cents: -movement.amount_cents,
                resolved_at: resolve_instant(&movement),
            })
        }
        MovementKind::Ingreso => {
            let movement: CajaMovement = serde_json::from_value(doc.clone())?;
            let kind = match movement.categoria.as_deref() {
                Some(CATEGORIA_ABONO) => MovementKind::Abono,
                _ => MovementKind::Ingreso,
            };
            Ok(Movement {
                kind,
                id: movement.id.clone(),
                description: movement.concept.clone(),
                amount_cents: movement.amount_cents,
                resolved_at: resolve_instant(&movement),
            })
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Internal events flowing from listeners into the merge loop.
#[derive(Debug)]
enum AggregatorEvent {
    /// One delta from a live subscription.
    Change {
        kind: MovementKind,
        collection: &'static str,
        event: ChangeEvent,
    },
    /// Full snapshot of a source; replaces everything previously merged
    /// from that source.
    Resync {
        kind: MovementKind,
        collection: &'static str,
        events: Vec<ChangeEvent>,
    },
    /// A listener changed state.
    Status {
        collection: &'static str,
        state: SourceState,
    },
}

/// The historial aggregator. Consumes change streams only; never writes.
pub struct HistoryAggregator {
    store: MemoryStore,
    config: AggregatorConfig,
}

/// Handle for consuming the aggregated timeline.
#[derive(Clone)]
pub struct HistorialHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    timeline_rx: watch::Receiver<Vec<Movement>>,
    status_rx: watch::Receiver<SourceStates>,
}

impl HistorialHandle {
    /// Current timeline, newest first.
    pub fn timeline(&self) -> Vec<Movement> {
        self.timeline_rx.borrow().clone()
    }

    /// Subscribes to timeline updates.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Movement>> {
        self.timeline_rx.clone()
    }

    /// Current per-source connectivity.
    pub fn status(&self) -> SourceStates {
        *self.status_rx.borrow()
    }

    /// Subscribes to connectivity updates.
    pub fn subscribe_status(&self) -> watch::Receiver<SourceStates> {
        self.status_rx.clone()
    }

    /// Stops every listener and the merge loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl HistoryAggregator {
    pub fn new(store: MemoryStore, config: AggregatorConfig) -> Self {
        HistoryAggregator { store, config }
    }

    /// Spawns the listeners and the merge loop; returns the consumer handle.
    pub fn start(self) -> HistorialHandle {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (timeline_tx, timeline_rx) = watch::channel(Vec::new());
        let (status_tx, status_rx) = watch::channel(SourceStates::default());

        for &(kind, collection) in SOURCES {
            tokio::spawn(listen(
                self.store.clone(),
                kind,
                collection,
                self.config.initial_backoff,
                event_tx.clone(),
                shutdown_rx.clone(),
            ));
        }

        tokio::spawn(merge_loop(
            event_rx,
            timeline_tx,
            status_tx,
            shutdown_rx,
        ));

        info!("historial aggregator started");
        HistorialHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            timeline_rx,
            status_rx,
        }
    }
}

// =============================================================================
// Listener Task
// =============================================================================

/// One source listener: subscribe, forward the snapshot as a resync, then
/// forward deltas until the stream breaks, backing off between attempts.
async fn listen(
    store: MemoryStore,
    kind: MovementKind,
    collection: &'static str,
    initial_backoff: Duration,
    tx: mpsc::Sender<AggregatorEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = ExponentialBackoff {
        initial_interval: initial_backoff,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    loop {
        match store.watch(collection).await {
            Ok((snapshot, mut delta_rx)) => {
                backoff.reset();
                debug!(collection, snapshot = snapshot.len(), "source subscribed");
                let subscribed = tx
                    .send(AggregatorEvent::Status {
                        collection,
                        state: SourceState::Listening,
                    })
                    .await
                    .is_ok()
                    && tx
                        .send(AggregatorEvent::Resync {
                            kind,
                            collection,
                            events: snapshot,
                        })
                        .await
                        .is_ok();
                if !subscribed {
                    return;
                }

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => return,
                        result = delta_rx.recv() => match result {
                            Ok(event) => {
                                if tx
                                    .send(AggregatorEvent::Change { kind, collection, event })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                // Missed deltas are unrecoverable in-stream;
                                // re-subscribe and resync from scratch.
                                warn!(collection, skipped, "source stream lagged");
                                break;
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                warn!(collection, "source stream closed");
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                warn!(collection, %err, "source subscription failed");
            }
        }

        if tx
            .send(AggregatorEvent::Status {
                collection,
                state: SourceState::Recovering,
            })
            .await
            .is_err()
        {
            return;
        }
        let delay = backoff.next_backoff().unwrap_or(initial_backoff);
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

// =============================================================================
// Merge Loop
// =============================================================================

/// Owns the timeline state: a keyed map of movements plus an index from
/// source document identity to timeline key (needed because normalization
/// can reclassify an ingreso, and removals carry no document).
struct MergeState {
    entries: HashMap<(MovementKind, String), Movement>,
    index: HashMap<(&'static str, String), (MovementKind, String)>,
    status: SourceStates,
}

impl MergeState {
    fn new() -> Self {
        MergeState {
            entries: HashMap::new(),
            index: HashMap::new(),
            status: SourceStates::default(),
        }
    }

    fn upsert(&mut self, kind: MovementKind, collection: &'static str, id: String, doc: &Value) {
        match normalize(kind, doc) {
            Ok(movement) => {
                let key = movement.key();
                // A reclassification change would strand the old entry
                if let Some(old_key) = self.index.insert((collection, id), key.clone()) {
                    if old_key != key {
                        self.entries.remove(&old_key);
                    }
                }
                self.entries.insert(key, movement);
            }
            Err(err) => {
                // Skip, never poison the timeline with a malformed doc
                warn!(collection, %id, %err, "skipping unnormalizable document");
            }
        }
    }

    fn remove(&mut self, collection: &'static str, id: &str) {
        if let Some(key) = self.index.remove(&(collection, id.to_string())) {
            self.entries.remove(&key);
        }
    }

    fn resync(&mut self, kind: MovementKind, collection: &'static str, events: Vec<ChangeEvent>) {
        let stale: Vec<_> = self
            .index
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (index_key, entry_key) in stale {
            self.index.remove(&index_key);
            self.entries.remove(&entry_key);
        }
        for event in events {
            self.apply(kind, collection, event);
        }
    }

    fn apply(&mut self, kind: MovementKind, collection: &'static str, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Added | ChangeKind::Modified => match event.doc {
                Some(doc) => self.upsert(kind, collection, event.id, &doc),
                None => warn!(collection, id = %event.id, "change event without document"),
            },
            ChangeKind::Removed => self.remove(collection, &event.id),
        }
    }

    /// Full timeline, newest first (ties broken by id for determinism).
    fn timeline(&self) -> Vec<Movement> {
        let mut movements: Vec<Movement> = self.entries.values().cloned().collect();
        movements.sort_by(|a, b| {
            b.resolved_at
                .cmp(&a.resolved_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        movements
    }
}

async fn merge_loop(
    mut rx: mpsc::Receiver<AggregatorEvent>,
    timeline_tx: watch::Sender<Vec<Movement>>,
    status_tx: watch::Sender<SourceStates>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut state = MergeState::new();

    loop {
        let first = tokio::select! {
            _ = shutdown_rx.changed() => break,
            maybe = rx.recv() => match maybe {
                Some(event) => event,
                None => break,
            },
        };

        // Drain whatever has queued up and publish once per burst
        let mut batch = vec![first];
        while let Ok(event) = rx.try_recv() {
            batch.push(event);
        }

        let mut timeline_dirty = false;
        let mut status_dirty = false;
        for event in batch {
            match event {
                AggregatorEvent::Change {
                    kind,
                    collection,
                    event,
                } => {
                    state.apply(kind, collection, event);
                    timeline_dirty = true;
                }
                AggregatorEvent::Resync {
                    kind,
                    collection,
                    events,
                } => {
                    state.resync(kind, collection, events);
                    timeline_dirty = true;
                }
                AggregatorEvent::Status { collection, state: source_state } => {
                    state.status.set(collection, source_state);
                    status_dirty = true;
                }
            }
        }

        if timeline_dirty {
            let _ = timeline_tx.send(state.timeline());
        }
        if status_dirty {
            let _ = status_tx.send(state.status);
        }
    }

    info!("historial merge loop stopped");
}

// =============================================================================
// Unit Tests
// =============================================================================
