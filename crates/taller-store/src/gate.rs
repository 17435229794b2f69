//! # Operation Gate
//!
//! Process-wide advisory lock serializing critical sections (sale
//! submission, bulk abono application, projection rebuilds).
//!
//! ## What It Does And Does Not Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Operation Gate                                     │
//! │                                                                         │
//! │  ✅ GUARDS                             ❌ DOES NOT GUARD                │
//! │  ──────────────────────                ─────────────────────────        │
//! │  concurrent critical sections          two separate clients racing     │
//! │  within this running client            the same data - that is what    │
//! │  (at most one in flight)               the duplicate-invoice check     │
//! │                                        and fail-closed batches catch   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Acquisition is bounded: a fixed attempt count × fixed delay, then
//! `LockTimeout`. The returned guard releases on drop, so release is
//! guaranteed on every exit path including early `?` returns - the
//! scoped-acquisition replacement for an ambient boolean lock flag.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::{debug, warn};

use taller_core::{GATE_DEFAULT_ATTEMPTS, GATE_DEFAULT_RETRY_MS};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Policy
// =============================================================================

/// Bounded acquisition policy: attempts × delay before `LockTimeout`.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        GatePolicy {
            attempts: GATE_DEFAULT_ATTEMPTS,
            retry_delay: Duration::from_millis(GATE_DEFAULT_RETRY_MS),
        }
    }
}

// =============================================================================
// Gate
// =============================================================================

/// The gate itself. Cheap to clone; all clones share one lock, which is
/// what makes it process-wide.
#[derive(Clone)]
pub struct OperationGate {
    lock: Arc<Mutex<()>>,
    policy: GatePolicy,
}

impl Default for OperationGate {
    fn default() -> Self {
        OperationGate::new()
    }
}

impl OperationGate {
    pub fn new() -> Self {
        OperationGate::with_policy(GatePolicy::default())
    }

    pub fn with_policy(policy: GatePolicy) -> Self {
        OperationGate {
            lock: Arc::new(Mutex::new(())),
            policy,
        }
    }

    /// Acquires the gate, retrying up to the policy's attempt count.
    ///
    /// ## Errors
    /// `LockTimeout` once the attempts are exhausted - surfaced to the
    /// caller for a user-facing retry decision, never retried silently.
    pub async fn acquire(&self, label: &str) -> StoreResult<GateGuard> {
        for attempt in 1..=self.policy.attempts {
            match self.lock.clone().try_lock_owned() {
                Ok(permit) => {
                    debug!(label, attempt, "gate acquired");
                    return Ok(GateGuard {
                        _permit: permit,
                        label: label.to_string(),
                    });
                }
                Err(_) if attempt < self.policy.attempts => {
                    sleep(self.policy.retry_delay).await;
                }
                Err(_) => {}
            }
        }

        warn!(label, attempts = self.policy.attempts, "gate acquisition timed out");
        Err(StoreError::LockTimeout {
            label: label.to_string(),
            attempts: self.policy.attempts,
        })
    }

    /// Runs `f` with the gate held; the guard drops on every exit path.
    pub async fn with_lock<T, F, Fut>(&self, label: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let _guard = self.acquire(label).await?;
        f().await
    }
}

/// RAII guard for a held gate; dropping it releases the gate.
pub struct GateGuard {
    _permit: OwnedMutexGuard<()>,
    label: String,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        debug!(label = %self.label, "gate released");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
