//! Credential pool state and rotation
//!
//! The pool is an immutable, ordered list of keys plus a cursor. The cursor
//! starts at 0 and only ever moves forward; `cursor == keys.len()` means every
//! key has been exhausted. Reads and advancement are serialized through one
//! mutex so the compare-and-advance in `report_failure` is atomic.

use common::Secret;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// The currently active key, handed to a worker for one attempt.
///
/// `index` must be passed back to `report_failure` so the pool can tell a
/// fresh exhaustion report from a stale one.
#[derive(Debug, Clone)]
pub struct ActiveKey {
    pub index: usize,
    pub credential: Secret<String>,
}

/// Ordered credential pool shared by all workers of a run.
pub struct CredentialPool {
    keys: Vec<Secret<String>>,
    cursor: Mutex<usize>,
}

impl CredentialPool {
    /// Build a pool from the given keys, preserving their order.
    ///
    /// Blank keys are discarded. Returns `NoCredentials` if nothing remains.
    pub fn new(keys: Vec<Secret<String>>) -> Result<Self> {
        let keys: Vec<Secret<String>> = keys
            .into_iter()
            .filter(|k| !k.is_blank())
            .collect();
        if keys.is_empty() {
            return Err(Error::NoCredentials);
        }
        info!(keys = keys.len(), "credential pool initialized");
        metrics::gauge!("credential_pool_active_index").set(0.0);
        Ok(Self {
            keys,
            cursor: Mutex::new(0),
        })
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: construction rejects an empty key list.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The active key and its index, or `None` once every key is exhausted.
    pub async fn current(&self) -> Option<ActiveKey> {
        let cursor = self.cursor.lock().await;
        self.keys.get(*cursor).map(|credential| ActiveKey {
            index: *cursor,
            credential: credential.clone(),
        })
    }

    /// Report a quota failure observed while using key `index`.
    ///
    /// Advances the cursor only if `index` is still the active key. A report
    /// for an older index lost the race to another worker and is ignored.
    /// Returns whether this call advanced the cursor.
    pub async fn report_failure(&self, index: usize) -> bool {
        let mut cursor = self.cursor.lock().await;
        if *cursor != index || *cursor >= self.keys.len() {
            return false;
        }

        let exhausted = self.keys[*cursor].suffix();
        *cursor += 1;
        metrics::counter!("credential_pool_rotations_total").increment(1);
        metrics::gauge!("credential_pool_active_index").set(*cursor as f64);

        match self.keys.get(*cursor) {
            Some(next) => info!(
                exhausted_key = %exhausted,
                active_key_number = *cursor + 1,
                active_key = %next.suffix(),
                "key exhausted, switching to next key"
            ),
            None => warn!(
                exhausted_key = %exhausted,
                keys = self.keys.len(),
                "key exhausted, all keys have now been tried"
            ),
        }
        true
    }

    /// Whether every key has been reported exhausted.
    pub async fn is_exhausted(&self) -> bool {
        *self.cursor.lock().await >= self.keys.len()
    }

    /// Current cursor position, in `0..=len()`.
    pub async fn cursor(&self) -> usize {
        *self.cursor.lock().await
    }

    /// Pool health summary for run reports.
    ///
    /// Status mapping: first key active → healthy, a later key active →
    /// degraded, no key left → exhausted.
    pub async fn health(&self) -> serde_json::Value {
        let cursor = *self.cursor.lock().await;
        let total = self.keys.len();
        let status = if cursor == 0 {
            "healthy"
        } else if cursor < total {
            "degraded"
        } else {
            "exhausted"
        };

        let keys: Vec<serde_json::Value> = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                serde_json::json!({
                    "number": i + 1,
                    "key": key.suffix(),
                    "status": if i < cursor { "exhausted" } else if i == cursor { "active" } else { "standby" },
                })
            })
            .collect();

        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_exhausted": cursor,
            "keys": keys,
        })
    }
}
