//! Ordered credential pool with single-cursor rotation
//!
//! Holds the API keys for one pipeline run in a fixed order. Exactly one key
//! is active at a time; the pool moves to the next key only when a worker
//! reports a quota failure for the key that is still active. Reports for a
//! key that has already been rotated away are ignored, so a burst of workers
//! failing on the same exhausted key advances the cursor once.
//!
//! Key lifecycle:
//! 1. Pool built from the configured keys → key #1 active
//! 2. Worker reports quota failure on the active key → next key active
//! 3. Last key reported → pool exhausted, `current()` returns `None` forever

pub mod error;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{ActiveKey, CredentialPool};
