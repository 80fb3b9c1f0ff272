//! Per-database mutual exclusion.
//!
//! Backup plus trim, restore and trim all take the lock for their database for the whole
//! operation, so two of them never race on the same set of files. The guard releases the lock
//! when dropped, including on error paths.
//!
//! The locks only exclude callers within one process. A second lifering process working on the
//! same database is not excluded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

/// Maps database names to a lock. Clones share the same locks.
#[derive(Debug, Default, Clone)]
pub struct DatabaseLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl DatabaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `name`.
    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(name.to_string()).or_default().clone()
        };
        trace!("Waiting for the lock on {name}");
        lock.lock_owned().await
    }
}
