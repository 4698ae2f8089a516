//! Per-hostname run serialization
//!
//! Workspaces are keyed by hostname, so two concurrent runs for the same host would reset and
//! archive each other's output. A run holds its host's guard from workspace reset until remote
//! sync has finished reading the workspace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive claim on one hostname's workspace
///
/// Dropping the guard releases the host.
#[derive(Debug)]
pub struct HostRunGuard {
    hostname: String,
    _guard: OwnedMutexGuard<()>,
}

impl HostRunGuard {
    /// The hostname this guard holds
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

/// Registry of per-hostname async locks
#[derive(Debug, Clone, Default)]
pub struct HostLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl HostLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other run holds `hostname`, then claims it
    pub async fn acquire(&self, hostname: &str) -> HostRunGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            // Entries only referenced by the map belong to finished runs.
            locks.retain(|host, lock| host == hostname || Arc::strong_count(lock) > 1);

            locks
                .entry(hostname.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        HostRunGuard {
            hostname: hostname.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of hostnames currently tracked
    pub fn tracked_hosts(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
