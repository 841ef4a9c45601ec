//! Cluster state version persistence.
//!
//! Versions must never repeat across controller restarts, so every freshly
//! minted version is recorded here before the state is published anywhere.
//! The store keeps a single `u64` per cluster; gaps are fine, repeats are
//! not.

use std::collections::HashMap;

use parking_lot::Mutex;

#[cfg(feature = "redb")]
mod redb;
#[cfg(feature = "redb")]
pub use redb::RedbVersionStore;

/// Durable record of the highest version handed out per cluster.
///
/// `record` is called on the control loop between building a state and
/// publishing it; when it fails the state is dropped and the version number
/// gets reused for the next attempt.
pub trait VersionStore: Send + Sync {
    /// Last recorded version for `cluster`, `None` for a brand new cluster.
    fn load(&self, cluster: &str) -> anyhow::Result<Option<u64>>;

    /// Records `version`, durably where the backend allows, before returning.
    fn record(&self, cluster: &str, version: u64) -> anyhow::Result<()>;
}

/// Process-local store. Versions restart from zero with the process, which
/// is fine for tests and throwaway clusters, not for production.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    versions: Mutex<HashMap<String, u64>>,
}

impl MemoryVersionStore {
    #[must_use]
    pub fn new() -> Self {
        MemoryVersionStore::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self, cluster: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.versions.lock().get(cluster).copied())
    }

    fn record(&self, cluster: &str, version: u64) -> anyhow::Result<()> {
        self.versions.lock().insert(cluster.to_string(), version);
        Ok(())
    }
}
