//! redb-backed version store.
//!
//! One tiny table mapping cluster name to its last recorded version. Every
//! `record` is its own committed write transaction; the write path runs on
//! the control loop roughly once per cluster state change, so transaction
//! overhead is irrelevant next to the durability it buys.

use std::path::Path;

use redb::{Database, TableDefinition};

use super::VersionStore;

const VERSIONS: TableDefinition<&str, u64> = TableDefinition::new("cluster_state_versions");

/// File-backed store surviving process restarts.
#[derive(Debug)]
pub struct RedbVersionStore {
    db: Database,
}

impl RedbVersionStore {
    /// Opens the database at `path`, creating it on first use.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        Ok(RedbVersionStore { db })
    }
}

impl VersionStore for RedbVersionStore {
    fn load(&self, cluster: &str) -> anyhow::Result<Option<u64>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(VERSIONS) {
            Ok(table) => table,
            // First start: nothing was ever recorded.
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        Ok(table.get(cluster)?.map(|guard| guard.value()))
    }

    fn record(&self, cluster: &str, version: u64) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VERSIONS)?;
            table.insert(cluster, version)?;
        }
        txn.commit()?;
        Ok(())
    }
}
