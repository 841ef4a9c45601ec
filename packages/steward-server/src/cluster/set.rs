//! Handle registry for the clusters one daemon controls.

use dashmap::DashMap;

use super::state::ControllerHandle;

// ---------------------------------------------------------------------------
// ControllerSet
// ---------------------------------------------------------------------------

/// All controller handles in this process, keyed by cluster name.
///
/// Built once at startup and shared with the HTTP layer. `DashMap` keeps
/// lookups lock-free on the request path; handles are cheap clones.
#[derive(Debug, Default)]
pub struct ControllerSet {
    handles: DashMap<String, ControllerHandle>,
}

impl ControllerSet {
    #[must_use]
    pub fn new() -> Self {
        ControllerSet { handles: DashMap::new() }
    }

    /// Registers a cluster's handle, replacing any previous one.
    pub fn insert(&self, handle: ControllerHandle) {
        self.handles.insert(handle.cluster().to_string(), handle);
    }

    #[must_use]
    pub fn get(&self, cluster: &str) -> Option<ControllerHandle> {
        self.handles.get(cluster).map(|entry| entry.value().clone())
    }

    /// Cluster names in no particular order. Collected because `DashMap`
    /// iteration yields guards that borrow the map.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use steward_core::state::ClusterState;
    use tokio::sync::mpsc;

    use crate::cluster::state::PublishedState;

    use super::*;

    fn handle(cluster: &str) -> ControllerHandle {
        let (events, _rx) = mpsc::channel(1);
        ControllerHandle::new(
            cluster.to_string(),
            events,
            Arc::new(PublishedState::new(ClusterState::resumed(0))),
        )
    }

    #[test]
    fn insert_and_get_by_cluster_name() {
        let set = ControllerSet::new();
        assert!(set.is_empty());

        set.insert(handle("media"));
        set.insert(handle("search"));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("media").map(|h| h.cluster().to_string()), Some("media".to_string()));
        assert!(set.get("missing").is_none());

        let mut names = set.names();
        names.sort();
        assert_eq!(names, vec!["media".to_string(), "search".to_string()]);
    }
}
