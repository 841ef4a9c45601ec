//! Master election and the takeover moratorium.
//!
//! The controller climbs `Follower -> Candidate -> Master` one rung per
//! observation and falls straight back to `Follower` when eligibility or
//! majority is lost. A fresh master holds a moratorium: it publishes nothing
//! until every configured node has reported once, or a grace deadline
//! passes, so a takeover does not mass-demote nodes it simply has not heard
//! from yet.

use std::collections::BTreeSet;

use tracing::{debug, info};

use steward_core::types::NodeId;

use super::types::ControllerRole;

/// Per-cluster election state. Owned by the control loop; the loop feeds it
/// liveness observations and node reports and reads back whether publishing
/// is currently allowed.
#[derive(Debug)]
pub struct MasterElection {
    role: ControllerRole,
    grace_ms: u64,
    /// Set while the takeover moratorium is running.
    grace_deadline_ms: Option<u64>,
    /// Nodes that reported since this mastership began.
    reported: BTreeSet<NodeId>,
    /// Configured nodes still silent since this mastership began.
    outstanding: BTreeSet<NodeId>,
}

impl MasterElection {
    #[must_use]
    pub fn new(grace_ms: u64) -> Self {
        MasterElection {
            role: ControllerRole::Follower,
            grace_ms,
            grace_deadline_ms: None,
            reported: BTreeSet::new(),
            outstanding: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn role(&self) -> ControllerRole {
        self.role
    }

    #[must_use]
    pub const fn is_master(&self) -> bool {
        matches!(self.role, ControllerRole::Master)
    }

    #[must_use]
    pub const fn in_moratorium(&self) -> bool {
        self.grace_deadline_ms.is_some()
    }

    /// Master with the moratorium behind it: cleared to publish.
    #[must_use]
    pub const fn is_master_ready(&self) -> bool {
        self.is_master() && !self.in_moratorium()
    }

    /// Feeds one liveness observation into the state machine and returns the
    /// new role if it changed. At most one rung is climbed per call; falling
    /// back to follower is immediate.
    pub fn observe(
        &mut self,
        eligible: bool,
        has_majority: bool,
        nodes: &[NodeId],
        now_ms: u64,
    ) -> Option<ControllerRole> {
        match self.role {
            ControllerRole::Follower if eligible => {
                self.role = ControllerRole::Candidate;
                info!("standing as candidate");
                Some(self.role)
            }
            ControllerRole::Candidate if !eligible => {
                self.role = ControllerRole::Follower;
                info!("no longer eligible, standing down");
                Some(self.role)
            }
            ControllerRole::Candidate if has_majority => {
                self.become_master(nodes, now_ms);
                Some(self.role)
            }
            ControllerRole::Master if !eligible || !has_majority => {
                self.role = ControllerRole::Follower;
                self.clear_moratorium();
                info!(eligible, has_majority, "lost mastership, standing down");
                Some(self.role)
            }
            _ => None,
        }
    }

    fn become_master(&mut self, nodes: &[NodeId], now_ms: u64) {
        self.role = ControllerRole::Master;
        self.reported.clear();
        self.outstanding = nodes.iter().copied().collect();
        if self.outstanding.is_empty() {
            info!("took mastership of an empty cluster");
            return;
        }
        self.grace_deadline_ms = Some(now_ms + self.grace_ms);
        info!(
            awaiting = self.outstanding.len(),
            grace_ms = self.grace_ms,
            "took mastership, holding publishes until all nodes report"
        );
    }

    fn clear_moratorium(&mut self) {
        self.grace_deadline_ms = None;
        self.reported.clear();
        self.outstanding.clear();
    }

    /// Notes a report from `node`. Returns `true` when this was the last
    /// node the moratorium was waiting on.
    pub fn note_report(&mut self, node: NodeId) -> bool {
        if !self.in_moratorium() {
            return false;
        }
        self.reported.insert(node);
        if !self.outstanding.remove(&node) {
            return false;
        }
        debug!(%node, remaining = self.outstanding.len(), "moratorium node reported");
        if self.outstanding.is_empty() {
            self.grace_deadline_ms = None;
            info!("all nodes reported, moratorium over");
            return true;
        }
        false
    }

    /// Expires the moratorium once its grace deadline passes. Returns `true`
    /// in the call that clears it.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let Some(deadline) = self.grace_deadline_ms else {
            return false;
        };
        if now_ms < deadline {
            return false;
        }
        info!(
            silent = self.outstanding.len(),
            "moratorium grace deadline passed, publishing with silent nodes down"
        );
        self.grace_deadline_ms = None;
        self.outstanding.clear();
        true
    }

    /// Re-scopes a running moratorium to a replaced topology: nodes that
    /// already reported stay credited, nodes no longer configured stop being
    /// waited on, newly configured nodes are waited on. Returns `true` when
    /// this emptied the outstanding set.
    pub fn reset_outstanding(&mut self, nodes: &[NodeId]) -> bool {
        if !self.in_moratorium() {
            return false;
        }
        self.outstanding = nodes
            .iter()
            .copied()
            .filter(|node| !self.reported.contains(node))
            .collect();
        if self.outstanding.is_empty() {
            self.grace_deadline_ms = None;
            info!("topology change left no nodes outstanding, moratorium over");
            return true;
        }
        false
    }
}
