//! Cluster controller seams.
//!
//! The three contracts the control loop depends on: `StatePublisher` (push a
//! new cluster state to the nodes), `PeerLiveness` (election eligibility and
//! majority, fed by the surrounding deployment), and `ClockSource` (wall
//! time, replaceable for deterministic tests).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use steward_core::messages::ClusterStateBundle;
use steward_core::topology::Topology;

// ---------------------------------------------------------------------------
// StatePublisher
// ---------------------------------------------------------------------------

/// Pushes a freshly built cluster state out to the nodes.
///
/// Implementations: HTTP fan-out to node endpoints, null (single-process
/// deployments without push), recording (tests).
#[async_trait]
pub trait StatePublisher: Send + Sync {
    /// Delivers `bundle` to every reachable node in `topology`.
    ///
    /// Errors are advisory: the state is already persisted and published
    /// locally, and nodes that missed the push pull it on their next report.
    async fn publish(&self, bundle: &ClusterStateBundle, topology: &Topology)
        -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// PeerLiveness
// ---------------------------------------------------------------------------

/// What the election needs to know about this controller's standing among
/// its peers.
pub trait PeerLiveness: Send + Sync {
    /// Whether this controller may stand for mastership at all.
    fn is_eligible(&self) -> bool;

    /// Whether a majority of controllers currently agrees on this one.
    fn has_majority(&self) -> bool;
}

/// Fixed answers; the single-controller deployment where this process is
/// always the master.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPeerLiveness;

impl PeerLiveness for StaticPeerLiveness {
    fn is_eligible(&self) -> bool {
        true
    }

    fn has_majority(&self) -> bool {
        true
    }
}

/// Liveness flags owned by an external agreement layer and flipped at
/// runtime. Cheap to clone; all clones share the flags.
#[derive(Debug, Clone, Default)]
pub struct SharedPeerLiveness {
    eligible: Arc<AtomicBool>,
    majority: Arc<AtomicBool>,
}

impl SharedPeerLiveness {
    /// Starts eligible and with majority.
    #[must_use]
    pub fn new() -> Self {
        SharedPeerLiveness {
            eligible: Arc::new(AtomicBool::new(true)),
            majority: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_eligible(&self, eligible: bool) {
        self.eligible.store(eligible, Ordering::Relaxed);
    }

    pub fn set_majority(&self, majority: bool) {
        self.majority.store(majority, Ordering::Relaxed);
    }
}

impl PeerLiveness for SharedPeerLiveness {
    fn is_eligible(&self) -> bool {
        self.eligible.load(Ordering::Relaxed)
    }

    fn has_majority(&self) -> bool {
        self.majority.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// ClockSource
// ---------------------------------------------------------------------------

/// Abstraction over the system clock for dependency injection.
///
/// Staleness demotion and the moratorium deadline are pure functions of
/// time, so tests replace the real clock with a [`ManualClock`].
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as u64
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn at(now_ms: u64) -> Arc<Self> {
        Arc::new(ManualClock { now_ms: AtomicU64::new(now_ms) })
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_nonzero() {
        let clock = SystemClock;
        assert!(clock.now_ms() > 0);
    }

    #[test]
    fn manual_clock_advances_by_hand() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn shared_liveness_flags_flip_across_clones() {
        let liveness = SharedPeerLiveness::new();
        let observer = liveness.clone();
        assert!(observer.is_eligible() && observer.has_majority());

        liveness.set_majority(false);
        assert!(!observer.has_majority());
        assert!(observer.is_eligible());
    }
}
