//! Distribution bits: how deep buckets are split across storage nodes.
//!
//! Every published cluster state carries the bit depth nodes must place data
//! with, so the controller and the nodes have to compute it from the same
//! contract. The depth targets an average of [`BUCKETS_PER_NODE`] buckets per
//! configured storage node and only moves within the configured
//! floor/ceiling window. It deliberately ignores which nodes are currently
//! `Up`: report flaps must not churn data placement.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Fewer than 2 buckets cannot be distributed.
pub const MIN_DISTRIBUTION_BITS: u8 = 1;

/// Bucket ids reserve the upper bits of a `u64`.
pub const MAX_DISTRIBUTION_BITS: u8 = 58;

/// Average bucket count per storage node the ideal depth aims for.
pub const BUCKETS_PER_NODE: usize = 16;

/// Configured bounds for the distribution bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributionParams {
    pub floor: u8,
    pub ceiling: u8,

    /// Pin the depth to one value, overriding the node-count heuristic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed: Option<u8>,
}

impl Default for DistributionParams {
    fn default() -> Self {
        DistributionParams { floor: 8, ceiling: 24, fixed: None }
    }
}

impl DistributionParams {
    pub fn validate(&self) -> Result<(), DistributionError> {
        for bits in [self.floor, self.ceiling].into_iter().chain(self.fixed) {
            if !(MIN_DISTRIBUTION_BITS..=MAX_DISTRIBUTION_BITS).contains(&bits) {
                return Err(DistributionError::OutOfRange(bits));
            }
        }
        if self.floor > self.ceiling {
            return Err(DistributionError::FloorAboveCeiling {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}

/// Bit depth for a cluster with `storage_nodes` configured storage nodes.
///
/// Smallest depth giving at least [`BUCKETS_PER_NODE`] buckets per node,
/// clamped into `[floor, ceiling]`; a configured `fixed` value wins outright.
/// Monotone in `storage_nodes`.
#[must_use]
pub fn ideal_distribution_bits(params: &DistributionParams, storage_nodes: usize) -> u8 {
    if let Some(fixed) = params.fixed {
        return fixed;
    }
    let need = BUCKETS_PER_NODE * storage_nodes.max(1);
    let ideal = u8::try_from(need.next_power_of_two().ilog2()).unwrap_or(MAX_DISTRIBUTION_BITS);
    let clamped = ideal.clamp(params.floor, params.ceiling);
    if clamped != ideal {
        debug!(ideal, clamped, storage_nodes, "distribution bits clamped to configured window");
    }
    clamped
}

/// Why distribution parameters were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DistributionError {
    #[error(
        "distribution bits must be between {MIN_DISTRIBUTION_BITS} and {MAX_DISTRIBUTION_BITS}, got {0}"
    )]
    OutOfRange(u8),
    #[error("distribution floor {floor} exceeds ceiling {ceiling}")]
    FloorAboveCeiling { floor: u8, ceiling: u8 },
}
