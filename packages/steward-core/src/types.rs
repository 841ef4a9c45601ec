//! Node identity and node state types shared by the controller, the content
//! nodes, and the operator API.
//!
//! The availability ladder defined here is the single ordering every other
//! component leans on: the effective-state rule, the safety checker, and the
//! state builder all compare states through [`Availability::rank`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Role of a node within a content cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Holds bucket replicas and serves reads/writes for them.
    Storage,
    /// Routes operations to storage nodes and tracks bucket ownership.
    Distributor,
}

impl NodeType {
    /// Lowercase wire form, also used in URL paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::Storage => "storage",
            NodeType::Distributor => "distributor",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storage" => Ok(NodeType::Storage),
            "distributor" => Ok(NodeType::Distributor),
            other => Err(ParseNodeIdError::UnknownType(other.to_string())),
        }
    }
}

/// Identity of a single node: its role plus a dense index assigned in
/// topology configuration.
///
/// Renders as `storage.0` / `distributor.3`. That string form is also the
/// JSON/`MsgPack` representation so node ids can key wire-level maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub node_type: NodeType,
    pub index: u16,
}

impl NodeId {
    #[must_use]
    pub const fn storage(index: u16) -> Self {
        NodeId { node_type: NodeType::Storage, index }
    }

    #[must_use]
    pub const fn distributor(index: u16) -> Self {
        NodeId { node_type: NodeType::Distributor, index }
    }

    #[must_use]
    pub const fn is_storage(self) -> bool {
        matches!(self.node_type, NodeType::Storage)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_type, self.index)
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once('.')
            .ok_or_else(|| ParseNodeIdError::MissingSeparator(s.to_string()))?;
        let node_type = kind.parse()?;
        let index = index
            .parse()
            .map_err(|_| ParseNodeIdError::InvalidIndex(index.to_string()))?;
        Ok(NodeId { node_type, index })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Error parsing a node id from its `storage.0` string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseNodeIdError {
    #[error("unknown node type {0:?}, expected \"storage\" or \"distributor\"")]
    UnknownType(String),
    #[error("invalid node index {0:?}")]
    InvalidIndex(String),
    #[error("node id must look like \"storage.0\", got {0:?}")]
    MissingSeparator(String),
}

// ---------------------------------------------------------------------------
// Availability ladder
// ---------------------------------------------------------------------------

/// Availability of a node, from fully serving to unreachable.
///
/// The variants form a total order (see [`Availability::rank`]); every state
/// comparison in the system is "more available than", never identity checks
/// against specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Serving reads and writes.
    Up,
    /// Still serving its data while replicas migrate off permanently.
    Retired,
    /// Starting up, loading indexes; partially available.
    Initializing,
    /// Graceful shutdown in progress.
    Stopping,
    /// Temporarily out of service; data is expected to come back.
    Maintenance,
    /// Unreachable or stopped.
    Down,
}

impl Availability {
    /// Position on the availability ladder; higher is more available.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Availability::Up => 5,
            Availability::Retired => 4,
            Availability::Initializing => 3,
            Availability::Stopping => 2,
            Availability::Maintenance => 1,
            Availability::Down => 0,
        }
    }

    #[must_use]
    pub fn more_available_than(self, other: Availability) -> bool {
        self.rank() > other.rank()
    }

    /// Whether a node in this state counts against group redundancy.
    ///
    /// Retired nodes still hold and serve their data, so they do not count
    /// as unavailable even though they are not `Up`.
    #[must_use]
    pub const fn is_unavailable(self) -> bool {
        matches!(
            self,
            Availability::Down
                | Availability::Maintenance
                | Availability::Stopping
                | Availability::Initializing
        )
    }

    /// Whether an operator may request this state as a wanted state.
    ///
    /// `Stopping` and `Initializing` are report-only transitions owned by the
    /// node itself.
    #[must_use]
    pub const fn is_settable(self) -> bool {
        matches!(
            self,
            Availability::Up
                | Availability::Down
                | Availability::Maintenance
                | Availability::Retired
        )
    }

    /// Lowercase wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Availability::Up => "up",
            Availability::Retired => "retired",
            Availability::Initializing => "initializing",
            Availability::Stopping => "stopping",
            Availability::Maintenance => "maintenance",
            Availability::Down => "down",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = ParseAvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Availability::Up),
            "retired" => Ok(Availability::Retired),
            "initializing" => Ok(Availability::Initializing),
            "stopping" => Ok(Availability::Stopping),
            "maintenance" => Ok(Availability::Maintenance),
            "down" => Ok(Availability::Down),
            other => Err(ParseAvailabilityError(other.to_string())),
        }
    }
}

/// Error parsing an [`Availability`] from its lowercase wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown availability {0:?}")]
pub struct ParseAvailabilityError(pub String);

// ---------------------------------------------------------------------------
// Node state
// ---------------------------------------------------------------------------

/// State of a node as reported by the node or requested by an operator.
///
/// The same shape serves both roles: reported states may carry
/// `init_progress`, wanted states usually carry a `description` naming the
/// operator's reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub availability: Availability,

    /// Free-form reason, e.g. "disk replacement" on a wanted Maintenance.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    /// Fraction of startup completed, only meaningful while `Initializing`.
    /// Clamped to `[0, 1]` on construction.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub init_progress: Option<f32>,
}

impl NodeState {
    #[must_use]
    pub const fn new(availability: Availability) -> Self {
        NodeState { availability, description: None, init_progress: None }
    }

    #[must_use]
    pub const fn up() -> Self {
        NodeState::new(Availability::Up)
    }

    #[must_use]
    pub fn down(description: impl Into<String>) -> Self {
        NodeState::new(Availability::Down).with_description(description)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_init_progress(mut self, progress: f32) -> Self {
        self.init_progress = Some(progress.clamp(0.0, 1.0));
        self
    }

    /// The effective-state rule: a wanted state only ever lowers
    /// availability, never raises it above what the node itself reports.
    #[must_use]
    pub fn effective<'a>(reported: &'a NodeState, wanted: &'a NodeState) -> &'a NodeState {
        if wanted.availability.rank() <= reported.availability.rank() {
            wanted
        } else {
            reported
        }
    }
}

impl Default for NodeState {
    /// Nodes are assumed wanted `Up` until an operator says otherwise.
    fn default() -> Self {
        NodeState::up()
    }
}

// ---------------------------------------------------------------------------
// State change conditions
// ---------------------------------------------------------------------------

/// How strictly a wanted-state change must respect cluster redundancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateChangeCondition {
    /// Deny the change if it would leave any group, or the distributor set,
    /// below its configured redundancy.
    #[default]
    Safe,
    /// Apply unconditionally.
    Force,
}
