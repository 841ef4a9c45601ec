//! Wire-level message schemas for the fleet controller protocol.
//!
//! Each submodule covers one traffic domain. Node-facing payloads travel as
//! named `MsgPack` maps (`rmp_serde::to_vec_named()`); the operator REST API
//! speaks JSON. Field names are camelCase on every wire.

pub mod broadcast;
pub mod operator;
pub mod report;

pub use broadcast::{ClusterStateAck, ClusterStateBundle};
pub use operator::{
    NodeStateView, SetWantedStateRequest, SetWantedStateResponse, StateChangeOutcome,
};
pub use report::{NodeStateReport, ReportAck};
