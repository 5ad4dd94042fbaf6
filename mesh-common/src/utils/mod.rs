//! utils.rs
//!
//! Common types shared across the mesh crates.
//!
//! This module provides the logical node identifier and its conversions,
//! plus small serde helpers.

pub mod duration_ms;
pub mod node_id;
pub use node_id::NodeId;
