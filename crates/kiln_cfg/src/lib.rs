//! Control-flow graph model for compiled units.
//!
//! Nodes wrap syntax-tree fragments (or are synthetic no-op placeholders
//! left behind by deletions); edges are directed, with designated graph-in
//! and graph-out edge sets that have no source or target node respectively.

#![warn(missing_docs)]

pub mod build;
pub mod graph;

pub use build::build_cfg;
pub use graph::{Cfg, CfgEdge, CfgEdgeId, CfgNode, CfgNodeId};
