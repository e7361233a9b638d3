//! The global calibration engine: anchor policy, overlap graph, system
//! assembly and the network-adjustment solve.

pub mod anchors;
pub mod glazebrook;
pub mod graph;
pub mod system;
