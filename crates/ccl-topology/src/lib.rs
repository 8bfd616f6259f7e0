//! Directed network topology (NPUs + per-link latency/bandwidth) and the
//! built-in topology factory.

mod builtin;
mod error;
mod graph;

pub use builtin::get_topology;
pub use error::TopologyError;
pub use graph::{EdgeAttrs, LinkId, NodeId, Topology, UNIT_CHUNK_SIZE};
