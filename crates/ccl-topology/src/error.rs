use crate::graph::NodeId;

/// Failures raised while building or loading a [`crate::graph::Topology`].
///
/// These are input-validation errors (spec §7 kind 1): malformed CSV, an
/// unknown topology specifier, or edge attributes that violate the α ≥ 0,
/// β > 0 invariant. All are fatal to the caller; there is no repair path.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("topology CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("topology CSV header row must be a single `num_nodes` column, got {0:?}")]
    BadHeader(Vec<String>),

    #[error("topology CSV row has {0} columns, expected 4 (Src,Dest,Latency,Bandwidth)")]
    BadRow(usize),

    #[error("duplicate directed edge ({src}, {dst})")]
    DuplicateEdge { src: NodeId, dst: NodeId },

    #[error("edge ({src}, {dst}) has negative latency alpha={alpha}")]
    NegativeAlpha { src: NodeId, dst: NodeId, alpha: f64 },

    #[error("edge ({src}, {dst}) has non-positive bandwidth beta={beta}")]
    NonPositiveBeta { src: NodeId, dst: NodeId, beta: f64 },

    #[error("unknown topology specifier: {0:?}")]
    UnknownSpecifier(String),

    #[error("topology specifier {specifier:?} argument {arg:?} could not be parsed: {reason}")]
    BadSpecifierArg { specifier: String, arg: String, reason: String },

    #[error("node id {0} is out of range for a topology of {1} nodes")]
    NodeOutOfRange(NodeId, usize),
}
