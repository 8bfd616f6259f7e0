use ccl_collective::ChunkId;
use ccl_topology::NodeId;

/// Failures raised while writing the canonical schedule CSV (spec §4.7).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("schedule CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Every §8 invariant the verifier checks, each carrying enough context to
/// explain the failure without re-deriving it. Always fatal for the trial
/// that produced the CSV (spec §7 kind 4): the verifier never repairs.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("schedule CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed header row {0:?}")]
    BadHeader(Vec<String>),

    #[error("NPUs Count mismatch: topology has {expected}, csv declares {actual}")]
    NpuCountMismatch { expected: usize, actual: usize },

    #[error("Links Count mismatch: topology has {expected}, csv declares {actual}")]
    LinkCountMismatch { expected: usize, actual: usize },

    #[error("Chunks Count mismatch: collective has {expected}, csv declares {actual}")]
    ChunkCountMismatch { expected: usize, actual: usize },

    #[error("Chunk Size mismatch: collective has {expected}, csv declares {actual}")]
    ChunkSizeMismatch { expected: f64, actual: f64 },

    #[error("edge row {row} is ({actual_src},{actual_dst}), expected topology edge order to put ({expected_src},{expected_dst}) there")]
    EdgeOrderMismatch { row: usize, expected_src: NodeId, expected_dst: NodeId, actual_src: NodeId, actual_dst: NodeId },

    #[error("csv row references edge ({src},{dst}) which does not exist in the topology")]
    UnknownEdge { src: NodeId, dst: NodeId },

    #[error("topology edge ({src},{dst}) has no corresponding row in the csv")]
    MissingEdgeRow { src: NodeId, dst: NodeId },

    #[error("edge ({src},{dst}) attributes mismatch: topology has alpha={expected_alpha} beta={expected_beta}, csv has alpha={actual_alpha} beta={actual_beta}")]
    EdgeAttrMismatch {
        src: NodeId,
        dst: NodeId,
        expected_alpha: f64,
        expected_beta: f64,
        actual_alpha: f64,
        actual_beta: f64,
    },

    #[error("malformed chunk cell {0:?}, expected `id:send_ns:recv_ns`")]
    BadChunkCell(String),

    #[error("chunk {chunk} appears twice on link ({src},{dst})")]
    DuplicateChunkOnLink { src: NodeId, dst: NodeId, chunk: ChunkId },

    #[error("link ({src},{dst}) has overlapping transmissions: chunk {chunk_a} [{send_a},{recv_a}) overlaps chunk {chunk_b} [{send_b},{recv_b})")]
    OverlappingTransmissions {
        src: NodeId,
        dst: NodeId,
        chunk_a: ChunkId,
        send_a: f64,
        recv_a: f64,
        chunk_b: ChunkId,
        send_b: f64,
        recv_b: f64,
    },

    #[error("link ({src},{dst}) chunk {chunk}: recv-send={actual} but delay(link,chunk_size)={expected}")]
    DurationMismatch { src: NodeId, dst: NodeId, chunk: ChunkId, expected: f64, actual: f64 },

    #[error("chunk {chunk} sent on link ({src},{dst}) at t={send_time}, but it was never possessed at {src} by then")]
    CausalityViolation { src: NodeId, dst: NodeId, chunk: ChunkId, send_time: f64 },

    #[error("postcondition (chunk {chunk}, node {node}) is never satisfied by any event or precondition")]
    PostconditionNotCovered { chunk: ChunkId, node: NodeId },

    #[error("Collective Time mismatch: csv declares {declared}, max receive_time across events is {actual}")]
    MakespanMismatch { declared: f64, actual: f64 },

    #[error("non-finite time encountered on link ({src},{dst}) chunk {chunk}: {context}={value}")]
    NonFiniteTime { src: NodeId, dst: NodeId, chunk: ChunkId, context: &'static str, value: f64 },
}
