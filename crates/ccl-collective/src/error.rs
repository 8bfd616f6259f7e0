use crate::ChunkId;

/// Failures raised while building or loading a [`crate::Collective`] (spec §7
/// kind 1): malformed JSON, or a chunk that never appears in a precondition
/// or postcondition entry.
#[derive(Debug, thiserror::Error)]
pub enum CollectiveError {
    #[error("collective JSON {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("collective JSON {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk {0} has no precondition entry (appears nowhere as an initially-held chunk)")]
    MissingPrecondition(ChunkId),

    #[error("chunk {0} has no postcondition entry (appears nowhere as a required destination)")]
    MissingPostcondition(ChunkId),

    #[error("collective JSON node key {0:?} is not a valid NPU id")]
    BadNodeKey(String),
}
