//! Collective communication patterns: a set of chunks, a precondition (where
//! each chunk starts), a postcondition (where each chunk must end up), and a
//! uniform chunk size. Five constructor shapes build the common collectives;
//! `add` is the primitive they're all built from.

mod error;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use error::CollectiveError;

pub type NodeId = u32;
pub type ChunkId = u32;

/// The default chunk size, defined once in `ccl_topology` since the delay
/// formula it was derived for lives there.
pub use ccl_topology::UNIT_CHUNK_SIZE;

/// A collective communication pattern: which chunks exist, where each one
/// starts (precondition), and where each one must end up (postcondition).
#[derive(Clone, Debug)]
pub struct Collective {
    chunk_size: f64,
    chunks: BTreeSet<ChunkId>,
    precondition: HashSet<(ChunkId, NodeId)>,
    postcondition: HashSet<(ChunkId, NodeId)>,
    precondition_by_node: HashMap<NodeId, BTreeSet<ChunkId>>,
    postcondition_by_node: HashMap<NodeId, BTreeSet<ChunkId>>,
}

#[derive(Serialize, Deserialize)]
struct CollectiveJson {
    chunk_size: f64,
    chunks: Vec<ChunkId>,
    preconditions: BTreeMap<String, Vec<ChunkId>>,
    postconditions: BTreeMap<String, Vec<ChunkId>>,
}

impl Collective {
    /// An empty collective with the given chunk size and no chunks.
    pub fn new(chunk_size: f64) -> Self {
        Self {
            chunk_size,
            chunks: BTreeSet::new(),
            precondition: HashSet::new(),
            postcondition: HashSet::new(),
            precondition_by_node: HashMap::new(),
            postcondition_by_node: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> f64 {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.iter().copied()
    }

    pub fn precondition(&self) -> impl Iterator<Item = (ChunkId, NodeId)> + '_ {
        self.precondition.iter().copied()
    }

    pub fn postcondition(&self) -> impl Iterator<Item = (ChunkId, NodeId)> + '_ {
        self.postcondition.iter().copied()
    }

    pub fn precondition_at(&self, node: NodeId) -> impl Iterator<Item = ChunkId> + '_ {
        self.precondition_by_node.get(&node).into_iter().flatten().copied()
    }

    pub fn postcondition_at(&self, node: NodeId) -> impl Iterator<Item = ChunkId> + '_ {
        self.postcondition_by_node.get(&node).into_iter().flatten().copied()
    }

    pub fn holds_precondition(&self, chunk: ChunkId, node: NodeId) -> bool {
        self.precondition.contains(&(chunk, node))
    }

    pub fn requires_postcondition(&self, chunk: ChunkId, node: NodeId) -> bool {
        self.postcondition.contains(&(chunk, node))
    }

    /// Schedule chunk `id` to start at `src` and be required at `dest`.
    /// Idempotent: a duplicate `(id, src, dest)` is a no-op, matching the
    /// original's `add()` short-circuit.
    pub fn add(&mut self, id: ChunkId, src: NodeId, dest: NodeId) {
        if self.precondition.contains(&(id, src)) && self.postcondition.contains(&(id, dest)) {
            return;
        }
        self.chunks.insert(id);
        self.precondition.insert((id, src));
        self.postcondition.insert((id, dest));
        self.precondition_by_node.entry(src).or_default().insert(id);
        self.postcondition_by_node.entry(dest).or_default().insert(id);
    }

    /// Check that every chunk has at least one precondition entry and at
    /// least one postcondition entry (spec.md §3 Collective invariant).
    pub fn validate(&self) -> Result<(), CollectiveError> {
        for &chunk in &self.chunks {
            if !self.precondition.iter().any(|&(c, _)| c == chunk) {
                return Err(CollectiveError::MissingPrecondition(chunk));
            }
            if !self.postcondition.iter().any(|&(c, _)| c == chunk) {
                return Err(CollectiveError::MissingPostcondition(chunk));
            }
        }
        Ok(())
    }

    /// All-Gather: for each `src` in `0..npus_count`, one chunk delivered
    /// from `src` to every node (including itself), repeated
    /// `collectives_count` times with chunk ids incrementing per src.
    pub fn all_gather(npus_count: u32, chunk_size: f64, collectives_count: u32) -> Self {
        let mut c = Collective::new(chunk_size);
        let mut chunk_id = 0;
        for _ in 0..collectives_count {
            for src in 0..npus_count {
                for dest in 0..npus_count {
                    c.add(chunk_id, src, dest);
                }
                chunk_id += 1;
            }
        }
        c
    }

    /// All-to-All: one distinct chunk per `(src, dst)` pair.
    pub fn all_to_all(npus_count: u32, chunk_size: f64, collectives_count: u32) -> Self {
        let mut c = Collective::new(chunk_size);
        let mut chunk_id = 0;
        for _ in 0..collectives_count {
            for src in 0..npus_count {
                for dest in 0..npus_count {
                    c.add(chunk_id, src, dest);
                    chunk_id += 1;
                }
            }
        }
        c
    }

    /// Scatter(src): one chunk per destination, all originating at `src`.
    pub fn scatter(src: NodeId, npus_count: u32, chunk_size: f64, collectives_count: u32) -> Self {
        let mut c = Collective::new(chunk_size);
        let mut chunk_id = 0;
        for _ in 0..collectives_count {
            for dest in 0..npus_count {
                c.add(chunk_id, src, dest);
                chunk_id += 1;
            }
        }
        c
    }

    /// Gather(dest): one chunk from each source to `dest`.
    pub fn gather(dest: NodeId, npus_count: u32, chunk_size: f64, collectives_count: u32) -> Self {
        let mut c = Collective::new(chunk_size);
        let mut chunk_id = 0;
        for _ in 0..collectives_count {
            for src in 0..npus_count {
                c.add(chunk_id, src, dest);
                chunk_id += 1;
            }
        }
        c
    }

    /// Broadcast(src): one chunk delivered from `src` to every node.
    pub fn broadcast(src: NodeId, npus_count: u32, chunk_size: f64, collectives_count: u32) -> Self {
        let mut c = Collective::new(chunk_size);
        let mut chunk_id = 0;
        for _ in 0..collectives_count {
            for dest in 0..npus_count {
                c.add(chunk_id, src, dest);
            }
            chunk_id += 1;
        }
        c
    }

    /// Load a collective from the external JSON contract (spec.md §6): keys
    /// `chunk_size`, `chunks`, `preconditions`, `postconditions`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CollectiveError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(path.as_ref()).map_err(|e| CollectiveError::Io { path: path_str.clone(), source: e })?;
        let data: CollectiveJson = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CollectiveError::Json { path: path_str.clone(), source: e })?;

        let mut c = Collective::new(data.chunk_size);
        for chunk in &data.chunks {
            c.chunks.insert(*chunk);
        }
        for (node_str, chunks) in data.preconditions {
            let node: NodeId = node_str
                .parse()
                .map_err(|_| CollectiveError::BadNodeKey(node_str.clone()))?;
            for chunk in chunks {
                c.precondition.insert((chunk, node));
                c.precondition_by_node.entry(node).or_default().insert(chunk);
            }
        }
        for (node_str, chunks) in data.postconditions {
            let node: NodeId = node_str
                .parse()
                .map_err(|_| CollectiveError::BadNodeKey(node_str.clone()))?;
            for chunk in chunks {
                c.postcondition.insert((chunk, node));
                c.postcondition_by_node.entry(node).or_default().insert(chunk);
            }
        }
        tracing::debug!(num_chunks = c.num_chunks(), path = %path_str, "loaded collective from json");
        Ok(c)
    }

    /// Write this collective out in the same JSON layout `load_json` reads.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CollectiveError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::create(path.as_ref()).map_err(|e| CollectiveError::Io { path: path_str.clone(), source: e })?;
        let data = CollectiveJson {
            chunk_size: self.chunk_size,
            chunks: self.chunks.iter().copied().collect(),
            preconditions: self
                .precondition_by_node
                .iter()
                .map(|(node, chunks)| (node.to_string(), chunks.iter().copied().collect()))
                .collect(),
            postconditions: self
                .postcondition_by_node
                .iter()
                .map(|(node, chunks)| (node.to_string(), chunks.iter().copied().collect()))
                .collect(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &data)
            .map_err(|e| CollectiveError::Json { path: path_str, source: e })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_gather_delivers_every_src_chunk_to_every_node() {
        let c = Collective::all_gather(4, UNIT_CHUNK_SIZE, 1);
        assert_eq!(c.num_chunks(), 4);
        for chunk in c.chunks() {
            assert_eq!(c.postcondition_at(0).filter(|&x| x == chunk).count(), 1);
        }
        for node in 0..4 {
            assert_eq!(c.postcondition_at(node).count(), 4);
        }
    }

    #[test]
    fn all_to_all_has_n_squared_chunks() {
        let c = Collective::all_to_all(3, UNIT_CHUNK_SIZE, 1);
        assert_eq!(c.num_chunks(), 9);
    }

    #[test]
    fn scatter_chunks_all_originate_at_source() {
        let c = Collective::scatter(2, 5, UNIT_CHUNK_SIZE, 1);
        assert_eq!(c.num_chunks(), 5);
        for chunk in c.chunks() {
            assert!(c.holds_precondition(chunk, 2));
        }
    }

    #[test]
    fn gather_chunks_all_converge_on_dest() {
        let c = Collective::gather(3, 5, UNIT_CHUNK_SIZE, 1);
        assert_eq!(c.num_chunks(), 5);
        for chunk in c.chunks() {
            assert!(c.requires_postcondition(chunk, 3));
        }
    }

    #[test]
    fn broadcast_is_one_chunk_to_every_node() {
        let c = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 2);
        assert_eq!(c.num_chunks(), 2);
        assert_eq!(c.postcondition_at(3).count(), 2);
    }

    #[test]
    fn add_is_idempotent_on_duplicates() {
        let mut c = Collective::new(UNIT_CHUNK_SIZE);
        c.add(0, 1, 2);
        c.add(0, 1, 2);
        assert_eq!(c.num_chunks(), 1);
        assert_eq!(c.precondition().count(), 1);
    }

    #[test]
    fn validate_rejects_chunk_missing_postcondition() {
        let mut c = Collective::new(UNIT_CHUNK_SIZE);
        c.chunks.insert(5);
        c.precondition.insert((5, 0));
        let err = c.validate().unwrap_err();
        assert_matches::assert_matches!(err, CollectiveError::MissingPostcondition(5));
    }

    #[test]
    fn json_round_trip_preserves_chunks_and_conditions() {
        let c = Collective::all_to_all(3, 42.0, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collective.json");
        c.write_json(&path).unwrap();
        let loaded = Collective::load_json(&path).unwrap();

        assert_eq!(loaded.num_chunks(), c.num_chunks());
        assert_eq!(loaded.chunk_size(), c.chunk_size());
        for (chunk, node) in c.precondition() {
            assert!(loaded.holds_precondition(chunk, node));
        }
        for (chunk, node) in c.postcondition() {
            assert!(loaded.requires_postcondition(chunk, node));
        }
    }
}
