use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

/// Index of an NPU (compute node) in a [`Topology`]. Nodes are always
/// `0..num_nodes`, so this doubles as a dense array index — the design note
/// in spec.md §9 prefers dense arrays over hash maps on the hot paths that
/// key off node/chunk ids.
pub type NodeId = u32;

/// One chunk-size's worth of default message: `1048576 / 976562.5`, i.e.
/// `2^30 / 1e9` — carried over byte-for-byte from the original `ChunkSize`
/// default so that delay computations with the default chunk size match the
/// reference tool exactly.
pub const UNIT_CHUNK_SIZE: f64 = 1048576.0 / 976562.5;

/// A directed link, identified by its ordered endpoint pair. Distinct from
/// the reverse link `(dst, src)`, which (if present) is a separate edge with
/// its own α/β.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId {
    pub src: NodeId,
    pub dst: NodeId,
}

impl LinkId {
    pub fn new(src: NodeId, dst: NodeId) -> Self {
        Self { src, dst }
    }
}

impl From<(NodeId, NodeId)> for LinkId {
    fn from((src, dst): (NodeId, NodeId)) -> Self {
        Self { src, dst }
    }
}

/// A single directed edge's attributes. Field names `alpha`/`beta` are part
/// of the external contract: the schedule verifier (`ccl-schedule`) reads
/// them back off the emitted CSV by these exact names.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub alpha: f64,
    pub beta: f64,
}

/// Directed network topology: a set of nodes `0..num_nodes` and a set of
/// unique directed edges, each carrying latency (`alpha`, ns) and bandwidth
/// (`beta`, GB/s).
///
/// Edges are stored in insertion order in a dense `Vec`, with an index map
/// for `(src, dst) -> edge index` lookup and per-node adjacency lists of
/// edge indices, so the hot paths in `ccl-ten` (`available_links`,
/// `possible_matches`) can iterate without hashing.
#[derive(Clone, Debug)]
pub struct Topology {
    num_nodes: usize,
    edges: Vec<(LinkId, EdgeAttrs)>,
    edge_index: HashMap<LinkId, usize>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
}

impl Topology {
    /// An empty topology over `num_nodes` nodes with no edges.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            edges: Vec::new(),
            edge_index: HashMap::new(),
            out_edges: vec![Vec::new(); num_nodes],
            in_edges: vec![Vec::new(); num_nodes],
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Add a directed edge `src -> dst` with the given (alpha, beta).
    ///
    /// Errors if the edge already exists, a node id is out of range, or the
    /// α/β invariant (`alpha >= 0`, `beta > 0`) is violated.
    pub fn connect(
        &mut self,
        src: NodeId,
        dst: NodeId,
        alpha: f64,
        beta: f64,
    ) -> Result<(), TopologyError> {
        if src as usize >= self.num_nodes {
            return Err(TopologyError::NodeOutOfRange(src, self.num_nodes));
        }
        if dst as usize >= self.num_nodes {
            return Err(TopologyError::NodeOutOfRange(dst, self.num_nodes));
        }
        if alpha < 0.0 {
            return Err(TopologyError::NegativeAlpha { src, dst, alpha });
        }
        if beta <= 0.0 {
            return Err(TopologyError::NonPositiveBeta { src, dst, beta });
        }
        let link = LinkId::new(src, dst);
        if self.edge_index.contains_key(&link) {
            return Err(TopologyError::DuplicateEdge { src, dst });
        }
        let idx = self.edges.len();
        self.edges.push((link, EdgeAttrs { alpha, beta }));
        self.edge_index.insert(link, idx);
        self.out_edges[src as usize].push(idx);
        self.in_edges[dst as usize].push(idx);
        Ok(())
    }

    /// Propagation delay, in nanoseconds, for a chunk of `chunk_size` bytes
    /// over `link`: `alpha + (chunk_size / 2^30) * (1e9 / beta)`.
    pub fn delay(&self, link: LinkId, chunk_size: f64) -> f64 {
        let attrs = &self.edges[self.edge_index[&link]].1;
        attrs.alpha + (chunk_size / (1u64 << 30) as f64) * (1e9 / attrs.beta)
    }

    /// Dense index of `link` in `0..num_edges()`, stable for the lifetime of
    /// this topology. Lets callers (e.g. `ccl-ten`'s TEN state machine) keep
    /// per-edge state in a plain `Vec` instead of hashing on every access.
    pub fn edge_index(&self, link: LinkId) -> Option<usize> {
        self.edge_index.get(&link).copied()
    }

    pub fn edge_at(&self, index: usize) -> (LinkId, EdgeAttrs) {
        self.edges[index]
    }

    pub fn edge_attrs(&self, link: LinkId) -> Option<EdgeAttrs> {
        self.edge_index.get(&link).map(|&idx| self.edges[idx].1)
    }

    /// Overwrite an existing edge's `(alpha, beta)` in place, used by the
    /// built-in topology factory's homogeneous/heterogeneous edge-attribute
    /// assignment pass. Errors under the same α/β invariant as `connect`.
    pub fn set_edge_attrs(&mut self, link: LinkId, alpha: f64, beta: f64) -> Result<(), TopologyError> {
        if alpha < 0.0 {
            return Err(TopologyError::NegativeAlpha { src: link.src, dst: link.dst, alpha });
        }
        if beta <= 0.0 {
            return Err(TopologyError::NonPositiveBeta { src: link.src, dst: link.dst, beta });
        }
        let idx = *self
            .edge_index
            .get(&link)
            .ok_or(TopologyError::NodeOutOfRange(link.src, self.num_nodes))?;
        self.edges[idx].1 = EdgeAttrs { alpha, beta };
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.num_nodes as NodeId).into_iter()
    }

    /// All edges, in insertion order — the order the CSV writer emits rows in.
    pub fn edges(&self) -> impl Iterator<Item = (LinkId, EdgeAttrs)> + '_ {
        self.edges.iter().copied()
    }

    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = LinkId> + '_ {
        self.out_edges[node as usize].iter().map(move |&idx| self.edges[idx].0)
    }

    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = LinkId> + '_ {
        self.in_edges[node as usize].iter().map(move |&idx| self.edges[idx].0)
    }

    /// Dense edge indices leaving `node`, for hot-path iteration that wants
    /// to avoid a `LinkId -> index` hash lookup per edge.
    pub fn out_edge_indices(&self, node: NodeId) -> impl Iterator<Item = usize> + '_ {
        self.out_edges[node as usize].iter().copied()
    }

    /// Load a topology CSV: line 1 is `<num_nodes>`, line 2 is the header
    /// `Src,Dest,Latency (ns),Bandwidth (GB/s)`, remaining rows are edges.
    pub fn load_from_csv(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(path.as_ref()).map_err(|e| TopologyError::Csv {
            path: path_str.clone(),
            source: csv::Error::from(e),
        })?;
        let mut rdr = csv::ReaderBuilder::new().has_headers(false).from_reader(file);
        let mut records = rdr.records();

        let num_nodes_row = records
            .next()
            .ok_or_else(|| TopologyError::BadHeader(Vec::new()))?
            .map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
        if num_nodes_row.len() != 1 {
            return Err(TopologyError::BadHeader(num_nodes_row.iter().map(String::from).collect()));
        }
        let num_nodes: usize = num_nodes_row[0]
            .trim()
            .parse()
            .map_err(|_| TopologyError::BadHeader(vec![num_nodes_row[0].to_string()]))?;

        let header = records
            .next()
            .ok_or_else(|| TopologyError::BadHeader(Vec::new()))?
            .map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
        let expected = ["Src", "Dest", "Latency (ns)", "Bandwidth (GB/s)"];
        if header.iter().collect::<Vec<_>>() != expected {
            return Err(TopologyError::BadHeader(header.iter().map(String::from).collect()));
        }

        let mut topo = Topology::new(num_nodes);
        for record in records {
            let record = record.map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
            if record.len() != 4 {
                return Err(TopologyError::BadRow(record.len()));
            }
            let src: NodeId = record[0].trim().parse().map_err(|_| TopologyError::BadRow(4))?;
            let dst: NodeId = record[1].trim().parse().map_err(|_| TopologyError::BadRow(4))?;
            let alpha: f64 = record[2].trim().parse().map_err(|_| TopologyError::BadRow(4))?;
            let beta: f64 = record[3].trim().parse().map_err(|_| TopologyError::BadRow(4))?;
            topo.connect(src, dst, alpha, beta)?;
        }
        tracing::debug!(num_nodes, num_edges = topo.num_edges(), path = %path_str, "loaded topology from csv");
        Ok(topo)
    }

    /// Write this topology back out in the same CSV layout `load_from_csv`
    /// reads, for the round-trip property in spec.md §8.
    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> Result<(), TopologyError> {
        let path_str = path.as_ref().display().to_string();
        let file = File::create(path.as_ref()).map_err(|e| TopologyError::Csv {
            path: path_str.clone(),
            source: csv::Error::from(e),
        })?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record([self.num_nodes.to_string()])
            .map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
        wtr.write_record(["Src", "Dest", "Latency (ns)", "Bandwidth (GB/s)"])
            .map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
        for (link, attrs) in &self.edges {
            wtr.write_record([
                link.src.to_string(),
                link.dst.to_string(),
                attrs.alpha.to_string(),
                attrs.beta.to_string(),
            ])
            .map_err(|e| TopologyError::Csv { path: path_str.clone(), source: e })?;
        }
        wtr.flush().map_err(|e| TopologyError::Csv { path: path_str, source: e.into() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_matches_fc4_scatter_example() {
        let mut topo = Topology::new(2);
        topo.connect(0, 1, 500.0, 50.0).unwrap();
        let delay = topo.delay(LinkId::new(0, 1), 1_048_576.0);
        assert!((delay - 20031.25).abs() < 1e-6);
    }

    #[test]
    fn rejects_duplicate_edge() {
        let mut topo = Topology::new(2);
        topo.connect(0, 1, 0.0, 1.0).unwrap();
        let err = topo.connect(0, 1, 1.0, 2.0).unwrap_err();
        assert_matches::assert_matches!(err, TopologyError::DuplicateEdge { .. });
    }

    #[test]
    fn rejects_non_positive_beta() {
        let mut topo = Topology::new(2);
        let err = topo.connect(0, 1, 0.0, 0.0).unwrap_err();
        assert_matches::assert_matches!(err, TopologyError::NonPositiveBeta { .. });
    }

    #[test]
    fn csv_round_trip_is_identity() {
        let mut topo = Topology::new(3);
        topo.connect(0, 1, 0.0, 1.0).unwrap();
        topo.connect(1, 2, 10.0, 2.0).unwrap();
        topo.connect(2, 0, 5.0, 0.5).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.csv");
        topo.save_to_csv(&path).unwrap();
        let loaded = Topology::load_from_csv(&path).unwrap();

        assert_eq!(loaded.num_nodes(), topo.num_nodes());
        assert_eq!(loaded.num_edges(), topo.num_edges());
        for (link, attrs) in topo.edges() {
            let loaded_attrs = loaded.edge_attrs(link).unwrap();
            assert!((loaded_attrs.alpha - attrs.alpha).abs() < 1e-9);
            assert!((loaded_attrs.beta - attrs.beta).abs() < 1e-9);
        }
    }
}
