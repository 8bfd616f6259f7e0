//! The canonical schedule CSV writer and its independent verifier (spec.md
//! §4.7). The CSV layout is the external contract: header rows for the
//! instance's shape (`NPUs Count`, `Links Count`, `Chunks Count`, `Chunk
//! Size`, `Collective Time`, `Synthesis Time`), a column header row, then
//! one data row per directed edge in topology order, with chunk cells
//! `id:send_ns:recv_ns` in commit order.

mod error;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use ccl_collective::{ChunkId, Collective};
use ccl_ten::synth::Schedule;
use ccl_topology::{LinkId, NodeId, Topology};

pub use error::{VerifyError, WriteError};

/// Relative tolerance applied to every floating-point comparison in the
/// verifier (spec.md §4.7/§8), except the strict duplicate-chunk check
/// which spec.md §9(c) calls out as an exact-equality check.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

fn approx_eq(a: f64, b: f64, rel_tol: f64) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs()).max(1.0)
}

/// Write `schedule` out in the canonical CSV layout.
pub fn write_csv(
    path: impl AsRef<Path>,
    topology: &Topology,
    collective: &Collective,
    schedule: &Schedule,
    synthesis_time_secs: f64,
) -> Result<(), WriteError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::create(path.as_ref()).map_err(|e| WriteError::Csv { path: path_str.clone(), source: csv::Error::from(e) })?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).flexible(true).from_writer(file);
    let wrap = |e: csv::Error| WriteError::Csv { path: path_str.clone(), source: e };

    wtr.write_record(["NPUs Count", &topology.num_nodes().to_string()]).map_err(wrap)?;
    wtr.write_record(["Links Count", &topology.num_edges().to_string()]).map_err(wrap)?;
    wtr.write_record(["Chunks Count", &collective.num_chunks().to_string()]).map_err(wrap)?;
    wtr.write_record(["Chunk Size", &collective.chunk_size().to_string()]).map_err(wrap)?;
    wtr.write_record(["Collective Time", &schedule.makespan.to_string(), "ns"]).map_err(wrap)?;
    wtr.write_record(["Synthesis Time", &synthesis_time_secs.to_string(), "s"]).map_err(wrap)?;
    wtr.write_record(["SrcID", "DestID", "Latency (ns)", "Bandwidth (GB/s)", "Chunks (ID:ns:ns)"]).map_err(wrap)?;

    let mut by_edge: HashMap<LinkId, Vec<&ccl_ten::Event>> = HashMap::new();
    for event in &schedule.event_history {
        by_edge.entry(event.link).or_default().push(event);
    }

    for (link, attrs) in topology.edges() {
        let mut record = vec![link.src.to_string(), link.dst.to_string(), attrs.alpha.to_string(), attrs.beta.to_string()];
        if let Some(events) = by_edge.get(&link) {
            for event in events {
                record.push(format!("{}:{}:{}", event.chunk, event.send_time, event.receive_time));
            }
        }
        wtr.write_record(&record).map_err(wrap)?;
    }
    wtr.flush().map_err(|e| WriteError::Csv { path: path_str, source: e.into() })?;
    tracing::info!(makespan = schedule.makespan, events = schedule.event_history.len(), path = %path.as_ref().display(), "wrote schedule csv");
    Ok(())
}

struct ParsedRow {
    link: LinkId,
    alpha: f64,
    beta: f64,
    events: Vec<(ChunkId, f64, f64)>,
}

fn parse_chunk_cell(cell: &str) -> Result<(ChunkId, f64, f64), VerifyError> {
    let parts: Vec<&str> = cell.split(':').collect();
    if parts.len() != 3 {
        return Err(VerifyError::BadChunkCell(cell.to_string()));
    }
    let chunk: ChunkId = parts[0].parse().map_err(|_| VerifyError::BadChunkCell(cell.to_string()))?;
    let send: f64 = parts[1].parse().map_err(|_| VerifyError::BadChunkCell(cell.to_string()))?;
    let recv: f64 = parts[2].parse().map_err(|_| VerifyError::BadChunkCell(cell.to_string()))?;
    Ok((chunk, send, recv))
}

fn intervals_overlap(s1: f64, r1: f64, s2: f64, r2: f64, tol: f64) -> bool {
    let eps = tol * r1.max(r2).max(1.0);
    s1 < r2 - eps && s2 < r1 - eps
}

/// Re-read the CSV at `path` and independently check every invariant in
/// spec.md §8 against `topology` and `collective`. Any violation is a hard
/// error (spec.md §7 kind 4) — this function never repairs the schedule.
pub fn verify(path: impl AsRef<Path>, topology: &Topology, collective: &Collective) -> Result<(), VerifyError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::open(path.as_ref()).map_err(|e| VerifyError::Csv { path: path_str.clone(), source: csv::Error::from(e) })?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(file);
    let wrap = |e: csv::Error| VerifyError::Csv { path: path_str.clone(), source: e };
    let mut records = rdr.records();

    let next = |records: &mut csv::StringRecordsIter<'_, File>| -> Result<csv::StringRecord, VerifyError> {
        records.next().ok_or_else(|| VerifyError::BadHeader(Vec::new()))?.map_err(wrap)
    };

    let npus_row = next(&mut records)?;
    let npus: usize = npus_row.get(1).and_then(|s| s.trim().parse().ok()).ok_or_else(|| VerifyError::BadHeader(row_to_vec(&npus_row)))?;
    if npus != topology.num_nodes() {
        return Err(VerifyError::NpuCountMismatch { expected: topology.num_nodes(), actual: npus });
    }

    let links_row = next(&mut records)?;
    let links: usize = links_row.get(1).and_then(|s| s.trim().parse().ok()).ok_or_else(|| VerifyError::BadHeader(row_to_vec(&links_row)))?;
    if links != topology.num_edges() {
        return Err(VerifyError::LinkCountMismatch { expected: topology.num_edges(), actual: links });
    }

    let chunks_row = next(&mut records)?;
    let chunks_count: usize =
        chunks_row.get(1).and_then(|s| s.trim().parse().ok()).ok_or_else(|| VerifyError::BadHeader(row_to_vec(&chunks_row)))?;
    if chunks_count != collective.num_chunks() {
        return Err(VerifyError::ChunkCountMismatch { expected: collective.num_chunks(), actual: chunks_count });
    }

    let chunk_size_row = next(&mut records)?;
    let chunk_size: f64 =
        chunk_size_row.get(1).and_then(|s| s.trim().parse().ok()).ok_or_else(|| VerifyError::BadHeader(row_to_vec(&chunk_size_row)))?;
    if !approx_eq(chunk_size, collective.chunk_size(), DEFAULT_TOLERANCE) {
        return Err(VerifyError::ChunkSizeMismatch { expected: collective.chunk_size(), actual: chunk_size });
    }

    let collective_time_row = next(&mut records)?;
    let declared_makespan: f64 = collective_time_row
        .get(1)
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| VerifyError::BadHeader(row_to_vec(&collective_time_row)))?;

    let _synthesis_time_row = next(&mut records)?;
    let _column_header_row = next(&mut records)?;

    let mut rows = Vec::new();
    for (row_idx, record) in records.enumerate() {
        let record = record.map_err(wrap)?;
        if record.len() < 4 {
            return Err(VerifyError::BadHeader(row_to_vec(&record)));
        }
        let src: NodeId = record[0].trim().parse().map_err(|_| VerifyError::BadHeader(row_to_vec(&record)))?;
        let dst: NodeId = record[1].trim().parse().map_err(|_| VerifyError::BadHeader(row_to_vec(&record)))?;
        let alpha: f64 = record[2].trim().parse().map_err(|_| VerifyError::BadHeader(row_to_vec(&record)))?;
        let beta: f64 = record[3].trim().parse().map_err(|_| VerifyError::BadHeader(row_to_vec(&record)))?;
        let link = LinkId::new(src, dst);

        let attrs = topology.edge_attrs(link).ok_or(VerifyError::UnknownEdge { src, dst })?;
        if !approx_eq(alpha, attrs.alpha, DEFAULT_TOLERANCE) || !approx_eq(beta, attrs.beta, DEFAULT_TOLERANCE) {
            return Err(VerifyError::EdgeAttrMismatch {
                src,
                dst,
                expected_alpha: attrs.alpha,
                expected_beta: attrs.beta,
                actual_alpha: alpha,
                actual_beta: beta,
            });
        }

        if row_idx < topology.num_edges() {
            let expected = topology.edge_at(row_idx).0;
            if (expected.src, expected.dst) != (src, dst) {
                return Err(VerifyError::EdgeOrderMismatch {
                    row: row_idx,
                    expected_src: expected.src,
                    expected_dst: expected.dst,
                    actual_src: src,
                    actual_dst: dst,
                });
            }
        }

        let mut events = Vec::new();
        for cell in record.iter().skip(4) {
            if cell.trim().is_empty() {
                continue;
            }
            events.push(parse_chunk_cell(cell)?);
        }
        rows.push(ParsedRow { link, alpha, beta, events });
    }

    let mut seen_edges: HashSet<LinkId> = HashSet::new();
    for row in &rows {
        seen_edges.insert(row.link);
    }
    for (link, _) in topology.edges() {
        if !seen_edges.contains(&link) {
            return Err(VerifyError::MissingEdgeRow { src: link.src, dst: link.dst });
        }
    }

    // Per-link: strict duplicate-chunk check (spec.md §9c, exact equality)
    // and tolerance-based non-overlap, independently.
    for row in &rows {
        let mut seen_chunks = HashSet::new();
        for &(chunk, _, _) in &row.events {
            if !seen_chunks.insert(chunk) {
                return Err(VerifyError::DuplicateChunkOnLink { src: row.link.src, dst: row.link.dst, chunk });
            }
        }
        for i in 0..row.events.len() {
            for j in (i + 1)..row.events.len() {
                let (chunk_a, send_a, recv_a) = row.events[i];
                let (chunk_b, send_b, recv_b) = row.events[j];
                if intervals_overlap(send_a, recv_a, send_b, recv_b, DEFAULT_TOLERANCE) {
                    return Err(VerifyError::OverlappingTransmissions {
                        src: row.link.src,
                        dst: row.link.dst,
                        chunk_a,
                        send_a,
                        recv_a,
                        chunk_b,
                        send_b,
                        recv_b,
                    });
                }
            }
        }
    }

    // Link duration, non-finite detection, and the makespan's raw ingredient.
    let mut max_receive = 0.0_f64;
    for row in &rows {
        let expected_delay = row.alpha + (collective.chunk_size() / (1u64 << 30) as f64) * (1e9 / row.beta);
        for &(chunk, send, recv) in &row.events {
            if !send.is_finite() {
                return Err(VerifyError::NonFiniteTime { src: row.link.src, dst: row.link.dst, chunk, context: "send_time", value: send });
            }
            if !recv.is_finite() {
                return Err(VerifyError::NonFiniteTime { src: row.link.src, dst: row.link.dst, chunk, context: "receive_time", value: recv });
            }
            let actual = recv - send;
            if !approx_eq(actual, expected_delay, DEFAULT_TOLERANCE) {
                return Err(VerifyError::DurationMismatch { src: row.link.src, dst: row.link.dst, chunk, expected: expected_delay, actual });
            }
            max_receive = max_receive.max(recv);
        }
    }

    // Causality: every event's chunk must already be possessed at its
    // source, either by precondition or by some earlier-arriving event.
    let mut delivered_by: HashMap<(ChunkId, NodeId), Vec<f64>> = HashMap::new();
    for row in &rows {
        for &(chunk, _, recv) in &row.events {
            delivered_by.entry((chunk, row.link.dst)).or_default().push(recv);
        }
    }
    for row in &rows {
        for &(chunk, send, _) in &row.events {
            let has_precondition = collective.holds_precondition(chunk, row.link.src);
            let has_prior_arrival = delivered_by
                .get(&(chunk, row.link.src))
                .map(|arrivals| arrivals.iter().any(|&t| t <= send + DEFAULT_TOLERANCE * send.abs().max(1.0)))
                .unwrap_or(false);
            if !has_precondition && !has_prior_arrival {
                return Err(VerifyError::CausalityViolation { src: row.link.src, dst: row.link.dst, chunk, send_time: send });
            }
        }
    }

    // Postcondition cover.
    for (chunk, node) in collective.postcondition() {
        let covered = collective.holds_precondition(chunk, node) || delivered_by.get(&(chunk, node)).map(|v| !v.is_empty()).unwrap_or(false);
        if !covered {
            return Err(VerifyError::PostconditionNotCovered { chunk, node });
        }
    }

    if !approx_eq(declared_makespan, max_receive, DEFAULT_TOLERANCE) {
        return Err(VerifyError::MakespanMismatch { declared: declared_makespan, actual: max_receive });
    }

    tracing::info!(path = %path_str, makespan = max_receive, "schedule verified");
    Ok(())
}

fn row_to_vec(record: &csv::StringRecord) -> Vec<String> {
    record.iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;
    use ccl_ten::Event;

    fn ring4() -> Topology {
        let mut t = Topology::new(4);
        for i in 0..4u32 {
            t.connect(i, (i + 1) % 4, 0.0, 1.0).unwrap();
        }
        t
    }

    #[test]
    fn writes_and_verifies_a_single_hop_scatter() {
        let mut topo = Topology::new(2);
        topo.connect(0, 1, 500.0, 50.0).unwrap();
        let collective = Collective::scatter(0, 2, UNIT_CHUNK_SIZE, 1);
        let delay = topo.delay(LinkId::new(0, 1), UNIT_CHUNK_SIZE);
        let schedule = Schedule {
            event_history: vec![Event { link: LinkId::new(0, 1), chunk: 1, send_time: 0.0, receive_time: delay }],
            makespan: delay,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        write_csv(&path, &topo, &collective, &schedule, 0.01).unwrap();
        verify(&path, &topo, &collective).unwrap();
    }

    #[test]
    fn rejects_a_schedule_missing_postcondition_coverage() {
        let mut topo = Topology::new(2);
        topo.connect(0, 1, 0.0, 1.0).unwrap();
        let collective = Collective::scatter(0, 2, UNIT_CHUNK_SIZE, 1);
        let schedule = Schedule { event_history: vec![], makespan: 0.0 };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        write_csv(&path, &topo, &collective, &schedule, 0.0).unwrap();
        let err = verify(&path, &topo, &collective).unwrap_err();
        assert_matches::assert_matches!(err, VerifyError::PostconditionNotCovered { .. });
    }

    #[test]
    fn rejects_overlapping_transmissions_on_the_same_link() {
        let mut topo = Topology::new(2);
        topo.connect(0, 1, 0.0, 1.0).unwrap();
        let collective = Collective::all_to_all(2, UNIT_CHUNK_SIZE, 1);
        let delay = topo.delay(LinkId::new(0, 1), UNIT_CHUNK_SIZE);
        let schedule = Schedule {
            event_history: vec![
                Event { link: LinkId::new(0, 1), chunk: 1, send_time: 0.0, receive_time: delay },
                Event { link: LinkId::new(0, 1), chunk: 2, send_time: delay / 2.0, receive_time: delay * 1.5 },
            ],
            makespan: delay * 1.5,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        write_csv(&path, &topo, &collective, &schedule, 0.0).unwrap();
        let err = verify(&path, &topo, &collective).unwrap_err();
        assert_matches::assert_matches!(err, VerifyError::OverlappingTransmissions { .. });
    }

    #[test]
    fn end_to_end_ring4_all_gather_via_greedy_tacos() {
        let topo = ring4();
        let collective = Collective::all_gather(4, UNIT_CHUNK_SIZE, 1);
        let schedule = ccl_ten::synth::greedy_tacos(&topo, &collective, 2430).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        write_csv(&path, &topo, &collective, &schedule, 0.02).unwrap();
        verify(&path, &topo, &collective).unwrap();
    }
}
