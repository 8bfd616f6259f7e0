use ccl_topology::Topology;

/// All-pairs shortest path distance by edge `delay`, computed once per
/// synthesizer run and cached — the `shortest_path` fitness function's
/// `dist` table (spec.md §4.5).
pub fn all_pairs_shortest_delay(topology: &Topology, chunk_size: f64) -> Vec<Vec<f64>> {
    let n = topology.num_nodes();
    let mut dist = vec![vec![f64::INFINITY; n]; n];
    for i in 0..n {
        dist[i][i] = 0.0;
    }
    for (link, _) in topology.edges() {
        let d = topology.delay(link, chunk_size);
        let entry = &mut dist[link.src as usize][link.dst as usize];
        if d < *entry {
            *entry = d;
        }
    }
    for k in 0..n {
        for i in 0..n {
            if dist[i][k].is_infinite() {
                continue;
            }
            for j in 0..n {
                let via_k = dist[i][k] + dist[k][j];
                if via_k < dist[i][j] {
                    dist[i][j] = via_k;
                }
            }
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_topology_distance_sums_hops() {
        let mut t = Topology::new(3);
        t.connect(0, 1, 1.0, 1.0).unwrap();
        t.connect(1, 2, 1.0, 1.0).unwrap();
        let dist = all_pairs_shortest_delay(&t, 0.0);
        assert_eq!(dist[0][2], dist[0][1] + dist[1][2]);
    }

    #[test]
    fn unreachable_pair_is_infinite() {
        let t = Topology::new(2);
        let dist = all_pairs_shortest_delay(&t, 0.0);
        assert!(dist[0][1].is_infinite());
    }
}
