//! The built-in topology factory (spec C8): a string specifier resolves to a
//! fully-built [`Topology`] without the caller touching a CSV file. Two
//! grammars are supported: a handful of named shortcuts for the topologies
//! used throughout the testable-property scenarios (`fc`, `grid`, `torus`,
//! `ring`, `tree`), and a generic `nx_<name>__k1=v1__k2=v2` form that mirrors
//! what a graph-library-backed generator would produce, without actually
//! depending on one — the core only ever depends on [`Topology`], never on a
//! graph library, so the specifier grammar stays a thin convenience layer on
//! top of a small set of generators implemented directly here.
//!
//! Both grammars share the same key=value separator: a double underscore.
//! Single underscores are allowed inside a key name (`slow_alpha`) without
//! ambiguity because pairs never split on a lone `_`.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::TopologyError;
use crate::graph::{LinkId, NodeId, Topology};

/// Build a [`Topology`] from a specifier string. See module docs for the
/// grammar.
pub fn get_topology(specifier: &str) -> Result<Topology, TopologyError> {
    let (name, args) = split_name_and_args(specifier)?;
    if let Some(graph_name) = name.strip_prefix("nx_") {
        return generic(specifier, graph_name, &args);
    }
    match name.as_str() {
        "fc" => fully_connected(specifier, &args),
        "grid" => grid(specifier, &args, false),
        "torus" => grid(specifier, &args, true),
        "ring" => ring(specifier, &args),
        "tree" => tree(specifier, &args),
        _ => Err(TopologyError::UnknownSpecifier(specifier.to_string())),
    }
}

/// Parse `name__k=v__k=v...` into `(name, {k: v})`.
fn split_name_and_args(specifier: &str) -> Result<(String, HashMap<String, String>), TopologyError> {
    let mut parts = specifier.split("__");
    let name = parts
        .next()
        .ok_or_else(|| TopologyError::UnknownSpecifier(specifier.to_string()))?
        .to_string();
    let mut args = HashMap::new();
    for piece in parts {
        let (k, v) = piece.split_once('=').ok_or_else(|| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: piece.to_string(),
            reason: "expected `key=value`".to_string(),
        })?;
        args.insert(k.to_string(), v.to_string());
    }
    Ok((name, args))
}

fn parse_f64(specifier: &str, args: &HashMap<String, String>, key: &str) -> Result<f64, TopologyError> {
    args.get(key)
        .ok_or_else(|| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: key.to_string(),
            reason: "missing required argument".to_string(),
        })?
        .parse()
        .map_err(|_| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: key.to_string(),
            reason: "not a valid number".to_string(),
        })
}

fn parse_usize(specifier: &str, args: &HashMap<String, String>, key: &str) -> Result<usize, TopologyError> {
    args.get(key)
        .ok_or_else(|| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: key.to_string(),
            reason: "missing required argument".to_string(),
        })?
        .parse()
        .map_err(|_| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: key.to_string(),
            reason: "not a valid integer".to_string(),
        })
}

/// Directed complete graph on `n` nodes, every edge homogeneous `(alpha, beta)`.
fn fully_connected(specifier: &str, args: &HashMap<String, String>) -> Result<Topology, TopologyError> {
    let n = parse_usize(specifier, args, "n")?;
    let alpha = parse_f64(specifier, args, "alpha")?;
    let beta = parse_f64(specifier, args, "beta")?;
    let mut topo = Topology::new(n);
    for src in 0..n as NodeId {
        for dst in 0..n as NodeId {
            if src != dst {
                topo.connect(src, dst, alpha, beta)?;
            }
        }
    }
    Ok(topo)
}

/// 2D grid (or, with `wrap = true`, torus) of `w * h` nodes, 4-neighbor,
/// edges directed both ways, homogeneous `(alpha, beta)`.
fn grid(specifier: &str, args: &HashMap<String, String>, wrap: bool) -> Result<Topology, TopologyError> {
    let w = parse_usize(specifier, args, "w")?;
    let h = parse_usize(specifier, args, "h")?;
    let alpha = parse_f64(specifier, args, "alpha")?;
    let beta = parse_f64(specifier, args, "beta")?;
    let n = w * h;
    let mut topo = Topology::new(n);
    let idx = |x: usize, y: usize| (y * w + x) as NodeId;
    for y in 0..h {
        for x in 0..w {
            let neighbors: Vec<(usize, usize)> = if wrap {
                vec![((x + 1) % w, y), ((x + w - 1) % w, y), (x, (y + 1) % h), (x, (y + h - 1) % h)]
            } else {
                let mut v = Vec::new();
                if x + 1 < w {
                    v.push((x + 1, y));
                }
                if x > 0 {
                    v.push((x - 1, y));
                }
                if y + 1 < h {
                    v.push((x, y + 1));
                }
                if y > 0 {
                    v.push((x, y - 1));
                }
                v
            };
            for (nx, ny) in neighbors {
                let (src, dst) = (idx(x, y), idx(nx, ny));
                if topo.edge_attrs(LinkId::new(src, dst)).is_none() {
                    topo.connect(src, dst, alpha, beta)?;
                }
            }
        }
    }
    Ok(topo)
}

/// Bidirectional ring of `n` nodes; the edge `(n-1, 0)` and its reverse use
/// `(slow_alpha, slow_beta)` instead of `(alpha, beta)`, matching the "ring
/// with one slow edge" shortcut named in spec.md §4.8.
fn ring(specifier: &str, args: &HashMap<String, String>) -> Result<Topology, TopologyError> {
    let n = parse_usize(specifier, args, "n")?;
    let alpha = parse_f64(specifier, args, "alpha")?;
    let beta = parse_f64(specifier, args, "beta")?;
    let slow_alpha = parse_f64(specifier, args, "slow_alpha")?;
    let slow_beta = parse_f64(specifier, args, "slow_beta")?;
    let mut topo = Topology::new(n);
    for i in 0..n {
        let j = (i + 1) % n;
        let (a, b) = if i == n - 1 { (slow_alpha, slow_beta) } else { (alpha, beta) };
        topo.connect(i as NodeId, j as NodeId, a, b)?;
        topo.connect(j as NodeId, i as NodeId, a, b)?;
    }
    Ok(topo)
}

/// Balanced binary tree over `n` nodes (node `i`'s parent is `(i-1)/2`),
/// edges directed both ways, homogeneous `(alpha, beta)`.
fn tree(specifier: &str, args: &HashMap<String, String>) -> Result<Topology, TopologyError> {
    let n = parse_usize(specifier, args, "n")?;
    let alpha = parse_f64(specifier, args, "alpha")?;
    let beta = parse_f64(specifier, args, "beta")?;
    let mut topo = Topology::new(n);
    for i in 1..n {
        let parent = (i - 1) / 2;
        topo.connect(parent as NodeId, i as NodeId, alpha, beta)?;
        topo.connect(i as NodeId, parent as NodeId, alpha, beta)?;
    }
    Ok(topo)
}

/// The generic `nx_<graph_name>__k1=v1__k2=v2` grammar. Recognized
/// `graph_name`s are `complete`, `cycle`, `path`, `star`, `grid2d`,
/// `hypercube`, `wheel`, each taking its own shape arguments plus the universal
/// `alpha`/`beta` (homogeneous) or `alpha`/`beta`/`alpha2`/`beta2`/
/// `proportion` (heterogeneous: a `proportion` fraction of edges, sampled
/// without replacement, get `(alpha2, beta2)` instead) and an optional
/// `seed` for that sampling.
fn generic(specifier: &str, graph_name: &str, args: &HashMap<String, String>) -> Result<Topology, TopologyError> {
    let mut topo = match graph_name {
        "complete" => {
            let n = parse_usize(specifier, args, "n")?;
            let mut t = Topology::new(n);
            for src in 0..n as NodeId {
                for dst in 0..n as NodeId {
                    if src != dst {
                        t.connect(src, dst, 0.0, 1.0)?;
                    }
                }
            }
            t
        }
        "cycle" => {
            let n = parse_usize(specifier, args, "n")?;
            let mut t = Topology::new(n);
            for i in 0..n {
                let j = (i + 1) % n;
                t.connect(i as NodeId, j as NodeId, 0.0, 1.0)?;
                t.connect(j as NodeId, i as NodeId, 0.0, 1.0)?;
            }
            t
        }
        "path" => {
            let n = parse_usize(specifier, args, "n")?;
            let mut t = Topology::new(n);
            for i in 0..n.saturating_sub(1) {
                t.connect(i as NodeId, (i + 1) as NodeId, 0.0, 1.0)?;
                t.connect((i + 1) as NodeId, i as NodeId, 0.0, 1.0)?;
            }
            t
        }
        "star" => {
            let n = parse_usize(specifier, args, "n")?;
            let mut t = Topology::new(n);
            for i in 1..n {
                t.connect(0, i as NodeId, 0.0, 1.0)?;
                t.connect(i as NodeId, 0, 0.0, 1.0)?;
            }
            t
        }
        "grid2d" => {
            let w = parse_usize(specifier, args, "w")?;
            let h = parse_usize(specifier, args, "h")?;
            let mut t = Topology::new(w * h);
            let idx = |x: usize, y: usize| (y * w + x) as NodeId;
            for y in 0..h {
                for x in 0..w {
                    if x + 1 < w {
                        t.connect(idx(x, y), idx(x + 1, y), 0.0, 1.0)?;
                        t.connect(idx(x + 1, y), idx(x, y), 0.0, 1.0)?;
                    }
                    if y + 1 < h {
                        t.connect(idx(x, y), idx(x, y + 1), 0.0, 1.0)?;
                        t.connect(idx(x, y + 1), idx(x, y), 0.0, 1.0)?;
                    }
                }
            }
            t
        }
        "hypercube" => {
            let dim = parse_usize(specifier, args, "dim")?;
            let n = 1usize << dim;
            let mut t = Topology::new(n);
            for i in 0..n {
                for bit in 0..dim {
                    let j = i ^ (1 << bit);
                    if i < j {
                        t.connect(i as NodeId, j as NodeId, 0.0, 1.0)?;
                        t.connect(j as NodeId, i as NodeId, 0.0, 1.0)?;
                    }
                }
            }
            t
        }
        "wheel" => {
            // Node 0 is the hub, connected both ways to every rim node;
            // the rim nodes `1..n` form their own bidirectional cycle.
            let n = parse_usize(specifier, args, "n")?;
            let mut t = Topology::new(n);
            for i in 1..n {
                t.connect(0, i as NodeId, 0.0, 1.0)?;
                t.connect(i as NodeId, 0, 0.0, 1.0)?;
            }
            let rim = n.saturating_sub(1);
            if rim == 2 {
                t.connect(1, 2, 0.0, 1.0)?;
                t.connect(2, 1, 0.0, 1.0)?;
            } else if rim >= 3 {
                for offset in 0..rim {
                    let i = 1 + offset;
                    let j = 1 + (offset + 1) % rim;
                    t.connect(i as NodeId, j as NodeId, 0.0, 1.0)?;
                    t.connect(j as NodeId, i as NodeId, 0.0, 1.0)?;
                }
            }
            t
        }
        _ => return Err(TopologyError::UnknownSpecifier(specifier.to_string())),
    };

    apply_edge_attrs(specifier, args, &mut topo)?;
    Ok(topo)
}

/// Overwrite every edge's `(alpha, beta)` with either a homogeneous value or
/// a proportion-sampled heterogeneous split, per spec.md §4.8.
fn apply_edge_attrs(
    specifier: &str,
    args: &HashMap<String, String>,
    topo: &mut Topology,
) -> Result<(), TopologyError> {
    let alpha = parse_f64(specifier, args, "alpha")?;
    let beta = parse_f64(specifier, args, "beta")?;
    let links: Vec<_> = topo.edges().map(|(link, _)| link).collect();

    if let Some(proportion_str) = args.get("proportion") {
        let proportion: f64 = proportion_str.parse().map_err(|_| TopologyError::BadSpecifierArg {
            specifier: specifier.to_string(),
            arg: "proportion".to_string(),
            reason: "not a valid fraction".to_string(),
        })?;
        let alpha2 = parse_f64(specifier, args, "alpha2")?;
        let beta2 = parse_f64(specifier, args, "beta2")?;
        let seed: u64 = args.get("seed").map(|s| s.parse().unwrap_or(0)).unwrap_or(0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut shuffled = links.clone();
        shuffled.shuffle(&mut rng);
        let slow_count = ((links.len() as f64) * proportion).round() as usize;
        let slow: std::collections::HashSet<_> = shuffled.into_iter().take(slow_count).collect();
        for link in links {
            let (a, b) = if slow.contains(&link) { (alpha2, beta2) } else { (alpha, beta) };
            topo.set_edge_attrs(link, a, b)?;
        }
    } else {
        for link in links {
            topo.set_edge_attrs(link, alpha, beta)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_connected_has_n_times_n_minus_one_edges() {
        let topo = get_topology("fc__n=4__alpha=1__beta=2").unwrap();
        assert_eq!(topo.num_nodes(), 4);
        assert_eq!(topo.num_edges(), 4 * 3);
    }

    #[test]
    fn grid_4x4_has_interior_degree_4() {
        let topo = get_topology("grid__w=4__h=4__alpha=0__beta=1").unwrap();
        assert_eq!(topo.num_nodes(), 16);
        let interior: Vec<_> = topo.out_edges(5).collect();
        assert_eq!(interior.len(), 4);
    }

    #[test]
    fn torus_wraps_every_node_to_degree_4() {
        let topo = get_topology("torus__w=3__h=3__alpha=0__beta=1").unwrap();
        for node in topo.nodes() {
            assert_eq!(topo.out_edges(node).count(), 4);
        }
    }

    #[test]
    fn ring_slow_edge_is_distinct() {
        let topo = get_topology("ring__n=4__alpha=1__beta=1__slow_alpha=100__slow_beta=1").unwrap();
        let slow = topo.edge_attrs(LinkId::new(3, 0)).unwrap();
        assert_eq!(slow.alpha, 100.0);
        let fast = topo.edge_attrs(LinkId::new(0, 1)).unwrap();
        assert_eq!(fast.alpha, 1.0);
    }

    #[test]
    fn wheel_10_has_a_degree_9_hub_and_degree_3_rim() {
        let topo = get_topology("nx_wheel__n=10__alpha=0__beta=1").unwrap();
        assert_eq!(topo.num_nodes(), 10);
        assert_eq!(topo.out_edges(0).count(), 9);
        for rim_node in 1..10 {
            assert_eq!(topo.out_edges(rim_node).count(), 3);
        }
    }

    #[test]
    fn unknown_specifier_is_rejected() {
        let err = get_topology("not_a_real_topology").unwrap_err();
        assert_matches::assert_matches!(err, TopologyError::UnknownSpecifier(_));
    }

    #[test]
    fn generic_heterogeneous_split_assigns_some_slow_edges() {
        let topo = get_topology(
            "nx_complete__n=10__alpha=1__beta=1__alpha2=100__beta2=1__proportion=0.5__seed=7",
        )
        .unwrap();
        let slow_count = topo.edges().filter(|(_, attrs)| attrs.alpha == 100.0).count();
        assert!(slow_count > 0 && slow_count < topo.num_edges());
    }
}
