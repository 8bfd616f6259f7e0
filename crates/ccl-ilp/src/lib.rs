//! The exact ILP encoding of collective schedule synthesis (spec.md §4.6):
//! `(send_time, receive_time, used)` variables over every `(edge, chunk)`
//! pair, big-M linearized preconditions/ordering, solved with `good_lp`'s
//! `coin_cbc` backend. Kept in its own crate so the solver dependency chain
//! isn't forced on consumers of the randomized synthesizers in `ccl-ten`.

mod error;

use std::collections::HashMap;
use std::time::Duration;

use ccl_collective::{ChunkId, Collective};
use ccl_ten::synth::Schedule;
use ccl_ten::Event;
use ccl_topology::Topology;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

pub use error::IlpError;

/// Solve the scheduling problem exactly over `topology`/`collective`,
/// returning the same [`Schedule`] shape the randomized synthesizers
/// produce, within `time_limit`. On timeout without a feasible incumbent,
/// returns [`IlpError::TimeoutNoIncumbent`] and emits no schedule (spec.md
/// §7 kind 5).
pub fn solve(topology: &Topology, collective: &Collective, time_limit: Duration) -> Result<Schedule, IlpError> {
    let num_nodes = topology.num_nodes();
    let num_edges = topology.num_edges();
    let chunks: Vec<ChunkId> = collective.chunks().collect();
    let chunk_size = collective.chunk_size();

    let edge_delay: Vec<f64> = (0..num_edges).map(|idx| topology.delay(topology.edge_at(idx).0, chunk_size)).collect();
    let big_m = edge_delay.iter().sum::<f64>() * (chunks.len().max(1) as f64) + 1.0;

    let mut vars = ProblemVariables::new();
    let t = vars.add(variable().min(0.0));

    // receive[v][c], dense by (node, chunk position).
    let mut receive: Vec<Vec<Variable>> = Vec::with_capacity(num_nodes);
    for _ in 0..num_nodes {
        receive.push((0..chunks.len()).map(|_| vars.add(variable().min(0.0))).collect());
    }
    // send[e][c], upper-bounded by big_m so "used=0 => send=M" can be driven
    // by a single-direction inequality against that bound (spec.md §4.6
    // constraint 6).
    let mut send: Vec<Vec<Variable>> = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        send.push((0..chunks.len()).map(|_| vars.add(variable().min(0.0).max(big_m))).collect());
    }
    let mut used: Vec<Vec<Variable>> = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        used.push((0..chunks.len()).map(|_| vars.add(variable().binary())).collect());
    }

    // order[e][a][b] / used2[e][a][b] only for a < b chunk positions.
    let mut order: HashMap<(usize, usize, usize), Variable> = HashMap::new();
    let mut used2_by_pair: HashMap<(usize, usize, usize), Variable> = HashMap::new();

    for e in 0..num_edges {
        for a in 0..chunks.len() {
            for b in (a + 1)..chunks.len() {
                order.insert((e, a, b), vars.add(variable().binary()));
                order.insert((e, b, a), vars.add(variable().binary()));
                used2_by_pair.insert((e, a, b), vars.add(variable().binary()));
            }
        }
    }

    let chunk_index: HashMap<ChunkId, usize> = chunks.iter().enumerate().map(|(i, &c)| (c, i)).collect();

    let mut constraints: Vec<good_lp::Constraint> = Vec::new();

    // 1. receive[v,c] = 0 for (c,v) in precondition.
    for (chunk, node) in collective.precondition() {
        let ci = chunk_index[&chunk];
        constraints.push(constraint!(receive[node as usize][ci] == 0.0));
    }

    // 2. for each (c,d) in postcondition \ precondition, exactly one
    // incoming edge of d has used = 1.
    for (chunk, node) in collective.postcondition() {
        if collective.holds_precondition(chunk, node) {
            continue;
        }
        let ci = chunk_index[&chunk];
        let incoming: Vec<usize> = topology.in_edges(node).filter_map(|link| topology.edge_index(link)).collect();
        let sum: Expression = incoming.iter().fold(Expression::from(0.0), |acc, &e| acc + used[e][ci]);
        constraints.push(constraint!(sum == 1.0));
    }

    // 3. receive[v,c] <= T for (c,v) in postcondition.
    for (chunk, node) in collective.postcondition() {
        let ci = chunk_index[&chunk];
        constraints.push(constraint!(receive[node as usize][ci] <= t));
    }

    for e in 0..num_edges {
        let (link, _) = topology.edge_at(e);
        let delay = edge_delay[e];
        for ci in 0..chunks.len() {
            let u = used[e][ci];
            let s = send[e][ci];
            let r_dst = receive[link.dst as usize][ci];
            let r_src = receive[link.src as usize][ci];

            // 4. used=1 => receive[src,c] <= send[e,c].
            constraints.push(constraint!(s >= r_src - big_m + big_m * u));
            // 5. used=1 => send[e,c] + delay = receive[dst,c].
            constraints.push(constraint!(s + delay <= r_dst + big_m - big_m * u));
            constraints.push(constraint!(r_dst <= s + delay + big_m - big_m * u));
            // 6. used=0 => send[e,c] = M (upper bound already caps it at M).
            constraints.push(constraint!(s >= big_m - big_m * u));
        }

        for a in 0..chunks.len() {
            for b in (a + 1)..chunks.len() {
                let order_ab = order[&(e, a, b)];
                let order_ba = order[&(e, b, a)];
                let u2 = used2_by_pair[&(e, a, b)];
                let used_a = used[e][a];
                let used_b = used[e][b];
                let send_a = send[e][a];
                let send_b = send[e][b];

                // 7. exactly one order holds.
                constraints.push(constraint!(order_ab + order_ba == 1.0));
                // 8. used2 = used_a AND used_b.
                constraints.push(constraint!(u2 <= used_a));
                constraints.push(constraint!(u2 <= used_b));
                constraints.push(constraint!(u2 >= used_a + used_b - 1.0));
                // 9. serialization with slack >= delay when both used.
                constraints.push(constraint!(
                    send_a - send_b >= delay + big_m * order_ba + big_m * u2 - 2.0 * big_m
                ));
                constraints.push(constraint!(
                    send_b - send_a >= delay + big_m * order_ab + big_m * u2 - 2.0 * big_m
                ));
            }
        }
    }

    let mut model = vars.minimise(t).using(good_lp::solvers::coin_cbc::coin_cbc);
    for c in constraints {
        model = model.with(c);
    }
    model.set_parameter("sec", &time_limit.as_secs().to_string());

    tracing::info!(num_nodes, num_edges, num_chunks = chunks.len(), time_limit_secs = time_limit.as_secs(), "starting ilp solve");

    let solution = model.solve().map_err(|err| {
        tracing::error!(error = %err, "ilp solve did not produce a feasible incumbent");
        IlpError::TimeoutNoIncumbent { time_limit_secs: time_limit.as_secs() }
    })?;

    let makespan = solution.value(t);
    if !makespan.is_finite() {
        return Err(IlpError::NonFinite { context: "T" });
    }

    let mut event_history = Vec::new();
    for e in 0..num_edges {
        let (link, _) = topology.edge_at(e);
        let delay = edge_delay[e];
        for (ci, &chunk) in chunks.iter().enumerate() {
            if solution.value(used[e][ci]) > 0.5 {
                let send_time = solution.value(send[e][ci]).max(0.0);
                if !send_time.is_finite() {
                    return Err(IlpError::NonFinite { context: "send_time" });
                }
                event_history.push(Event { link, chunk, send_time, receive_time: send_time + delay });
            }
        }
    }
    // Commit order on the same edge follows send_time; order across edges
    // follows topology edge order, for deterministic CSV emission.
    event_history.sort_by(|a, b| {
        (a.link.src, a.link.dst).cmp(&(b.link.src, b.link.dst)).then(a.send_time.partial_cmp(&b.send_time).unwrap())
    });

    let actual_makespan = event_history.iter().map(|e| e.receive_time).fold(0.0_f64, f64::max);
    tracing::info!(makespan = actual_makespan, events = event_history.len(), "ilp synthesis complete");
    Ok(Schedule { event_history, makespan: actual_makespan })
}
