use ccl_collective::Collective;
use ccl_topology::Topology;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ScheduleError;
use crate::synth::Schedule;
use crate::ten::{Convention, Ten};

/// Backward convention: considers links free at `current_time - delay(e)`
/// with a chunk already at the source by then, and deterministically
/// commits the match whose link has the smallest delay (ties broken by
/// `(src, dst, chunk)` order, since the RNG plays no role in this policy).
pub fn synthesize(topology: &Topology, collective: &Collective, seed: u64) -> Result<Schedule, ScheduleError> {
    let mut ten = Ten::new(topology, collective, Convention::Backward, StdRng::seed_from_u64(seed));
    while !ten.satisfied() {
        let matches = ten.possible_matches();
        let best = matches.into_iter().min_by(|&(link_a, chunk_a), &(link_b, chunk_b)| {
            let delay_a = topology.delay(link_a, collective.chunk_size());
            let delay_b = topology.delay(link_b, collective.chunk_size());
            delay_a
                .partial_cmp(&delay_b)
                .unwrap()
                .then((link_a.src, link_a.dst, chunk_a).cmp(&(link_b.src, link_b.dst, chunk_b)))
        });
        match best {
            Some((link, chunk)) => ten.commit_match(link, chunk)?,
            None => ten.step()?,
        }
    }
    tracing::info!(makespan = ten.current_time(), events = ten.event_history().len(), "greedy_tacos synthesis complete");
    Ok(Schedule { event_history: ten.event_history().to_vec(), makespan: ten.current_time() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;

    #[test]
    fn prefers_the_lowest_delay_link_when_multiple_are_productive() {
        let mut topo = Topology::new(3);
        topo.connect(0, 1, 10.0, 1.0).unwrap();
        topo.connect(0, 2, 1.0, 1.0).unwrap();
        let collective = Collective::all_gather(3, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 1).unwrap();
        assert!(!schedule.event_history.is_empty());
    }

    #[test]
    fn is_fully_deterministic_given_a_seed() {
        let mut topo = Topology::new(4);
        topo.connect(0, 1, 1.0, 1.0).unwrap();
        topo.connect(1, 2, 1.0, 1.0).unwrap();
        topo.connect(2, 3, 1.0, 1.0).unwrap();
        let collective = Collective::scatter(0, 4, UNIT_CHUNK_SIZE, 1);
        let a = synthesize(&topo, &collective, 3).unwrap();
        let b = synthesize(&topo, &collective, 3).unwrap();
        assert_eq!(a.makespan, b.makespan);
    }
}
