use ccl_collective::Collective;
use ccl_topology::Topology;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::ScheduleError;
use crate::synth::{random_walk_to_satisfaction, Schedule};
use crate::ten::{Convention, Ten};

/// `num_instances` independent TACOS runs seeded from a single root seed;
/// returns the instance with the smallest final `current_time`. Instances
/// are fully independent after seeding (spec.md §5), so they run in
/// parallel via `rayon`.
pub fn synthesize(
    topology: &Topology,
    collective: &Collective,
    seed: u64,
    num_instances: usize,
) -> Result<Schedule, ScheduleError> {
    let mut root_rng = StdRng::seed_from_u64(seed);
    let sub_seeds: Vec<u64> = (0..num_instances).map(|_| root_rng.gen()).collect();

    let results: Vec<Result<Schedule, ScheduleError>> = sub_seeds
        .into_par_iter()
        .map(|sub_seed| {
            let mut ten = Ten::new(topology, collective, Convention::Forward, StdRng::seed_from_u64(sub_seed));
            random_walk_to_satisfaction(&mut ten)?;
            Ok(Schedule { event_history: ten.event_history().to_vec(), makespan: ten.current_time() })
        })
        .collect();

    let mut best: Option<Schedule> = None;
    for result in results {
        let schedule = result?;
        if best.as_ref().map(|b| schedule.makespan < b.makespan).unwrap_or(true) {
            best = Some(schedule);
        }
    }
    let best = best.expect("num_instances must be > 0");
    tracing::info!(
        num_instances,
        makespan = best.makespan,
        "multiple_tacos synthesis complete"
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;

    #[test]
    fn returns_the_best_of_n_instances() {
        let mut topo = Topology::new(4);
        topo.connect(0, 1, 1.0, 1.0).unwrap();
        topo.connect(1, 2, 1.0, 1.0).unwrap();
        topo.connect(2, 3, 1.0, 1.0).unwrap();
        topo.connect(0, 3, 5.0, 1.0).unwrap();
        let collective = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 42, 8).unwrap();
        assert!(schedule.makespan > 0.0);
    }
}
