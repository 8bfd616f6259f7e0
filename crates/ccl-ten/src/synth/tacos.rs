use ccl_collective::Collective;
use ccl_topology::Topology;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ScheduleError;
use crate::synth::{random_walk_to_satisfaction, Schedule};
use crate::ten::{Convention, Ten};

/// Same loop as Naive, forward convention, but run through a [`Ten`] whose
/// RNG is captured independently in the instance — the entry point
/// Multiple-TACOS and Beam clone and reseed per sub-instance.
pub fn synthesize(topology: &Topology, collective: &Collective, seed: u64) -> Result<Schedule, ScheduleError> {
    let mut ten = Ten::new(topology, collective, Convention::Forward, StdRng::seed_from_u64(seed));
    random_walk_to_satisfaction(&mut ten)?;
    tracing::info!(makespan = ten.current_time(), events = ten.event_history().len(), "tacos synthesis complete");
    Ok(Schedule { event_history: ten.event_history().to_vec(), makespan: ten.current_time() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;

    #[test]
    fn same_seed_is_deterministic() {
        let mut topo = Topology::new(4);
        topo.connect(0, 1, 1.0, 1.0).unwrap();
        topo.connect(1, 2, 1.0, 1.0).unwrap();
        topo.connect(2, 3, 1.0, 1.0).unwrap();
        topo.connect(0, 2, 2.0, 1.0).unwrap();
        let collective = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 1);
        let a = synthesize(&topo, &collective, 99).unwrap();
        let b = synthesize(&topo, &collective, 99).unwrap();
        assert_eq!(a.makespan, b.makespan);
        assert_eq!(a.event_history.len(), b.event_history.len());
    }
}
