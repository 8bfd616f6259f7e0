use ccl_collective::Collective;
use ccl_topology::Topology;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ScheduleError;
use crate::synth::{random_walk_to_satisfaction, Schedule};
use crate::ten::{Convention, Ten};

/// At each step, if productive matches exist pick one uniformly at random
/// and commit it; otherwise advance the clock. Forward convention.
pub fn synthesize(topology: &Topology, collective: &Collective, seed: u64) -> Result<Schedule, ScheduleError> {
    let mut ten = Ten::new(topology, collective, Convention::Forward, StdRng::seed_from_u64(seed));
    random_walk_to_satisfaction(&mut ten)?;
    tracing::info!(makespan = ten.current_time(), events = ten.event_history().len(), "naive synthesis complete");
    Ok(Schedule { event_history: ten.event_history().to_vec(), makespan: ten.current_time() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;

    #[test]
    fn synthesizes_a_satisfying_schedule_for_a_scatter() {
        let mut topo = Topology::new(3);
        topo.connect(0, 1, 1.0, 1.0).unwrap();
        topo.connect(0, 2, 1.0, 1.0).unwrap();
        let collective = Collective::scatter(0, 3, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 7).unwrap();
        assert_eq!(schedule.event_history.len(), 2);
        assert!(schedule.makespan > 0.0);
    }

    #[test]
    fn reports_deadlock_on_disconnected_topology() {
        let topo = Topology::new(2);
        let collective = Collective::scatter(0, 2, UNIT_CHUNK_SIZE, 1);
        let err = synthesize(&topo, &collective, 0).unwrap_err();
        assert_matches::assert_matches!(err, ScheduleError::Deadlock { .. });
    }
}
