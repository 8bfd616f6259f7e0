use ccl_collective::{Collective, NodeId};
use ccl_topology::Topology;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distance::all_pairs_shortest_delay;
use crate::error::ScheduleError;
use crate::synth::Schedule;
use crate::ten::{Convention, Ten};

/// The two fitness functions beam search can score a population by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fitness {
    /// Total chunks possessed across all nodes at `current_time` — larger
    /// is better.
    ChunkCount,
    /// Negated maximum, over `(chunk, dst)` in the postcondition, of the
    /// shortest remaining delay from any node currently holding that chunk
    /// to `dst`.
    ShortestPath,
}

/// Maintains a population of `num_beams` TEN clones, repeatedly expanding
/// each unsatisfied instance into `num_beams` descendants via a random
/// rollout and selecting the next generation by `fitness`.
pub fn synthesize(
    topology: &Topology,
    collective: &Collective,
    seed: u64,
    num_beams: usize,
    fitness: Fitness,
    temperature: f64,
) -> Result<Schedule, ScheduleError> {
    let dist = match fitness {
        Fitness::ShortestPath => Some(all_pairs_shortest_delay(topology, collective.chunk_size())),
        Fitness::ChunkCount => None,
    };

    let mut root_rng = StdRng::seed_from_u64(seed);
    let mut population: Vec<Ten> = (0..num_beams)
        .map(|_| Ten::new(topology, collective, Convention::Forward, StdRng::seed_from_u64(root_rng.gen())))
        .collect();

    while !population.iter().all(Ten::satisfied) {
        let mut descendants: Vec<Ten> = Vec::new();
        let mut any_unsatisfied = false;
        let mut progressed = false;

        for instance in population.iter_mut() {
            if instance.satisfied() {
                descendants.push(instance.clone());
                continue;
            }
            any_unsatisfied = true;
            let parent_len = instance.event_history().len();
            for _ in 0..num_beams {
                let mut child = instance.clone();
                let sub_seed: u64 = instance.rng_mut().gen();
                *child.rng_mut() = StdRng::seed_from_u64(sub_seed);
                rollout(&mut child)?;
                if child.event_history().len() > parent_len {
                    progressed = true;
                }
                descendants.push(child);
            }
        }

        if any_unsatisfied && !progressed {
            // Open question (b): every descendant of every unsatisfied
            // parent committed nothing this round. Force one step on each
            // unsatisfied parent directly and re-roll rather than stalling.
            for instance in population.iter_mut() {
                if !instance.satisfied() {
                    instance.step()?;
                }
            }
            continue;
        }

        let scores: Vec<f64> = descendants.iter().map(|d| fitness_score(d, fitness, dist.as_deref())).collect();
        population = select(descendants, scores, num_beams, temperature, &mut root_rng);
    }

    let best = population
        .into_iter()
        .min_by(|a, b| a.current_time().partial_cmp(&b.current_time()).unwrap())
        .expect("num_beams must be > 0");
    tracing::info!(num_beams, makespan = best.current_time(), "beam synthesis complete");
    Ok(Schedule { event_history: best.event_history().to_vec(), makespan: best.current_time() })
}

/// Repeatedly commit a uniformly random productive match until either a
/// committed match leaves no further productive match at the same
/// `current_time` (then one `step`), or the instance becomes satisfied.
fn rollout(ten: &mut Ten) -> Result<(), ScheduleError> {
    loop {
        if ten.satisfied() {
            return Ok(());
        }
        let matches = ten.possible_matches();
        if matches.is_empty() {
            ten.step()?;
            return Ok(());
        }
        let idx = ten.rng_mut().gen_range(0..matches.len());
        let (link, chunk) = matches[idx];
        ten.commit_match(link, chunk)?;
        if ten.satisfied() {
            return Ok(());
        }
        if ten.possible_matches().is_empty() {
            ten.step()?;
            return Ok(());
        }
    }
}

fn fitness_score(ten: &Ten, fitness: Fitness, dist: Option<&[Vec<f64>]>) -> f64 {
    match fitness {
        Fitness::ChunkCount => ten.total_chunks_possessed() as f64,
        Fitness::ShortestPath => {
            let dist = dist.expect("shortest_path fitness requires a distance table");
            let num_nodes = ten.topology().num_nodes();
            let worst = ten
                .collective()
                .postcondition()
                .map(|(chunk, dst)| {
                    (0..num_nodes as NodeId)
                        .filter(|&v| ten.chunks_at(v, ten.current_time()).any(|c| c == chunk))
                        .map(|v| dist[v as usize][dst as usize])
                        .fold(f64::INFINITY, f64::min)
                })
                .fold(0.0_f64, f64::max);
            -worst
        }
    }
}

/// `temperature == 0`: keep the top-`num_beams` by score. Otherwise: sample
/// `num_beams` without replacement, weighted by `softmax(score / temperature)`
/// (shifted by the max score for numerical stability).
fn select(
    descendants: Vec<Ten>,
    scores: Vec<f64>,
    num_beams: usize,
    temperature: f64,
    rng: &mut StdRng,
) -> Vec<Ten> {
    let mut items: Vec<(Ten, f64)> = descendants.into_iter().zip(scores).collect();

    if temperature == 0.0 {
        // Top-N by partition, not a total sort (spec.md §4.5), mirroring the
        // original's `np.argpartition`.
        let n = num_beams.min(items.len());
        if n > 0 {
            items.select_nth_unstable_by(n - 1, |a, b| b.1.partial_cmp(&a.1).unwrap());
        }
        items.truncate(n);
        return items.into_iter().map(|(t, _)| t).collect();
    }

    let max_score = items.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    let mut selected = Vec::with_capacity(num_beams);
    for _ in 0..num_beams.min(items.len()) {
        let weights: Vec<f64> = items.iter().map(|(_, s)| ((s - max_score) / temperature).exp()).collect();
        let weighted = WeightedIndex::new(&weights).expect("at least one positive weight after max-shift");
        let idx = weighted.sample(rng);
        selected.push(items.remove(idx).0);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_collective::UNIT_CHUNK_SIZE;

    fn line_topology() -> Topology {
        let mut t = Topology::new(4);
        t.connect(0, 1, 1.0, 1.0).unwrap();
        t.connect(1, 2, 1.0, 1.0).unwrap();
        t.connect(2, 3, 1.0, 1.0).unwrap();
        t
    }

    #[test]
    fn chunk_count_fitness_synthesizes_a_satisfying_schedule() {
        let topo = line_topology();
        let collective = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 5, 3, Fitness::ChunkCount, 0.0).unwrap();
        assert!(schedule.makespan > 0.0);
        assert_eq!(schedule.event_history.len(), 3);
    }

    #[test]
    fn shortest_path_fitness_synthesizes_a_satisfying_schedule() {
        let topo = line_topology();
        let collective = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 5, 3, Fitness::ShortestPath, 1.0).unwrap();
        assert!(schedule.makespan > 0.0);
    }

    #[test]
    fn positive_temperature_still_converges() {
        let topo = line_topology();
        let collective = Collective::broadcast(0, 4, UNIT_CHUNK_SIZE, 1);
        let schedule = synthesize(&topo, &collective, 11, 4, Fitness::ChunkCount, 2.0).unwrap();
        assert_eq!(schedule.event_history.len(), 3);
    }
}
