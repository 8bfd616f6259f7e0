use std::path::PathBuf;
use std::time::{Duration, Instant};

use ccl_collective::{Collective, UNIT_CHUNK_SIZE};
use ccl_topology::Topology;

/// Synthesize an execution schedule for a collective communication pattern
/// over a directed network of heterogeneous NPUs, then verify it.
#[derive(clap::Parser)]
#[command(rename_all = "snake_case")]
pub struct Cli {
    /// Topology: a built-in specifier (e.g. `fc__n=4__alpha=0__beta=1`) or a
    /// path to a topology CSV (spec.md §6).
    #[arg(long)]
    topology: String,

    /// Collective: `all_gather`, `all_to_all`, `scatter_<i>`, `gather_<i>`,
    /// `broadcast_<i>`, or a path to a collective JSON file.
    #[arg(long)]
    collective: String,

    #[arg(long, value_enum)]
    synthesizer: Synthesizer,

    /// Number of beams (Beam) or parallel instances (MultipleTacos).
    #[arg(long, default_value_t = 4)]
    num_beams: usize,

    /// Number of independent trials to run; the best (by makespan) is kept.
    #[arg(long, default_value_t = 1)]
    num_trials: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = FitnessType::ChunkCount)]
    fitness_type: FitnessType,

    #[arg(long, default_value_t = 0.0)]
    temperature: f64,

    /// Where to write the canonical schedule CSV.
    #[arg(long, default_value = "schedule.csv")]
    output: PathBuf,

    /// Wall-clock time limit, in seconds, for the ILP solver. Required when
    /// `--synthesizer ilp`.
    #[arg(long)]
    ilp_time_limit: Option<u64>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Synthesizer {
    Naive,
    Tacos,
    GreedyTacos,
    MultipleTacos,
    Beam,
    Ilp,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum FitnessType {
    ChunkCount,
    ShortestPath,
}

impl From<FitnessType> for ccl_ten::synth::Fitness {
    fn from(value: FitnessType) -> Self {
        match value {
            FitnessType::ChunkCount => ccl_ten::synth::Fitness::ChunkCount,
            FitnessType::ShortestPath => ccl_ten::synth::Fitness::ShortestPath,
        }
    }
}

fn load_topology(spec: &str) -> anyhow::Result<Topology> {
    if spec.ends_with(".csv") {
        Ok(Topology::load_from_csv(spec)?)
    } else {
        Ok(ccl_topology::get_topology(spec)?)
    }
}

/// Parse the `<name>_<i>` collective shortcut, returning the node index
/// argument the constructor needs.
fn parse_indexed(spec: &str, prefix: &str) -> Option<u32> {
    spec.strip_prefix(prefix).and_then(|rest| rest.parse().ok())
}

fn load_collective(spec: &str, topology: &Topology) -> anyhow::Result<Collective> {
    let n = topology.num_nodes() as u32;
    if spec.ends_with(".json") {
        return Ok(Collective::load_json(spec)?);
    }
    let collective = match spec {
        "all_gather" => Collective::all_gather(n, UNIT_CHUNK_SIZE, 1),
        "all_to_all" => Collective::all_to_all(n, UNIT_CHUNK_SIZE, 1),
        _ => {
            if let Some(src) = parse_indexed(spec, "scatter_") {
                Collective::scatter(src, n, UNIT_CHUNK_SIZE, 1)
            } else if let Some(dest) = parse_indexed(spec, "gather_") {
                Collective::gather(dest, n, UNIT_CHUNK_SIZE, 1)
            } else if let Some(src) = parse_indexed(spec, "broadcast_") {
                Collective::broadcast(src, n, UNIT_CHUNK_SIZE, 1)
            } else {
                anyhow::bail!("unknown collective name: {spec:?}");
            }
        }
    };
    collective.validate()?;
    Ok(collective)
}

/// Run the CLI: load inputs, synthesize, write the schedule, verify it.
/// Mirrors `anyhow::Result` all the way out to `main`'s exit-code mapping
/// (spec.md §6: exit code 0 on success, non-zero on verifier failure).
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let topology = load_topology(&cli.topology)?;
    let collective = load_collective(&cli.collective, &topology)?;

    let started = Instant::now();
    let schedule = match cli.synthesizer {
        Synthesizer::Naive => ccl_ten::synth::naive(&topology, &collective, cli.seed)?,
        Synthesizer::Tacos => ccl_ten::synth::tacos(&topology, &collective, cli.seed)?,
        Synthesizer::GreedyTacos => ccl_ten::synth::greedy_tacos(&topology, &collective, cli.seed)?,
        Synthesizer::MultipleTacos => {
            ccl_ten::synth::multiple_tacos(&topology, &collective, cli.seed, cli.num_trials.max(1) as usize)?
        }
        Synthesizer::Beam => ccl_ten::synth::beam(
            &topology,
            &collective,
            cli.seed,
            cli.num_beams.max(1),
            cli.fitness_type.into(),
            cli.temperature,
        )?,
        Synthesizer::Ilp => {
            let limit = cli
                .ilp_time_limit
                .ok_or_else(|| anyhow::anyhow!("--ilp_time_limit is required when --synthesizer ilp"))?;
            ccl_ilp::solve(&topology, &collective, Duration::from_secs(limit))?
        }
    };
    let synthesis_time_secs = started.elapsed().as_secs_f64();

    ccl_schedule::write_csv(&cli.output, &topology, &collective, &schedule, synthesis_time_secs)?;
    tracing::info!(
        synthesizer = ?cli.synthesizer,
        makespan = schedule.makespan,
        synthesis_time_secs,
        output = %cli.output.display(),
        "schedule synthesized"
    );

    if let Err(err) = ccl_schedule::verify(&cli.output, &topology, &collective) {
        let _ = std::fs::remove_file(&cli.output);
        anyhow::bail!("schedule verification failed: {err}");
    }
    tracing::info!("schedule verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_indexed_extracts_the_node_index() {
        assert_eq!(parse_indexed("scatter_3", "scatter_"), Some(3));
        assert_eq!(parse_indexed("gather_0", "gather_"), Some(0));
        assert_eq!(parse_indexed("scatter_3", "gather_"), None);
    }

    #[test]
    fn load_collective_builds_all_gather_from_topology_size() {
        let topo = Topology::new(4);
        let c = load_collective("all_gather", &topo).unwrap();
        assert_eq!(c.num_chunks(), 4);
    }

    #[test]
    fn load_collective_rejects_unknown_names() {
        let topo = Topology::new(4);
        assert!(load_collective("frobnicate", &topo).is_err());
    }
}
