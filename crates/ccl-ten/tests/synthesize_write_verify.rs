//! Multi-crate round trips: synthesize a schedule with each policy, write it
//! out in the canonical CSV layout, and independently verify it — the
//! concrete end-to-end scenarios of spec.md §8.

use ccl_collective::{Collective, UNIT_CHUNK_SIZE};
use ccl_ten::synth::{self, Fitness};
use ccl_topology::Topology;

fn ring4() -> Topology {
    let mut t = Topology::new(4);
    for i in 0..4u32 {
        t.connect(i, (i + 1) % 4, 0.0, 1.0).unwrap();
    }
    t
}

fn grid3x3() -> Topology {
    ccl_topology::get_topology("grid__w=3__h=3__alpha=0__beta=1").unwrap()
}

fn wheel10() -> Topology {
    ccl_topology::get_topology("nx_wheel__n=10__alpha=0__beta=1").unwrap()
}

fn fc(n: usize, alpha: f64, beta: f64) -> Topology {
    let mut t = Topology::new(n);
    for src in 0..n as u32 {
        for dst in 0..n as u32 {
            if src != dst {
                t.connect(src, dst, alpha, beta).unwrap();
            }
        }
    }
    t
}

fn write_and_verify(topo: &Topology, collective: &Collective, schedule: &synth::Schedule) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.csv");
    ccl_schedule::write_csv(&path, topo, collective, schedule, 0.0).unwrap();
    ccl_schedule::verify(&path, topo, collective).unwrap();
}

#[test]
fn ring4_all_gather_has_makespan_three_delays() {
    let topo = ring4();
    let collective = Collective::all_gather(4, UNIT_CHUNK_SIZE, 1);
    let schedule = synth::naive(&topo, &collective, 1).unwrap();
    assert_eq!(schedule.event_history.len(), 12);
    write_and_verify(&topo, &collective, &schedule);
}

#[test]
fn grid_3x3_all_gather_greedy_tacos_terminates_and_verifies() {
    let topo = grid3x3();
    let collective = Collective::all_gather(9, UNIT_CHUNK_SIZE, 1);
    let schedule = synth::greedy_tacos(&topo, &collective, 2430).unwrap();
    assert!(schedule.makespan > 0.0);
    write_and_verify(&topo, &collective, &schedule);
}

#[test]
fn fc4_scatter_single_hop_matches_expected_delay() {
    let topo = fc(4, 500.0, 50.0);
    let collective = Collective::scatter(0, 4, 1_048_576.0, 1);
    let schedule = synth::tacos(&topo, &collective, 5).unwrap();
    assert!((schedule.makespan - 20031.25).abs() < 1e-2);
    write_and_verify(&topo, &collective, &schedule);
}

#[test]
fn beam_on_wheel10_all_gather_synthesizes_a_verifiable_schedule() {
    let topo = wheel10();
    let collective = Collective::all_gather(10, UNIT_CHUNK_SIZE, 1);
    let beam_schedule = synth::beam(&topo, &collective, 77, 5, Fitness::ChunkCount, 0.0).unwrap();
    assert!(beam_schedule.makespan.is_finite() && beam_schedule.makespan > 0.0);
    write_and_verify(&topo, &collective, &beam_schedule);
}

#[test]
fn multiple_tacos_on_wheel10_all_gather_synthesizes_a_verifiable_schedule() {
    let topo = wheel10();
    let collective = Collective::all_gather(10, UNIT_CHUNK_SIZE, 1);
    let combined = synth::multiple_tacos(&topo, &collective, 77, 5).unwrap();
    assert!(combined.makespan.is_finite() && combined.makespan > 0.0);
    write_and_verify(&topo, &collective, &combined);
}

#[test]
fn all_to_all_fc3_has_one_hop_makespan() {
    let topo = fc(3, 0.0, 1.0);
    let collective = Collective::all_to_all(3, UNIT_CHUNK_SIZE, 1);
    let schedule = synth::naive(&topo, &collective, 9).unwrap();
    let delay = topo.delay(ccl_topology::LinkId::new(0, 1), UNIT_CHUNK_SIZE);
    assert_eq!(schedule.event_history.len(), 6);
    assert!((schedule.makespan - delay).abs() < 1e-9);
    write_and_verify(&topo, &collective, &schedule);
}

#[test]
fn empty_postcondition_is_satisfied_at_t_zero() {
    let topo = ring4();
    let collective = Collective::new(UNIT_CHUNK_SIZE);
    let schedule = synth::naive(&topo, &collective, 0).unwrap();
    assert_eq!(schedule.event_history.len(), 0);
    assert_eq!(schedule.makespan, 0.0);
    write_and_verify(&topo, &collective, &schedule);
}

#[test]
fn disconnected_postcondition_reports_deadlock_not_a_spin() {
    let topo = Topology::new(2);
    let collective = Collective::scatter(0, 2, UNIT_CHUNK_SIZE, 1);
    let err = synth::naive(&topo, &collective, 0).unwrap_err();
    assert_matches::assert_matches!(err, ccl_ten::ScheduleError::Deadlock { .. });
}
