//! The five synthesizer policies (spec.md §4.5), all consuming the
//! [`crate::ten::Ten`] contract.

mod beam;
mod greedy_tacos;
mod multiple_tacos;
mod naive;
mod tacos;

pub use beam::{synthesize as beam, Fitness};
pub use greedy_tacos::synthesize as greedy_tacos;
pub use multiple_tacos::synthesize as multiple_tacos;
pub use naive::synthesize as naive;
pub use tacos::synthesize as tacos;

use rand::seq::SliceRandom;

use crate::error::ScheduleError;
use crate::event::Event;
use crate::ten::Ten;

/// The output every synthesizer produces: the committed event history and
/// its makespan (`Collective Time` in the external CSV contract), ready to
/// hand to the schedule writer.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub event_history: Vec<Event>,
    pub makespan: f64,
}

/// The policy shared by Naive and TACOS (spec.md §4.5): while unsatisfied,
/// commit a uniformly random productive match, or advance the clock if none
/// exists. Also the base rollout Multiple-TACOS runs to completion per
/// instance.
pub(crate) fn random_walk_to_satisfaction(ten: &mut Ten) -> Result<(), ScheduleError> {
    while !ten.satisfied() {
        let matches = ten.possible_matches();
        if let Some(&(link, chunk)) = matches.choose(ten.rng_mut()) {
            ten.commit_match(link, chunk)?;
        } else {
            ten.step()?;
        }
    }
    Ok(())
}
