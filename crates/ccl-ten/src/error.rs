use ccl_collective::ChunkId;
use ccl_topology::LinkId;

/// Failures raised while driving a [`crate::ten::Ten`] or a synthesizer
/// built on top of it (spec §7 kinds 2, 3, 6).
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("match({link:?}, chunk {chunk}) attempted at t={current_time} but the match is not productive")]
    NonProductiveMatch { link: LinkId, chunk: ChunkId, current_time: f64 },

    #[error("no progress possible: no productive match exists and no future event time is scheduled (current_time={current_time})")]
    Deadlock { current_time: f64 },

    #[error("non-finite time encountered: {context} = {value}")]
    NonFiniteTime { context: &'static str, value: f64 },
}
