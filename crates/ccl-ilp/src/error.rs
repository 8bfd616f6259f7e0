/// Failures raised while encoding or solving the ILP (spec §7 kind 5).
#[derive(Debug, thiserror::Error)]
pub enum IlpError {
    #[error("ILP timed out after {time_limit_secs}s with no feasible incumbent")]
    TimeoutNoIncumbent { time_limit_secs: u64 },

    #[error("ILP returned a non-finite value for {context}")]
    NonFinite { context: &'static str },
}
