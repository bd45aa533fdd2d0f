use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Pipeline-fatal conditions. Everything recoverable (a session missing
/// fields, a region without observations, a candidate ruled out by a hard
/// distance constraint) is handled by exclusion and never surfaces here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient sessions for a clock-offset median: have {have}, need 2")]
    InsufficientSessions { have: usize },
    #[error("no region produced a latency observation; no anchor selectable")]
    NoRegionLatency,
}
