use crate::numerics::solver::SolverError;
use thiserror::Error;

/// Failures that end a simulation run.
///
/// A single CFL violation is not an error: the controller shrinks the step and
/// redoes it. Only a second consecutive violation surfaces as
/// [`SimulationError::CflDivergence`].
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("{equation} equation failed to solve: {source}")]
    SolverDivergence {
        equation: &'static str,
        #[source]
        source: SolverError,
    },
    #[error("CFL condition violated on two consecutive attempts at step {step} (dt = {dt:.3e})")]
    CflDivergence { step: usize, dt: f64 },
    #[error("failed to write snapshot: {0}")]
    Snapshot(#[from] std::io::Error),
    #[error("failed to read parameters: {0}")]
    Params(#[from] serde_json::Error),
}

impl SimulationError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimulationError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
