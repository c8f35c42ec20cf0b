use merit_core::GridError;
use thiserror::Error;

/// Dispatch errors.
///
/// Only problems that make a formulation impossible are errors. A solver that
/// stops short of optimality still yields a
/// [`DispatchResult`](crate::DispatchResult) with a suboptimal status.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing buses, generators or lines
    #[error("Dispatch structural error: {0}")]
    Structural(String),

    /// Invalid configuration value
    #[error("Dispatch configuration error: {0}")]
    Config(String),

    /// The conic solver rejected the problem data before iterating
    #[error("Dispatch solver setup failed: {0}")]
    SolverSetup(String),

    /// Case loading, validation or topology error
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Session has no case loaded
    #[error("No case loaded")]
    NoCase,
}
