//! Solve-path selection and the backends behind it.
//!
//! | Path | Cost | Line limits | Backend |
//! |------|------|-------------|---------|
//! | [`SolvePath::LpCongested`] | linear | yes | [`ClarabelBackend`] |
//! | [`SolvePath::QpCongested`] | quadratic | yes | [`AugmentedLagrangianBackend`] |
//! | [`SolvePath::LpUncongested`] | linear | no | [`ClarabelBackend`] |
//! | [`SolvePath::QpUncongested`] | quadratic | no | [`AugmentedLagrangianBackend`] |
//!
//! Backends are matched to the problem by [`ProblemClass`]. Each one reports
//! its multipliers in its own sign convention; [`Multipliers`] carries the
//! convention so price extraction can normalize them.

pub mod augmented;
pub mod clarabel;

pub use augmented::AugmentedLagrangianBackend;
pub use self::clarabel::ClarabelBackend;

use crate::merit;
use crate::problem::{DispatchProblem, ProblemClass};
use crate::{DispatchError, SolverSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolvePath {
    LpCongested,
    QpCongested,
    LpUncongested,
    QpUncongested,
}

impl SolvePath {
    pub fn select(class: ProblemClass, congested: bool) -> Self {
        match (class, congested) {
            (ProblemClass::LinearProgram, true) => SolvePath::LpCongested,
            (ProblemClass::QuadraticProgram, true) => SolvePath::QpCongested,
            (ProblemClass::LinearProgram, false) => SolvePath::LpUncongested,
            (ProblemClass::QuadraticProgram, false) => SolvePath::QpUncongested,
        }
    }

    pub fn is_congested(&self) -> bool {
        matches!(self, SolvePath::LpCongested | SolvePath::QpCongested)
    }
}

impl fmt::Display for SolvePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePath::LpCongested => write!(f, "lp-congested"),
            SolvePath::QpCongested => write!(f, "qp-congested"),
            SolvePath::LpUncongested => write!(f, "lp-uncongested"),
            SolvePath::QpUncongested => write!(f, "qp-uncongested"),
        }
    }
}

/// Sign convention of a backend's multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierConvention {
    /// Conic dual `z` of `Ax + s = b`: stationarity reads `∇f + Aᵀz = 0`,
    /// so the balance dual is the negated system price.
    ConicDual,
    /// Lagrangian `f - ν·g + Σ μ·c`: the balance multiplier is the system
    /// price as is.
    Penalty,
}

impl MultiplierConvention {
    /// System price ($/h per pu) from the raw balance multiplier.
    pub fn system_price(&self, balance: f64) -> f64 {
        match self {
            MultiplierConvention::ConicDual => -balance,
            MultiplierConvention::Penalty => balance,
        }
    }
}

/// Multipliers of the balance row and the two line-limit blocks, in decision
/// units ($/h per pu).
#[derive(Debug, Clone)]
pub struct Multipliers {
    pub convention: MultiplierConvention,
    pub balance: f64,
    /// Rows `H x - d ≤ rate`, one per branch (≥ 0)
    pub line_upper: Vec<f64>,
    /// Rows `-(H x - d) ≤ rate`, one per branch (≥ 0)
    pub line_lower: Vec<f64>,
}

impl Multipliers {
    pub fn zero(convention: MultiplierConvention, n_lines: usize) -> Self {
        Self {
            convention,
            balance: 0.0,
            line_upper: vec![0.0; n_lines],
            line_lower: vec![0.0; n_lines],
        }
    }
}

/// What a backend hands back: primal point, duals and how it went.
#[derive(Debug, Clone)]
pub struct RawSolution {
    pub x: Vec<f64>,
    pub multipliers: Multipliers,
    /// True when the backend reached its optimality criteria
    pub optimal: bool,
    pub iterations: usize,
}

/// Implements the actual solving of a formulated dispatch.
pub trait DispatchBackend: Send + Sync {
    /// Unique identifier ("clarabel", "augmented-lagrangian")
    fn id(&self) -> &str;

    /// Problem classes this backend can solve
    fn supported_classes(&self) -> &[ProblemClass];

    fn solve(
        &self,
        problem: &DispatchProblem,
        settings: &SolverSettings,
        warm_start: &[f64],
    ) -> Result<RawSolution, DispatchError>;
}

/// Backend registered for `class`.
pub fn backend_for(class: ProblemClass) -> Box<dyn DispatchBackend> {
    let clarabel = ClarabelBackend;
    if clarabel.supported_classes().contains(&class) {
        Box::new(clarabel)
    } else {
        Box::new(AugmentedLagrangianBackend)
    }
}

/// Run the backend for `problem`, never failing.
///
/// Setup errors and non-finite primal points degrade to the merit-order
/// starting point with a non-optimal flag.
pub fn run(problem: &DispatchProblem, settings: &SolverSettings) -> RawSolution {
    let start = merit::initial_guess(problem);
    let backend = backend_for(problem.class);
    let n_lines = problem.lines.as_ref().map_or(0, |l| l.len());

    match backend.solve(problem, settings, &start) {
        Ok(raw) if raw.x.len() == problem.n_var() && raw.x.iter().all(|v| v.is_finite()) => raw,
        Ok(raw) => {
            warn!(backend = backend.id(), "backend returned a non-finite point; using merit-order start");
            RawSolution {
                x: start,
                multipliers: Multipliers::zero(raw.multipliers.convention, n_lines),
                optimal: false,
                iterations: raw.iterations,
            }
        }
        Err(err) => {
            warn!(backend = backend.id(), error = %err, "backend failed; using merit-order start");
            RawSolution {
                x: start,
                multipliers: Multipliers::zero(MultiplierConvention::Penalty, n_lines),
                optimal: false,
                iterations: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_selection() {
        assert_eq!(
            SolvePath::select(ProblemClass::LinearProgram, true),
            SolvePath::LpCongested
        );
        assert_eq!(
            SolvePath::select(ProblemClass::QuadraticProgram, false),
            SolvePath::QpUncongested
        );
        assert!(SolvePath::QpCongested.is_congested());
        assert!(!SolvePath::LpUncongested.is_congested());
        assert_eq!(SolvePath::LpUncongested.to_string(), "lp-uncongested");
    }

    #[test]
    fn test_backend_matching() {
        assert_eq!(backend_for(ProblemClass::LinearProgram).id(), "clarabel");
        assert_eq!(
            backend_for(ProblemClass::QuadraticProgram).id(),
            "augmented-lagrangian"
        );
    }

    #[test]
    fn test_conventions_agree_on_price() {
        assert_eq!(MultiplierConvention::ConicDual.system_price(-2000.0), 2000.0);
        assert_eq!(MultiplierConvention::Penalty.system_price(2000.0), 2000.0);
    }

    #[test]
    fn test_backends_are_object_safe() {
        fn _assert_send<T: Send>() {}
        fn _assert_sync<T: Sync>() {}
        _assert_send::<Box<dyn DispatchBackend>>();
        _assert_sync::<Box<dyn DispatchBackend>>();
    }
}
