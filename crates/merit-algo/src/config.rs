//! Dispatch configuration.
//!
//! Every knob the solve path reads lives here with a declared default, so a
//! TOML file only needs to mention what it changes:
//!
//! ```toml
//! voll = 5000.0
//! enforce_line_limits = false
//!
//! [solver]
//! max_iterations = 2000
//! ```

use crate::DispatchError;
use serde::{Deserialize, Serialize};

/// Iteration caps and tolerances shared by the solver backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Total iteration budget (interior-point iterations, or L-BFGS
    /// iterations summed over all augmented-Lagrangian rounds)
    pub max_iterations: usize,
    /// Constraint violation (per-unit) accepted as feasible
    pub tolerance: f64,
    /// Augmented-Lagrangian rounds before giving up on feasibility
    pub max_outer_iterations: usize,
    /// Starting penalty weight on the normalized objective
    pub initial_penalty: f64,
    /// Factor applied to the penalty when the violation stalls
    pub penalty_growth: f64,
    /// Penalty ceiling; beyond it the subproblem becomes ill-conditioned
    pub max_penalty: f64,
    /// Number of correction pairs kept by L-BFGS
    pub lbfgs_memory: usize,
    /// KKT residual of the cost-normalized problem accepted as optimal by
    /// the augmented-Lagrangian backend
    pub stationarity_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-6,
            max_outer_iterations: 30,
            initial_penalty: 100.0,
            penalty_growth: 10.0,
            max_penalty: 1e7,
            lbfgs_memory: 7,
            stationarity_tolerance: 1e-3,
        }
    }
}

/// Parameters of a single dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Value of lost load ($/MWh), the price of curtailing demand
    pub voll: f64,
    /// Formulate line-flow limits and curtailment variables
    pub enforce_line_limits: bool,
    /// Drop buses not connected to the slack before formulating
    pub remove_isolated: bool,
    /// Rating (MW) used for lines whose `rate_a` is zero or negative
    pub default_line_rating_mw: f64,
    /// Reactance (per-unit) used for lines whose `x` is zero or negative
    pub zero_reactance_default: f64,
    pub solver: SolverSettings,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            voll: 10_000.0,
            enforce_line_limits: true,
            remove_isolated: false,
            default_line_rating_mw: 250.0,
            zero_reactance_default: 0.01,
            solver: SolverSettings::default(),
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voll(mut self, voll: f64) -> Self {
        self.voll = voll;
        self
    }

    pub fn with_line_limits(mut self, enforce: bool) -> Self {
        self.enforce_line_limits = enforce;
        self
    }

    pub fn with_remove_isolated(mut self, remove: bool) -> Self {
        self.remove_isolated = remove;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.solver.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.solver.tolerance = tol;
        self
    }

    pub fn with_solver_settings(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    /// Reject values no solve path can work with.
    pub fn validate(&self) -> Result<(), DispatchError> {
        fn positive(name: &str, value: f64) -> Result<(), DispatchError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(DispatchError::Config(format!(
                    "{} must be positive and finite (got {})",
                    name, value
                )))
            }
        }

        positive("voll", self.voll)?;
        positive("default_line_rating_mw", self.default_line_rating_mw)?;
        positive("zero_reactance_default", self.zero_reactance_default)?;
        positive("solver.tolerance", self.solver.tolerance)?;
        positive("solver.initial_penalty", self.solver.initial_penalty)?;
        positive("solver.max_penalty", self.solver.max_penalty)?;
        positive(
            "solver.stationarity_tolerance",
            self.solver.stationarity_tolerance,
        )?;

        if self.solver.max_iterations == 0 {
            return Err(DispatchError::Config(
                "solver.max_iterations must be at least 1".into(),
            ));
        }
        if self.solver.max_outer_iterations == 0 {
            return Err(DispatchError::Config(
                "solver.max_outer_iterations must be at least 1".into(),
            ));
        }
        if self.solver.lbfgs_memory == 0 {
            return Err(DispatchError::Config(
                "solver.lbfgs_memory must be at least 1".into(),
            ));
        }
        if !(self.solver.penalty_growth.is_finite() && self.solver.penalty_growth > 1.0) {
            return Err(DispatchError::Config(format!(
                "solver.penalty_growth must exceed 1 (got {})",
                self.solver.penalty_growth
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.voll, 10_000.0);
        assert!(config.enforce_line_limits);
        assert!(!config.remove_isolated);
        assert_eq!(config.default_line_rating_mw, 250.0);
        assert_eq!(config.solver.max_iterations, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::new()
            .with_voll(3000.0)
            .with_line_limits(false)
            .with_remove_isolated(true)
            .with_max_iterations(200)
            .with_tolerance(1e-5);
        assert_eq!(config.voll, 3000.0);
        assert!(!config.enforce_line_limits);
        assert!(config.remove_isolated);
        assert_eq!(config.solver.max_iterations, 200);
        assert_eq!(config.solver.tolerance, 1e-5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(DispatchConfig::new().with_voll(0.0).validate().is_err());
        assert!(DispatchConfig::new().with_voll(f64::NAN).validate().is_err());
        assert!(DispatchConfig::new().with_max_iterations(0).validate().is_err());

        let mut config = DispatchConfig::new();
        config.solver.penalty_growth = 1.0;
        assert!(matches!(config.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config: DispatchConfig = toml::from_str(
            r#"
            voll = 5000.0

            [solver]
            max_iterations = 2000
            "#,
        )
        .unwrap();
        assert_eq!(config.voll, 5000.0);
        assert!(config.enforce_line_limits);
        assert_eq!(config.solver.max_iterations, 2000);
        assert_eq!(config.solver.tolerance, 1e-6);
    }
}
