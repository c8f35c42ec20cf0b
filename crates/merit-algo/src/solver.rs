//! Dispatch entry point.

use crate::extract::extract;
use crate::network::NetworkModel;
use crate::problem::DispatchProblem;
use crate::solve::{self, SolvePath};
use crate::types::{DispatchResult, SolveStatus};
use crate::{DispatchConfig, DispatchError};
use merit_core::{remove_isolated, Case, Diagnostics, GridError, Severity};
use tracing::{info, warn};
use web_time::Instant;

/// Runs one DC-OPF dispatch per call.
///
/// The solver holds configuration only; every call builds its own network
/// model and problem, so one solver can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct DispatchSolver {
    config: DispatchConfig,
}

impl DispatchSolver {
    /// Create a solver with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set value of lost load ($/MWh)
    pub fn with_voll(mut self, voll: f64) -> Self {
        self.config.voll = voll;
        self
    }

    /// Enable or disable line-limit enforcement
    pub fn with_line_limits(mut self, enforce: bool) -> Self {
        self.config.enforce_line_limits = enforce;
        self
    }

    pub fn with_remove_isolated(mut self, remove: bool) -> Self {
        self.config.remove_isolated = remove;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.config.solver.max_iterations = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.config.solver.tolerance = tol;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch `case`.
    ///
    /// Fails only on invalid configuration or a case that cannot be
    /// formulated (no buses, generators or lines, or an in-service unit whose
    /// Pmin exceeds its Pmax). A backend that stops short
    /// of optimality yields a [`SolveStatus::Suboptimal`] result.
    pub fn solve(&self, case: &Case) -> Result<DispatchResult, DispatchError> {
        let start = Instant::now();
        self.config.validate()?;
        case.ensure_dispatchable().map_err(structural)?;

        let mut diagnostics = Diagnostics::new();
        let mut removed_buses = Vec::new();
        let reduced;
        let case = if self.config.remove_isolated {
            let removal = remove_isolated(case)?;
            if !removal.removed_buses.is_empty() {
                diagnostics.add_warning(
                    "topology",
                    &format!(
                        "{} bus(es) not connected to the slack bus removed",
                        removal.removed_buses.len()
                    ),
                );
            }
            removed_buses = removal.removed_buses;
            reduced = removal.case;
            reduced.ensure_dispatchable().map_err(structural)?;
            &reduced
        } else {
            case
        };

        case.validate_into(&mut diagnostics);
        if let Some(issue) = diagnostics
            .issues_by_category("physical")
            .find(|issue| issue.severity == Severity::Error)
        {
            return Err(DispatchError::Structural(issue.to_string()));
        }

        let network = NetworkModel::build(case, &self.config, &mut diagnostics)?;
        let congested = self.config.enforce_line_limits && network.n_branch() > 0;
        let problem = DispatchProblem::build(case, &network, &self.config, congested)?;
        let solve_path = SolvePath::select(problem.class, congested);

        let raw = solve::run(&problem, &self.config.solver);
        let feasible = problem.max_violation(&raw.x) <= 10.0 * self.config.solver.tolerance;
        let status = if raw.optimal && feasible {
            SolveStatus::Optimal
        } else {
            SolveStatus::Suboptimal
        };

        let out = extract(case, &network, &problem, &raw);
        let solve_time_ms = start.elapsed().as_millis();

        if status == SolveStatus::Suboptimal {
            warn!(
                path = %solve_path,
                violation = problem.max_violation(&raw.x),
                "dispatch did not reach optimality"
            );
        }
        info!(
            path = %solve_path,
            status = %status,
            total_cost = out.total_cost,
            curtailment_mw = out.total_curtailment,
            iterations = raw.iterations,
            solve_time_ms = solve_time_ms as u64,
            "dispatch solved"
        );

        Ok(DispatchResult {
            status,
            solve_path,
            iterations: raw.iterations,
            solve_time_ms,
            total_cost: out.total_cost,
            objective_value: out.objective_value,
            total_curtailment: out.total_curtailment,
            generator_results: out.generator_results,
            bus_results: out.bus_results,
            line_results: out.line_results,
            binding_constraints: out.binding_constraints,
            removed_buses,
            diagnostics,
        })
    }
}

fn structural(err: GridError) -> DispatchError {
    match err {
        GridError::Structure(msg) => DispatchError::Structural(msg),
        other => other.into(),
    }
}
