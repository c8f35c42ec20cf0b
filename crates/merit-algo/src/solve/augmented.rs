//! Augmented-Lagrangian backend for quadratic-cost dispatch.
//!
//! The constrained problem is turned into a sequence of unconstrained
//! subproblems, each minimized with L-BFGS (More–Thuente line search):
//!
//! ```text
//! L_ρ(x) = f(x)/s − ν·g(x) + (ρ/2)·g(x)²
//!        + Σ_j [ max(0, μ_j + ρ·c_j(x))² − μ_j² ] / (2ρ)
//!
//! g(x)   = Σ x − demand                   (balance)
//! c_j(x) ≤ 0                              (bounds and line limits)
//! s      = objective scale
//! ```
//!
//! After each subproblem the multipliers are updated
//! (`ν ← ν − ρ·g`, `μ_j ← max(0, μ_j + ρ·c_j)`) and ρ grows when the
//! violation stops shrinking. The last iterate is projected onto its bounds
//! and the balance residual redistributed in merit order.
//!
//! A run is optimal only when the last iterate is feasible, the last L-BFGS
//! round stopped on its own convergence test rather than the iteration cap,
//! and the KKT residual of the normalized problem is within
//! [`SolverSettings::stationarity_tolerance`].
//!
//! The multipliers returned follow [`MultiplierConvention::Penalty`]: at a
//! solution `∇f = ν·1 − Σ (μ⁺ − μ⁻)·H`, so ν is the system price.

use super::{DispatchBackend, MultiplierConvention, Multipliers, RawSolution};
use crate::merit;
use crate::problem::{DispatchProblem, ProblemClass};
use crate::{DispatchError, SolverSettings};
use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use tracing::debug;

/// Violation must shrink by at least this factor per round to keep ρ fixed.
const REQUIRED_DECREASE: f64 = 0.25;

/// L-BFGS gradient tolerance as a fraction of the stationarity tolerance.
const INNER_GRAD_FRACTION: f64 = 0.01;

/// Quasi-Newton backend, always available.
pub struct AugmentedLagrangianBackend;

/// Multiplier estimates for every inequality family.
#[derive(Debug, Clone)]
struct InequalityMultipliers {
    upper_bound: Vec<f64>,
    lower_bound: Vec<f64>,
    line_upper: Vec<f64>,
    line_lower: Vec<f64>,
}

impl InequalityMultipliers {
    fn zeros(n_var: usize, n_lines: usize) -> Self {
        Self {
            upper_bound: vec![0.0; n_var],
            lower_bound: vec![0.0; n_var],
            line_upper: vec![0.0; n_lines],
            line_lower: vec![0.0; n_lines],
        }
    }
}

#[inline]
fn phr_weight(mu: f64, rho: f64, c: f64) -> f64 {
    (mu + rho * c).max(0.0)
}

#[inline]
fn phr_term(mu: f64, rho: f64, c: f64) -> f64 {
    let w = phr_weight(mu, rho, c);
    (w * w - mu * mu) / (2.0 * rho)
}

/// One augmented-Lagrangian subproblem with frozen multipliers and penalty.
struct Subproblem<'a> {
    problem: &'a DispatchProblem,
    scale: f64,
    rho: f64,
    nu: f64,
    mu: &'a InequalityMultipliers,
}

impl<'a> Subproblem<'a> {
    fn line_flows(&self, x: &[f64]) -> Vec<f64> {
        self.problem
            .lines
            .as_ref()
            .map(|lines| lines.flows(x))
            .unwrap_or_default()
    }
}

impl<'a> CostFunction for Subproblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let p = self.problem;
        let rho = self.rho;

        let g = p.balance_residual(x);
        let mut value = p.objective(x) / self.scale - self.nu * g + 0.5 * rho * g * g;

        for (i, xi) in x.iter().enumerate() {
            if p.upper[i].is_finite() {
                value += phr_term(self.mu.upper_bound[i], rho, xi - p.upper[i]);
            }
            if p.lower[i].is_finite() {
                value += phr_term(self.mu.lower_bound[i], rho, p.lower[i] - xi);
            }
        }

        if let Some(lines) = &p.lines {
            for (k, flow) in self.line_flows(x).iter().enumerate() {
                value += phr_term(self.mu.line_upper[k], rho, flow - lines.rating[k]);
                value += phr_term(self.mu.line_lower[k], rho, -flow - lines.rating[k]);
            }
        }

        Ok(value)
    }
}

impl<'a> Gradient for Subproblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let p = self.problem;
        let rho = self.rho;

        let balance_weight = -self.nu + rho * p.balance_residual(x);
        let mut grad: Vec<f64> = p
            .gradient(x)
            .into_iter()
            .map(|df| df / self.scale + balance_weight)
            .collect();

        for (i, xi) in x.iter().enumerate() {
            if p.upper[i].is_finite() {
                grad[i] += phr_weight(self.mu.upper_bound[i], rho, xi - p.upper[i]);
            }
            if p.lower[i].is_finite() {
                grad[i] -= phr_weight(self.mu.lower_bound[i], rho, p.lower[i] - xi);
            }
        }

        if let Some(lines) = &p.lines {
            for (k, flow) in self.line_flows(x).iter().enumerate() {
                let w = phr_weight(self.mu.line_upper[k], rho, flow - lines.rating[k])
                    - phr_weight(self.mu.line_lower[k], rho, -flow - lines.rating[k]);
                if w != 0.0 {
                    for (j, gj) in grad.iter_mut().enumerate() {
                        *gj += w * lines.h[(k, j)];
                    }
                }
            }
        }

        Ok(grad)
    }
}

/// Largest KKT residual of the normalized problem at `x`.
///
/// Stationarity `∇f/s − ν·1 + Σ μ_j·∇c_j` and complementarity
/// `|min(−c_j, μ_j)|` over bounds and line rows, in max-norm.
fn kkt_residual(
    problem: &DispatchProblem,
    scale: f64,
    nu: f64,
    mu: &InequalityMultipliers,
    x: &[f64],
) -> f64 {
    let mut stationarity: Vec<f64> = problem
        .gradient(x)
        .into_iter()
        .map(|df| df / scale - nu)
        .collect();
    let mut complementarity = 0.0_f64;

    for (i, xi) in x.iter().enumerate() {
        if problem.upper[i].is_finite() {
            stationarity[i] += mu.upper_bound[i];
            complementarity =
                complementarity.max((problem.upper[i] - xi).min(mu.upper_bound[i]).abs());
        }
        if problem.lower[i].is_finite() {
            stationarity[i] -= mu.lower_bound[i];
            complementarity =
                complementarity.max((xi - problem.lower[i]).min(mu.lower_bound[i]).abs());
        }
    }

    if let Some(lines) = &problem.lines {
        for (k, flow) in lines.flows(x).iter().enumerate() {
            let w = mu.line_upper[k] - mu.line_lower[k];
            if w != 0.0 {
                for (j, sj) in stationarity.iter_mut().enumerate() {
                    *sj += w * lines.h[(k, j)];
                }
            }
            complementarity = complementarity
                .max((lines.rating[k] - flow).min(mu.line_upper[k]).abs())
                .max((lines.rating[k] + flow).min(mu.line_lower[k]).abs());
        }
    }

    stationarity
        .iter()
        .fold(complementarity, |acc, v| acc.max(v.abs()))
}

/// Largest generator cost coefficient, so the normalized generation cost is
/// O(1). Curtailment at VOLL is excluded.
fn objective_scale(problem: &DispatchProblem) -> f64 {
    let n_gen = problem.n_gen();
    problem.linear[..n_gen]
        .iter()
        .chain(&problem.quad[..n_gen])
        .fold(1.0_f64, |acc, v| acc.max(v.abs()))
}

impl DispatchBackend for AugmentedLagrangianBackend {
    fn id(&self) -> &str {
        "augmented-lagrangian"
    }

    fn supported_classes(&self) -> &[ProblemClass] {
        &[ProblemClass::QuadraticProgram, ProblemClass::LinearProgram]
    }

    fn solve(
        &self,
        problem: &DispatchProblem,
        settings: &SolverSettings,
        warm_start: &[f64],
    ) -> Result<RawSolution, DispatchError> {
        let n_var = problem.n_var();
        let n_lines = problem.lines.as_ref().map_or(0, |l| l.len());
        let scale = objective_scale(problem);

        let mut x = if warm_start.len() == n_var {
            warm_start.to_vec()
        } else {
            merit::initial_guess(problem)
        };

        let mut rho = settings.initial_penalty;
        let mut nu = 0.0;
        let mut mu = InequalityMultipliers::zeros(n_var, n_lines);

        let max_outer = settings.max_outer_iterations;
        let inner_max_iter = (settings.max_iterations / max_outer).max(1) as u64;
        let mut total_iterations = 0usize;
        let mut violation = problem.max_violation(&x);
        let mut previous_violation = f64::INFINITY;
        let mut residual = f64::INFINITY;
        let mut inner_capped = false;

        for outer in 0..max_outer {
            let subproblem = Subproblem {
                problem,
                scale,
                rho,
                nu,
                mu: &mu,
            };

            let linesearch = MoreThuenteLineSearch::new();
            let solver = LBFGS::new(linesearch, settings.lbfgs_memory)
                .with_tolerance_grad(INNER_GRAD_FRACTION * settings.stationarity_tolerance)
                .map_err(|e| DispatchError::SolverSetup(format!("L-BFGS settings error: {}", e)))?;
            let start = x.clone();
            let result = Executor::new(subproblem, solver)
                .configure(|state| state.param(start).max_iters(inner_max_iter))
                .run();

            match result {
                Ok(res) => {
                    let state = res.state();
                    total_iterations += state.get_iter() as usize;
                    inner_capped = matches!(
                        state.get_termination_status(),
                        TerminationStatus::Terminated(TerminationReason::MaxItersReached)
                    );
                    if let Some(best) = state.get_best_param() {
                        x = best.clone();
                    }
                }
                Err(err) => {
                    // Line search can fail near a stationary point; keep the
                    // current iterate and let the KKT residual judge it
                    inner_capped = false;
                    debug!(outer, error = %err, "L-BFGS subproblem stopped early");
                }
            }

            nu -= rho * problem.balance_residual(&x);
            for (i, xi) in x.iter().enumerate() {
                if problem.upper[i].is_finite() {
                    mu.upper_bound[i] = phr_weight(mu.upper_bound[i], rho, xi - problem.upper[i]);
                }
                if problem.lower[i].is_finite() {
                    mu.lower_bound[i] = phr_weight(mu.lower_bound[i], rho, problem.lower[i] - xi);
                }
            }
            if let Some(lines) = &problem.lines {
                for (k, flow) in lines.flows(&x).iter().enumerate() {
                    mu.line_upper[k] = phr_weight(mu.line_upper[k], rho, flow - lines.rating[k]);
                    mu.line_lower[k] = phr_weight(mu.line_lower[k], rho, -flow - lines.rating[k]);
                }
            }

            violation = problem.max_violation(&x);
            residual = kkt_residual(problem, scale, nu, &mu, &x);
            debug!(outer, violation, residual, rho, "augmented Lagrangian round");

            if violation < settings.tolerance || total_iterations >= settings.max_iterations {
                break;
            }
            if violation > REQUIRED_DECREASE * previous_violation {
                rho = (rho * settings.penalty_growth).min(settings.max_penalty);
            }
            previous_violation = violation;
        }

        let optimal = violation < settings.tolerance
            && !inner_capped
            && residual <= settings.stationarity_tolerance;
        if !optimal {
            debug!(violation, residual, inner_capped, "augmented Lagrangian did not converge");
        }

        for (i, xi) in x.iter_mut().enumerate() {
            *xi = xi.max(problem.lower[i]).min(problem.upper[i]);
        }
        merit::rebalance(problem, &mut x);

        Ok(RawSolution {
            x,
            multipliers: Multipliers {
                convention: MultiplierConvention::Penalty,
                balance: nu * scale,
                line_upper: mu.line_upper.iter().map(|m| m * scale).collect(),
                line_lower: mu.line_lower.iter().map(|m| m * scale).collect(),
            },
            optimal,
            iterations: total_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkModel;
    use crate::DispatchConfig;
    use merit_core::{Bus, BusId, Case, Diagnostics, Generator, Line, Load};

    fn quadratic_problem(load_mw: f64) -> DispatchProblem {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2))],
            generators: vec![
                Generator::new(b(1)).with_p_limits(0.0, 200.0).with_cost(0.01, 10.0, 0.0),
                Generator::new(b(2)).with_p_limits(0.0, 200.0).with_cost(0.02, 10.0, 0.0),
            ],
            lines: vec![Line::new(b(1), b(2), 0.1)],
            loads: vec![Load::new(b(2), load_mw)],
            ..Case::default()
        };
        let config = DispatchConfig::default();
        let network = NetworkModel::build(&case, &config, &mut Diagnostics::new()).unwrap();
        DispatchProblem::build(&case, &network, &config, false).unwrap()
    }

    #[test]
    fn test_equal_incremental_cost() {
        let problem = quadratic_problem(150.0);
        let start = merit::initial_guess(&problem);
        let raw = AugmentedLagrangianBackend
            .solve(&problem, &SolverSettings::default(), &start)
            .unwrap();

        assert!(raw.optimal);
        assert!((raw.x[0] - 1.0).abs() < 1e-4, "P1 = {} pu", raw.x[0]);
        assert!((raw.x[1] - 0.5).abs() < 1e-4, "P2 = {} pu", raw.x[1]);

        // 12 $/MWh on a 100 MVA base
        let price = raw.multipliers.convention.system_price(raw.multipliers.balance);
        assert!((price - 1200.0).abs() < 1.0, "price = {}", price);
    }

    #[test]
    fn test_shortfall_is_not_optimal() {
        let problem = quadratic_problem(500.0);
        let mut settings = SolverSettings::default();
        settings.max_outer_iterations = 8;
        let raw = AugmentedLagrangianBackend
            .solve(&problem, &settings, &merit::initial_guess(&problem))
            .unwrap();

        assert!(!raw.optimal);
        // Projected onto bounds: both units at Pmax
        assert!((raw.x[0] - 2.0).abs() < 1e-9);
        assert!((raw.x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_cap_is_not_optimal() {
        let problem = quadratic_problem(150.0);
        let mut settings = SolverSettings::default();
        settings.max_iterations = 20;
        let raw = AugmentedLagrangianBackend
            .solve(&problem, &settings, &merit::initial_guess(&problem))
            .unwrap();

        assert!(!raw.optimal);
        // Still a balanced point within bounds
        assert!(problem.balance_residual(&raw.x).abs() < 1e-9);
        assert!(raw.x.iter().all(|v| (0.0..=2.0).contains(v)));
    }

    #[test]
    fn test_kkt_residual_vanishes_at_solution() {
        let problem = quadratic_problem(150.0);
        let scale = objective_scale(&problem);
        let mu = InequalityMultipliers::zeros(2, 0);
        // 12 $/MWh normalized by the 1000 $/h per pu scale
        let nu = 1200.0 / scale;

        let at_solution = kkt_residual(&problem, scale, nu, &mu, &[1.0, 0.5]);
        assert!(at_solution < 1e-12, "residual = {}", at_solution);

        let off_solution = kkt_residual(&problem, scale, nu, &mu, &[1.2, 0.3]);
        assert!(off_solution > 1e-2, "residual = {}", off_solution);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let problem = quadratic_problem(150.0);
        let mu = InequalityMultipliers::zeros(2, 0);
        let sub = Subproblem {
            problem: &problem,
            scale: objective_scale(&problem),
            rho: 100.0,
            nu: 0.7,
            mu: &mu,
        };
        let x = vec![1.3, 0.4];
        let grad = sub.gradient(&x).unwrap();
        let eps = 1e-6;
        for i in 0..2 {
            let mut xp = x.clone();
            xp[i] += eps;
            let mut xm = x.clone();
            xm[i] -= eps;
            let fd = (sub.cost(&xp).unwrap() - sub.cost(&xm).unwrap()) / (2.0 * eps);
            assert!((grad[i] - fd).abs() < 1e-5, "d/dx{}: {} vs {}", i, grad[i], fd);
        }
    }
}
