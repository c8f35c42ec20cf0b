//! Clarabel backend for linear-cost dispatch.
//!
//! Clarabel solves
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//! Row layout of A:
//!
//! | Rows | Cone | Constraint |
//! |------|------|------------|
//! | 0 | Zero | Σ x = demand |
//! | 1 ..= m | Nonnegative | H x ≤ rate + d |
//! | m+1 ..= 2m | Nonnegative | -H x ≤ rate - d |
//! | rest | Nonnegative | x ≤ upper, -x ≤ -lower |
//!
//! Variables whose bounds coincide get a single equality row instead of the
//! two bound rows.
//!
//! The balance and line-row duals are returned for price extraction.
//!
//! When Clarabel certifies infeasibility its iterate is a certificate, not a
//! dispatch; the merit-order point (filled and rebalanced within bounds) is
//! returned instead, flagged non-optimal and without multipliers.

use super::{DispatchBackend, MultiplierConvention, Multipliers, RawSolution};
use crate::merit;
use crate::problem::{DispatchProblem, ProblemClass};
use crate::{DispatchError, SolverSettings};
use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use tracing::{debug, warn};

/// Pure-Rust interior-point backend, always available.
pub struct ClarabelBackend;

/// Column-wise accumulation of A with its right-hand side and cone list.
struct ConicRows {
    columns: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

impl ConicRows {
    fn new(n_var: usize) -> Self {
        Self {
            columns: vec![Vec::new(); n_var],
            rhs: Vec::new(),
            cones: Vec::new(),
        }
    }

    fn push_row(&mut self, coeffs: impl IntoIterator<Item = (usize, f64)>, b: f64) -> usize {
        let row = self.rhs.len();
        for (col, val) in coeffs {
            if val != 0.0 {
                self.columns[col].push((row, val));
            }
        }
        self.rhs.push(b);
        row
    }

    /// Σ coeffᵢ·xᵢ = b
    fn push_eq(&mut self, coeffs: impl IntoIterator<Item = (usize, f64)>, b: f64) -> usize {
        let row = self.push_row(coeffs, b);
        match self.cones.last_mut() {
            Some(SupportedConeT::ZeroConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::ZeroConeT(1)),
        }
        row
    }

    /// Σ coeffᵢ·xᵢ ≤ b
    fn push_leq(&mut self, coeffs: impl IntoIterator<Item = (usize, f64)>, b: f64) -> usize {
        let row = self.push_row(coeffs, b);
        match self.cones.last_mut() {
            Some(SupportedConeT::NonnegativeConeT(n)) => *n += 1,
            _ => self.cones.push(SupportedConeT::NonnegativeConeT(1)),
        }
        row
    }

    /// Convert the accumulated columns to CSC.
    fn into_parts(mut self) -> (CscMatrix<f64>, Vec<f64>, Vec<SupportedConeT<f64>>) {
        let n_var = self.columns.len();
        let mut col_ptr = Vec::with_capacity(n_var + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();

        for column in self.columns.iter_mut() {
            col_ptr.push(row_idx.len());
            column.sort_by_key(|(r, _)| *r);
            for &(r, v) in column.iter() {
                row_idx.push(r);
                values.push(v);
            }
        }
        col_ptr.push(row_idx.len());

        let a_mat = CscMatrix::new(self.rhs.len(), n_var, col_ptr, row_idx, values);
        (a_mat, self.rhs, self.cones)
    }
}

impl DispatchBackend for ClarabelBackend {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn supported_classes(&self) -> &[ProblemClass] {
        &[ProblemClass::LinearProgram]
    }

    fn solve(
        &self,
        problem: &DispatchProblem,
        settings: &SolverSettings,
        _warm_start: &[f64],
    ) -> Result<RawSolution, DispatchError> {
        let n_var = problem.n_var();
        let mut rows = ConicRows::new(n_var);

        let balance_row = rows.push_eq((0..n_var).map(|j| (j, 1.0)), problem.total_demand_pu);

        let mut upper_rows = Vec::new();
        let mut lower_rows = Vec::new();
        if let Some(lines) = &problem.lines {
            for k in 0..lines.len() {
                let coeffs = (0..n_var).map(|j| (j, lines.h[(k, j)]));
                upper_rows.push(rows.push_leq(coeffs, lines.rating[k] + lines.offset[k]));
            }
            for k in 0..lines.len() {
                let coeffs = (0..n_var).map(|j| (j, -lines.h[(k, j)]));
                lower_rows.push(rows.push_leq(coeffs, lines.rating[k] - lines.offset[k]));
            }
        }

        for j in 0..n_var {
            // Fixed variables (curtailment at buses without demand, must-run units)
            if problem.upper[j] <= problem.lower[j] {
                rows.push_eq([(j, 1.0)], problem.lower[j]);
                continue;
            }
            if problem.upper[j].is_finite() {
                rows.push_leq([(j, 1.0)], problem.upper[j]);
            }
            if problem.lower[j].is_finite() {
                rows.push_leq([(j, -1.0)], -problem.lower[j]);
            }
        }

        let (a_mat, rhs, cones) = rows.into_parts();
        let p_mat = CscMatrix::new(n_var, n_var, vec![0; n_var + 1], Vec::new(), Vec::new());

        debug!(
            variables = n_var,
            rows = rhs.len(),
            "invoking clarabel"
        );

        let clarabel_settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(u32::try_from(settings.max_iterations).unwrap_or(u32::MAX))
            .build()
            .map_err(|e| DispatchError::SolverSetup(format!("Clarabel settings error: {:?}", e)))?;

        let mut solver =
            DefaultSolver::new(&p_mat, &problem.linear, &a_mat, &rhs, &cones, clarabel_settings)
                .map_err(|e| {
                    DispatchError::SolverSetup(format!("Clarabel initialization failed: {:?}", e))
                })?;

        solver.solve();

        let sol = &solver.solution;
        if matches!(
            sol.status,
            SolverStatus::PrimalInfeasible
                | SolverStatus::AlmostPrimalInfeasible
                | SolverStatus::DualInfeasible
                | SolverStatus::AlmostDualInfeasible
        ) {
            warn!(status = ?sol.status, "clarabel reports an infeasible dispatch; using merit-order point");
            let mut x = merit::initial_guess(problem);
            merit::rebalance(problem, &mut x);
            return Ok(RawSolution {
                x,
                multipliers: Multipliers::zero(MultiplierConvention::ConicDual, upper_rows.len()),
                optimal: false,
                iterations: sol.iterations as usize,
            });
        }

        let optimal = matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved);
        if !optimal {
            debug!(status = ?sol.status, "clarabel stopped short of optimality");
        }

        let dual = |row: usize| sol.z.get(row).copied().unwrap_or(0.0);
        let multipliers = Multipliers {
            convention: MultiplierConvention::ConicDual,
            balance: dual(balance_row),
            line_upper: upper_rows.iter().map(|&r| dual(r).max(0.0)).collect(),
            line_lower: lower_rows.iter().map(|&r| dual(r).max(0.0)).collect(),
        };

        Ok(RawSolution {
            x: sol.x.clone(),
            multipliers,
            optimal,
            iterations: sol.iterations as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkModel;
    use crate::DispatchConfig;
    use merit_core::{Bus, BusId, Case, Diagnostics, Generator, Line, Load};

    fn two_unit_problem(rating: f64, congested: bool) -> DispatchProblem {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2))],
            generators: vec![
                Generator::new(b(1)).with_p_limits(0.0, 200.0).with_cost(0.0, 10.0, 0.0),
                Generator::new(b(2)).with_p_limits(0.0, 200.0).with_cost(0.0, 40.0, 0.0),
            ],
            lines: vec![Line::new(b(1), b(2), 0.1).with_rating(rating)],
            loads: vec![Load::new(b(2), 100.0)],
            ..Case::default()
        };
        let config = DispatchConfig::default();
        let network = NetworkModel::build(&case, &config, &mut Diagnostics::new()).unwrap();
        DispatchProblem::build(&case, &network, &config, congested).unwrap()
    }

    #[test]
    fn test_backend_identity() {
        let backend = ClarabelBackend;
        assert_eq!(backend.id(), "clarabel");
        assert!(backend.supported_classes().contains(&ProblemClass::LinearProgram));
        assert!(!backend.supported_classes().contains(&ProblemClass::QuadraticProgram));
    }

    #[test]
    fn test_uncongested_balance_dual() {
        let problem = two_unit_problem(250.0, false);
        let raw = ClarabelBackend
            .solve(&problem, &SolverSettings::default(), &[])
            .unwrap();
        assert!(raw.optimal);
        assert!((raw.x[0] - 1.0).abs() < 1e-5, "cheap unit = {}", raw.x[0]);
        assert!(raw.x[1].abs() < 1e-5);
        // price 10 $/MWh = 1000 $/h per pu, reported with the conic sign
        let price = raw.multipliers.convention.system_price(raw.multipliers.balance);
        assert!((price - 1000.0).abs() < 1e-2, "price = {}", price);
    }

    #[test]
    fn test_infeasible_returns_merit_order_point() {
        // 400 MW of capacity against 500 MW of load, no curtailment columns
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2))],
            generators: vec![
                Generator::new(b(1)).with_p_limits(0.0, 200.0).with_cost(0.0, 10.0, 0.0),
                Generator::new(b(2)).with_p_limits(0.0, 200.0).with_cost(0.0, 40.0, 0.0),
            ],
            lines: vec![Line::new(b(1), b(2), 0.1)],
            loads: vec![Load::new(b(2), 500.0)],
            ..Case::default()
        };
        let config = DispatchConfig::default();
        let network = NetworkModel::build(&case, &config, &mut Diagnostics::new()).unwrap();
        let problem = DispatchProblem::build(&case, &network, &config, false).unwrap();

        let raw = ClarabelBackend
            .solve(&problem, &SolverSettings::default(), &[])
            .unwrap();
        assert!(!raw.optimal);
        assert_eq!(raw.x, vec![2.0, 2.0]);
        assert_eq!(raw.multipliers.balance, 0.0);
    }

    #[test]
    fn test_binding_line_dual() {
        let problem = two_unit_problem(60.0, true);
        let raw = ClarabelBackend
            .solve(&problem, &SolverSettings::default(), &[])
            .unwrap();
        assert!(raw.optimal);
        assert!((raw.x[0] - 0.6).abs() < 1e-5);
        assert!((raw.x[1] - 0.4).abs() < 1e-5);
        // flow 1 → 2 at its upper limit prices the 30 $/MWh spread
        assert!((raw.multipliers.line_upper[0] - 3000.0).abs() < 1e-1);
        assert!(raw.multipliers.line_lower[0] < 1e-3);
    }
}
