//! Dispatch problem in decision-vector form.
//!
//! ```text
//! x = [ real generator output (pu) | curtailment per bus (pu) ]
//!
//! minimize    ½ xᵀ diag(P) x + qᵀ x + const
//! subject to  Σ x = total demand                      (balance)
//!             -rate ≤ H x - d ≤ rate                  (line limits)
//!             lower ≤ x ≤ upper                       (unit and curtailment bounds)
//!
//! P_g = 2·a·base²,  q_g = b·base,  q_curtail = VOLL·base
//! H   = PTDF · [M_gen | I],  d = PTDF · Pd
//! ```
//!
//! Uncongested problems carry real generators only, the balance row and the
//! bounds. Costs are applied to MW, so the coefficients above convert the
//! per-unit decision vector back to $/h.

use crate::network::NetworkModel;
use crate::{DispatchConfig, DispatchError};
use merit_core::{Case, CostCurve};
use nalgebra::DMatrix;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Cost structure of the dispatch, used to pick a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProblemClass {
    /// Every quadratic coefficient is zero
    LinearProgram,
    QuadraticProgram,
}

impl fmt::Display for ProblemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemClass::LinearProgram => write!(f, "LP"),
            ProblemClass::QuadraticProgram => write!(f, "QP"),
        }
    }
}

/// A real generator that takes part in the dispatch.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    /// Position in [`Case::generators`]
    pub case_pos: usize,
    /// Index of the host bus in the network model
    pub bus_idx: usize,
    pub cost: CostCurve,
    pub pmin_pu: f64,
    pub pmax_pu: f64,
}

/// Line-limit rows `-rate ≤ H x - d ≤ rate`.
#[derive(Debug, Clone)]
pub struct LineRows {
    /// n_branch × n_var
    pub h: DMatrix<f64>,
    /// PTDF · Pd (per-unit)
    pub offset: Vec<f64>,
    /// Branch ratings (per-unit)
    pub rating: Vec<f64>,
}

impl LineRows {
    pub fn len(&self) -> usize {
        self.rating.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rating.is_empty()
    }

    /// Flow on every branch for decision vector `x` (per-unit).
    pub fn flows(&self, x: &[f64]) -> Vec<f64> {
        (0..self.len())
            .map(|k| {
                let hx: f64 = x.iter().enumerate().map(|(j, v)| self.h[(k, j)] * v).sum();
                hx - self.offset[k]
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchProblem {
    pub class: ProblemClass,
    pub base_mva: f64,
    pub voll: f64,
    pub units: Vec<DispatchUnit>,
    /// Demand per bus (per-unit, bus order)
    pub demand_pu: Vec<f64>,
    pub total_demand_pu: f64,
    /// Whether per-bus curtailment variables follow the generators
    pub with_curtailment: bool,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Diagonal of P (decision units)
    pub quad: Vec<f64>,
    /// q (decision units)
    pub linear: Vec<f64>,
    /// Σ c over dispatched units ($/h)
    pub constant: f64,
    pub lines: Option<LineRows>,
}

impl DispatchProblem {
    /// Formulate the dispatch for `case` on `network`.
    ///
    /// `congested` adds curtailment variables and line-limit rows.
    pub fn build(
        case: &Case,
        network: &NetworkModel,
        config: &DispatchConfig,
        congested: bool,
    ) -> Result<Self, DispatchError> {
        let base = network.base_mva;
        let n_bus = network.n_bus();

        let units: Vec<DispatchUnit> = case
            .generators
            .iter()
            .enumerate()
            .filter(|(_, g)| g.in_service)
            .filter_map(|(pos, g)| match network.bus_index.get(&g.bus) {
                Some(&bus_idx) => Some(DispatchUnit {
                    case_pos: pos,
                    bus_idx,
                    cost: g.cost,
                    pmin_pu: g.pmin.to_per_unit(base).value(),
                    pmax_pu: g.pmax.to_per_unit(base).value(),
                }),
                None => {
                    debug!(generator = %g.label(pos), bus = g.bus.value(), "generator on unknown bus; skipped");
                    None
                }
            })
            .collect();

        if units.is_empty() {
            return Err(DispatchError::Structural(
                "no in-service generators on known buses".into(),
            ));
        }

        let demand_pu: Vec<f64> = case
            .bus_demand()
            .into_iter()
            .map(|p| p.to_per_unit(base).value())
            .collect();
        let total_demand_pu: f64 = demand_pu.iter().sum();

        let class = if units.iter().all(|u| u.cost.is_linear()) {
            ProblemClass::LinearProgram
        } else {
            ProblemClass::QuadraticProgram
        };

        let n_gen = units.len();
        let n_var = if congested { n_gen + n_bus } else { n_gen };

        let mut lower = Vec::with_capacity(n_var);
        let mut upper = Vec::with_capacity(n_var);
        let mut quad = Vec::with_capacity(n_var);
        let mut linear = Vec::with_capacity(n_var);
        for unit in &units {
            lower.push(unit.pmin_pu);
            upper.push(unit.pmax_pu);
            quad.push(2.0 * unit.cost.a * base * base);
            linear.push(unit.cost.b * base);
        }
        if congested {
            for &pd in &demand_pu {
                lower.push(0.0);
                upper.push(pd.max(0.0));
                quad.push(0.0);
                linear.push(config.voll * base);
            }
        }
        let constant = units.iter().map(|u| u.cost.c).sum();

        let lines = if congested && network.n_branch() > 0 {
            let ptdf = &network.ptdf;
            let n_branch = network.n_branch();
            let mut h = DMatrix::zeros(n_branch, n_var);
            for k in 0..n_branch {
                for (g, unit) in units.iter().enumerate() {
                    h[(k, g)] = ptdf.get_by_idx(k, unit.bus_idx);
                }
                for i in 0..n_bus {
                    h[(k, n_gen + i)] = ptdf.get_by_idx(k, i);
                }
            }
            Some(LineRows {
                h,
                offset: ptdf.flows(&demand_pu),
                rating: network.branches.iter().map(|b| b.rating_pu).collect(),
            })
        } else {
            None
        };

        debug!(
            class = %class,
            generators = n_gen,
            variables = n_var,
            line_rows = lines.as_ref().map_or(0, |l| l.len()),
            "dispatch problem formulated"
        );

        Ok(Self {
            class,
            base_mva: base,
            voll: config.voll,
            units,
            demand_pu,
            total_demand_pu,
            with_curtailment: congested,
            lower,
            upper,
            quad,
            linear,
            constant,
            lines,
        })
    }

    pub fn n_gen(&self) -> usize {
        self.units.len()
    }

    pub fn n_var(&self) -> usize {
        self.linear.len()
    }

    /// Objective ($/h) at `x`.
    pub fn objective(&self, x: &[f64]) -> f64 {
        let variable: f64 = x
            .iter()
            .enumerate()
            .map(|(i, v)| 0.5 * self.quad[i] * v * v + self.linear[i] * v)
            .sum();
        variable + self.constant
    }

    /// Gradient of the objective with respect to `x`.
    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, v)| self.quad[i] * v + self.linear[i])
            .collect()
    }

    /// Σ x - total demand (per-unit).
    pub fn balance_residual(&self, x: &[f64]) -> f64 {
        x.iter().sum::<f64>() - self.total_demand_pu
    }

    /// Curtailment slice of `x` (empty when uncongested).
    pub fn curtailment<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        if self.with_curtailment {
            &x[self.n_gen()..]
        } else {
            &[]
        }
    }

    /// Largest violation of balance, bounds and line limits (per-unit).
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        let mut worst = self.balance_residual(x).abs();
        for (i, v) in x.iter().enumerate() {
            worst = worst.max(self.lower[i] - v).max(v - self.upper[i]);
        }
        if let Some(lines) = &self.lines {
            for (flow, rate) in lines.flows(x).iter().zip(&lines.rating) {
                worst = worst.max(flow.abs() - rate);
            }
        }
        worst.max(0.0)
    }
}
