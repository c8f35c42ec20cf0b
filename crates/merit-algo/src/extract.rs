//! Turn a raw decision vector and its multipliers into per-element results.
//!
//! Prices follow
//!
//! ```text
//! LMP_i = λ − Σ_k (μ⁺_k − μ⁻_k) · PTDF[k, i]      ($/MWh)
//! ```
//!
//! where λ is the system price and μ± the multipliers of the two line-limit
//! blocks, normalized per backend convention. A binding upper limit on a line
//! carrying power away from bus i (negative PTDF entry for an injection at i
//! that relieves it) raises the price at i.

use crate::network::NetworkModel;
use crate::problem::DispatchProblem;
use crate::solve::RawSolution;
use crate::types::{BindingConstraint, BusResult, GeneratorResult, LineResult};
use merit_core::{Case, Radians};
use std::collections::HashMap;
use tracing::debug;

/// Distance (per-unit) within which a variable counts as sitting on a bound.
const BOUND_TOL: f64 = 1e-5;

/// Distance (MW) within which a line counts as loaded to its rating.
const BINDING_TOL_MW: f64 = 1e-3;

/// Everything the result record needs apart from status and timing.
#[derive(Debug, Clone)]
pub(crate) struct Extraction {
    pub total_cost: f64,
    pub objective_value: f64,
    pub total_curtailment: f64,
    pub generator_results: Vec<GeneratorResult>,
    pub bus_results: Vec<BusResult>,
    pub line_results: Vec<LineResult>,
    pub binding_constraints: Vec<BindingConstraint>,
}

pub(crate) fn extract(
    case: &Case,
    network: &NetworkModel,
    problem: &DispatchProblem,
    raw: &RawSolution,
) -> Extraction {
    let base = network.base_mva;
    let n_bus = network.n_bus();
    let x = &raw.x;

    // Net injection per bus (per-unit)
    let mut injection: Vec<f64> = problem.demand_pu.iter().map(|pd| -pd).collect();
    for (i, unit) in problem.units.iter().enumerate() {
        injection[unit.bus_idx] += x[i];
    }
    let curtailment = problem.curtailment(x);
    for (i, c) in curtailment.iter().enumerate() {
        injection[i] += c;
    }

    let (theta, _) = network.solve_angles(&injection);
    let lmp = bus_prices(network, problem, raw);

    // === Generators ===
    let dispatched: HashMap<usize, usize> = problem
        .units
        .iter()
        .enumerate()
        .map(|(i, u)| (u.case_pos, i))
        .collect();

    let mut objective_value = 0.0;
    let generator_results: Vec<GeneratorResult> = case
        .generators
        .iter()
        .enumerate()
        .map(|(pos, gen)| {
            let (pg, cost) = match dispatched.get(&pos) {
                Some(&i) => {
                    let pg = x[i] * base;
                    (pg, gen.cost.evaluate(pg))
                }
                None => (0.0, 0.0),
            };
            objective_value += cost;
            GeneratorResult {
                id: gen.label(pos),
                bus: gen.bus,
                pg,
                qg: 0.0,
                cost,
            }
        })
        .collect();

    // === Buses ===
    let mut reactive_demand = vec![0.0; n_bus];
    for load in &case.loads {
        if let Some(&i) = network.bus_index.get(&load.bus) {
            reactive_demand[i] += load.qd.value();
        }
    }

    let bus_results: Vec<BusResult> = case
        .buses
        .iter()
        .enumerate()
        .map(|(i, bus)| BusResult {
            bus: bus.id,
            va: Radians(theta[i]).to_degrees().value(),
            vm: bus.voltage_pu.value(),
            pl: injection[i] * base,
            ql: -reactive_demand[i],
            marginal_cost: lmp[i],
            curtailment: curtailment.get(i).map_or(0.0, |c| c * base),
        })
        .collect();

    // === Lines ===
    let branch_of_line: HashMap<usize, usize> = network
        .branches
        .iter()
        .enumerate()
        .map(|(k, b)| (b.terminals.line_pos, k))
        .collect();

    let mut binding_constraints = Vec::new();
    let line_results: Vec<LineResult> = case
        .lines
        .iter()
        .enumerate()
        .map(|(pos, line)| {
            let Some(&k) = branch_of_line.get(&pos) else {
                return LineResult {
                    from_bus: line.from_bus,
                    to_bus: line.to_bus,
                    flow_mw: 0.0,
                    flow_mvar: 0.0,
                    loading_percent: 0.0,
                    congestion_rent: 0.0,
                };
            };
            let branch = &network.branches[k];
            let t = branch.terminals;
            let flow_mw = (theta[t.from] - theta[t.to]) / t.x * base;

            if problem.lines.is_some() && branch.rating_mw - flow_mw.abs() <= BINDING_TOL_MW {
                let upper = raw.multipliers.line_upper.get(k).copied().unwrap_or(0.0);
                let lower = raw.multipliers.line_lower.get(k).copied().unwrap_or(0.0);
                binding_constraints.push(BindingConstraint {
                    name: line.label(),
                    flow_mw,
                    limit_mw: branch.rating_mw,
                    shadow_price: (upper + lower) / base,
                });
            }

            LineResult {
                from_bus: line.from_bus,
                to_bus: line.to_bus,
                flow_mw,
                flow_mvar: 0.0,
                loading_percent: flow_mw.abs() / branch.rating_mw * 100.0,
                congestion_rent: (lmp[t.to] - lmp[t.from]) * flow_mw,
            }
        })
        .collect();

    let total_curtailment: f64 = curtailment.iter().map(|c| c * base).sum();

    Extraction {
        total_cost: objective_value + total_curtailment * problem.voll,
        objective_value,
        total_curtailment,
        generator_results,
        bus_results,
        line_results,
        binding_constraints,
    }
}

/// LMP per bus ($/MWh, bus order).
///
/// In the degenerate case only the system component is replaced by
/// [`degenerate_price`]. Line multipliers are used as the backend reported
/// them, so the whole price vector shifts by one amount and price
/// differences across binding lines (and the rents they produce) keep
/// matching the reported shadow prices.
fn bus_prices(network: &NetworkModel, problem: &DispatchProblem, raw: &RawSolution) -> Vec<f64> {
    let base = network.base_mva;
    let m = &raw.multipliers;

    let system_price = match degenerate_price(problem, &raw.x) {
        Some(price) => {
            debug!(price, "every unit at a bound; using midpoint of the dual interval");
            price
        }
        None => m.convention.system_price(m.balance) / base,
    };

    (0..network.n_bus())
        .map(|i| {
            let congestion: f64 = m
                .line_upper
                .iter()
                .zip(&m.line_lower)
                .enumerate()
                .map(|(k, (up, lo))| (up - lo) * network.ptdf.get_by_idx(k, i))
                .sum();
            system_price - congestion / base
        })
        .collect()
}

/// System price ($/MWh) when no dispatchable variable is strictly inside its
/// bounds.
///
/// Units at Pmax and curtailment at its cap bound the price from below,
/// units at Pmin and unused curtailment from above. Fixed units and buses
/// without demand say nothing about the price and are skipped. Returns the
/// midpoint of the interval (or its finite end), or `None` when some
/// variable is interior. The interval is taken system-wide; congestion
/// multipliers are not re-derived.
fn degenerate_price(problem: &DispatchProblem, x: &[f64]) -> Option<f64> {
    let base = problem.base_mva;
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;

    for (i, unit) in problem.units.iter().enumerate() {
        if unit.pmax_pu - unit.pmin_pu < BOUND_TOL {
            continue;
        }
        let mc = unit.cost.marginal_cost(x[i] * base);
        if unit.pmax_pu - x[i] < BOUND_TOL {
            lo = lo.max(mc);
        } else if x[i] - unit.pmin_pu < BOUND_TOL {
            hi = hi.min(mc);
        } else {
            return None;
        }
    }

    let n_gen = problem.n_gen();
    for (i, &c) in problem.curtailment(x).iter().enumerate() {
        let cap = problem.upper[n_gen + i];
        if cap < BOUND_TOL {
            continue;
        }
        if cap - c < BOUND_TOL {
            lo = lo.max(problem.voll);
        } else if c < BOUND_TOL {
            hi = hi.min(problem.voll);
        } else {
            return None;
        }
    }

    match (lo.is_finite(), hi.is_finite()) {
        (true, true) => Some(0.5 * (lo + hi)),
        (true, false) => Some(lo),
        (false, true) => Some(hi),
        (false, false) => None,
    }
}
