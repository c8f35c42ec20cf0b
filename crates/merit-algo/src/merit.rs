//! Merit-order helpers: the starting point for iterative backends and the
//! balance repair applied after them.

use crate::problem::DispatchProblem;
use std::cmp::Ordering;

/// Below this (per-unit) the remaining demand counts as met.
const FILL_EPS: f64 = 1e-10;

/// Unit indices sorted by ascending linear cost coefficient.
///
/// Ties keep case order.
pub fn merit_order(problem: &DispatchProblem) -> Vec<usize> {
    let mut order: Vec<usize> = (0..problem.n_gen()).collect();
    order.sort_by(|&a, &b| {
        problem.units[a]
            .cost
            .b
            .partial_cmp(&problem.units[b].cost.b)
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Every unit at Pmin, then filled toward Pmax in merit order until demand
/// is met. Curtailment starts at zero.
pub fn initial_guess(problem: &DispatchProblem) -> Vec<f64> {
    let mut x = vec![0.0; problem.n_var()];
    for (i, unit) in problem.units.iter().enumerate() {
        x[i] = unit.pmin_pu;
    }

    let mut remaining = problem.total_demand_pu - x.iter().sum::<f64>();
    for idx in merit_order(problem) {
        if remaining <= FILL_EPS {
            break;
        }
        let headroom = (problem.units[idx].pmax_pu - x[idx]).max(0.0);
        let dispatch = remaining.min(headroom);
        x[idx] += dispatch;
        remaining -= dispatch;
    }
    x
}

/// Spread the balance residual over variables with room to move.
///
/// A shortfall is taken up by generators in merit order and then by
/// curtailment; a surplus is shed from the most expensive generators first,
/// then from curtailment. Bounds are never crossed, so an infeasible problem
/// keeps part of its residual.
pub fn rebalance(problem: &DispatchProblem, x: &mut [f64]) {
    let n_gen = problem.n_gen();
    let mut order = merit_order(problem);
    order.extend(n_gen..problem.n_var());

    let mut residual = problem.total_demand_pu - x.iter().sum::<f64>();
    if residual > FILL_EPS {
        for &i in &order {
            let room = (problem.upper[i] - x[i]).max(0.0);
            let step = residual.min(room);
            x[i] += step;
            residual -= step;
            if residual <= FILL_EPS {
                break;
            }
        }
    } else if residual < -FILL_EPS {
        let mut surplus = -residual;
        let (gens, curtail) = order.split_at(n_gen);
        for &i in gens.iter().rev().chain(curtail) {
            let room = (x[i] - problem.lower[i]).max(0.0);
            let step = surplus.min(room);
            x[i] -= step;
            surplus -= step;
            if surplus <= FILL_EPS {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkModel;
    use crate::DispatchConfig;
    use merit_core::{Bus, BusId, Case, Diagnostics, Generator, Line, Load};

    fn problem(load_mw: f64, congested: bool) -> DispatchProblem {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2))],
            generators: vec![
                Generator::new(b(1)).with_p_limits(10.0, 60.0).with_cost(0.0, 30.0, 0.0),
                Generator::new(b(1)).with_p_limits(0.0, 60.0).with_cost(0.0, 10.0, 0.0),
                Generator::new(b(2)).with_p_limits(5.0, 60.0).with_cost(0.0, 20.0, 0.0),
            ],
            lines: vec![Line::new(b(1), b(2), 0.1)],
            loads: vec![Load::new(b(2), load_mw)],
            ..Case::default()
        };
        let config = DispatchConfig::default();
        let network = NetworkModel::build(&case, &config, &mut Diagnostics::new()).unwrap();
        DispatchProblem::build(&case, &network, &config, congested).unwrap()
    }

    #[test]
    fn test_merit_order_by_linear_cost() {
        assert_eq!(merit_order(&problem(100.0, false)), vec![1, 2, 0]);
    }

    #[test]
    fn test_initial_guess_fills_cheapest_first() {
        let x = initial_guess(&problem(100.0, true));
        // Pmin 0.1 + 0.05 = 0.15; remaining 0.85 goes 0.6 to unit 1 then 0.25 to unit 2
        assert!((x[0] - 0.1).abs() < 1e-12);
        assert!((x[1] - 0.6).abs() < 1e-12);
        assert!((x[2] - 0.3).abs() < 1e-12);
        assert_eq!(&x[3..], &[0.0, 0.0]);
    }

    #[test]
    fn test_rebalance_shortfall_uses_curtailment_last() {
        let p = problem(200.0, true);
        let mut x = vec![0.6, 0.6, 0.6, 0.0, 0.0];
        rebalance(&p, &mut x);
        assert!((x.iter().sum::<f64>() - 2.0).abs() < 1e-12);
        assert!((x[4] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_rebalance_surplus_sheds_expensive_first() {
        let p = problem(100.0, false);
        let mut x = vec![0.6, 0.6, 0.6];
        rebalance(&p, &mut x);
        assert!((x[0] - 0.1).abs() < 1e-12);
        assert!((x[2] - 0.3).abs() < 1e-12);
        assert!((x.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
