//! Shared case builders and property checks for dispatch tests.

#![allow(dead_code)]

use merit_algo::DispatchResult;
use merit_core::{Bus, BusId, BusType, Case, Generator, Line, Load};

pub fn bus(id: usize) -> BusId {
    BusId::new(id)
}

/// Triangle 1-2-3 with x = 0.1 on every line and bus 1 as slack.
///
/// Line order: 1-2, 2-3, 1-3. Ratings are 250 MW unless overridden.
pub fn triangle(rating_13: f64) -> Case {
    Case {
        buses: vec![
            Bus::new(bus(1)).with_type(BusType::Slack),
            Bus::new(bus(2)),
            Bus::new(bus(3)),
        ],
        lines: vec![
            Line::new(bus(1), bus(2), 0.1),
            Line::new(bus(2), bus(3), 0.1),
            Line::new(bus(1), bus(3), 0.1).with_rating(rating_13),
        ],
        loads: vec![Load::new(bus(3), 100.0)],
        ..Case::default()
    }
}

/// One generator per triangle bus at 10/20/30 $/MWh, each 0-60 MW.
pub fn merit_order_case(rating_13: f64) -> Case {
    let mut case = triangle(rating_13);
    case.generators = vec![
        Generator::new(bus(1)).with_id("g1").with_p_limits(0.0, 60.0).with_cost(0.0, 10.0, 0.0),
        Generator::new(bus(2)).with_id("g2").with_p_limits(0.0, 60.0).with_cost(0.0, 20.0, 0.0),
        Generator::new(bus(3)).with_id("g3").with_p_limits(0.0, 60.0).with_cost(0.0, 30.0, 0.0),
    ];
    case
}

/// Cheap unit at bus 1 and an expensive one at the load bus 3.
pub fn congested_case(rating_13: f64) -> Case {
    let mut case = triangle(rating_13);
    case.generators = vec![
        Generator::new(bus(1)).with_id("g1").with_p_limits(0.0, 200.0).with_cost(0.0, 10.0, 0.0),
        Generator::new(bus(3)).with_id("g3").with_p_limits(0.0, 200.0).with_cost(0.0, 30.0, 0.0),
    ];
    case
}

/// Two buses joined by one line; generators at bus 1, `load_mw` at bus 2.
pub fn two_bus(generators: Vec<Generator>, load_mw: f64) -> Case {
    Case {
        buses: vec![Bus::new(bus(1)).with_type(BusType::Slack), Bus::new(bus(2))],
        generators,
        lines: vec![Line::new(bus(1), bus(2), 0.1)],
        loads: vec![Load::new(bus(2), load_mw)],
        ..Case::default()
    }
}

pub fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

/// Generation plus curtailment meets demand to 1e-6 p.u.
pub fn assert_balanced(case: &Case, result: &DispatchResult) {
    let served = result.total_generation() + result.total_curtailment;
    let demand = case.total_demand().value();
    let tol = 1e-6 * case.base_mva();
    assert!(
        (served - demand).abs() <= tol,
        "generation {} + curtailment {} != demand {}",
        result.total_generation(),
        result.total_curtailment,
        demand
    );
}

/// Every in-service line stays within its rating.
pub fn assert_within_ratings(case: &Case, result: &DispatchResult) {
    for (line, flow) in case.lines.iter().zip(&result.line_results) {
        let rating = line.rate_a.value();
        assert!(
            flow.flow_mw.abs() <= rating + 1e-3,
            "{} carries {} MW over its {} MW rating",
            line.label(),
            flow.flow_mw,
            rating
        );
    }
}

pub fn lmp(result: &DispatchResult, id: usize) -> f64 {
    result
        .bus(bus(id))
        .map(|b| b.marginal_cost)
        .unwrap_or_else(|| panic!("no result for bus {}", id))
}

pub fn pg(result: &DispatchResult, id: &str) -> f64 {
    result
        .generator(id)
        .map(|g| g.pg)
        .unwrap_or_else(|| panic!("no result for generator {}", id))
}
