use std::fmt;

use merit_core::{BusId, Diagnostics};
use serde::Serialize;

use crate::solve::SolvePath;

/// Outcome reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    /// Backend failed, hit its iteration cap or left constraints violated;
    /// the dispatch is still reported for inspection
    Suboptimal,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Suboptimal => write!(f, "suboptimal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorResult {
    /// Generator id, name, or `gen{n}` by position
    pub id: String,
    pub bus: BusId,
    /// Real output (MW)
    pub pg: f64,
    /// Reactive output (Mvar), always zero in the DC model
    pub qg: f64,
    /// a·P² + b·P + c ($/h), zero for excluded units
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub bus: BusId,
    /// Voltage angle (degrees)
    pub va: f64,
    /// Voltage magnitude (p.u., passed through)
    pub vm: f64,
    /// Net real injection (MW): generation + curtailment − demand
    pub pl: f64,
    pub ql: f64,
    /// Locational marginal price ($/MWh)
    pub marginal_cost: f64,
    /// Unserved demand (MW)
    pub curtailment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// From → to real flow (MW)
    pub flow_mw: f64,
    pub flow_mvar: f64,
    pub loading_percent: f64,
    /// (LMP_to − LMP_from) × flow ($/h)
    pub congestion_rent: f64,
}

/// A line sitting at its rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingConstraint {
    pub name: String,
    pub flow_mw: f64,
    pub limit_mw: f64,
    /// Value of one more MW of capacity ($/MWh)
    pub shadow_price: f64,
}

/// Dispatch output.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    // === Status ===
    pub status: SolveStatus,
    pub solve_path: SolvePath,
    pub iterations: usize,
    pub solve_time_ms: u128,

    // === Costs ===
    /// Generation plus curtailment at VOLL ($/h)
    pub total_cost: f64,
    /// Generation only ($/h)
    pub objective_value: f64,
    pub total_curtailment: f64,

    // === Per-element records ===
    pub generator_results: Vec<GeneratorResult>,
    pub bus_results: Vec<BusResult>,
    pub line_results: Vec<LineResult>,
    pub binding_constraints: Vec<BindingConstraint>,

    // === Preprocessing ===
    /// Buses dropped by island removal
    pub removed_buses: Vec<BusId>,
    pub diagnostics: Diagnostics,
}

impl DispatchResult {
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn total_generation(&self) -> f64 {
        self.generator_results.iter().map(|g| g.pg).sum()
    }

    pub fn generator(&self, id: &str) -> Option<&GeneratorResult> {
        self.generator_results.iter().find(|g| g.id == id)
    }

    pub fn bus(&self, id: BusId) -> Option<&BusResult> {
        self.bus_results.iter().find(|b| b.bus == id)
    }

    /// Result of the first line between `from` and `to` in either direction.
    pub fn line(&self, from: BusId, to: BusId) -> Option<&LineResult> {
        self.line_results.iter().find(|l| {
            (l.from_bus == from && l.to_bus == to) || (l.from_bus == to && l.to_bus == from)
        })
    }
}
