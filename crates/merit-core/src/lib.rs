//! # merit-core: case model for DC dispatch
//!
//! Plain data structures describing a single static snapshot of a transmission
//! system: buses, generators, lines and loads plus the system MVA base. The
//! solver crate (`merit-algo`) builds its network model from a [`Case`].
//!
//! ## Conventions
//!
//! - Powers are entered in MW/Mvar, angles in degrees. Conversion to per-unit
//!   happens inside the solver using [`Case::base_mva`].
//! - Bus identifiers are arbitrary integers. They are **not** assumed to be
//!   contiguous or 1-based; every lookup goes through [`Case::bus_index_map`].
//! - Serialized field names match the usual case interchange layout
//!   (`type`, `v_mag`, `rate_a`, `status` as 0/1, `cost` as `[a, b, c]`).
//!
//! ## Quick Start
//!
//! ```rust
//! use merit_core::*;
//!
//! let case = Case {
//!     buses: vec![Bus::new(BusId::new(1)).with_type(BusType::Slack), Bus::new(BusId::new(2))],
//!     generators: vec![Generator::new(BusId::new(1))
//!         .with_p_limits(0.0, 200.0)
//!         .with_cost(0.0, 20.0, 0.0)],
//!     lines: vec![Line::new(BusId::new(1), BusId::new(2), 0.1)],
//!     loads: vec![Load::new(BusId::new(2), 80.0)],
//!     ..Case::default()
//! };
//!
//! assert!(case.ensure_dispatchable().is_ok());
//! assert_eq!(case.total_demand().value(), 80.0);
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Warning/error collection for validation and preprocessing
//! - [`topology`] - Island detection and removal of buses cut off from the slack
//! - [`units`] - Unit newtypes (MW, per-unit, radians, ...)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;

pub mod diagnostics;
pub mod error;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GridError, GridResult};
pub use topology::{find_islands, remove_isolated, Island, IslandRemoval};
pub use units::{Degrees, Kilovolts, Megavars, Megawatts, PerUnit, Radians};

/// Base used when a case carries a missing or non-positive MVA base.
pub const DEFAULT_BASE_MVA: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);

impl BusId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BusId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bus {}", self.0)
    }
}

/// Bus classification. Serialized as the integer codes 1 (PQ), 2 (PV), 3 (slack).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BusType {
    #[default]
    Pq,
    Pv,
    Slack,
}

impl TryFrom<u8> for BusType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BusType::Pq),
            2 => Ok(BusType::Pv),
            3 => Ok(BusType::Slack),
            other => Err(format!("bus type must be 1, 2 or 3 (got {})", other)),
        }
    }
}

impl From<BusType> for u8 {
    fn from(t: BusType) -> Self {
        match t {
            BusType::Pq => 1,
            BusType::Pv => 2,
            BusType::Slack => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub bus_type: BusType,
    /// Voltage magnitude, passed through to results
    #[serde(rename = "v_mag", default = "default_voltage")]
    pub voltage_pu: PerUnit,
    /// Initial voltage angle; overwritten by the dispatch solution
    #[serde(rename = "v_ang", default)]
    pub angle_deg: Degrees,
    #[serde(default = "default_base_kv")]
    pub base_kv: Kilovolts,
    #[serde(default = "default_zone")]
    pub zone: i64,
}

fn default_voltage() -> PerUnit {
    PerUnit(1.0)
}

fn default_base_kv() -> Kilovolts {
    Kilovolts(345.0)
}

fn default_zone() -> i64 {
    1
}

impl Bus {
    pub fn new(id: BusId) -> Self {
        Self {
            id,
            name: None,
            bus_type: BusType::Pq,
            voltage_pu: default_voltage(),
            angle_deg: Degrees(0.0),
            base_kv: default_base_kv(),
            zone: default_zone(),
        }
    }

    pub fn with_type(mut self, bus_type: BusType) -> Self {
        self.bus_type = bus_type;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_slack(&self) -> bool {
        self.bus_type == BusType::Slack
    }
}

/// Quadratic generator cost `a·P² + b·P + c` with `P` in MW and the result in $/h.
///
/// Serialized as the coefficient array `[a, b, c]`. Shorter arrays are read
/// as the trailing coefficients (`[b, c]` is linear, `[c]` is a constant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 3]")]
pub struct CostCurve {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for CostCurve {
    fn default() -> Self {
        Self {
            a: 0.0,
            b: 25.0,
            c: 0.0,
        }
    }
}

impl CostCurve {
    pub fn quadratic(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    pub fn linear(b: f64, c: f64) -> Self {
        Self { a: 0.0, b, c }
    }

    /// Cost at `p_mw` ($/h)
    pub fn evaluate(&self, p_mw: f64) -> f64 {
        self.a * p_mw * p_mw + self.b * p_mw + self.c
    }

    /// Incremental cost at `p_mw` ($/MWh)
    pub fn marginal_cost(&self, p_mw: f64) -> f64 {
        2.0 * self.a * p_mw + self.b
    }

    pub fn is_linear(&self) -> bool {
        self.a == 0.0
    }
}

impl TryFrom<Vec<f64>> for CostCurve {
    type Error = String;

    fn try_from(coeffs: Vec<f64>) -> Result<Self, Self::Error> {
        match coeffs.as_slice() {
            [a, b, c] => Ok(Self::quadratic(*a, *b, *c)),
            [b, c] => Ok(Self::linear(*b, *c)),
            [c] => Ok(Self::linear(0.0, *c)),
            [] => Ok(Self::linear(0.0, 0.0)),
            _ => Err(format!(
                "cost must have at most 3 coefficients [a, b, c] (got {})",
                coeffs.len()
            )),
        }
    }
}

impl From<CostCurve> for [f64; 3] {
    fn from(cost: CostCurve) -> Self {
        [cost.a, cost.b, cost.c]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub bus: BusId,
    #[serde(default = "default_pmax")]
    pub pmax: Megawatts,
    #[serde(default = "default_pmin")]
    pub pmin: Megawatts,
    /// Reactive limits are carried for reporting; dispatch ignores them
    #[serde(default = "default_qmax")]
    pub qmax: Megavars,
    #[serde(default = "default_qmin")]
    pub qmin: Megavars,
    #[serde(default)]
    pub cost: CostCurve,
    #[serde(rename = "status", default = "default_in_service", with = "status_flag")]
    pub in_service: bool,
}

fn default_pmax() -> Megawatts {
    Megawatts(250.0)
}

fn default_pmin() -> Megawatts {
    Megawatts(10.0)
}

fn default_qmax() -> Megavars {
    Megavars(300.0)
}

fn default_qmin() -> Megavars {
    Megavars(-300.0)
}

fn default_in_service() -> bool {
    true
}

impl Generator {
    /// Generator with the interchange-format defaults (10-250 MW, 25 $/MWh).
    pub fn new(bus: BusId) -> Self {
        Self {
            id: None,
            name: None,
            bus,
            pmax: default_pmax(),
            pmin: default_pmin(),
            qmax: default_qmax(),
            qmin: default_qmin(),
            cost: CostCurve::default(),
            in_service: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set active power limits (in MW)
    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin = Megawatts(pmin);
        self.pmax = Megawatts(pmax);
        self
    }

    pub fn with_cost(mut self, a: f64, b: f64, c: f64) -> Self {
        self.cost = CostCurve::quadratic(a, b, c);
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.in_service = false;
        self
    }

    /// Display label: id, then name, then the position-derived fallback.
    pub fn label(&self, position: usize) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("gen{}", position + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit); ignored by the lossless model
    #[serde(default)]
    pub r: f64,
    /// Series reactance (per-unit)
    pub x: f64,
    /// Total line charging susceptance (per-unit)
    #[serde(default)]
    pub b: f64,
    /// Long-term rating (MW)
    #[serde(default = "default_rating")]
    pub rate_a: Megawatts,
    #[serde(default = "default_rating")]
    pub rate_b: Megawatts,
    #[serde(default = "default_rating")]
    pub rate_c: Megawatts,
    #[serde(rename = "status", default = "default_in_service", with = "status_flag")]
    pub in_service: bool,
}

fn default_rating() -> Megawatts {
    Megawatts(250.0)
}

impl Line {
    pub fn new(from_bus: BusId, to_bus: BusId, x: f64) -> Self {
        Self {
            from_bus,
            to_bus,
            r: 0.0,
            x,
            b: 0.0,
            rate_a: default_rating(),
            rate_b: default_rating(),
            rate_c: default_rating(),
            in_service: true,
        }
    }

    pub fn with_rating(mut self, rate_a: f64) -> Self {
        self.rate_a = Megawatts(rate_a);
        self
    }

    pub fn out_of_service(mut self) -> Self {
        self.in_service = false;
        self
    }

    /// "Line 1-2" style label
    pub fn label(&self) -> String {
        format!("Line {}-{}", self.from_bus.value(), self.to_bus.value())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub bus: BusId,
    pub pd: Megawatts,
    #[serde(default)]
    pub qd: Megavars,
}

impl Load {
    pub fn new(bus: BusId, pd: f64) -> Self {
        Self {
            bus,
            pd: Megawatts(pd),
            qd: Megavars(0.0),
        }
    }
}

/// Reference bus chosen for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlackBus {
    /// Position in [`Case::buses`]
    pub index: usize,
    pub id: BusId,
    /// True when no bus was marked as slack and the first bus was taken
    pub implicit: bool,
}

/// Element counts and totals for a case.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseStats {
    pub num_buses: usize,
    pub num_generators: usize,
    pub num_in_service_generators: usize,
    pub num_lines: usize,
    pub num_in_service_lines: usize,
    pub num_loads: usize,
    pub total_demand_mw: f64,
    pub total_capacity_mw: f64,
}

/// A single static snapshot of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(default)]
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub generators: Vec<Generator>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub loads: Vec<Load>,
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
}

fn default_base_mva() -> f64 {
    DEFAULT_BASE_MVA
}

impl Default for Case {
    fn default() -> Self {
        Self {
            buses: Vec::new(),
            generators: Vec::new(),
            lines: Vec::new(),
            loads: Vec::new(),
            base_mva: DEFAULT_BASE_MVA,
        }
    }
}

impl Case {
    pub fn from_json_str(json: &str) -> GridResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> GridResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// MVA base used for per-unit conversion (100 when the stored value is unusable).
    pub fn base_mva(&self) -> f64 {
        if self.base_mva.is_finite() && self.base_mva > 0.0 {
            self.base_mva
        } else {
            DEFAULT_BASE_MVA
        }
    }

    /// Map from bus id to position in `buses`. Later duplicates are ignored.
    pub fn bus_index_map(&self) -> HashMap<BusId, usize> {
        let mut map = HashMap::with_capacity(self.buses.len());
        for (idx, bus) in self.buses.iter().enumerate() {
            map.entry(bus.id).or_insert(idx);
        }
        map
    }

    /// First bus marked as slack, or the first bus when none is marked.
    pub fn slack_bus(&self) -> Option<SlackBus> {
        if let Some((index, bus)) = self.buses.iter().enumerate().find(|(_, b)| b.is_slack()) {
            return Some(SlackBus {
                index,
                id: bus.id,
                implicit: false,
            });
        }
        self.buses.first().map(|bus| SlackBus {
            index: 0,
            id: bus.id,
            implicit: true,
        })
    }

    /// Real demand per bus in bus order. Loads on the same bus accumulate;
    /// loads on unknown buses are dropped.
    pub fn bus_demand(&self) -> Vec<Megawatts> {
        let index = self.bus_index_map();
        let mut demand = vec![Megawatts(0.0); self.buses.len()];
        for load in &self.loads {
            if let Some(&i) = index.get(&load.bus) {
                demand[i] += load.pd;
            }
        }
        demand
    }

    /// Total demand on known buses.
    pub fn total_demand(&self) -> Megawatts {
        self.bus_demand().into_iter().sum()
    }

    /// Sum of Pmax over in-service generators on known buses.
    pub fn in_service_capacity(&self) -> Megawatts {
        let index = self.bus_index_map();
        self.generators
            .iter()
            .filter(|g| g.in_service && index.contains_key(&g.bus))
            .map(|g| g.pmax)
            .sum()
    }

    pub fn stats(&self) -> CaseStats {
        CaseStats {
            num_buses: self.buses.len(),
            num_generators: self.generators.len(),
            num_in_service_generators: self.generators.iter().filter(|g| g.in_service).count(),
            num_lines: self.lines.len(),
            num_in_service_lines: self.lines.iter().filter(|l| l.in_service).count(),
            num_loads: self.loads.len(),
            total_demand_mw: self.total_demand().value(),
            total_capacity_mw: self.in_service_capacity().value(),
        }
    }

    /// Structural checks that must pass before any dispatch is formulated.
    pub fn ensure_dispatchable(&self) -> GridResult<()> {
        if self.buses.is_empty() {
            return Err(GridError::Structure("case has no buses".into()));
        }
        if self.generators.is_empty() {
            return Err(GridError::Structure("case has no generators".into()));
        }
        if self.lines.is_empty() {
            return Err(GridError::Structure("case has no lines".into()));
        }
        Ok(())
    }

    /// Record data problems that dispatch tolerates but callers should see.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.buses.is_empty() {
            diag.add_error("structure", "case has no buses");
        }
        if self.generators.is_empty() {
            diag.add_error("structure", "case has no generators");
        }
        if self.lines.is_empty() {
            diag.add_error("structure", "case has no lines");
        }

        let index = self.bus_index_map();
        if index.len() != self.buses.len() {
            diag.add_error(
                "structure",
                &format!(
                    "{} duplicate bus id(s); only the first occurrence is used",
                    self.buses.len() - index.len()
                ),
            );
        }

        let slack_count = self.buses.iter().filter(|b| b.is_slack()).count();
        if slack_count == 0 && !self.buses.is_empty() {
            diag.add_warning(
                "topology",
                &format!("no slack bus marked; using {}", self.buses[0].id),
            );
        } else if slack_count > 1 {
            diag.add_warning(
                "topology",
                &format!("{} slack buses marked; only the first is used", slack_count),
            );
        }

        for (pos, gen) in self.generators.iter().enumerate() {
            let label = gen.label(pos);
            if !index.contains_key(&gen.bus) {
                diag.add_warning_with_entity(
                    "reference",
                    &format!("generator references unknown {}; skipped", gen.bus),
                    &label,
                );
            }
            if gen.in_service && gen.pmin.value() > gen.pmax.value() {
                diag.add_error_with_entity(
                    "physical",
                    &format!("Pmin {} exceeds Pmax {}", gen.pmin, gen.pmax),
                    &label,
                );
            }
        }

        for line in &self.lines {
            if !index.contains_key(&line.from_bus) || !index.contains_key(&line.to_bus) {
                diag.add_warning_with_entity(
                    "reference",
                    "line references unknown bus; skipped",
                    &line.label(),
                );
            }
            if line.x <= 0.0 {
                diag.add_warning_with_entity(
                    "physical",
                    &format!("non-positive reactance {}; small default substituted", line.x),
                    &line.label(),
                );
            }
        }

        for load in &self.loads {
            if !index.contains_key(&load.bus) {
                diag.add_warning_with_entity(
                    "reference",
                    &format!("load references unknown {}; skipped", load.bus),
                    &format!("Load at {}", load.bus.value()),
                );
            }
        }

        let demand = self.total_demand();
        let capacity = self.in_service_capacity();
        if capacity.value() < demand.value() {
            diag.add_warning(
                "capacity",
                &format!(
                    "in-service capacity {} is below demand {}; load will be curtailed",
                    capacity, demand
                ),
            );
        }
    }
}

/// In-service flags are written as 0/1 but also accepted as booleans.
mod status_flag {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
    }
}
