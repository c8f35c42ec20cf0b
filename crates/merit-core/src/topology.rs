//! Island detection and removal of buses cut off from the slack bus.
//!
//! Only in-service lines with both endpoints present connect buses. A bus
//! that cannot reach the slack through such lines has no defined angle in the
//! linearized model, so callers either inspect [`find_islands`] or drop those
//! buses with [`remove_isolated`] before dispatch.

use crate::{BusId, Case, GridError, GridResult};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// One connected component of the in-service network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    pub island_id: usize,
    /// Member buses in case order
    pub buses: Vec<BusId>,
    pub contains_slack: bool,
}

/// A case reduced to the slack bus island.
#[derive(Debug, Clone)]
pub struct IslandRemoval {
    pub case: Case,
    pub removed_buses: Vec<BusId>,
    pub removed_generators: usize,
    pub removed_lines: usize,
    pub removed_loads: usize,
}

/// Bus graph with one node per bus position and one edge per in-service line.
fn bus_graph(case: &Case) -> UnGraph<BusId, ()> {
    let index = case.bus_index_map();
    let mut graph = UnGraph::with_capacity(case.buses.len(), case.lines.len());
    for bus in &case.buses {
        graph.add_node(bus.id);
    }
    for line in case.lines.iter().filter(|l| l.in_service) {
        if let (Some(&i), Some(&j)) = (index.get(&line.from_bus), index.get(&line.to_bus)) {
            graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), ());
        }
    }
    graph
}

/// Number of connected components in the in-service network.
pub fn island_count(case: &Case) -> usize {
    connected_components(&bus_graph(case))
}

/// Labels connected components by breadth-first search, in case bus order.
pub fn find_islands(case: &Case) -> Vec<Island> {
    let graph = bus_graph(case);
    let slack = case.slack_bus().map(|s| s.index);
    let mut visited = HashSet::new();
    let mut islands = Vec::new();

    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(node);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        members.sort();
        islands.push(Island {
            island_id: islands.len(),
            contains_slack: slack.is_some_and(|s| members.contains(&NodeIndex::new(s))),
            buses: members.into_iter().map(|n| graph[n]).collect(),
        });
    }

    debug!(islands = islands.len(), "island scan complete");
    islands
}

/// Keep only the slack bus island.
///
/// Generators and loads on removed buses are dropped, as is every line with
/// an endpoint outside the island.
pub fn remove_isolated(case: &Case) -> GridResult<IslandRemoval> {
    let slack = case
        .slack_bus()
        .ok_or_else(|| GridError::Topology("case has no buses".into()))?;

    let islands = find_islands(case);
    let keep: HashSet<BusId> = islands
        .iter()
        .find(|island| island.contains_slack)
        .map(|island| island.buses.iter().copied().collect())
        .ok_or_else(|| GridError::Topology(format!("no island contains slack {}", slack.id)))?;

    let mut reduced = case.clone();
    reduced.buses.retain(|b| keep.contains(&b.id));
    reduced.generators.retain(|g| keep.contains(&g.bus));
    reduced
        .lines
        .retain(|l| keep.contains(&l.from_bus) && keep.contains(&l.to_bus));
    reduced.loads.retain(|l| keep.contains(&l.bus));

    let removed_buses: Vec<BusId> = case
        .buses
        .iter()
        .map(|b| b.id)
        .filter(|id| !keep.contains(id))
        .collect();

    let removal = IslandRemoval {
        removed_generators: case.generators.len() - reduced.generators.len(),
        removed_lines: case.lines.len() - reduced.lines.len(),
        removed_loads: case.loads.len() - reduced.loads.len(),
        removed_buses,
        case: reduced,
    };

    if !removal.removed_buses.is_empty() {
        info!(
            buses = removal.removed_buses.len(),
            generators = removal.removed_generators,
            lines = removal.removed_lines,
            loads = removal.removed_loads,
            "removed elements not connected to slack {}",
            slack.id
        );
    }

    Ok(removal)
}
