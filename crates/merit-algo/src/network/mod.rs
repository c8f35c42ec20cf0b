//! Linearized network model rebuilt for every solve.
//!
//! [`NetworkModel::build`] resolves the slack bus, assembles B, computes the
//! PTDF and attaches per-unit ratings to every monitored branch. Angles are
//! recovered afterwards from net injections with [`NetworkModel::solve_angles`].

pub mod linalg;
pub mod ptdf;
pub mod susceptance;

pub use linalg::Factorization;
pub use ptdf::PtdfMatrix;
pub use susceptance::{BranchTerminals, SparseSusceptance};

use crate::{DispatchConfig, DispatchError};
use merit_core::{BusId, Case, Diagnostics, SlackBus};
use nalgebra::DVector;
use std::collections::HashMap;
use tracing::warn;

/// A monitored line: terminals, reactance and rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch {
    pub terminals: BranchTerminals,
    /// Rating in MW after default substitution
    pub rating_mw: f64,
    /// Rating in per-unit
    pub rating_pu: f64,
}

#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub base_mva: f64,
    pub slack: SlackBus,
    pub bus_index: HashMap<BusId, usize>,
    pub susceptance: SparseSusceptance,
    pub ptdf: PtdfMatrix,
    pub branches: Vec<Branch>,
}

impl NetworkModel {
    pub fn build(
        case: &Case,
        config: &DispatchConfig,
        diag: &mut Diagnostics,
    ) -> Result<Self, DispatchError> {
        let slack = case
            .slack_bus()
            .ok_or_else(|| DispatchError::Structural("case has no buses".into()))?;
        if slack.implicit {
            // Case::validate_into records this one
            warn!("no slack bus marked; using {}", slack.id);
        }

        let base_mva = case.base_mva();
        let susceptance =
            SparseSusceptance::from_case(case, slack.index, config.zero_reactance_default)?;
        let ptdf = PtdfMatrix::compute(&susceptance);
        if ptdf.factorization == Factorization::Fallback {
            diag.add_warning(
                "topology",
                "network is not fully connected; pseudo-inverse used for PTDF",
            );
        }

        let branches = susceptance
            .branches()
            .iter()
            .map(|t| {
                let rate_a = case.lines[t.line_pos].rate_a.value();
                let rating_mw = if rate_a > 0.0 {
                    rate_a
                } else {
                    config.default_line_rating_mw
                };
                Branch {
                    terminals: *t,
                    rating_mw,
                    rating_pu: rating_mw / base_mva,
                }
            })
            .collect();

        Ok(Self {
            base_mva,
            slack,
            bus_index: case.bus_index_map(),
            susceptance,
            ptdf,
            branches,
        })
    }

    pub fn n_bus(&self) -> usize {
        self.susceptance.n_bus()
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }

    /// Branch flows (per-unit, branch order) for net injections via PTDF · P.
    pub fn flows_from_injections(&self, injections_pu: &[f64]) -> Vec<f64> {
        self.ptdf.flows(injections_pu)
    }

    /// Bus angles (radians) for net injections (per-unit, bus order).
    ///
    /// Solves `B_r θ_r = P_r` with the slack row removed; the slack angle is
    /// exactly zero.
    pub fn solve_angles(&self, injections_pu: &[f64]) -> (Vec<f64>, Factorization) {
        let slack = self.slack.index;
        let reduced_rhs: Vec<f64> = injections_pu
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != slack)
            .map(|(_, p)| *p)
            .collect();

        let (theta_r, how) =
            linalg::solve_or_lstsq(&self.susceptance.reduced_matrix(), &DVector::from_vec(reduced_rhs));

        let mut theta = Vec::with_capacity(self.n_bus());
        theta.extend(theta_r.iter().take(slack).copied());
        theta.push(0.0);
        theta.extend(theta_r.iter().skip(slack).copied());
        (theta, how)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::{Bus, BusType, Line};

    fn chain() -> Case {
        let b = BusId::new;
        Case {
            buses: vec![
                Bus::new(b(30)),
                Bus::new(b(10)).with_type(BusType::Slack),
                Bus::new(b(20)),
            ],
            lines: vec![
                Line::new(b(10), b(30), 0.1).with_rating(80.0),
                Line::new(b(10), b(20), 0.2).with_rating(0.0),
            ],
            base_mva: 50.0,
            ..Case::default()
        }
    }

    #[test]
    fn test_build_ratings_and_slack() {
        let mut diag = Diagnostics::new();
        let model = NetworkModel::build(&chain(), &DispatchConfig::default(), &mut diag).unwrap();
        assert_eq!(model.slack.index, 1);
        assert!(diag.is_empty());
        assert_eq!(model.branches[0].rating_mw, 80.0);
        assert!((model.branches[0].rating_pu - 1.6).abs() < 1e-12);
        assert_eq!(model.branches[1].rating_mw, 250.0);
    }

    #[test]
    fn test_slack_angle_zero_at_slack_position() {
        let model =
            NetworkModel::build(&chain(), &DispatchConfig::default(), &mut Diagnostics::new())
                .unwrap();
        // slack supplies 0.5 pu to bus 30 and 0.25 pu to bus 20
        let (theta, how) = model.solve_angles(&[-0.5, 0.75, -0.25]);
        assert_eq!(how, Factorization::Direct);
        assert_eq!(theta[1], 0.0);
        assert!((theta[0] + 0.05).abs() < 1e-12, "theta_30 = {}", theta[0]);
        assert!((theta[2] + 0.05).abs() < 1e-12, "theta_20 = {}", theta[2]);
    }

    #[test]
    fn test_ptdf_flows_match_angle_flows() {
        let model =
            NetworkModel::build(&chain(), &DispatchConfig::default(), &mut Diagnostics::new())
                .unwrap();
        let injections = [-0.5, 0.75, -0.25];
        let (theta, _) = model.solve_angles(&injections);
        let flows = model.flows_from_injections(&injections);
        for (branch, flow) in model.branches.iter().zip(&flows) {
            let t = branch.terminals;
            let from_angles = (theta[t.from] - theta[t.to]) / t.x;
            assert!((flow - from_angles).abs() < 1e-9, "flow {} vs {}", flow, from_angles);
        }
        assert!((flows[0] - 0.5).abs() < 1e-9);
        assert!((flows[1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_implicit_slack_is_first_bus() {
        let mut case = chain();
        case.buses[1].bus_type = BusType::Pq;
        let model =
            NetworkModel::build(&case, &DispatchConfig::default(), &mut Diagnostics::new())
                .unwrap();
        assert_eq!(model.slack.index, 0);
        assert!(model.slack.implicit);
        let (theta, _) = model.solve_angles(&[0.5, -0.25, -0.25]);
        assert_eq!(theta[0], 0.0);
    }
}
