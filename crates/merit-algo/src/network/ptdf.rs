//! Power Transfer Distribution Factors.
//!
//! PTDF[ℓ,n] is the change in flow on branch ℓ (from → to, per-unit) for one
//! per-unit injected at bus n and withdrawn at the slack:
//! ```text
//! X      = B_r⁻¹ re-embedded with a zero slack row/column
//! PTDF[ℓ,:] = (X[from,:] - X[to,:]) / x_ℓ
//! ```
//! The slack column is therefore always zero.

use super::linalg::{invert_or_pinv, Factorization};
use super::susceptance::SparseSusceptance;
use merit_core::BusId;
use nalgebra::DMatrix;

/// Dense PTDF matrix, one row per branch of the susceptance model.
#[derive(Debug, Clone)]
pub struct PtdfMatrix {
    /// Column index → bus ID
    pub bus_ids: Vec<BusId>,
    /// ptdf[(branch_idx, bus_idx)]
    pub values: DMatrix<f64>,
    /// Whether B_r had to be pseudo-inverted
    pub factorization: Factorization,
}

impl PtdfMatrix {
    pub fn compute(susceptance: &SparseSusceptance) -> Self {
        let n = susceptance.n_bus();
        let slack = susceptance.slack_idx();
        let (inv_reduced, factorization) = invert_or_pinv(&susceptance.reduced_matrix());

        let reduced_to_full: Vec<usize> = (0..n).filter(|&i| i != slack).collect();
        let mut x = DMatrix::zeros(n, n);
        for (ri, &fi) in reduced_to_full.iter().enumerate() {
            for (rj, &fj) in reduced_to_full.iter().enumerate() {
                x[(fi, fj)] = inv_reduced[(ri, rj)];
            }
        }

        let branches = susceptance.branches();
        let mut values = DMatrix::zeros(branches.len(), n);
        for (k, br) in branches.iter().enumerate() {
            for col in 0..n {
                values[(k, col)] = (x[(br.from, col)] - x[(br.to, col)]) / br.x;
            }
        }

        Self {
            bus_ids: susceptance.bus_order().to_vec(),
            values,
            factorization,
        }
    }

    pub fn get_by_idx(&self, branch_idx: usize, bus_idx: usize) -> f64 {
        self.values
            .get((branch_idx, bus_idx))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn num_branches(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_buses(&self) -> usize {
        self.values.ncols()
    }

    /// Branch flows (per-unit) for a vector of bus injections (per-unit).
    pub fn flows(&self, injections: &[f64]) -> Vec<f64> {
        (0..self.num_branches())
            .map(|k| {
                injections
                    .iter()
                    .enumerate()
                    .map(|(i, p)| self.values[(k, i)] * p)
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::{Bus, Case, Line};

    fn ptdf_for(case: &Case, slack: usize) -> PtdfMatrix {
        let b_mat = SparseSusceptance::from_case(case, slack, 0.01).unwrap();
        PtdfMatrix::compute(&b_mat)
    }

    #[test]
    fn test_two_bus_ptdf() {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2))],
            lines: vec![Line::new(b(1), b(2), 0.25)],
            ..Case::default()
        };
        let ptdf = ptdf_for(&case, 0);
        assert_eq!(ptdf.factorization, Factorization::Direct);
        assert!(ptdf.get_by_idx(0, 0).abs() < 1e-12);
        assert!((ptdf.get_by_idx(0, 1) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_split() {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2)), Bus::new(b(3))],
            lines: vec![
                Line::new(b(1), b(2), 0.1),
                Line::new(b(2), b(3), 0.1),
                Line::new(b(1), b(3), 0.1),
            ],
            ..Case::default()
        };
        let ptdf = ptdf_for(&case, 0);

        // One unit injected at bus 3 returns to the slack 2/3 directly, 1/3 via bus 2
        let flows = ptdf.flows(&[0.0, 0.0, 1.0]);
        assert!((flows[0] + 1.0 / 3.0).abs() < 1e-10, "flow 1-2 = {}", flows[0]);
        assert!((flows[1] + 1.0 / 3.0).abs() < 1e-10, "flow 2-3 = {}", flows[1]);
        assert!((flows[2] + 2.0 / 3.0).abs() < 1e-10, "flow 1-3 = {}", flows[2]);

        for k in 0..3 {
            assert_eq!(ptdf.get_by_idx(k, 0), 0.0, "slack column must be zero");
        }
    }

    #[test]
    fn test_slack_in_middle() {
        let b = BusId::new;
        let case = Case {
            buses: vec![Bus::new(b(5)), Bus::new(b(8)), Bus::new(b(2))],
            lines: vec![Line::new(b(5), b(8), 0.2), Line::new(b(8), b(2), 0.2)],
            ..Case::default()
        };
        let ptdf = ptdf_for(&case, 1);
        // Radial: injection at bus 5 flows 5 → 8 entirely
        assert!((ptdf.get_by_idx(0, 0) - 1.0).abs() < 1e-10);
        assert!(ptdf.get_by_idx(1, 0).abs() < 1e-10);
        // injection at bus 2 flows 2 → 8, against the 8 → 2 orientation
        assert!((ptdf.get_by_idx(1, 2) + 1.0).abs() < 1e-10);
    }
}
