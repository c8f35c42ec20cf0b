//! Sparse susceptance matrix (B) for the lossless DC network.
//!
//! ```text
//! P = B × θ
//!
//! where:
//!   B[i,j] = -1/x_ij        for i ≠ j
//!   B[i,i] = Σ_k 1/x_ik
//! ```
//!
//! Bus order is case order. Lines that are out of service or reference an
//! unknown bus do not contribute.

use crate::DispatchError;
use merit_core::{BusId, Case};
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use tracing::debug;

/// An in-service line with both endpoints resolved to matrix indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchTerminals {
    /// Position in [`Case::lines`]
    pub line_pos: usize,
    pub from: usize,
    pub to: usize,
    /// Reactance after zero-reactance substitution (per-unit, > 0)
    pub x: f64,
}

/// Sparse B matrix in CSR format.
#[derive(Debug, Clone)]
pub struct SparseSusceptance {
    matrix: CsMat<f64>,
    bus_order: Vec<BusId>,
    bus_to_idx: HashMap<BusId, usize>,
    branches: Vec<BranchTerminals>,
    slack_idx: usize,
}

impl SparseSusceptance {
    /// Assemble B from the in-service lines of `case`.
    ///
    /// A reactance that is zero or negative is replaced by `zero_x_default`.
    pub fn from_case(
        case: &Case,
        slack_idx: usize,
        zero_x_default: f64,
    ) -> Result<Self, DispatchError> {
        let n = case.buses.len();
        if n == 0 {
            return Err(DispatchError::Structural("case has no buses".into()));
        }
        if slack_idx >= n {
            return Err(DispatchError::Structural(format!(
                "slack index {} outside {} buses",
                slack_idx, n
            )));
        }

        let bus_order: Vec<BusId> = case.buses.iter().map(|b| b.id).collect();
        let bus_to_idx = case.bus_index_map();

        let mut triplets = TriMat::new((n, n));
        let mut branches = Vec::with_capacity(case.lines.len());

        for (line_pos, line) in case.lines.iter().enumerate() {
            if !line.in_service {
                continue;
            }
            let (Some(&i), Some(&j)) = (bus_to_idx.get(&line.from_bus), bus_to_idx.get(&line.to_bus))
            else {
                debug!(line = %line.label(), "line references unknown bus; skipped");
                continue;
            };

            let x = if line.x > 0.0 { line.x } else { zero_x_default };
            let b = 1.0 / x;

            triplets.add_triplet(i, j, -b);
            triplets.add_triplet(j, i, -b);
            triplets.add_triplet(i, i, b);
            triplets.add_triplet(j, j, b);

            branches.push(BranchTerminals {
                line_pos,
                from: i,
                to: j,
                x,
            });
        }

        Ok(Self {
            matrix: triplets.to_csr(),
            bus_order,
            bus_to_idx,
            branches,
            slack_idx,
        })
    }

    /// Element B[i,j] by matrix indices.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    pub fn n_bus(&self) -> usize {
        self.bus_order.len()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn bus_order(&self) -> &[BusId] {
        &self.bus_order
    }

    pub fn bus_index(&self, bus_id: BusId) -> Option<usize> {
        self.bus_to_idx.get(&bus_id).copied()
    }

    pub fn slack_idx(&self) -> usize {
        self.slack_idx
    }

    /// Lines that contributed to B, in case order.
    pub fn branches(&self) -> &[BranchTerminals] {
        &self.branches
    }

    /// Dense B with the slack row and column removed.
    ///
    /// Row/column `r` of the result corresponds to bus index `r` when
    /// `r < slack_idx` and to `r + 1` otherwise.
    pub fn reduced_matrix(&self) -> DMatrix<f64> {
        let n = self.n_bus();
        let m = n.saturating_sub(1);
        let reduce = |idx: usize| if idx < self.slack_idx { idx } else { idx - 1 };

        let mut reduced = DMatrix::zeros(m, m);
        for i in 0..n {
            if i == self.slack_idx {
                continue;
            }
            if let Some(row) = self.matrix.outer_view(i) {
                for (j, &val) in row.iter() {
                    if j == self.slack_idx {
                        continue;
                    }
                    reduced[(reduce(i), reduce(j))] += val;
                }
            }
        }
        reduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merit_core::{Bus, Line};

    fn triangle() -> Case {
        let b = BusId::new;
        Case {
            buses: vec![Bus::new(b(1)), Bus::new(b(2)), Bus::new(b(3))],
            lines: vec![
                Line::new(b(1), b(2), 0.1),
                Line::new(b(2), b(3), 0.1),
                Line::new(b(1), b(3), 0.2),
            ],
            ..Case::default()
        }
    }

    #[test]
    fn test_susceptance_symmetry_and_row_sums() {
        let b_mat = SparseSusceptance::from_case(&triangle(), 0, 0.01).unwrap();
        assert_eq!(b_mat.n_bus(), 3);

        for i in 0..3 {
            let row_sum: f64 = (0..3).map(|j| b_mat.get(i, j)).sum();
            assert!(row_sum.abs() < 1e-10, "row {} sum = {}", i, row_sum);
            for j in 0..3 {
                assert!((b_mat.get(i, j) - b_mat.get(j, i)).abs() < 1e-10);
            }
        }
        assert!((b_mat.get(0, 0) - 15.0).abs() < 1e-10);
        assert!((b_mat.get(0, 2) + 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_out_of_service_and_unknown_lines_skipped() {
        let mut case = triangle();
        case.lines[2] = case.lines[2].clone().out_of_service();
        case.lines
            .push(Line::new(BusId::new(1), BusId::new(42), 0.1));

        let b_mat = SparseSusceptance::from_case(&case, 0, 0.01).unwrap();
        assert_eq!(b_mat.branches().len(), 2);
        assert_eq!(b_mat.get(0, 2), 0.0);
        assert!((b_mat.get(0, 0) - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_zero_reactance_substituted() {
        let mut case = triangle();
        case.lines[0].x = 0.0;
        let b_mat = SparseSusceptance::from_case(&case, 0, 0.01).unwrap();
        assert_eq!(b_mat.branches()[0].x, 0.01);
        assert!((b_mat.get(0, 1) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reduced_matrix_drops_slack() {
        let b_mat = SparseSusceptance::from_case(&triangle(), 1, 0.01).unwrap();
        let reduced = b_mat.reduced_matrix();
        assert_eq!(reduced.shape(), (2, 2));
        // remaining buses are 1 and 3
        assert!((reduced[(0, 0)] - b_mat.get(0, 0)).abs() < 1e-12);
        assert!((reduced[(0, 1)] - b_mat.get(0, 2)).abs() < 1e-12);
        assert!((reduced[(1, 1)] - b_mat.get(2, 2)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_case_is_structural() {
        let err = SparseSusceptance::from_case(&Case::default(), 0, 0.01).unwrap_err();
        assert!(matches!(err, DispatchError::Structural(_)));
    }
}
