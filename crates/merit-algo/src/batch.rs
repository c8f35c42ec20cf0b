//! Solve many independent cases with one configuration.
//!
//! With the `parallel` feature each case runs on the rayon pool; otherwise
//! cases are solved in order on the calling thread. Results keep input order
//! and one failing case does not stop the others.

use crate::{DispatchError, DispatchResult, DispatchSolver};
use merit_core::Case;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::info;

pub fn solve_batch(
    solver: &DispatchSolver,
    cases: &[Case],
) -> Vec<Result<DispatchResult, DispatchError>> {
    #[cfg(feature = "parallel")]
    let results: Vec<_> = cases.par_iter().map(|case| solver.solve(case)).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = cases.iter().map(|case| solver.solve(case)).collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(cases = cases.len(), failed, "batch dispatch finished");
    results
}
