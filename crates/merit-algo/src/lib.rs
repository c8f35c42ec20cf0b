//! # merit-algo: DC optimal power flow dispatch
//!
//! Least-cost dispatch of a [`merit_core::Case`] under the linearized ("DC")
//! network model, with locational marginal prices, line flows and
//! unserved-load curtailment priced at the value of lost load (VOLL).
//!
//! ## Pipeline
//!
//! 1. **[`network`]**: susceptance matrix, slack resolution and PTDF
//! 2. **[`problem`]**: decision vector `[generators | curtailment per bus]`,
//!    balance row, line-limit rows and bounds
//! 3. **[`solve`]**: picks one of four solve paths and runs its backend
//! 4. **extraction**: angles, flows, LMPs, congestion rent and costs
//!
//! | Path | Cost curves | Line limits | Backend |
//! |------|-------------|-------------|---------|
//! | [`SolvePath::LpCongested`] | linear | enforced | Clarabel interior point |
//! | [`SolvePath::QpCongested`] | quadratic | enforced | augmented Lagrangian + L-BFGS |
//! | [`SolvePath::LpUncongested`] | linear | off | Clarabel interior point |
//! | [`SolvePath::QpUncongested`] | quadratic | off | augmented Lagrangian + L-BFGS |
//!
//! Every call is stateless: matrices are rebuilt per solve, so a
//! [`DispatchSolver`] can be shared freely between threads. Use
//! [`DispatchSession`] to keep a working case between calls and
//! [`solve_batch`] to run many cases in parallel.
//!
//! ## Example
//!
//! ```ignore
//! use merit_algo::DispatchSolver;
//! use merit_core::Case;
//!
//! let case = Case::from_json_file("case3.json")?;
//! let result = DispatchSolver::new().with_voll(5000.0).solve(&case)?;
//!
//! println!("{} via {}: ${:.2}/h", result.status, result.solve_path, result.total_cost);
//! for bus in &result.bus_results {
//!     println!("{}: {:.2} $/MWh", bus.bus, bus.marginal_cost);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
mod extract;
pub mod merit;
pub mod network;
pub mod problem;
pub mod session;
pub mod solve;
pub mod solver;
pub mod types;

pub use batch::solve_batch;
pub use config::{DispatchConfig, SolverSettings};
pub use error::DispatchError;
pub use network::{NetworkModel, PtdfMatrix};
pub use problem::{DispatchProblem, ProblemClass};
pub use session::DispatchSession;
pub use solve::{DispatchBackend, MultiplierConvention, SolvePath};
pub use solver::DispatchSolver;
pub use types::{
    BindingConstraint, BusResult, DispatchResult, GeneratorResult, LineResult, SolveStatus,
};
