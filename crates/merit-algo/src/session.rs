//! Caller-owned "current case / last result" context.
//!
//! Services that keep one working case between requests hold a
//! [`DispatchSession`] per client instead of a process-wide slot. Wrap it in
//! a mutex if several threads share one.

use crate::{DispatchConfig, DispatchError, DispatchResult, DispatchSolver};
use merit_core::Case;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DispatchSession {
    solver: DispatchSolver,
    case: Option<Case>,
    last_result: Option<DispatchResult>,
}

impl DispatchSession {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            solver: DispatchSolver::new().with_config(config),
            case: None,
            last_result: None,
        }
    }

    /// Replace the current case. The previous result no longer applies and
    /// is dropped.
    pub fn load_case(&mut self, case: Case) {
        debug!(buses = case.buses.len(), "session case loaded");
        self.case = Some(case);
        self.last_result = None;
    }

    pub fn case(&self) -> Option<&Case> {
        self.case.as_ref()
    }

    /// Solve the current case and keep the result.
    pub fn solve(&mut self) -> Result<&DispatchResult, DispatchError> {
        let case = self.case.as_ref().ok_or(DispatchError::NoCase)?;
        let result = self.solver.solve(case)?;
        Ok(self.last_result.insert(result))
    }

    pub fn last_result(&self) -> Option<&DispatchResult> {
        self.last_result.as_ref()
    }

    pub fn config(&self) -> &DispatchConfig {
        self.solver.config()
    }

    /// Swap configuration for subsequent solves.
    pub fn set_config(&mut self, config: DispatchConfig) {
        self.solver = DispatchSolver::new().with_config(config);
    }

    pub fn clear(&mut self) {
        self.case = None;
        self.last_result = None;
    }
}
