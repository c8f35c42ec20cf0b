//! Error type for case loading and validation.
//!
//! [`GridError`] covers everything that can go wrong before a dispatch is
//! formulated: reading a case, decoding it, and structural checks on the
//! network. Solver crates convert it into their own error types.
//!
//! ```ignore
//! use merit_core::{Case, GridResult};
//!
//! fn load(path: &str) -> GridResult<Case> {
//!     let case = Case::from_json_file(path)?;
//!     case.ensure_dispatchable()?;
//!     Ok(case)
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors while reading case files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Case decoding errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// The case lacks something every dispatch needs (buses, generators, lines)
    #[error("Structural error: {0}")]
    Structure(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Topology errors (slack bus not found, empty island)
    #[error("Topology error: {0}")]
    Topology(String),

    #[error("{0}")]
    Other(String),
}

pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Parse(err.to_string())
    }
}
