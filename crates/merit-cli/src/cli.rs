use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "merit", author, version, about = "DC optimal power flow dispatch", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a case and report prices, flows and costs
    Solve {
        /// Case file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        case: PathBuf,

        #[command(flatten)]
        options: DispatchArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write the JSON result to a file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// Dispatch several cases with one configuration
    Batch {
        /// Case files (JSON)
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        cases: Vec<PathBuf>,

        #[command(flatten)]
        options: DispatchArgs,
    },
    /// Check a case for data problems without solving it
    Validate {
        /// Case file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        case: PathBuf,
    },
    /// List the connected components of a case
    Islands {
        /// Case file (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        case: PathBuf,
    },
}

/// Dispatch parameters shared by `solve` and `batch`.
///
/// Flags override values read from `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct DispatchArgs {
    /// Dispatch configuration (TOML)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Value of lost load ($/MWh)
    #[arg(long)]
    pub voll: Option<f64>,

    /// Ignore line ratings (economic dispatch)
    #[arg(long)]
    pub no_line_limits: bool,

    /// Drop buses not connected to the slack bus before solving
    #[arg(long)]
    pub remove_isolated: bool,

    /// Iteration cap for the solver backend
    #[arg(long)]
    pub max_iter: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}
