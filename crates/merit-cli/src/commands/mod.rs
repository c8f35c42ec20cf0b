pub mod inspect;
pub mod solve;

use anyhow::{Context, Result};
use merit_algo::DispatchConfig;
use merit_cli::cli::DispatchArgs;
use merit_core::Case;
use std::path::Path;

pub fn load_case(path: &Path) -> Result<Case> {
    Case::from_json_file(path).with_context(|| format!("loading case {}", path.display()))
}

/// Configuration from `--config` (or defaults) with flag overrides applied.
pub fn dispatch_config(args: &DispatchArgs) -> Result<DispatchConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => DispatchConfig::default(),
    };

    if let Some(voll) = args.voll {
        config.voll = voll;
    }
    if args.no_line_limits {
        config.enforce_line_limits = false;
    }
    if args.remove_isolated {
        config.remove_isolated = true;
    }
    if let Some(max_iter) = args.max_iter {
        config.solver.max_iterations = max_iter;
    }
    config.validate()?;
    Ok(config)
}
