use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use merit_algo::{solve_batch, DispatchResult, DispatchSolver};
use merit_cli::cli::{DispatchArgs, OutputFormat};
use tabwriter::TabWriter;
use tracing::{info, warn};

use super::{dispatch_config, load_case};

pub fn handle(
    case_path: &Path,
    args: &DispatchArgs,
    format: OutputFormat,
    out: Option<&Path>,
) -> Result<()> {
    let config = dispatch_config(args)?;
    let case = load_case(case_path)?;
    info!(
        case = %case_path.display(),
        buses = case.buses.len(),
        generators = case.generators.len(),
        lines = case.lines.len(),
        "loaded case"
    );

    let result = DispatchSolver::new()
        .with_config(config)
        .solve(&case)
        .with_context(|| format!("dispatching {}", case_path.display()))?;

    if let Some(path) = out {
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &result)?;
        info!(out = %path.display(), "wrote dispatch result");
    }

    match format {
        OutputFormat::Json => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &result)?;
            writeln!(handle)?;
        }
        OutputFormat::Table => print_tables(&result)?,
    }
    Ok(())
}

pub fn handle_batch(cases: &[PathBuf], args: &DispatchArgs) -> Result<()> {
    let config = dispatch_config(args)?;
    let loaded = cases
        .iter()
        .map(|path| load_case(path))
        .collect::<Result<Vec<_>>>()?;

    let solver = DispatchSolver::new().with_config(config);
    let results = solve_batch(&solver, &loaded);

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "CASE\tSTATUS\tPATH\tTOTAL COST ($/h)\tCURTAILMENT (MW)\tTIME (ms)")?;
    for (path, result) in cases.iter().zip(&results) {
        match result {
            Ok(r) => writeln!(
                writer,
                "{}\t{}\t{}\t{:.2}\t{:.3}\t{}",
                path.display(),
                r.status,
                r.solve_path,
                r.total_cost,
                r.total_curtailment,
                r.solve_time_ms
            )?,
            Err(err) => {
                warn!(case = %path.display(), error = %err, "case failed");
                writeln!(writer, "{}\terror\t-\t-\t-\t-", path.display())?
            }
        }
    }
    writer.flush()?;

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} cases failed", failed, cases.len());
    }
    Ok(())
}

fn print_tables(result: &DispatchResult) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());

    writeln!(
        writer,
        "Status: {} ({}, {} iterations, {} ms)",
        result.status, result.solve_path, result.iterations, result.solve_time_ms
    )?;
    writeln!(
        writer,
        "Total cost: {:.2} $/h (generation {:.2}, curtailment {:.3} MW)",
        result.total_cost, result.objective_value, result.total_curtailment
    )?;
    writeln!(writer)?;

    writeln!(writer, "GENERATOR\tBUS\tP (MW)\tCOST ($/h)")?;
    for gen in &result.generator_results {
        writeln!(
            writer,
            "{}\t{}\t{:.3}\t{:.2}",
            gen.id,
            gen.bus.value(),
            gen.pg,
            gen.cost
        )?;
    }
    writeln!(writer)?;

    writeln!(writer, "BUS\tANGLE (deg)\tNET P (MW)\tLMP ($/MWh)\tCURTAILED (MW)")?;
    for bus in &result.bus_results {
        writeln!(
            writer,
            "{}\t{:.4}\t{:.3}\t{:.4}\t{:.3}",
            bus.bus.value(),
            bus.va,
            bus.pl,
            bus.marginal_cost,
            bus.curtailment
        )?;
    }
    writeln!(writer)?;

    writeln!(writer, "FROM\tTO\tFLOW (MW)\tLOADING (%)\tRENT ($/h)")?;
    for line in &result.line_results {
        writeln!(
            writer,
            "{}\t{}\t{:.3}\t{:.1}\t{:.2}",
            line.from_bus.value(),
            line.to_bus.value(),
            line.flow_mw,
            line.loading_percent,
            line.congestion_rent
        )?;
    }

    if !result.binding_constraints.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "BINDING\tFLOW (MW)\tLIMIT (MW)\tSHADOW PRICE ($/MWh)")?;
        for c in &result.binding_constraints {
            writeln!(
                writer,
                "{}\t{:.3}\t{:.3}\t{:.4}",
                c.name, c.flow_mw, c.limit_mw, c.shadow_price
            )?;
        }
    }

    if !result.diagnostics.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Diagnostics: {}", result.diagnostics.summary())?;
        for issue in &result.diagnostics.issues {
            writeln!(writer, "  {}", issue)?;
        }
    }

    writer.flush()?;
    Ok(())
}
