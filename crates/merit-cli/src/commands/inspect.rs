use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Result};
use merit_core::{find_islands, Diagnostics};
use tabwriter::TabWriter;

use super::load_case;

pub fn validate(case_path: &Path) -> Result<()> {
    let case = load_case(case_path)?;
    let mut diag = Diagnostics::new();
    case.validate_into(&mut diag);

    let stats = case.stats();
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "Buses\t{}", stats.num_buses)?;
    writeln!(
        writer,
        "Generators\t{} ({} in service)",
        stats.num_generators, stats.num_in_service_generators
    )?;
    writeln!(
        writer,
        "Lines\t{} ({} in service)",
        stats.num_lines, stats.num_in_service_lines
    )?;
    writeln!(writer, "Loads\t{}", stats.num_loads)?;
    writeln!(writer, "Demand\t{:.2} MW", stats.total_demand_mw)?;
    writeln!(writer, "Capacity\t{:.2} MW", stats.total_capacity_mw)?;
    writer.flush()?;

    println!("\nDiagnostics: {}", diag.summary());
    for issue in &diag.issues {
        println!("  {}", issue);
    }

    if diag.has_errors() {
        bail!("{} has {} error(s)", case_path.display(), diag.error_count());
    }
    Ok(())
}

pub fn islands(case_path: &Path) -> Result<()> {
    let case = load_case(case_path)?;
    let islands = find_islands(&case);

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "ISLAND\tBUSES\tSLACK\tMEMBERS")?;
    for island in &islands {
        let members: Vec<String> = island.buses.iter().map(|b| b.value().to_string()).collect();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            island.island_id,
            island.buses.len(),
            if island.contains_slack { "yes" } else { "no" },
            members.join(",")
        )?;
    }
    writer.flush()?;
    Ok(())
}
