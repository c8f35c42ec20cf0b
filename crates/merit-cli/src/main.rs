use anyhow::Result;
use clap::Parser;
use merit_cli::cli::{Cli, Commands};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Solve {
            case,
            options,
            format,
            out,
        } => commands::solve::handle(case, options, *format, out.as_deref()),
        Commands::Batch { cases, options } => commands::solve::handle_batch(cases, options),
        Commands::Validate { case } => commands::inspect::validate(case),
        Commands::Islands { case } => commands::inspect::islands(case),
    }
}
