//! Arxivist CLI — two-phase arXiv research agent.
//!
//! Ingests arXiv papers into a vector index, then answers questions over
//! them, driving every external capability through tool subprocesses.

mod commands;

use clap::Parser;

use arxivist_shared::ArxivistError;
use commands::Cli;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    if let Err(report) = commands::run(cli).await {
        // Interrupts and connect timeouts carry distinct exit codes so
        // wrapping scripts can tell them apart from ordinary failures.
        let code = report
            .downcast_ref::<ArxivistError>()
            .map(ArxivistError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {report:?}");
        std::process::exit(code);
    }
    Ok(())
}
