use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use scip_index::cli::Cli;

fn main() -> ExitCode {
    // Usage errors share exit code 1 with every other validation failure
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("generate-index: {e:#}");
    }

    // Build a context once, pass everywhere
    let ctx = cli.context();

    match scip_index::generate_run(cli, &ctx) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `GENERATE_INDEX_LOG` takes an EnvFilter directive and beats the flags.
/// Logs go to stderr so stdout stays parseable.
fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("GENERATE_INDEX_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
