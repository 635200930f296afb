//! Cato CLI - prints denormalized snapshots of a Marcus data root.

use cato::Aggregator;
use cato::cli::{Cli, Commands, LogFormat};
use cato::commands::{self, Output};
use cato::config;
use clap::Parser;
use std::process;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    init_logging(cli.log_level.as_deref(), cli.log_format);

    let start = Instant::now();
    let result = run(cli);
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "command finished");

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays a clean JSON document.
///
/// Filter priority: --log-level > RUST_LOG > "warn".
fn init_logging(level: Option<&str>, format: LogFormat) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn run(cli: Cli) -> cato::Result<()> {
    let human = cli.human_readable;
    let settings = config::resolve(&cli.overrides())?;
    debug!(
        data_root = %settings.data_root().display(),
        source = %settings.data_root.source,
        "resolved data root"
    );
    let aggregator = Aggregator::new(settings.data_root(), settings.aggregator_options());

    match cli.command {
        Commands::Snapshot {
            project,
            view,
            exponent,
            pretty,
        } => {
            let result = commands::snapshot(&aggregator, project.as_deref(), view, exponent, pretty)?;
            output(&result, human);
        }
        Commands::Projects => {
            let result = commands::projects(&aggregator)?;
            output(&result, human);
        }
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
