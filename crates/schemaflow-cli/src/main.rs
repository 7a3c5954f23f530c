//! Schemaflow command-line entry point.

use clap::Parser;
use schemaflow_cli::{execute, Args};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schemaflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let (config, command) = match args.into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    tracing::debug!(
        ledger = %config.ledger_path.display(),
        database = %config.database_path.display(),
        migrations = %config.migrations_dir.display(),
        app = %config.variant.app,
        dry_run = config.runner.dry_run,
        "configuration loaded"
    );

    match execute(&config, command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("Hint: {}", hint);
            }
            std::process::exit(1);
        }
    }
}
