use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cs_cli::commands::{cats, classify, events, ingest, process, status};
use cs_cli::{CatsAction, Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(cs_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = cs_db::Database::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database_path.display()
        )
    })?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Ingest) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let summary = ingest::run(io::stdin().lock(), &mut db, &config)?;
            writeln!(stdout, "{summary}")?;
        }
        Some(Commands::Process { stage }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            process::run(io::stdin().lock(), &mut stdout, &mut db, *stage, &config)?;
        }
        Some(Commands::Classify { timestamp, dry_run }) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            classify::run(&mut stdout, &mut db, *timestamp, *dry_run, &config)?;
        }
        Some(Commands::Events { date, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            events::run(&mut stdout, &db, date.as_deref(), *json)?;
        }
        Some(Commands::Cats(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                CatsAction::SetWeight { name, weight, at } => {
                    let timestamp = cats::set_weight(&mut db, name, weight, at.as_deref())?;
                    writeln!(stdout, "Defined {name} at {weight} from {timestamp}.")?;
                }
                CatsAction::List { json } => cats::list(&mut stdout, &db, *json)?,
            }
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
