//! cvstore CLI entry point.

use clap::Parser;
use cvstore::cli::commands;
use cvstore::cli::{Cli, Commands};
use cvstore::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let ns = cli.namespace.as_deref();
    let json = cli.json;

    match &cli.command {
        Commands::Save { file } => commands::data::save(file.as_ref(), db, ns, json),
        Commands::Load => commands::data::load(db, ns, json),
        Commands::Clear => commands::data::clear(db, ns, json),
        Commands::Cleanup { max_age_days } => commands::data::cleanup(*max_age_days, db, ns, json),

        // Transfer
        Commands::Export { format, out } => {
            commands::transfer::export(format, out.as_ref(), db, ns, json)
        }
        Commands::Import { file, format } => {
            commands::transfer::import(file, format.as_deref(), db, ns, json)
        }
        Commands::Backup { out } => commands::transfer::backup(out.as_ref(), db, ns, json),
        Commands::Restore { file } => commands::transfer::restore(file, db, ns, json),

        Commands::Stats => commands::stats::execute(db, ns, json),
        Commands::Validate => commands::validate::execute(db, ns, json),
        Commands::Watch {
            file,
            interval_ms,
            ticks,
        } => commands::watch::execute(file.as_ref(), *interval_ms, *ticks, db, ns, json),

        Commands::Version => commands::version::execute(json),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
