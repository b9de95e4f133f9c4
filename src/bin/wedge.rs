//! Wedge CLI Binary
//!
//! Command-line entry point: parse flags, set up logging, then run the sweep.

use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wedge::cli::{load_settings, Cli, RunContext};
use wedge::error::WedgeError;
use wedge::logging::{init_logging, LoggingConfig};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Wedge CLI starting");

    if cli.show_settings {
        match load_settings(&cli).and_then(|s| s.to_toml()) {
            Ok(toml) => {
                println!("{}", toml);
                return;
            }
            Err(e) => {
                eprintln!("{}", wedge::cli::map_error(&WedgeError::from(e)));
                process::exit(1);
            }
        }
    }

    let context = match RunContext::new(&cli) {
        Ok(ctx) => ctx.with_progress_lines(progress_lines(&cli, &logging_config)),
        Err(e) => {
            error!("Failed to prepare sweep: {}", e);
            eprintln!("{}", wedge::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.preflight() {
        Ok(Some(outcome)) => {
            println!("{}", outcome.output);
            process::exit(outcome.exit_code);
        }
        Ok(None) => {}
        Err(e) => {
            error!("Preflight failed: {}", e);
            eprintln!("{}", wedge::cli::map_error(&e));
            process::exit(1);
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    match rt.block_on(context.submit(cancel)) {
        Ok(outcome) => {
            info!(exit_code = outcome.exit_code, "Run complete");
            println!("{}", outcome.output);
            process::exit(outcome.exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("{}", wedge::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and settings.
/// Precedence: CLI flags override settings override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = load_settings(cli)
        .ok()
        .map(|s| s.logging)
        .unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    config
}

/// Progress lines go to stderr only when logs are not already there.
fn progress_lines(cli: &Cli, logging: &LoggingConfig) -> bool {
    !cli.quiet && cli.format == "text" && logging.enabled && logging.output != "stderr"
}
