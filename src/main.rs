//! `cypilot`: registry-driven identifier traceability validation.
mod autodetect;
mod cli;
mod context;
mod graph;
mod kit;
mod registry;
mod report;
mod scan;
mod util;
mod validate;
mod workflow;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{RootArgs, LOG_ENV};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = RootArgs::parse();
    let code = init_logging(&args.global.log_level)
        .and_then(|()| workflow::run(&args.global, &args.command))
        .unwrap_or_else(|err| {
            eprintln!("error: {err:#}");
            report::EXIT_USAGE
        });
    std::process::exit(code);
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(level: &str) -> Result<()> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(&spec)
            .with_context(|| format!("parse {LOG_ENV}={spec:?}"))?,
        _ => EnvFilter::try_new(level).with_context(|| format!("parse --log-level {level:?}"))?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("install log subscriber")?;
    Ok(())
}
