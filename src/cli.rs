//! CLI argument parsing for the traceability engine.
//!
//! The CLI stays thin: flags are parsed here and handed to `workflow`, which
//! owns every decision about loading, scanning, and exit codes.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Environment variable holding a tracing filter; wins over `--log-level`.
pub const LOG_ENV: &str = "CYPILOT_LOG";

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "cypilot",
    version,
    about = "Registry-driven identifier traceability validation",
    after_help = "Commands:\n  validate [--artifact <path>]        Validate the whole project or one artifact\n  validate-kits                       Self-check every registered kit\n  list-ids [--artifact <path>] [--kind <k>]\n                                      List identifier definitions\n  where-defined --id <id>             Show where an identifier is defined\n  where-used --id <id>                Show where an identifier is referenced\n  adapter-info                        Show the discovered registry and systems\n\nExit codes: 0 pass/found, 1 failures/not found, 2 usage, registry, or incomplete run.\n\nExamples:\n  cypilot validate\n  cypilot --json validate --artifact docs/PRD.md\n  cypilot where-used --id cpt-app-fr-login",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Registry file to load instead of discovering one
    #[arg(long, global = true, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Directory to start registry discovery from (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Scan worker threads (default: one per CPU)
    #[arg(long, global = true, value_name = "N")]
    pub jobs: Option<usize>,

    /// Abandon the scan after this many milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Log filter when CYPILOT_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Validate(ValidateArgs),
    /// Check kit constraints against their templates
    ValidateKits,
    ListIds(ListIdsArgs),
    WhereDefined(IdArgs),
    WhereUsed(IdArgs),
    /// Show the discovered registry, kits, and system tree
    AdapterInfo,
}

#[derive(Parser, Debug)]
#[command(about = "Validate artifacts, code markers, and kit constraints")]
pub struct ValidateArgs {
    /// Only report issues located in this artifact (path relative to the project root)
    #[arg(long, value_name = "PATH")]
    pub artifact: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "List identifier definitions")]
pub struct ListIdsArgs {
    /// Only list definitions in this artifact
    #[arg(long, value_name = "PATH")]
    pub artifact: Option<String>,

    /// Only list identifiers of this kind (case-insensitive)
    #[arg(long, value_name = "KIND")]
    pub kind: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Look up one identifier")]
pub struct IdArgs {
    /// Identifier to look up
    #[arg(long, value_name = "ID")]
    pub id: String,
}
