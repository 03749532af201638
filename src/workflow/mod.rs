//! Command orchestration.
//!
//! Every command returns its process exit code; STOP-class failures come
//! back as `Err` and `main` maps them to exit 2.
mod adapter;
mod pipeline;
mod query;
mod validate;

pub(crate) use adapter::run_adapter_info;
pub(crate) use query::{run_list_ids, run_where_defined, run_where_used};
pub(crate) use validate::{run_validate, run_validate_kits};

use crate::cli::{Command, GlobalArgs};
use crate::report::Report;
use anyhow::{anyhow, Result};
use serde::Serialize;

/// Route a parsed command to its workflow step.
pub(crate) fn run(global: &GlobalArgs, command: &Command) -> Result<i32> {
    if global.jobs == Some(0) {
        return Err(anyhow!("--jobs must be at least 1"));
    }
    match command {
        Command::Validate(args) => run_validate(global, args),
        Command::ValidateKits => run_validate_kits(global),
        Command::ListIds(args) => run_list_ids(global, args),
        Command::WhereDefined(args) => run_where_defined(global, &args.id),
        Command::WhereUsed(args) => run_where_used(global, &args.id),
        Command::AdapterInfo => run_adapter_info(global),
    }
}

/// Print `text` or the pretty JSON form of `value` to stdout.
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

fn print_report(json: bool, report: &Report) -> Result<()> {
    let text = if json {
        report.render_json()?
    } else {
        report.render_text()
    };
    print!("{text}");
    Ok(())
}
