//! `validate` and `validate-kits`.
use super::print_report;
use super::pipeline::{analyze, cancelled_reason, load, load_registry_only};
use crate::cli::{GlobalArgs, ValidateArgs};
use crate::kit;
use crate::report::{Issue, Report};
use crate::util::{is_within, normalize_rel};
use crate::validate::validate;
use anyhow::{anyhow, Result};

pub(crate) fn run_validate(global: &GlobalArgs, args: &ValidateArgs) -> Result<i32> {
    let loaded = load(global)?;
    let only = match &args.artifact {
        Some(raw) => {
            let rel = normalize_rel(raw)?;
            if loaded.ctx.artifact(&rel).is_none() {
                return Err(anyhow!("{rel} is not a registered artifact"));
            }
            Some(rel)
        }
        None => None,
    };

    let Some(analysis) = analyze(&loaded.ctx, global)? else {
        let report = Report::incomplete(&cancelled_reason(global));
        print_report(global.json, &report)?;
        return Ok(report.status.exit_code());
    };

    let mut issues = loaded.issues;
    issues.extend(analysis.issues);
    issues.extend(validate(&loaded.ctx, &analysis.graph));
    if let Some(only) = &only {
        issues.retain(|issue| issue.path.as_deref() == Some(only.as_str()));
    }
    let report = Report::from_issues(
        issues,
        analysis.artifacts_scanned,
        analysis.code_files_scanned,
    );
    tracing::info!(
        status = report.status.as_str(),
        errors = report.error_count,
        warnings = report.warning_count,
        "validation finished"
    );
    print_report(global.json, &report)?;
    Ok(report.status.exit_code())
}

/// Self-check every kit the registry loaded. Kit load problems and
/// contradictions are reported here instead of stopping the run.
pub(crate) fn run_validate_kits(global: &GlobalArgs) -> Result<i32> {
    let (registry, load_issues) = load_registry_only(global)?;
    let kit_dirs = registry.kit_dirs();
    let mut issues: Vec<Issue> = load_issues
        .into_iter()
        .filter(|issue| {
            issue
                .path
                .as_deref()
                .is_some_and(|path| kit_dirs.iter().any(|dir| is_within(path, dir)))
        })
        .collect();
    let mut templates = 0;
    for kit in registry.kits.values() {
        if !kit.is_tooled() {
            tracing::debug!(kit = %kit.id, format = %kit.format, "kit is not fully tooled");
        }
        templates += kit.templates.len();
        issues.extend(kit::self_check(kit, &registry.project_root));
    }
    let report = Report::from_issues(issues, templates, 0);
    print_report(global.json, &report)?;
    Ok(report.status.exit_code())
}
