//! Load and scan stages shared by `validate` and the query commands.
use crate::autodetect::{resolve, FsLister};
use crate::cli::GlobalArgs;
use crate::context::ValidationContext;
use crate::graph::Graph;
use crate::kit;
use crate::registry::{discover_registry, load_registry, Registry};
use crate::report::Issue;
use crate::scan::{plan_jobs, run_scan, CancelToken, ScanJob};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Registry, resolved artifacts, and the issues found while getting there.
pub(crate) struct Loaded {
    pub(crate) ctx: ValidationContext,
    pub(crate) issues: Vec<Issue>,
}

/// Scan results reduced into a graph.
pub(crate) struct Analysis {
    pub(crate) graph: Graph,
    pub(crate) issues: Vec<Issue>,
    pub(crate) artifacts_scanned: usize,
    pub(crate) code_files_scanned: usize,
}

pub(crate) fn discovery_start(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.root {
        Some(root) => Ok(root.clone()),
        None => std::env::current_dir().context("resolve current directory"),
    }
}

/// Discover and load the registry without the contradiction STOP.
pub(crate) fn load_registry_only(global: &GlobalArgs) -> Result<(Registry, Vec<Issue>)> {
    let start = discovery_start(global)?;
    let path = discover_registry(global.registry.as_deref(), &start)?;
    load_registry(&path)
}

/// Load the registry, stop on kit contradictions, and resolve autodetect.
pub(crate) fn load(global: &GlobalArgs) -> Result<Loaded> {
    let (registry, mut issues) = load_registry_only(global)?;

    let clashes: Vec<Issue> = registry
        .kits
        .values()
        .flat_map(|kit| kit::check_contradictions(kit, &registry.project_root))
        .collect();
    if !clashes.is_empty() {
        let lines: Vec<String> = clashes
            .iter()
            .map(|issue| format!("{} [{}] {}", issue.location(), issue.code, issue.message))
            .collect();
        return Err(anyhow!(
            "kit constraints contradict their templates:\n  {}",
            lines.join("\n  ")
        ));
    }

    let resolution = {
        let lister = FsLister::new(&registry.project_root, &registry.ignore);
        resolve(&registry, &lister)
    };
    issues.extend(resolution.issues.iter().cloned());
    tracing::info!(
        artifacts = resolution.artifacts.len(),
        codebase = resolution.codebase.len(),
        "resolved artifacts"
    );
    let ctx = ValidationContext::new(registry, &resolution)?;
    Ok(Loaded { ctx, issues })
}

/// Scan every artifact and code file. `None` means the run was cancelled.
pub(crate) fn analyze(ctx: &ValidationContext, global: &GlobalArgs) -> Result<Option<Analysis>> {
    let root = &ctx.registry.project_root;
    let lister = FsLister::new(root, &ctx.registry.ignore);
    let jobs = plan_jobs(&ctx.artifacts, &ctx.codebase, &lister)?;
    let code_files_scanned = jobs
        .iter()
        .filter(|job| matches!(job, ScanJob::Code { .. }))
        .count();
    let cancel = CancelToken::new(global.timeout_ms.map(Duration::from_millis));
    let Some(scans) = run_scan(root, &jobs, &ctx.patterns, global.jobs, &cancel)? else {
        return Ok(None);
    };
    let issues = scans
        .iter()
        .flat_map(|scan| scan.issues.iter().cloned())
        .collect();
    let graph = Graph::build(&scans, &ctx.scope_index());
    Ok(Some(Analysis {
        graph,
        issues,
        artifacts_scanned: jobs.len() - code_files_scanned,
        code_files_scanned,
    }))
}

/// Message for a run abandoned by `--timeout-ms`.
pub(crate) fn cancelled_reason(global: &GlobalArgs) -> String {
    match global.timeout_ms {
        Some(ms) => format!("scan exceeded --timeout-ms {ms}; partial results discarded"),
        None => "scan cancelled; partial results discarded".to_string(),
    }
}
