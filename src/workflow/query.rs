//! Read-only identifier queries over the cross-reference graph.
//!
//! Queries share the full load and scan pipeline with `validate` but never
//! report constraint issues; registry problems only surface as a log line.
use super::pipeline::{analyze, cancelled_reason, load, Analysis};
use super::{emit, print_report};
use crate::cli::{GlobalArgs, ListIdsArgs};
use crate::graph::Graph;
use crate::report::{Report, RunStatus, EXIT_FAIL, EXIT_PASS};
use crate::scan::{Definition, Reference};
use crate::util::normalize_rel;
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Serialize)]
struct IdEntry<'a> {
    id: &'a str,
    kind: Option<String>,
    system: Option<&'a str>,
    path: &'a str,
    line: usize,
}

#[derive(Debug, Serialize)]
struct IdListing<'a> {
    ids: Vec<IdEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct Definitions<'a> {
    id: &'a str,
    kind: Option<String>,
    system: Option<&'a str>,
    definitions: &'a [Definition],
}

#[derive(Debug, Serialize)]
struct Usages<'a> {
    id: &'a str,
    system: Option<&'a str>,
    references: &'a [Reference],
}

/// Load and scan; `None` after printing the incomplete report.
fn scanned(global: &GlobalArgs) -> Result<Option<Analysis>> {
    let loaded = load(global)?;
    let problems = loaded.issues.iter().filter(|issue| issue.is_error()).count();
    if problems > 0 {
        tracing::warn!(errors = problems, "registry has errors; run validate for details");
    }
    let analysis = analyze(&loaded.ctx, global)?;
    if analysis.is_none() {
        print_report(global.json, &Report::incomplete(&cancelled_reason(global)))?;
    }
    Ok(analysis)
}

pub(crate) fn run_list_ids(global: &GlobalArgs, args: &ListIdsArgs) -> Result<i32> {
    let Some(analysis) = scanned(global)? else {
        return Ok(RunStatus::Incomplete.exit_code());
    };
    let artifact = args.artifact.as_deref().map(normalize_rel).transpose()?;
    let wanted_kind = args.kind.as_deref().map(str::to_ascii_lowercase);
    let graph = &analysis.graph;

    let ids: Vec<IdEntry> = graph
        .definitions
        .values()
        .flatten()
        .filter(|def| artifact.is_none() || artifact.as_deref() == Some(def.path.as_str()))
        .map(|def| IdEntry {
            id: &def.id,
            kind: graph.definition_kind(def),
            system: system_of(graph, &def.id),
            path: &def.path,
            line: def.line,
        })
        .filter(|entry| match (&wanted_kind, &entry.kind) {
            (None, _) => true,
            (Some(wanted), Some(kind)) => kind.eq_ignore_ascii_case(wanted),
            (Some(_), None) => false,
        })
        .collect();

    let listing = IdListing { ids };
    emit(global.json, &listing, || {
        let mut out = String::new();
        for entry in &listing.ids {
            let _ = writeln!(
                out,
                "{} {} {}:{}",
                entry.id,
                entry.kind.as_deref().unwrap_or("-"),
                entry.path,
                entry.line
            );
        }
        out
    })?;
    Ok(EXIT_PASS)
}

pub(crate) fn run_where_defined(global: &GlobalArgs, id: &str) -> Result<i32> {
    let Some(analysis) = scanned(global)? else {
        return Ok(RunStatus::Incomplete.exit_code());
    };
    let graph = &analysis.graph;
    let found = Definitions {
        id,
        kind: graph.id_kind(id),
        system: system_of(graph, id),
        definitions: graph.definitions_of(id),
    };
    emit(global.json, &found, || {
        if found.definitions.is_empty() {
            return format!("{id}: not defined\n");
        }
        let mut out = String::new();
        for def in found.definitions {
            let _ = write!(out, "{}:{}", def.path, def.line);
            if !def.heading_path.is_empty() {
                let _ = write!(out, " ({})", def.heading_path.join(" > "));
            }
            out.push('\n');
        }
        out
    })?;
    Ok(if found.definitions.is_empty() {
        EXIT_FAIL
    } else {
        EXIT_PASS
    })
}

pub(crate) fn run_where_used(global: &GlobalArgs, id: &str) -> Result<i32> {
    let Some(analysis) = scanned(global)? else {
        return Ok(RunStatus::Incomplete.exit_code());
    };
    let graph = &analysis.graph;
    let found = Usages {
        id,
        system: system_of(graph, id),
        references: graph.references_to(id),
    };
    emit(global.json, &found, || {
        if found.references.is_empty() {
            return format!("{id}: no references\n");
        }
        let mut out = String::new();
        for reference in found.references {
            let _ = write!(out, "{}:{} [{}]", reference.path, reference.line, reference.from_kind);
            if let Some(phase) = reference.phase {
                let _ = write!(out, " p{phase}");
            }
            if let Some(instruction) = &reference.instruction {
                let _ = write!(out, " inst-{instruction}");
            }
            out.push('\n');
        }
        out
    })?;
    Ok(if found.references.is_empty() {
        EXIT_FAIL
    } else {
        EXIT_PASS
    })
}

fn system_of<'a>(graph: &'a Graph, id: &str) -> Option<&'a str> {
    graph.scopes.get(id).and_then(|scope| scope.system())
}
