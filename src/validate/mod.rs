//! Constraint validation over the cross-reference graph.
//!
//! Constraint checks only touch identifiers scoped to a registered system and
//! definitions that live in artifacts governed by a fully tooled kit. Graph
//! integrity checks (duplicates, undefined references, code traceability)
//! apply to every in-scope identifier.
use crate::context::ValidationContext;
use crate::graph::{Graph, Scope};
use crate::kit::{Coverage, IdentifierRule, ReferenceRule};
use crate::registry::{ArtifactEntry, Traceability};
use crate::report::{codes, Issue};
use crate::scan::{Definition, Reference, CODE_KIND};
use crate::util::headings_match;
use std::collections::BTreeMap;

/// Run every check and return the issues found, unsorted.
pub(crate) fn validate(ctx: &ValidationContext, graph: &Graph) -> Vec<Issue> {
    let mut issues = Vec::new();
    let definitions = by_path(graph.definitions.values().flatten(), |def| &def.path);
    let references = by_path(graph.references.values().flatten(), |reference| &reference.path);

    for artifact in &ctx.artifacts {
        let defs = definitions.get(artifact.path.as_str()).cloned().unwrap_or_default();
        let refs = references.get(artifact.path.as_str()).cloned().unwrap_or_default();
        check_artifact(ctx, graph, artifact, &defs, &refs, &mut issues);
    }
    check_integrity(ctx, graph, &mut issues);
    tracing::debug!(issues = issues.len(), "constraint validation finished");
    issues
}

fn by_path<'a, T, F>(items: impl Iterator<Item = &'a T>, key: F) -> BTreeMap<&'a str, Vec<&'a T>>
where
    T: 'a,
    F: Fn(&'a T) -> &'a String,
{
    let mut out: BTreeMap<&str, Vec<&T>> = BTreeMap::new();
    for item in items {
        out.entry(key(item).as_str()).or_default().push(item);
    }
    out
}

fn in_scope(graph: &Graph, id: &str) -> Option<String> {
    match graph.scope(id) {
        Scope::System(slug) => Some(slug),
        Scope::External => None,
    }
}

fn check_artifact(
    ctx: &ValidationContext,
    graph: &Graph,
    artifact: &ArtifactEntry,
    defs: &[&Definition],
    refs: &[&Reference],
    issues: &mut Vec<Issue>,
) {
    let Some((kit, constraints)) = ctx.constraints_for(artifact) else {
        return;
    };
    let scoped_defs: Vec<(&Definition, String)> = defs
        .iter()
        .filter(|def| in_scope(graph, &def.id).is_some())
        .filter_map(|def| graph.definition_kind(def).map(|kind| (*def, kind.to_ascii_lowercase())))
        .collect();

    // Allowed-kind: definitions.
    for (def, kind) in &scoped_defs {
        if !constraints.identifiers.contains_key(kind) {
            issues.push(
                Issue::error(
                    codes::KIND_NOT_ALLOWED,
                    format!("identifier kind {kind} is not allowed in {} artifacts", artifact.kind),
                )
                .at(def.path.clone(), Some(def.line))
                .for_id(def.id.clone()),
            );
        }
    }
    // Allowed-kind: references, unless some rule names this artifact kind as
    // a reference target for the referenced kind.
    for reference in refs {
        if in_scope(graph, &reference.id).is_none() {
            continue;
        }
        let Some(kind) = graph.id_kind(&reference.id).map(|kind| kind.to_ascii_lowercase()) else {
            continue;
        };
        let declared_target = kit.constraints.artifacts.values().any(|other| {
            other
                .identifiers
                .get(&kind)
                .is_some_and(|rule| rule.references.contains_key(&artifact.kind))
        });
        if !constraints.identifiers.contains_key(&kind) && !declared_target {
            issues.push(
                Issue::error(
                    codes::KIND_NOT_ALLOWED,
                    format!(
                        "references to {kind} identifiers are not allowed in {} artifacts",
                        artifact.kind
                    ),
                )
                .at(reference.path.clone(), Some(reference.line))
                .for_id(reference.id.clone()),
            );
        }
    }

    for (identifier_kind, rule) in &constraints.identifiers {
        let of_kind: Vec<&Definition> = scoped_defs
            .iter()
            .filter(|(_, kind)| kind == identifier_kind)
            .map(|(def, _)| *def)
            .collect();
        if of_kind.is_empty() {
            if rule.required() {
                issues.push(
                    Issue::error(
                        codes::REQUIRED_MISSING,
                        format!(
                            "{} artifact defines no {identifier_kind} identifiers",
                            artifact.kind
                        ),
                    )
                    .at(artifact.path.clone(), None)
                    .in_system(artifact.system.clone()),
                );
            }
            continue;
        }
        for def in of_kind {
            check_definition(ctx, graph, artifact, identifier_kind, rule, def, issues);
        }
    }
}

fn check_definition(
    ctx: &ValidationContext,
    graph: &Graph,
    artifact: &ArtifactEntry,
    identifier_kind: &str,
    rule: &IdentifierRule,
    def: &Definition,
    issues: &mut Vec<Issue>,
) {
    let at = |issue: Issue| issue.at(def.path.clone(), Some(def.line)).for_id(def.id.clone());

    if !rule.headings().is_empty() && !under_heading(&def.heading_path, rule.headings()) {
        issues.push(at(Issue::error(
            codes::HEADING_SCOPE,
            format!(
                "{identifier_kind} definition must be under one of: {}",
                rule.headings().join(", ")
            ),
        )));
    }
    if let Some(problem) = rule.task().violation(def.has_task) {
        issues.push(at(Issue::error(
            codes::TASK_FLAG,
            format!("task checkbox {problem} on {identifier_kind} definition"),
        )));
    }
    if let Some(problem) = rule.priority().violation(def.has_priority) {
        issues.push(at(Issue::error(
            codes::PRIORITY_FLAG,
            format!("priority {problem} on {identifier_kind} definition"),
        )));
    }

    let references = graph.references_to(&def.id);
    if rule.to_code()
        && artifact.traceability == Traceability::Full
        && !references.iter().any(|reference| reference.from_kind == CODE_KIND)
    {
        issues.push(at(Issue::error(
            codes::NOT_IN_CODE,
            format!("{identifier_kind} definition has no code traceability marker"),
        )));
    }

    let Some(system) = in_scope(graph, &def.id) else {
        return;
    };
    for (target_kind, reference_rule) in &rule.references {
        let from_target: Vec<&Reference> = references
            .iter()
            .filter(|reference| &reference.from_kind == target_kind)
            .collect();
        match reference_rule.coverage() {
            Coverage::Required => {
                let target_present = if target_kind == CODE_KIND {
                    ctx.has_codebase_in_scope(&system)
                } else {
                    ctx.has_artifacts_in_scope(&system, target_kind)
                };
                if !target_present {
                    issues.push(at(Issue::warning(
                        codes::TARGET_NOT_IN_SCOPE,
                        format!(
                            "{identifier_kind} must be referenced from {target_kind}, but no {target_kind} artifacts are in scope"
                        ),
                    )));
                } else if from_target.is_empty() {
                    issues.push(at(Issue::error(
                        codes::COVERAGE_MISSING,
                        format!("{identifier_kind} is not referenced from any {target_kind} artifact"),
                    )));
                }
            }
            Coverage::Prohibited => {
                for reference in &from_target {
                    issues.push(
                        Issue::error(
                            codes::COVERAGE_PROHIBITED,
                            format!("{identifier_kind} must not be referenced from {target_kind}"),
                        )
                        .at(reference.path.clone(), Some(reference.line))
                        .for_id(def.id.clone()),
                    );
                }
                continue;
            }
            Coverage::Optional => {}
        }
        for reference in from_target {
            check_reference(identifier_kind, target_kind, reference_rule, reference, issues);
        }
    }
}

fn check_reference(
    identifier_kind: &str,
    target_kind: &str,
    rule: &ReferenceRule,
    reference: &Reference,
    issues: &mut Vec<Issue>,
) {
    let at = |issue: Issue| {
        issue
            .at(reference.path.clone(), Some(reference.line))
            .for_id(reference.id.clone())
    };
    let flags = [
        (codes::TASK_FLAG, "task checkbox", rule.task(), reference.has_task),
        (codes::PRIORITY_FLAG, "priority", rule.priority(), reference.has_priority),
    ];
    for (code, label, presence, present) in flags {
        if let Some(problem) = presence.violation(present) {
            issues.push(at(Issue::error(
                code,
                format!("{label} {problem} on {identifier_kind} reference in {target_kind}"),
            )));
        }
    }
    if let Some(headings) = &rule.headings {
        if !headings.is_empty() && !under_heading(&reference.heading_path, headings) {
            issues.push(at(Issue::error(
                codes::HEADING_SCOPE,
                format!(
                    "{identifier_kind} reference in {target_kind} must be under one of: {}",
                    headings.join(", ")
                ),
            )));
        }
    }
}

fn under_heading(path: &[String], wanted: &[String]) -> bool {
    path.iter()
        .any(|title| wanted.iter().any(|heading| headings_match(title, heading)))
}

/// Checks that hold for every in-scope identifier regardless of kit.
fn check_integrity(ctx: &ValidationContext, graph: &Graph, issues: &mut Vec<Issue>) {
    for (id, scope) in &graph.scopes {
        if scope.system().is_none() {
            continue;
        }
        let defs = graph.definitions_of(id);
        let refs = graph.references_to(id);
        for duplicate in defs.iter().skip(1) {
            issues.push(
                Issue::error(
                    codes::DUPLICATE_DEFINITION,
                    format!("{id} is already defined at {}:{}", defs[0].path, defs[0].line),
                )
                .at(duplicate.path.clone(), Some(duplicate.line))
                .for_id(id.clone()),
            );
        }
        if defs.is_empty() {
            for reference in refs {
                issues.push(
                    Issue::error(codes::UNDEFINED_REFERENCE, format!("{id} is not defined"))
                        .at(reference.path.clone(), Some(reference.line))
                        .for_id(id.clone()),
                );
            }
            continue;
        }

        let docs_only = defs.iter().all(|def| {
            ctx.artifact(&def.path)
                .is_some_and(|artifact| artifact.traceability == Traceability::DocsOnly)
        });
        for reference in refs {
            if reference.from_kind == CODE_KIND {
                if docs_only {
                    issues.push(
                        Issue::error(
                            codes::DOCS_ONLY_IN_CODE,
                            format!("{id} is defined only in DOCS-ONLY artifacts but is marked in code"),
                        )
                        .at(reference.path.clone(), Some(reference.line))
                        .for_id(id.clone()),
                    );
                }
                continue;
            }
            if !(reference.has_task && reference.done) {
                continue;
            }
            for def in defs.iter().filter(|def| def.has_task && !def.done) {
                let tracked = ctx
                    .artifact(&def.path)
                    .is_some_and(|artifact| ctx.constraints_for(artifact).is_some());
                if tracked {
                    issues.push(
                        Issue::error(
                            codes::CHECKBOX_SYNC,
                            format!(
                                "{id} is checked at {}:{} but its definition is not",
                                reference.path, reference.line
                            ),
                        )
                        .at(def.path.clone(), Some(def.line))
                        .for_id(id.clone()),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
