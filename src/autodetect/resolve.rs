//! Turn effective rules into synthetic entries and merge them with the
//! explicit registry entries.
//!
//! Checks run per rule in a fixed order: required-pattern, kind registered,
//! `.md` extension, then unmatched markdown. All of them run; issues
//! accumulate.
use super::expand::{expand_rule, ConcreteRule, ExpansionScope};
use super::lister::FileLister;
use super::EffectiveRule;
use crate::registry::{codebase_entry, ArtifactEntry, CodebaseEntry, Origin, Registry, SystemNode};
use crate::report::{codes, Issue};
use crate::util::is_within;
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Final artifact and codebase sets after autodetection and merge.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Sorted by path; at most one entry per path.
    pub artifacts: Vec<ArtifactEntry>,
    pub codebase: Vec<CodebaseEntry>,
    pub issues: Vec<Issue>,
}

pub fn resolve(registry: &Registry, lister: &dyn FileLister) -> Resolution {
    let mut issues = Vec::new();
    let mut explicit = Vec::new();
    let mut detected = Vec::new();
    let mut codebase = Vec::new();
    for node in registry.all_systems() {
        explicit.extend(node.artifacts.iter().cloned());
        codebase.extend(node.codebase.iter().cloned());
        for rule in &node.autodetect {
            let output = resolve_rule(registry, node, rule, lister);
            detected.extend(output.artifacts);
            codebase.extend(output.codebase);
            issues.extend(output.issues);
        }
    }
    let (artifacts, merge_issues) = merge_artifacts(explicit, detected);
    issues.extend(merge_issues);

    let mut seen = BTreeSet::new();
    codebase.retain(|entry| seen.insert(entry.path.clone()));
    codebase.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        artifacts = artifacts.len(),
        codebase = codebase.len(),
        "resolved autodetect rules"
    );
    Resolution {
        artifacts,
        codebase,
        issues,
    }
}

/// Explicit entries first, then autodetected ones. Same path + same kind keeps
/// the earlier entry; a different kind is a conflict.
pub fn merge_artifacts(
    explicit: Vec<ArtifactEntry>,
    detected: Vec<ArtifactEntry>,
) -> (Vec<ArtifactEntry>, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut by_path: BTreeMap<String, ArtifactEntry> = BTreeMap::new();
    for entry in explicit.into_iter().chain(detected) {
        match by_path.entry(entry.path.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.kind != entry.kind {
                    issues.push(
                        Issue::error(
                            codes::KIND_CONFLICT,
                            format!(
                                "kind conflict: registered as {} ({:?}) and {} ({:?})",
                                existing.kind, existing.origin, entry.kind, entry.origin
                            ),
                        )
                        .at(entry.path.clone(), None)
                        .in_system(entry.system.clone()),
                    );
                }
            }
        }
    }
    (by_path.into_values().collect(), issues)
}

#[derive(Default)]
struct RuleOutput {
    artifacts: Vec<ArtifactEntry>,
    codebase: Vec<CodebaseEntry>,
    issues: Vec<Issue>,
}

fn resolve_rule(
    registry: &Registry,
    node: &SystemNode,
    rule: &EffectiveRule,
    lister: &dyn FileLister,
) -> RuleOutput {
    let mut out = RuleOutput::default();
    let system = node.full_slug.as_str();
    let scope = ExpansionScope {
        system: node.slug.clone(),
        parent_root: rule.parent_root.clone(),
        artifacts_dir: node.artifacts_dir.clone(),
    };
    let concrete = match expand_rule(&rule.rule, &scope) {
        Ok(concrete) => concrete,
        Err(err) => {
            out.issues.push(
                Issue::error(
                    codes::AUTODETECT_INVALID,
                    format!("autodetect rule from {}: {err:#}", rule.declared_in),
                )
                .in_system(system),
            );
            return out;
        }
    };

    let kit_id = match concrete.kit.as_deref() {
        Some(id) if registry.kits.contains_key(id) => Some(id.to_string()),
        Some(id) => {
            out.issues.push(
                Issue::error(
                    codes::UNKNOWN_KIT,
                    format!("autodetect rule references unregistered kit {id:?}"),
                )
                .in_system(system),
            );
            None
        }
        None => node.kit.clone(),
    };
    let kit = kit_id.as_deref().and_then(|id| registry.kits.get(id));

    let mut matchers = Vec::new();
    for pattern in &concrete.patterns {
        let matcher = match compile(&pattern.glob) {
            Ok(matcher) => matcher,
            Err(err) => {
                out.issues.push(
                    Issue::error(codes::AUTODETECT_INVALID, format!("{}: {err:#}", pattern.kind))
                        .in_system(system),
                );
                continue;
            }
        };
        let matches = match lister.files_under(&literal_base(&pattern.glob)) {
            Ok(files) => files
                .into_iter()
                .filter(|file| matcher.is_match(file))
                .collect::<Vec<_>>(),
            Err(err) => {
                out.issues.push(
                    Issue::error(codes::READ_FAILED, format!("{}: {err:#}", pattern.kind))
                        .in_system(system),
                );
                continue;
            }
        };
        matchers.push(matcher);

        if matches.is_empty() && pattern.required {
            out.issues.push(
                Issue::error(
                    codes::REQUIRED_PATTERN_UNMATCHED,
                    format!(
                        "{}: required pattern {:?} matched zero files",
                        pattern.kind, pattern.glob
                    ),
                )
                .in_system(system),
            );
        }
        if concrete.validation.require_kind_registered {
            if let Some(kit) = kit {
                if !kit.has_template(&pattern.kind) {
                    out.issues.push(
                        Issue::error(
                            codes::KIND_NOT_REGISTERED,
                            format!(
                                "artifact kind {} has no template in kit {}",
                                pattern.kind, kit.id
                            ),
                        )
                        .in_system(system),
                    );
                }
            }
        }
        for path in matches {
            if concrete.validation.require_md_extension && !is_markdown(&path) {
                out.issues.push(
                    Issue::error(
                        codes::NOT_MARKDOWN,
                        format!("{} artifact is not a .md file", pattern.kind),
                    )
                    .at(path.clone(), None)
                    .in_system(system),
                );
            }
            out.artifacts.push(ArtifactEntry {
                path,
                kind: pattern.kind.clone(),
                traceability: pattern.traceability,
                name: None,
                origin: Origin::Autodetect,
                system: system.to_string(),
                kit: kit_id.clone(),
            });
        }
    }

    if concrete.validation.fail_on_unmatched_markdown {
        out.issues
            .extend(unmatched_markdown(registry, &concrete, &matchers, lister, system));
    }

    for doc in &concrete.codebase {
        match codebase_entry(doc, system) {
            Ok(entry) if lister.exists(&entry.path) => out.codebase.push(entry),
            Ok(entry) => tracing::debug!(path = %entry.path, system, "autodetected codebase path absent"),
            Err(err) => out.issues.push(
                Issue::error(codes::INVALID_PATH, format!("autodetect codebase: {err:#}"))
                    .in_system(system),
            ),
        }
    }
    out
}

/// Markdown under the rule's artifacts root that no pattern claims. The
/// adapter and kit directories are skipped; templates are not artifacts.
fn unmatched_markdown(
    registry: &Registry,
    concrete: &ConcreteRule,
    matchers: &[GlobMatcher],
    lister: &dyn FileLister,
    system: &str,
) -> Vec<Issue> {
    let files = match lister.files_under(&concrete.artifacts_root) {
        Ok(files) => files,
        Err(err) => {
            return vec![Issue::error(codes::READ_FAILED, format!("{err:#}")).in_system(system)]
        }
    };
    let tooling = registry.tooling_dirs();
    files
        .into_iter()
        .filter(|file| is_markdown(file))
        .filter(|file| !tooling.iter().any(|dir| is_within(file, dir)))
        .filter(|file| !matchers.iter().any(|matcher| matcher.is_match(file)))
        .map(|file| {
            Issue::error(
                codes::UNMATCHED_MARKDOWN,
                format!(
                    "markdown file under {:?} matches no autodetect pattern",
                    concrete.artifacts_root
                ),
            )
            .at(file, None)
            .in_system(system)
        })
        .collect()
}

fn compile(glob: &str) -> Result<GlobMatcher> {
    Ok(GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob: {glob:?}"))?
        .compile_matcher())
}

/// Longest leading directory of a glob that contains no glob syntax; the
/// only part of the tree worth walking.
fn literal_base(glob: &str) -> String {
    let segments: Vec<&str> = glob.split('/').collect();
    let Some((_, dirs)) = segments.split_last() else {
        return String::new();
    };
    dirs.iter()
        .take_while(|segment| !segment.contains(['*', '?', '[', '{']))
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

fn is_markdown(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".md")
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
