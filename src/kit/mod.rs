//! Kits: template directories plus optional `constraints.json`.
//!
//! A kit directory looks like:
//!
//! ```text
//! <kit>/
//! ├── constraints.json          (optional)
//! └── artifacts/
//!     ├── PRD/template.md
//!     └── DESIGN/template.md
//! ```
//!
//! Artifact and identifier kinds are open strings; validity is a lookup
//! against what the kit directory actually declares.
mod constraints;
mod template;

pub use constraints::{
    ArtifactConstraints, Coverage, IdentifierRule, KitConstraints, ReferenceRule,
};
pub use template::{contradictions, MarkerParser, TemplateMarker};

use crate::report::{codes, Issue};
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The `format` value for kits the engine fully validates.
pub const TOOLED_FORMAT: &str = "Cypilot";

#[derive(Debug, Clone)]
pub struct Kit {
    pub id: String,
    pub format: String,
    pub root: PathBuf,
    /// Artifact kind -> template path.
    pub templates: BTreeMap<String, PathBuf>,
    /// Artifact kind -> markers parsed from its template.
    pub markers: BTreeMap<String, Vec<TemplateMarker>>,
    pub constraints: KitConstraints,
}

impl Kit {
    /// Fully tooled kits get constraint enforcement; others are LLM-only.
    pub fn is_tooled(&self) -> bool {
        self.format.eq_ignore_ascii_case(TOOLED_FORMAT)
    }

    pub fn has_template(&self, artifact_kind: &str) -> bool {
        self.templates.contains_key(artifact_kind)
    }

    pub fn knows_artifact_kind(&self, artifact_kind: &str) -> bool {
        self.has_template(artifact_kind) || self.constraints.artifacts.contains_key(artifact_kind)
    }

    pub fn artifact_kinds(&self) -> BTreeSet<&str> {
        self.templates
            .keys()
            .chain(self.constraints.artifacts.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn template_path(&self, artifact_kind: &str) -> PathBuf {
        self.root
            .join("artifacts")
            .join(artifact_kind)
            .join("template.md")
    }
}

/// Load a kit directory. Structural problems become issues; the returned kit
/// keeps whatever could be loaded.
pub fn load_kit(
    id: &str,
    format: &str,
    root: &Path,
    namespace: &str,
    display_root: &Path,
) -> (Kit, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut kit = Kit {
        id: id.to_string(),
        format: format.to_string(),
        root: root.to_path_buf(),
        templates: BTreeMap::new(),
        markers: BTreeMap::new(),
        constraints: KitConstraints::default(),
    };
    let shown = display_path(root, Some(display_root));
    if !root.is_dir() {
        issues.push(
            Issue::error(codes::UNKNOWN_KIT, format!("kit {id}: directory {shown} not found"))
                .at(shown, None),
        );
        return (kit, issues);
    }

    match discover_templates(root) {
        Ok(templates) => kit.templates = templates,
        Err(err) => issues.push(
            Issue::error(codes::READ_FAILED, format!("kit {id}: {err:#}")).at(shown.clone(), None),
        ),
    }

    let parser = MarkerParser::new(namespace);
    for (kind, path) in &kit.templates {
        match fs::read_to_string(path) {
            Ok(text) => {
                kit.markers.insert(kind.clone(), parser.parse(&text));
            }
            Err(err) => issues.push(
                Issue::error(codes::READ_FAILED, format!("read template: {err}"))
                    .at(display_path(path, Some(display_root)), None),
            ),
        }
    }

    let constraints_path = root.join("constraints.json");
    if constraints_path.is_file() {
        match load_constraints(&constraints_path) {
            Ok(constraints) => kit.constraints = constraints,
            Err(err) => issues.push(
                Issue::error(codes::CONSTRAINTS_INVALID, format!("kit {id}: {err:#}"))
                    .at(display_path(&constraints_path, Some(display_root)), None),
            ),
        }
    }
    tracing::debug!(
        kit = id,
        templates = kit.templates.len(),
        constrained_kinds = kit.constraints.artifacts.len(),
        "loaded kit"
    );
    (kit, issues)
}

fn load_constraints(path: &Path) -> Result<KitConstraints> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    KitConstraints::parse(&text)
}

fn discover_templates(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let artifacts_dir = root.join("artifacts");
    let mut templates = BTreeMap::new();
    if !artifacts_dir.is_dir() {
        return Ok(templates);
    }
    let entries = fs::read_dir(&artifacts_dir)
        .with_context(|| format!("read {}", artifacts_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read {}", artifacts_dir.display()))?;
        let template = entry.path().join("template.md");
        if !template.is_file() {
            continue;
        }
        let kind = entry
            .file_name()
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("non UTF-8 kind directory under {}", artifacts_dir.display()))?;
        templates.insert(kind, template);
    }
    Ok(templates)
}

/// Load-time contradictions between `constraints.json` and template markers.
/// Any entry here stops `validate` before scanning begins.
pub fn check_contradictions(kit: &Kit, display_root: &Path) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (artifact_kind, markers) in &kit.markers {
        for marker in markers {
            let Some(rule) = kit.constraints.rule(artifact_kind, &marker.kind) else {
                continue;
            };
            for clash in contradictions(marker, rule) {
                issues.push(
                    Issue::error(
                        codes::CONSTRAINTS_INVALID,
                        format!(
                            "kit {}: {artifact_kind}.{} contradicts template marker: {clash}",
                            kit.id, marker.kind
                        ),
                    )
                    .at(
                        display_path(&kit.template_path(artifact_kind), Some(display_root)),
                        Some(marker.line),
                    ),
                );
            }
        }
    }
    issues
}

/// Self-check used by `validate-kits`: constrained kinds need templates and
/// templates should declare the identifier kinds constrained for them.
pub fn self_check(kit: &Kit, display_root: &Path) -> Vec<Issue> {
    let mut issues = check_contradictions(kit, display_root);
    let kit_shown = display_path(&kit.root, Some(display_root));
    for (artifact_kind, constraints) in &kit.constraints.artifacts {
        if !kit.has_template(artifact_kind) {
            issues.push(
                Issue::error(
                    codes::TEMPLATE_MISSING,
                    format!(
                        "kit {}: constraints declare {artifact_kind} but artifacts/{artifact_kind}/template.md is missing",
                        kit.id
                    ),
                )
                .at(kit_shown.clone(), None),
            );
            continue;
        }
        let declared: BTreeSet<&str> = kit
            .markers
            .get(artifact_kind)
            .map(|markers| markers.iter().map(|marker| marker.kind.as_str()).collect())
            .unwrap_or_default();
        for identifier_kind in constraints.identifiers.keys() {
            if !declared.contains(identifier_kind.as_str()) {
                issues.push(
                    Issue::warning(
                        codes::TEMPLATE_MARKER_MISSING,
                        format!(
                            "kit {}: template for {artifact_kind} has no marker for identifier kind {identifier_kind}",
                            kit.id
                        ),
                    )
                    .at(
                        display_path(&kit.template_path(artifact_kind), Some(display_root)),
                        None,
                    ),
                );
            }
        }
        for (identifier_kind, rule) in &constraints.identifiers {
            for target in rule.references.keys() {
                if !kit.knows_artifact_kind(target) {
                    issues.push(
                        Issue::warning(
                            codes::UNKNOWN_KIND,
                            format!(
                                "kit {}: {artifact_kind}.{identifier_kind} references unknown artifact kind {target}",
                                kit.id
                            ),
                        )
                        .at(kit_shown.clone(), None),
                    );
                }
            }
        }
    }
    issues
}

#[cfg(test)]
#[path = "kit_tests.rs"]
mod tests;
