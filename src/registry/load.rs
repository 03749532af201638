//! Registry loading: parse, validate, and build the system tree.
//!
//! Malformed JSON, missing mandatory fields, an unsupported version, an empty
//! kit map, or a bad ignore glob stop the run. Everything else is collected as
//! an [`Issue`] tied to the offending system node so loading can continue.
use super::ignore::IgnoreFilter;
use super::types::{ArtifactDoc, BlockComment, CodebaseDoc, RegistryDoc, SystemDoc, Traceability};
use crate::autodetect::{inherit_rules, EffectiveRule};
use crate::kit::{self, Kit};
use crate::report::{codes, Issue};
use crate::util::{display_path, normalize_rel, to_posix, validate_relative_path};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Registry file name.
pub const REGISTRY_FILE: &str = "artifacts.json";
/// Adapter directory searched for the registry.
pub const ADAPTER_DIR: &str = ".cypilot";
/// Namespace used when the registry does not set one.
pub const DEFAULT_NAMESPACE: &str = "cpt";
const SUPPORTED_MAJOR_VERSION: u64 = 1;
const SLUG_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";

/// Where an artifact entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Explicit,
    Autodetect,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub traceability: Traceability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub origin: Origin,
    /// Owning system, by full slug.
    pub system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CodebaseEntry {
    pub path: String,
    /// Lower-cased, without the leading dot.
    pub extensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_line_comments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_line_comments: Option<Vec<BlockComment>>,
    pub system: String,
}

#[derive(Debug, Clone)]
pub struct SystemNode {
    pub name: String,
    pub slug: String,
    /// Ancestor slugs joined with `-`; the prefix identifiers are scoped by.
    pub full_slug: String,
    /// Resolved kit id; `None` when the reference is missing or unknown.
    pub kit: Option<String>,
    pub artifacts_dir: Option<String>,
    pub artifacts: Vec<ArtifactEntry>,
    pub codebase: Vec<CodebaseEntry>,
    /// Effective autodetect rules: inherited ++ parent rule children ++ own.
    pub autodetect: Vec<EffectiveRule>,
    pub children: Vec<SystemNode>,
}

impl SystemNode {
    /// Depth-first walk, parents before children.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a SystemNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    pub path: PathBuf,
    pub project_root: PathBuf,
    pub version: String,
    pub namespace: String,
    pub kits: BTreeMap<String, Kit>,
    pub ignore: IgnoreFilter,
    pub systems: Vec<SystemNode>,
}

impl Registry {
    pub fn all_systems(&self) -> Vec<&SystemNode> {
        let mut out = Vec::new();
        for system in &self.systems {
            system.walk(&mut out);
        }
        out
    }

    pub fn display(&self, path: &Path) -> String {
        display_path(path, Some(&self.project_root))
    }

    /// Project-relative kit directories. Kits outside the project root or at
    /// the root itself are left out.
    pub fn kit_dirs(&self) -> Vec<String> {
        self.kits
            .values()
            .filter_map(|kit| self.relative_dir(&kit.root))
            .collect()
    }

    /// Kit directories plus the directory holding the registry file, when
    /// that is not the project root. Markdown under these is kit material,
    /// never an artifact.
    pub fn tooling_dirs(&self) -> Vec<String> {
        let registry_dir = self.path.parent().and_then(|dir| self.relative_dir(dir));
        let mut dirs: Vec<String> = registry_dir.into_iter().chain(self.kit_dirs()).collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    fn relative_dir(&self, dir: &Path) -> Option<String> {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let rel = dir.strip_prefix(&self.project_root).ok()?;
        Some(to_posix(rel)).filter(|rel| !rel.is_empty())
    }

    /// True if `rel` exists as a file under the project root and is not ignored.
    pub fn is_visible_file(&self, rel: &str) -> bool {
        !self.ignore.is_ignored(rel) && self.project_root.join(rel).is_file()
    }
}

/// Find the registry: an explicit path wins, otherwise walk up from `start`.
pub fn discover_registry(explicit: Option<&Path>, start: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(anyhow!("registry {} not found", path.display()));
        }
        return Ok(path.to_path_buf());
    }
    locate_registry(start)?.ok_or_else(|| {
        anyhow!(
            "no {ADAPTER_DIR}/{REGISTRY_FILE} found in {} or any parent directory",
            start.display()
        )
    })
}

/// Walk up from `start` looking for `.cypilot/artifacts.json`, then
/// `artifacts.json`, in each directory.
pub fn locate_registry(start: &Path) -> Result<Option<PathBuf>> {
    let start = start
        .canonicalize()
        .with_context(|| format!("resolve {}", start.display()))?;
    for dir in start.ancestors() {
        for candidate in [dir.join(ADAPTER_DIR).join(REGISTRY_FILE), dir.join(REGISTRY_FILE)] {
            if candidate.is_file() {
                tracing::debug!(registry = %candidate.display(), "discovered registry");
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

pub fn load_registry(path: &Path) -> Result<(Registry, Vec<Issue>)> {
    let text = fs::read_to_string(path).with_context(|| format!("read registry {}", path.display()))?;
    let doc: RegistryDoc = serde_json::from_str(&text)
        .with_context(|| format!("parse registry JSON {}", path.display()))?;
    let registry_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    match doc.version.major() {
        Some(SUPPORTED_MAJOR_VERSION) => {}
        _ => {
            return Err(anyhow!(
                "unsupported registry version {:?} (expected {SUPPORTED_MAJOR_VERSION}.x)",
                doc.version.to_string()
            ))
        }
    }
    if doc.kits.is_empty() {
        return Err(anyhow!("registry kits map must be non-empty"));
    }
    let namespace = doc
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let namespace_re = Regex::new(r"^[a-z][a-z0-9]*$").expect("namespace regex");
    if !namespace_re.is_match(&namespace) {
        return Err(anyhow!(
            "registry namespace must match [a-z][a-z0-9]* (got {namespace:?})"
        ));
    }

    let in_adapter_dir = registry_dir
        .file_name()
        .is_some_and(|name| name == ADAPTER_DIR);
    let default_root = if in_adapter_dir { ".." } else { "." };
    let project_root_rel = doc
        .project_root
        .clone()
        .unwrap_or_else(|| default_root.to_string());
    let project_root = registry_dir
        .join(&project_root_rel)
        .canonicalize()
        .with_context(|| format!("resolve project_root {project_root_rel:?}"))?;
    let ignore = IgnoreFilter::new(&doc.ignore).context("compile ignore rules")?;

    let mut issues = Vec::new();
    let mut kits = BTreeMap::new();
    for (id, kit_doc) in &doc.kits {
        let root = registry_dir.join(&kit_doc.path);
        let root = root.canonicalize().unwrap_or(root);
        let (kit, kit_issues) = kit::load_kit(id, &kit_doc.format, &root, &namespace, &project_root);
        issues.extend(kit_issues);
        kits.insert(id.clone(), kit);
    }

    let mut registry = Registry {
        path: path.to_path_buf(),
        project_root,
        version: doc.version.to_string(),
        namespace,
        kits,
        ignore,
        systems: Vec::new(),
    };
    let builder = TreeBuilder {
        registry: &registry,
        slug_re: Regex::new(SLUG_PATTERN).expect("slug regex"),
    };
    let root_scope = ParentScope::root();
    let systems = builder.build_level(&doc.systems, &root_scope, &mut issues);
    check_full_slug_collisions(&systems, &mut issues);
    registry.systems = systems;
    tracing::info!(
        registry = %path.display(),
        systems = registry.all_systems().len(),
        kits = registry.kits.len(),
        "loaded registry"
    );
    Ok((registry, issues))
}

struct ParentScope {
    full_slug: Option<String>,
    slug: Option<String>,
    kit: Option<String>,
    rules: Vec<EffectiveRule>,
}

impl ParentScope {
    fn root() -> Self {
        Self {
            full_slug: None,
            slug: None,
            kit: None,
            rules: Vec::new(),
        }
    }
}

struct TreeBuilder<'a> {
    registry: &'a Registry,
    slug_re: Regex,
}

impl TreeBuilder<'_> {
    fn build_level(
        &self,
        docs: &[SystemDoc],
        parent: &ParentScope,
        issues: &mut Vec<Issue>,
    ) -> Vec<SystemNode> {
        let mut seen = BTreeSet::new();
        let mut nodes = Vec::new();
        for doc in docs {
            let label = match &parent.full_slug {
                Some(prefix) => format!("{prefix}-{}", doc.slug),
                None => doc.slug.clone(),
            };
            if !self.slug_re.is_match(&doc.slug) {
                issues.push(
                    Issue::error(
                        codes::INVALID_SLUG,
                        format!("slug {:?} must match {SLUG_PATTERN}", doc.slug),
                    )
                    .in_system(label),
                );
                continue;
            }
            if !seen.insert(doc.slug.clone()) {
                issues.push(
                    Issue::error(
                        codes::DUPLICATE_SLUG,
                        format!("slug {:?} is already used by a sibling system", doc.slug),
                    )
                    .in_system(label),
                );
                continue;
            }
            nodes.push(self.build_node(doc, parent, label, issues));
        }
        nodes
    }

    fn build_node(
        &self,
        doc: &SystemDoc,
        parent: &ParentScope,
        full_slug: String,
        issues: &mut Vec<Issue>,
    ) -> SystemNode {
        let kit = self.resolve_kit(doc, parent, &full_slug, issues);
        let artifacts = doc
            .artifacts
            .iter()
            .filter_map(|artifact| self.explicit_artifact(artifact, &full_slug, kit.as_deref(), issues))
            .collect();
        let codebase = doc
            .codebase
            .iter()
            .filter_map(|entry| match codebase_entry(entry, &full_slug) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    issues.push(
                        Issue::error(codes::INVALID_PATH, format!("codebase: {err:#}"))
                            .in_system(full_slug.clone()),
                    );
                    None
                }
            })
            .collect();
        let (rules, rule_issues) = inherit_rules(
            &parent.rules,
            parent.slug.as_deref(),
            &doc.autodetect,
            &full_slug,
        );
        issues.extend(rule_issues);

        let scope = ParentScope {
            full_slug: Some(full_slug.clone()),
            slug: Some(doc.slug.clone()),
            kit: kit.clone(),
            rules: rules.clone(),
        };
        let children = self.build_level(&doc.children, &scope, issues);
        SystemNode {
            name: doc.name.clone().unwrap_or_else(|| doc.slug.clone()),
            slug: doc.slug.clone(),
            full_slug,
            kit,
            artifacts_dir: doc.artifacts_dir.clone(),
            artifacts,
            codebase,
            autodetect: rules,
            children,
        }
    }

    fn resolve_kit(
        &self,
        doc: &SystemDoc,
        parent: &ParentScope,
        full_slug: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<String> {
        match doc.kit.as_deref() {
            Some(id) if self.registry.kits.contains_key(id) => Some(id.to_string()),
            Some(id) => {
                issues.push(
                    Issue::error(codes::UNKNOWN_KIT, format!("kit {id:?} is not registered"))
                        .in_system(full_slug),
                );
                None
            }
            None if parent.kit.is_some() => parent.kit.clone(),
            None if parent.full_slug.is_none() => {
                issues.push(
                    Issue::error(codes::UNKNOWN_KIT, "system has no kit assigned")
                        .in_system(full_slug),
                );
                None
            }
            None => None,
        }
    }

    fn explicit_artifact(
        &self,
        doc: &ArtifactDoc,
        system: &str,
        kit_id: Option<&str>,
        issues: &mut Vec<Issue>,
    ) -> Option<ArtifactEntry> {
        let path = match validate_relative_path(&doc.path, "artifact path")
            .and_then(|_| normalize_rel(&doc.path))
        {
            Ok(path) => path,
            Err(err) => {
                issues.push(
                    Issue::error(codes::INVALID_PATH, format!("{err:#}")).in_system(system),
                );
                return None;
            }
        };
        if !self.registry.is_visible_file(&path) {
            let detail = match self.registry.ignore.reason(&path) {
                Some(reason) => format!("artifact is hidden by an ignore rule ({reason})"),
                None => "artifact file does not exist".to_string(),
            };
            issues.push(
                Issue::error(codes::ARTIFACT_MISSING, detail)
                    .at(path, None)
                    .in_system(system),
            );
            return None;
        }
        if let Some(issue) = kind_issue(self.registry, kit_id, &doc.kind) {
            issues.push(issue.at(path.clone(), None).in_system(system));
        }
        Some(ArtifactEntry {
            path,
            kind: doc.kind.clone(),
            traceability: doc.traceability,
            name: doc.name.clone(),
            origin: Origin::Explicit,
            system: system.to_string(),
            kit: kit_id.map(str::to_string),
        })
    }
}

/// Unknown kind or missing template for artifacts governed by a tooled kit.
pub fn kind_issue(registry: &Registry, kit_id: Option<&str>, kind: &str) -> Option<Issue> {
    let kit = kit_id.and_then(|id| registry.kits.get(id))?;
    if !kit.is_tooled() {
        return None;
    }
    if !kit.knows_artifact_kind(kind) {
        return Some(Issue::error(
            codes::UNKNOWN_KIND,
            format!("artifact kind {kind} is not declared by kit {}", kit.id),
        ));
    }
    if !kit.has_template(kind) {
        return Some(Issue::error(
            codes::TEMPLATE_MISSING,
            format!(
                "kit {} has no artifacts/{kind}/template.md",
                kit.id
            ),
        ));
    }
    None
}

pub fn codebase_entry(doc: &CodebaseDoc, system: &str) -> Result<CodebaseEntry> {
    validate_relative_path(&doc.path, "codebase path")?;
    let path = normalize_rel(&doc.path)?;
    let extensions = doc
        .extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    Ok(CodebaseEntry {
        path,
        extensions,
        single_line_comments: doc.single_line_comments.clone(),
        multi_line_comments: doc.multi_line_comments.clone(),
        system: system.to_string(),
    })
}

// Sibling uniqueness does not rule out `a` + child `b-c` colliding with
// `a-b` + child `c`; identifier scoping needs full slugs to be unique.
fn check_full_slug_collisions(systems: &[SystemNode], issues: &mut Vec<Issue>) {
    let mut all = Vec::new();
    for system in systems {
        system.walk(&mut all);
    }
    let mut seen = BTreeSet::new();
    for node in all {
        if !seen.insert(node.full_slug.as_str()) {
            issues.push(
                Issue::error(
                    codes::DUPLICATE_SLUG,
                    format!(
                        "full slug {:?} is produced by more than one system path",
                        node.full_slug
                    ),
                )
                .in_system(node.full_slug.clone()),
            );
        }
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
