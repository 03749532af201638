//! Placeholder expansion for autodetect rules.
//!
//! Expansion is pure: it never touches the filesystem, so a rule can be turned
//! into concrete, project-relative patterns before any glob runs.
use crate::registry::{ArtifactPattern, AutodetectRule, AutodetectValidation, CodebaseDoc, Traceability};
use crate::util::{join_rel, normalize_rel};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;

pub const PROJECT_ROOT: &str = "project_root";
pub const SYSTEM_ROOT: &str = "system_root";
pub const PARENT_ROOT: &str = "parent_root";
pub const SYSTEM: &str = "system";

/// Values bound while expanding one rule for one system node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionScope {
    /// System slug substituted for `{system}`.
    pub system: String,
    /// Resolved root of the parent under the rule that produced this one.
    pub parent_root: Option<String>,
    /// Node-level `artifacts_dir`, the default `artifacts_root`.
    pub artifacts_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcretePattern {
    pub kind: String,
    /// Glob relative to the project root.
    pub glob: String,
    pub traceability: Traceability,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteRule {
    pub kit: Option<String>,
    pub system_root: String,
    pub artifacts_root: String,
    pub patterns: Vec<ConcretePattern>,
    pub codebase: Vec<CodebaseDoc>,
    pub validation: ValidationFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationFlags {
    pub require_kind_registered: bool,
    pub require_md_extension: bool,
    pub fail_on_unmatched_markdown: bool,
}

impl From<&AutodetectValidation> for ValidationFlags {
    fn from(validation: &AutodetectValidation) -> Self {
        Self {
            require_kind_registered: validation.require_kind_registered,
            require_md_extension: validation.require_md_extension,
            fail_on_unmatched_markdown: validation.fail_on_unmatched_markdown,
        }
    }
}

/// True when the rule's system root mentions `{system}`; such rules re-expand
/// for every descendant, others stay scoped to the declaring node.
pub fn is_inheritable(rule: &AutodetectRule) -> bool {
    rule.system_root
        .as_deref()
        .is_some_and(|root| root.contains("{system}"))
}

/// Expand only the system root; used when binding `{parent_root}` for
/// descendants.
pub fn expand_system_root(rule: &AutodetectRule, scope: &ExpansionScope) -> Result<String> {
    let vars = base_vars(rule, scope);
    let raw = rule.system_root.as_deref().unwrap_or("{project_root}");
    expand_path(raw, &vars).context("expand system_root")
}

/// `(rule, scope) -> concrete patterns`, with no filesystem access.
pub fn expand_rule(rule: &AutodetectRule, scope: &ExpansionScope) -> Result<ConcreteRule> {
    let mut vars = base_vars(rule, scope);
    let system_root = expand_system_root(rule, scope)?;
    vars.insert(SYSTEM_ROOT.to_string(), system_root.clone());

    let artifacts_root_raw = rule
        .artifacts_root
        .clone()
        .or_else(|| scope.artifacts_dir.clone())
        .unwrap_or_else(|| "{system_root}".to_string());
    let artifacts_root =
        expand_path(&artifacts_root_raw, &vars).context("expand artifacts_root")?;

    let mut patterns = Vec::new();
    for (kind, ArtifactPattern { pattern, traceability, required }) in &rule.artifacts {
        let expanded = expand(pattern, &vars).with_context(|| format!("expand pattern for {kind}"))?;
        let glob = if expanded.starts_with('/') {
            normalize_rel(&expanded)?
        } else {
            join_rel(&artifacts_root, expanded.trim_start_matches("./"))
        };
        patterns.push(ConcretePattern {
            kind: kind.clone(),
            glob,
            traceability: *traceability,
            required: *required,
        });
    }

    let mut codebase = Vec::new();
    for entry in &rule.codebase {
        let path = expand_path(&entry.path, &vars)
            .with_context(|| format!("expand codebase path {:?}", entry.path))?;
        codebase.push(CodebaseDoc {
            path: if path.is_empty() { ".".to_string() } else { path },
            ..entry.clone()
        });
    }

    Ok(ConcreteRule {
        kit: rule.kit.clone(),
        system_root,
        artifacts_root,
        patterns,
        codebase,
        validation: ValidationFlags::from(&rule.validation),
    })
}

fn base_vars(rule: &AutodetectRule, scope: &ExpansionScope) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for (name, value) in &rule.aliases {
        vars.insert(name.clone(), value.clone());
    }
    // Built-ins win over aliases of the same name.
    vars.insert(PROJECT_ROOT.to_string(), String::new());
    vars.insert(SYSTEM.to_string(), scope.system.clone());
    vars.insert(
        PARENT_ROOT.to_string(),
        scope.parent_root.clone().unwrap_or_default(),
    );
    vars
}

fn expand_path(raw: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    normalize_rel(&expand(raw, vars)?)
}

/// Substitute `{name}` placeholders. Alias values may themselves contain
/// placeholders; expansion is bounded to catch cycles.
pub fn expand(raw: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut current = raw.to_string();
    for _ in 0..8 {
        let (next, replaced) = expand_once(&current, vars)?;
        if !replaced {
            return Ok(next);
        }
        current = next;
    }
    Err(anyhow!("placeholder expansion of {raw:?} does not terminate"))
}

fn expand_once(raw: &str, vars: &BTreeMap<String, String>) -> Result<(String, bool)> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut replaced = false;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        // Glob alternations such as `{a,b}` are not placeholders.
        if name.contains(',') || name.is_empty() {
            out.push_str(&rest[start..start + end + 2]);
        } else {
            let value = vars
                .get(name)
                .ok_or_else(|| anyhow!("unknown placeholder {{{name}}} in {raw:?}"))?;
            out.push_str(value);
            replaced = true;
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok((out, replaced))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(system: &str, parent_root: Option<&str>) -> ExpansionScope {
        ExpansionScope {
            system: system.to_string(),
            parent_root: parent_root.map(str::to_string),
            artifacts_dir: None,
        }
    }

    fn rule(system_root: &str, artifacts_root: Option<&str>, pattern: &str) -> AutodetectRule {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            "PRD".to_string(),
            ArtifactPattern {
                pattern: pattern.to_string(),
                traceability: Traceability::DocsOnly,
                required: true,
            },
        );
        AutodetectRule {
            system_root: Some(system_root.to_string()),
            artifacts_root: artifacts_root.map(str::to_string),
            artifacts,
            ..AutodetectRule::default()
        }
    }

    #[test]
    fn expands_placeholders_before_globbing() {
        let concrete = expand_rule(
            &rule("{project_root}/modules/{system}", Some("{system_root}/docs"), "*.md"),
            &scope("auth", None),
        )
        .unwrap();
        assert_eq!(concrete.system_root, "modules/auth");
        assert_eq!(concrete.artifacts_root, "modules/auth/docs");
        assert_eq!(concrete.patterns[0].glob, "modules/auth/docs/*.md");
    }

    #[test]
    fn parent_root_and_aliases_resolve() {
        let mut with_alias = rule("{parent_root}/{area}/{system}", None, "{doc}.md");
        with_alias.aliases.insert("area".into(), "components".into());
        with_alias.aliases.insert("doc".into(), "PRD".into());
        let concrete = expand_rule(&with_alias, &scope("billing", Some("apps/core"))).unwrap();
        assert_eq!(concrete.system_root, "apps/core/components/billing");
        assert_eq!(concrete.patterns[0].glob, "apps/core/components/billing/PRD.md");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = expand_rule(&rule("{nope}/x", None, "*.md"), &scope("a", None)).unwrap_err();
        assert!(format!("{err:#}").contains("unknown placeholder {nope}"));
    }

    #[test]
    fn glob_alternation_braces_are_kept() {
        let concrete = expand_rule(&rule("{project_root}", None, "{PRD,prd}.md"), &scope("a", None))
            .unwrap();
        assert_eq!(concrete.patterns[0].glob, "{PRD,prd}.md");
    }

    #[test]
    fn inheritance_follows_system_placeholder() {
        assert!(is_inheritable(&rule("modules/{system}", None, "x")));
        assert!(!is_inheritable(&rule("modules/core", None, "x")));
    }
}
