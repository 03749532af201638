//! Serde types mirroring the registry document (`artifacts.json`).
//!
//! These are the authored shapes only; validated, resolved models live in
//! [`super::load`].
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Root registry document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryDoc {
    pub version: RegistryVersion,
    #[serde(default, alias = "projectRoot")]
    pub project_root: Option<String>,
    /// Identifier and marker namespace (`cpt` unless overridden).
    #[serde(default)]
    pub namespace: Option<String>,
    pub kits: BTreeMap<String, KitDoc>,
    #[serde(default)]
    pub ignore: Vec<IgnoreRule>,
    pub systems: Vec<SystemDoc>,
}

/// Registry versions are authored as either strings (`"1.0"`) or numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RegistryVersion {
    Text(String),
    Number(serde_json::Number),
}

impl RegistryVersion {
    /// Leading numeric component, if any.
    pub fn major(&self) -> Option<u64> {
        let text = self.to_string();
        text.trim()
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
    }
}

impl fmt::Display for RegistryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryVersion::Text(text) => f.write_str(text),
            RegistryVersion::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KitDoc {
    pub format: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IgnoreRule {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemDoc {
    #[serde(default)]
    pub name: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub kit: Option<String>,
    #[serde(default, alias = "artifactsDir")]
    pub artifacts_dir: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactDoc>,
    #[serde(default)]
    pub codebase: Vec<CodebaseDoc>,
    #[serde(default)]
    pub autodetect: Vec<AutodetectRule>,
    #[serde(default)]
    pub children: Vec<SystemDoc>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum Traceability {
    #[serde(rename = "FULL")]
    Full,
    #[default]
    #[serde(rename = "DOCS-ONLY")]
    DocsOnly,
}

impl Traceability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Traceability::Full => "FULL",
            Traceability::DocsOnly => "DOCS-ONLY",
        }
    }
}

impl fmt::Display for Traceability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactDoc {
    pub path: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub traceability: Traceability,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CodebaseDoc {
    pub path: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "singleLineComments")]
    pub single_line_comments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "multiLineComments")]
    pub multi_line_comments: Option<Vec<BlockComment>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlockComment {
    pub start: String,
    pub end: String,
}

/// Pattern-based discovery rule. `children` recurse with the same shape and
/// apply to the declaring node's child systems.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AutodetectRule {
    #[serde(default)]
    pub kit: Option<String>,
    #[serde(default, alias = "systemRoot")]
    pub system_root: Option<String>,
    #[serde(default, alias = "artifactsRoot")]
    pub artifacts_root: Option<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactPattern>,
    #[serde(default)]
    pub codebase: Vec<CodebaseDoc>,
    #[serde(default)]
    pub validation: AutodetectValidation,
    #[serde(default)]
    pub children: Vec<AutodetectRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactPattern {
    pub pattern: String,
    #[serde(default)]
    pub traceability: Traceability,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutodetectValidation {
    #[serde(default = "default_true", alias = "requireKindRegistered")]
    pub require_kind_registered: bool,
    #[serde(default = "default_true", alias = "requireMdExtension")]
    pub require_md_extension: bool,
    #[serde(default, alias = "failOnUnmatchedMarkdown")]
    pub fail_on_unmatched_markdown: bool,
}

impl Default for AutodetectValidation {
    fn default() -> Self {
        Self {
            require_kind_registered: true,
            require_md_extension: true,
            fail_on_unmatched_markdown: false,
        }
    }
}

fn default_true() -> bool {
    true
}
