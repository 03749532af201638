//! `adapter-info`: where the registry is and what it declares.
use super::emit;
use super::pipeline::discovery_start;
use crate::cli::GlobalArgs;
use crate::registry::{discover_registry, load_registry, locate_registry, Registry, SystemNode};
use crate::report::{EXIT_FAIL, EXIT_PASS};
use crate::util::to_posix;
use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Serialize)]
struct AdapterInfo {
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    registry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    kits: Vec<KitInfo>,
    systems: Vec<SystemInfo>,
}

#[derive(Debug, Serialize)]
struct KitInfo {
    id: String,
    format: String,
    path: String,
    tooled: bool,
    artifact_kinds: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SystemInfo {
    slug: String,
    full_slug: String,
    name: String,
    kit: Option<String>,
    artifacts: usize,
    codebase: usize,
    autodetect_rules: usize,
    children: Vec<SystemInfo>,
}

impl SystemInfo {
    fn from_node(node: &SystemNode) -> Self {
        Self {
            slug: node.slug.clone(),
            full_slug: node.full_slug.clone(),
            name: node.name.clone(),
            kit: node.kit.clone(),
            artifacts: node.artifacts.len(),
            codebase: node.codebase.len(),
            autodetect_rules: node.autodetect.len(),
            children: node.children.iter().map(SystemInfo::from_node).collect(),
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let _ = writeln!(
            out,
            "{:indent$}- {} ({}) kit={} artifacts={} codebase={} autodetect={}",
            "",
            self.full_slug,
            self.name,
            self.kit.as_deref().unwrap_or("-"),
            self.artifacts,
            self.codebase,
            self.autodetect_rules,
            indent = depth * 2
        );
        for child in &self.children {
            child.render(depth + 1, out);
        }
    }
}

impl AdapterInfo {
    fn missing() -> Self {
        Self {
            found: false,
            registry: None,
            project_root: None,
            version: None,
            namespace: None,
            kits: Vec::new(),
            systems: Vec::new(),
        }
    }

    fn from_registry(registry: &Registry) -> Self {
        let kits = registry
            .kits
            .values()
            .map(|kit| KitInfo {
                id: kit.id.clone(),
                format: kit.format.clone(),
                path: registry.display(&kit.root),
                tooled: kit.is_tooled(),
                artifact_kinds: kit.artifact_kinds().into_iter().map(str::to_string).collect(),
            })
            .collect();
        Self {
            found: true,
            registry: Some(registry.display(&registry.path)),
            project_root: Some(to_posix(&registry.project_root)),
            version: Some(registry.version.clone()),
            namespace: Some(registry.namespace.clone()),
            kits,
            systems: registry.systems.iter().map(SystemInfo::from_node).collect(),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        let _ = writeln!(out, "registry: {}", field(&self.registry));
        let _ = writeln!(out, "project_root: {}", field(&self.project_root));
        let _ = writeln!(out, "version: {}", field(&self.version));
        let _ = writeln!(out, "namespace: {}", field(&self.namespace));
        out.push_str("kits:\n");
        for kit in &self.kits {
            let _ = writeln!(
                out,
                "- {} format={}{} path={} kinds={}",
                kit.id,
                kit.format,
                if kit.tooled { "" } else { " (not tooled)" },
                kit.path,
                kit.artifact_kinds.join(",")
            );
        }
        out.push_str("systems:\n");
        for system in &self.systems {
            system.render(0, &mut out);
        }
        out
    }
}

pub(crate) fn run_adapter_info(global: &GlobalArgs) -> Result<i32> {
    let path = match &global.registry {
        Some(explicit) => Some(discover_registry(Some(explicit), &discovery_start(global)?)?),
        None => locate_registry(&discovery_start(global)?)?,
    };
    let Some(path) = path else {
        let info = AdapterInfo::missing();
        emit(global.json, &info, || "no adapter found\n".to_string())?;
        return Ok(EXIT_FAIL);
    };
    let (registry, issues) = load_registry(&path)?;
    if !issues.is_empty() {
        tracing::warn!(issues = issues.len(), "registry has issues; run validate for details");
    }
    let info = AdapterInfo::from_registry(&registry);
    emit(global.json, &info, || info.render_text())?;
    Ok(EXIT_PASS)
}
