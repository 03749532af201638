//! Immutable per-run context threaded through validation and queries.
use crate::autodetect::Resolution;
use crate::graph::ScopeIndex;
use crate::kit::{ArtifactConstraints, Kit};
use crate::registry::{ArtifactEntry, CodebaseEntry, Registry};
use crate::scan::Patterns;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct ValidationContext {
    pub(crate) registry: Registry,
    /// Final artifact set, sorted by path.
    pub(crate) artifacts: Vec<ArtifactEntry>,
    pub(crate) codebase: Vec<CodebaseEntry>,
    pub(crate) patterns: Patterns,
    pub(crate) systems: BTreeSet<String>,
    pub(crate) identifier_kinds: BTreeSet<String>,
    /// Full slug -> parent full slug.
    parents: BTreeMap<String, Option<String>>,
}

impl ValidationContext {
    pub(crate) fn new(registry: Registry, resolution: &Resolution) -> Result<Self> {
        let patterns = Patterns::new(&registry.namespace)?;
        let mut parents = BTreeMap::new();
        for root in &registry.systems {
            record_parents(root, None, &mut parents);
        }
        let systems = parents.keys().cloned().collect();
        let identifier_kinds = registry
            .kits
            .values()
            .flat_map(|kit| kit.constraints.identifier_kinds().map(str::to_string))
            .collect();
        Ok(Self {
            registry,
            artifacts: resolution.artifacts.clone(),
            codebase: resolution.codebase.clone(),
            patterns,
            systems,
            identifier_kinds,
            parents,
        })
    }

    pub(crate) fn scope_index(&self) -> ScopeIndex<'_> {
        ScopeIndex {
            namespace: &self.registry.namespace,
            systems: &self.systems,
            identifier_kinds: &self.identifier_kinds,
        }
    }

    pub(crate) fn artifact(&self, path: &str) -> Option<&ArtifactEntry> {
        self.artifacts
            .binary_search_by(|entry| entry.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.artifacts[index])
    }

    pub(crate) fn kit_for(&self, artifact: &ArtifactEntry) -> Option<&Kit> {
        artifact
            .kit
            .as_deref()
            .and_then(|id| self.registry.kits.get(id))
    }

    /// Constraints governing an artifact, for fully tooled kits only.
    pub(crate) fn constraints_for(&self, artifact: &ArtifactEntry) -> Option<(&Kit, &ArtifactConstraints)> {
        let kit = self.kit_for(artifact).filter(|kit| kit.is_tooled())?;
        let constraints = kit.constraints.artifacts.get(&artifact.kind)?;
        Some((kit, constraints))
    }

    /// The system itself, its ancestors, and its descendants.
    pub(crate) fn systems_in_scope(&self, system: &str) -> BTreeSet<&str> {
        let mut scope = BTreeSet::new();
        let mut current = Some(system);
        while let Some(slug) = current {
            let Some((key, parent)) = self.parents.get_key_value(slug) else {
                break;
            };
            scope.insert(key.as_str());
            current = parent.as_deref();
        }
        for slug in self.parents.keys() {
            if self.is_descendant(slug, system) {
                scope.insert(slug.as_str());
            }
        }
        scope
    }

    fn is_descendant(&self, slug: &str, ancestor: &str) -> bool {
        let mut current = self.parents.get(slug).and_then(|parent| parent.as_deref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parents.get(parent).and_then(|parent| parent.as_deref());
        }
        false
    }

    pub(crate) fn has_artifacts_in_scope(&self, system: &str, kind: &str) -> bool {
        let scope = self.systems_in_scope(system);
        self.artifacts
            .iter()
            .any(|artifact| artifact.kind == kind && scope.contains(artifact.system.as_str()))
    }

    pub(crate) fn has_codebase_in_scope(&self, system: &str) -> bool {
        let scope = self.systems_in_scope(system);
        self.codebase
            .iter()
            .any(|entry| scope.contains(entry.system.as_str()))
    }
}

fn record_parents(
    node: &crate::registry::SystemNode,
    parent: Option<&str>,
    parents: &mut BTreeMap<String, Option<String>>,
) {
    parents.insert(node.full_slug.clone(), parent.map(str::to_string));
    for child in &node.children {
        record_parents(child, Some(&node.full_slug), parents);
    }
}
