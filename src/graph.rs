//! Cross-reference graph: identifier -> definitions and identifier ->
//! references, with each identifier's system scope.
//!
//! Building is a pure reduce over per-file scan results. Lists are sorted by
//! `(path, line)` so the graph does not depend on scan order.
use crate::scan::{Definition, FileScan, Reference};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "system")]
pub enum Scope {
    /// Owned by the system with this full slug.
    System(String),
    /// No registered system matches; indexed but never constraint-checked.
    External,
}

impl Scope {
    pub fn system(&self) -> Option<&str> {
        match self {
            Scope::System(slug) => Some(slug),
            Scope::External => None,
        }
    }
}

/// What the graph needs to know about the registry.
#[derive(Debug, Clone, Copy)]
pub struct ScopeIndex<'a> {
    pub namespace: &'a str,
    /// Full slugs of every registered system.
    pub systems: &'a BTreeSet<String>,
    /// Lower-cased identifier kinds known from loaded constraints.
    pub identifier_kinds: &'a BTreeSet<String>,
}

impl ScopeIndex<'_> {
    /// Longest registered full slug prefixing the id body, and the remainder.
    fn split<'id>(&self, id: &'id str) -> Option<(&str, &'id str)> {
        let body = id.strip_prefix(self.namespace)?.strip_prefix('-')?;
        self.systems
            .iter()
            .filter_map(|slug| {
                if body == slug {
                    Some((slug.as_str(), ""))
                } else {
                    body.strip_prefix(slug.as_str())
                        .and_then(|rest| rest.strip_prefix('-'))
                        .map(|rest| (slug.as_str(), rest))
                }
            })
            .max_by_key(|(slug, _)| slug.len())
    }

    pub fn scope_of(&self, id: &str) -> Scope {
        match self.split(id) {
            Some((slug, _)) => Scope::System(slug.to_string()),
            None => Scope::External,
        }
    }

    /// Longest known kind that the post-slug remainder starts with, else its
    /// first segment.
    pub fn derive_kind(&self, id: &str) -> Option<String> {
        let (_, rest) = self.split(id)?;
        if rest.is_empty() {
            return None;
        }
        let lowered = rest.to_ascii_lowercase();
        let known = self
            .identifier_kinds
            .iter()
            .filter(|kind| {
                lowered
                    .strip_prefix(kind.as_str())
                    .is_some_and(|after| after.starts_with('-'))
            })
            .max_by_key(|kind| kind.len());
        match known {
            Some(kind) => Some(kind.clone()),
            None => lowered.split('-').next().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    pub definitions: BTreeMap<String, Vec<Definition>>,
    pub references: BTreeMap<String, Vec<Reference>>,
    pub scopes: BTreeMap<String, Scope>,
    /// Kind derived from the identifier text, for in-scope ids.
    pub derived_kinds: BTreeMap<String, String>,
}

impl Graph {
    pub fn build(scans: &[FileScan], index: &ScopeIndex<'_>) -> Self {
        let mut graph = Graph::default();
        for scan in scans {
            for definition in &scan.definitions {
                graph
                    .definitions
                    .entry(definition.id.clone())
                    .or_default()
                    .push(definition.clone());
            }
            for reference in &scan.references {
                graph
                    .references
                    .entry(reference.id.clone())
                    .or_default()
                    .push(reference.clone());
            }
        }
        for list in graph.definitions.values_mut() {
            list.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        }
        for list in graph.references.values_mut() {
            list.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        }
        let ids: BTreeSet<String> = graph
            .definitions
            .keys()
            .chain(graph.references.keys())
            .cloned()
            .collect();
        for id in ids {
            if let Some(kind) = index.derive_kind(&id) {
                graph.derived_kinds.insert(id.clone(), kind);
            }
            graph.scopes.insert(id.clone(), index.scope_of(&id));
        }
        tracing::debug!(
            ids = graph.scopes.len(),
            definitions = graph.definitions.values().map(Vec::len).sum::<usize>(),
            references = graph.references.values().map(Vec::len).sum::<usize>(),
            "built cross-reference graph"
        );
        graph
    }

    pub fn scope(&self, id: &str) -> Scope {
        self.scopes.get(id).cloned().unwrap_or(Scope::External)
    }

    /// Kind of one definition: its marker kind, else the derived kind.
    pub fn definition_kind(&self, definition: &Definition) -> Option<String> {
        definition
            .explicit_kind
            .clone()
            .or_else(|| self.derived_kinds.get(&definition.id).cloned())
    }

    /// Kind of an identifier: the first definition's kind, else derived.
    pub fn id_kind(&self, id: &str) -> Option<String> {
        self.definitions
            .get(id)
            .and_then(|defs| defs.first())
            .and_then(|def| def.explicit_kind.clone())
            .or_else(|| self.derived_kinds.get(id).cloned())
    }

    pub fn definitions_of(&self, id: &str) -> &[Definition] {
        self.definitions.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn references_to(&self, id: &str) -> &[Reference] {
        self.references.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}
