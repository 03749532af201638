//! Autodetect: pattern-based discovery of artifacts and codebase entries.
//!
//! Rule lists are flattened once, top-down, while the system tree is built
//! ([`inherit_rules`]). Resolution then expands each effective rule into
//! concrete globs ([`expand`]), matches them through a [`FileLister`], and
//! merges the synthetic entries with explicit ones ([`resolve`]).
mod expand;
mod lister;
#[cfg(test)]
mod memory;
mod resolve;

pub use lister::{FileLister, FsLister};
#[cfg(test)]
pub use memory::MemoryLister;
pub use resolve::{resolve, Resolution};

use crate::registry::AutodetectRule;
use crate::report::{codes, Issue};
use expand::ExpansionScope;

/// Nesting depth beyond which a rule earns a soft warning.
pub const MAX_RULE_DEPTH: usize = 3;

/// One rule as it applies to a particular system node.
#[derive(Debug, Clone)]
pub struct EffectiveRule {
    pub rule: AutodetectRule,
    /// Full slug of the node that authored the rule.
    pub declared_in: String,
    /// Value bound to `{parent_root}` when expanding for this node.
    pub parent_root: Option<String>,
    /// 0 for top-level rules, +1 per `children` level.
    pub depth: usize,
}

/// Effective rules for a node: inherited ++ parent rule children ++ own.
///
/// `parent_rules` are the parent's already-resolved effective rules and
/// `parent_slug` its slug; both are empty/`None` for top-level systems.
pub fn inherit_rules(
    parent_rules: &[EffectiveRule],
    parent_slug: Option<&str>,
    own: &[AutodetectRule],
    full_slug: &str,
) -> (Vec<EffectiveRule>, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut inherited = Vec::new();
    let mut from_children = Vec::new();
    let mut first_parent_root = None;

    if let Some(parent_slug) = parent_slug {
        for parent_rule in parent_rules {
            let scope = ExpansionScope {
                system: parent_slug.to_string(),
                parent_root: parent_rule.parent_root.clone(),
                artifacts_dir: None,
            };
            // A rule that fails to expand is reported when the parent
            // resolves it; descendants just lose the binding.
            let Ok(parent_root) = expand::expand_system_root(&parent_rule.rule, &scope) else {
                continue;
            };
            first_parent_root.get_or_insert_with(|| parent_root.clone());
            if expand::is_inheritable(&parent_rule.rule) {
                inherited.push(EffectiveRule {
                    parent_root: Some(parent_root.clone()),
                    ..parent_rule.clone()
                });
            }
            for child in &parent_rule.rule.children {
                let depth = parent_rule.depth + 1;
                if depth > MAX_RULE_DEPTH {
                    issues.push(
                        Issue::warning(
                            codes::DEEP_AUTODETECT,
                            format!(
                                "autodetect rule from {} is nested {depth} levels deep",
                                parent_rule.declared_in
                            ),
                        )
                        .in_system(full_slug),
                    );
                }
                from_children.push(EffectiveRule {
                    rule: child.clone(),
                    declared_in: parent_rule.declared_in.clone(),
                    parent_root: Some(parent_root.clone()),
                    depth,
                });
            }
        }
    }

    let own = own.iter().map(|rule| EffectiveRule {
        rule: rule.clone(),
        declared_in: full_slug.to_string(),
        parent_root: first_parent_root.clone(),
        depth: 0,
    });
    let rules = inherited.into_iter().chain(from_children).chain(own).collect();
    (rules, issues)
}
