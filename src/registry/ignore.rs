//! Global visibility filter built from the registry's `ignore` rules.
//!
//! Every downstream path lookup consults this filter first; an ignored path is
//! treated exactly as if it did not exist.
use super::IgnoreRule;
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
    reasons: Vec<String>,
}

impl IgnoreFilter {
    pub fn new(rules: &[IgnoreRule]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut reasons = Vec::new();
        for rule in rules {
            for pattern in &rule.patterns {
                let pattern = pattern.trim().trim_start_matches("./").trim_end_matches('/');
                if pattern.is_empty() {
                    continue;
                }
                // A pattern naming a directory hides everything beneath it.
                for glob in [pattern.to_string(), format!("{pattern}/**")] {
                    builder.add(
                        GlobBuilder::new(&glob)
                            .literal_separator(true)
                            .build()
                            .with_context(|| format!("invalid ignore glob: {glob:?}"))?,
                    );
                    reasons.push(rule.reason.clone());
                }
            }
        }
        let set = builder.build().context("build ignore globset")?;
        Ok(Self { set, reasons })
    }

    /// True if the normalized relative path is hidden.
    pub fn is_ignored(&self, rel: &str) -> bool {
        !rel.is_empty() && self.set.is_match(rel)
    }

    /// Reason of the first rule hiding `rel`, for diagnostics.
    pub fn reason(&self, rel: &str) -> Option<&str> {
        self.set
            .matches(rel)
            .into_iter()
            .next()
            .and_then(|index| self.reasons.get(index))
            .map(String::as_str)
    }
}
