//! Template marker parsing and the load-time contradiction check.
//!
//! Templates declare identifier kinds with HTML comments such as
//! `<!-- cpt:id:fr required="true" task="required" headings="Functional Requirements" -->`.
//! `constraints.json` is authoritative, but an explicit attribute that disagrees
//! with an explicit constraint value is an authoring error.
use super::constraints::{IdentifierRule, Presence};
use crate::util::heading_key;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMarker {
    pub kind: String,
    pub line: usize,
    pub attrs: BTreeMap<String, String>,
}

pub struct MarkerParser {
    marker: Regex,
    attr: Regex,
}

impl MarkerParser {
    pub fn new(namespace: &str) -> Self {
        let ns = regex::escape(namespace);
        Self {
            marker: Regex::new(&format!(
                r"<!--\s*{ns}:id:([A-Za-z0-9_-]+)((?:\s+[A-Za-z_]+\s*=\s*\x22[^\x22]*\x22)*)\s*-->"
            ))
            .expect("template marker regex"),
            attr: Regex::new(r#"([A-Za-z_]+)\s*=\s*"([^"]*)""#).expect("attr regex"),
        }
    }

    pub fn parse(&self, text: &str) -> Vec<TemplateMarker> {
        let mut markers = Vec::new();
        for (index, line) in text.lines().enumerate() {
            for caps in self.marker.captures_iter(line) {
                let attrs = caps
                    .get(2)
                    .map(|raw| {
                        self.attr
                            .captures_iter(raw.as_str())
                            .map(|attr| (attr[1].to_ascii_lowercase(), attr[2].to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                markers.push(TemplateMarker {
                    kind: caps[1].to_ascii_lowercase(),
                    line: index + 1,
                    attrs,
                });
            }
        }
        markers
    }
}

/// Describe every explicit disagreement between a marker and its rule.
pub fn contradictions(marker: &TemplateMarker, rule: &IdentifierRule) -> Vec<String> {
    let mut found = Vec::new();
    for (name, raw) in &marker.attrs {
        let clash = match name.as_str() {
            "required" => match (rule.required, parse_bool(raw)) {
                (Some(set), Some(attr)) if set != attr => {
                    Some(format!("required={attr} but constraints say {set}"))
                }
                _ => None,
            },
            "to_code" => match (rule.to_code, parse_bool(raw)) {
                (Some(set), Some(attr)) if set != attr => {
                    Some(format!("to_code={attr} but constraints say {set}"))
                }
                _ => None,
            },
            "task" => presence_clash("task", rule.task, raw),
            "priority" => presence_clash("priority", rule.priority, raw),
            "headings" => match &rule.headings {
                Some(set) if heading_set(set.iter().map(String::as_str)) != heading_set(raw.split('|')) => {
                    Some(format!(
                        "headings=\"{raw}\" but constraints say {:?}",
                        set
                    ))
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(clash) = clash {
            found.push(clash);
        }
    }
    found
}

fn presence_clash(label: &str, declared: Option<Presence>, raw: &str) -> Option<String> {
    let declared = declared?;
    let attr = Presence::parse(raw)?;
    (declared != attr).then(|| format!("{label}={attr} but constraints say {declared}"))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn heading_set<'a>(titles: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    titles
        .map(heading_key)
        .filter(|key| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_and_attributes() {
        let parser = MarkerParser::new("cpt");
        let markers = parser.parse(
            "# PRD\n\n<!-- cpt:id:FR task=\"required\" headings=\"Functional Requirements|Scope\" -->\n",
        );
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].kind, "fr");
        assert_eq!(markers[0].line, 3);
        assert_eq!(markers[0].attrs["task"], "required");
    }

    #[test]
    fn flags_explicit_disagreement_only() {
        let parser = MarkerParser::new("cpt");
        let marker = parser
            .parse("<!-- cpt:id:fr task=\"prohibited\" priority=\"required\" headings=\"scope|functional  requirements\" -->")
            .remove(0);
        let rule = IdentifierRule {
            task: Some(Presence::Required),
            headings: Some(vec!["Functional Requirements".into(), "Scope".into()]),
            ..IdentifierRule::default()
        };
        let clashes = contradictions(&marker, &rule);
        assert_eq!(clashes.len(), 1, "{clashes:?}");
        assert!(clashes[0].starts_with("task=prohibited"));
    }
}
