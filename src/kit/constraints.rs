//! Kit `constraints.json` model.
//!
//! Fields are kept as `Option` so the loader can tell an explicit value apart
//! from a default; the template contradiction check depends on that.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Tri-state flag for task checkboxes and priority tokens.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    #[default]
    Allowed,
    Prohibited,
}

impl Presence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "required" | "true" => Some(Presence::Required),
            "allowed" | "optional" => Some(Presence::Allowed),
            "prohibited" | "false" => Some(Presence::Prohibited),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Required => "required",
            Presence::Allowed => "allowed",
            Presence::Prohibited => "prohibited",
        }
    }

    /// Problem description if `present` violates this flag.
    pub fn violation(&self, present: bool) -> Option<&'static str> {
        match (self, present) {
            (Presence::Required, false) => Some("is required but missing"),
            (Presence::Prohibited, true) => Some("is prohibited but present"),
            _ => None,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Legacy booleans: true -> required, false -> prohibited.
impl<'de> Deserialize<'de> for Presence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(true) => Ok(Presence::Required),
            Value::Bool(false) => Ok(Presence::Prohibited),
            Value::String(text) => Presence::parse(&text).ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "expected required|allowed|prohibited, got {text:?}"
                ))
            }),
            other => Err(serde::de::Error::custom(format!(
                "expected boolean or string flag, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Required,
    #[default]
    Optional,
    Prohibited,
}

impl<'de> Deserialize<'de> for Coverage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(true) => Ok(Coverage::Required),
            Value::Bool(false) => Ok(Coverage::Optional),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "required" => Ok(Coverage::Required),
                "optional" | "allowed" => Ok(Coverage::Optional),
                "prohibited" => Ok(Coverage::Prohibited),
                _ => Err(serde::de::Error::custom(format!(
                    "expected required|optional|prohibited, got {text:?}"
                ))),
            },
            other => Err(serde::de::Error::custom(format!(
                "expected coverage string, got {other}"
            ))),
        }
    }
}

/// How identifiers of one kind may be referenced from another artifact kind.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ReferenceRule {
    #[serde(default)]
    pub coverage: Option<Coverage>,
    #[serde(default)]
    pub task: Option<Presence>,
    #[serde(default)]
    pub priority: Option<Presence>,
    #[serde(default)]
    pub headings: Option<Vec<String>>,
}

impl ReferenceRule {
    pub fn coverage(&self) -> Coverage {
        self.coverage.unwrap_or_default()
    }

    pub fn task(&self) -> Presence {
        self.task.unwrap_or_default()
    }

    pub fn priority(&self) -> Presence {
        self.priority.unwrap_or_default()
    }
}

/// Rule for one `(artifact kind, identifier kind)` pair.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct IdentifierRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub task: Option<Presence>,
    #[serde(default)]
    pub priority: Option<Presence>,
    #[serde(default)]
    pub headings: Option<Vec<String>>,
    #[serde(default, alias = "toCode")]
    pub to_code: Option<bool>,
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceRule>,
}

impl IdentifierRule {
    pub fn required(&self) -> bool {
        self.required.unwrap_or(true)
    }

    pub fn task(&self) -> Presence {
        self.task.unwrap_or_default()
    }

    pub fn priority(&self) -> Presence {
        self.priority.unwrap_or_default()
    }

    pub fn to_code(&self) -> bool {
        self.to_code.unwrap_or(false)
    }

    pub fn headings(&self) -> &[String] {
        self.headings.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ArtifactConstraints {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Keyed by lower-cased identifier kind.
    pub identifiers: BTreeMap<String, IdentifierRule>,
}

/// Parsed `constraints.json`, keyed by artifact kind.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct KitConstraints {
    pub artifacts: BTreeMap<String, ArtifactConstraints>,
}

impl KitConstraints {
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("parse constraints JSON")?;
        let Value::Object(entries) = root else {
            return Err(anyhow!("constraints document must be a JSON object"));
        };
        let mut artifacts = BTreeMap::new();
        for (artifact_kind, body) in entries {
            if artifact_kind.starts_with('$') {
                continue;
            }
            let parsed = parse_artifact_constraints(&artifact_kind, body)?;
            artifacts.insert(artifact_kind, parsed);
        }
        Ok(Self { artifacts })
    }

    pub fn rule(&self, artifact_kind: &str, identifier_kind: &str) -> Option<&IdentifierRule> {
        self.artifacts
            .get(artifact_kind)
            .and_then(|constraints| constraints.identifiers.get(identifier_kind))
    }

    /// All identifier kinds declared anywhere in this kit.
    pub fn identifier_kinds(&self) -> impl Iterator<Item = &str> {
        self.artifacts
            .values()
            .flat_map(|constraints| constraints.identifiers.keys())
            .map(String::as_str)
    }
}

fn parse_artifact_constraints(artifact_kind: &str, body: Value) -> Result<ArtifactConstraints> {
    let Value::Object(mut fields) = body else {
        return Err(anyhow!("constraints for {artifact_kind} must be an object"));
    };
    let name = fields
        .remove("name")
        .and_then(|value| value.as_str().map(str::to_string));
    let description = fields
        .remove("description")
        .and_then(|value| value.as_str().map(str::to_string));
    let mut identifiers = BTreeMap::new();
    match fields.remove("identifiers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(rules)) => {
            for (identifier_kind, rule) in rules {
                if identifier_kind.starts_with('$') {
                    continue;
                }
                let rule: IdentifierRule = serde_json::from_value(rule).with_context(|| {
                    format!("parse constraint {artifact_kind}.{identifier_kind}")
                })?;
                identifiers.insert(identifier_kind.to_ascii_lowercase(), rule);
            }
        }
        Some(_) => {
            return Err(anyhow!(
                "constraints for {artifact_kind}: identifiers must be an object"
            ))
        }
    }
    Ok(ArtifactConstraints {
        name,
        description,
        identifiers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_booleans_map_to_presence() {
        let constraints = KitConstraints::parse(
            r#"{
                "$schema": "ignored",
                "PRD": {
                    "identifiers": {
                        "FR": {"task": true, "priority": false},
                        "$comment": {"anything": 1}
                    }
                }
            }"#,
        )
        .unwrap();
        let rule = constraints.rule("PRD", "fr").expect("fr rule");
        assert_eq!(rule.task(), Presence::Required);
        assert_eq!(rule.priority(), Presence::Prohibited);
        assert!(rule.required());
        assert_eq!(constraints.artifacts.len(), 1);
    }

    #[test]
    fn reference_rules_default_to_optional() {
        let constraints = KitConstraints::parse(
            r#"{"PRD": {"identifiers": {"fr": {"references": {
                "DESIGN": {"coverage": "required", "task": "allowed"},
                "ADR": {}
            }}}}}"#,
        )
        .unwrap();
        let rule = constraints.rule("PRD", "fr").unwrap();
        assert_eq!(rule.references["DESIGN"].coverage(), Coverage::Required);
        assert_eq!(rule.references["ADR"].coverage(), Coverage::Optional);
        assert_eq!(rule.references["ADR"].priority(), Presence::Allowed);
    }

    #[test]
    fn rejects_unknown_flag_values() {
        let err = KitConstraints::parse(r#"{"PRD": {"identifiers": {"fr": {"task": "maybe"}}}}"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("PRD.fr"));
    }
}
