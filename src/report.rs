//! Structured validation issues and deterministic report rendering.
//!
//! Every non-fatal problem the engine finds is recorded as an [`Issue`] rather
//! than returned as an error, so a single run reports everything it can. The
//! rendered report never carries timestamps: validating an unchanged tree twice
//! yields byte-identical output.
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Exit code for a clean run (or a query that found results).
pub const EXIT_PASS: i32 = 0;
/// Exit code when validation issues of error severity were found.
pub const EXIT_FAIL: i32 = 1;
/// Exit code when validation could not even be attempted.
pub const EXIT_USAGE: i32 = 2;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable issue codes. Kept as `&'static str` so callers can match on them.
pub mod codes {
    pub const INVALID_SLUG: &str = "invalid-slug";
    pub const DUPLICATE_SLUG: &str = "duplicate-slug";
    pub const UNKNOWN_KIT: &str = "unknown-kit";
    pub const INVALID_PATH: &str = "invalid-path";
    pub const ARTIFACT_MISSING: &str = "artifact-missing";
    pub const UNKNOWN_KIND: &str = "unknown-kind";
    pub const TEMPLATE_MISSING: &str = "template-missing";
    pub const CONSTRAINTS_INVALID: &str = "constraints-invalid";
    pub const TEMPLATE_MARKER_MISSING: &str = "template-marker-missing";
    pub const AUTODETECT_INVALID: &str = "autodetect-invalid";
    pub const REQUIRED_PATTERN_UNMATCHED: &str = "required-pattern-unmatched";
    pub const KIND_NOT_REGISTERED: &str = "kind-not-registered";
    pub const NOT_MARKDOWN: &str = "not-markdown";
    pub const UNMATCHED_MARKDOWN: &str = "unmatched-markdown";
    pub const KIND_CONFLICT: &str = "kind-conflict";
    pub const DEEP_AUTODETECT: &str = "deep-autodetect-nesting";
    pub const READ_FAILED: &str = "read-failed";
    pub const MARKER_UNBALANCED: &str = "marker-unbalanced";
    pub const MARKER_EMPTY_BLOCK: &str = "marker-empty-block";
    pub const MARKER_DUPLICATE: &str = "marker-duplicate";
    pub const MARKER_SINGLE_LINE: &str = "marker-single-line";
    pub const KIND_NOT_ALLOWED: &str = "kind-not-allowed";
    pub const REQUIRED_MISSING: &str = "required-missing";
    pub const HEADING_SCOPE: &str = "heading-scope";
    pub const COVERAGE_MISSING: &str = "coverage-missing";
    pub const COVERAGE_PROHIBITED: &str = "coverage-prohibited";
    pub const TARGET_NOT_IN_SCOPE: &str = "target-not-in-scope";
    pub const TASK_FLAG: &str = "task-flag";
    pub const PRIORITY_FLAG: &str = "priority-flag";
    pub const CHECKBOX_SYNC: &str = "checkbox-sync";
    pub const DUPLICATE_DEFINITION: &str = "duplicate-definition";
    pub const UNDEFINED_REFERENCE: &str = "undefined-reference";
    pub const NOT_IN_CODE: &str = "not-in-code";
    pub const DOCS_ONLY_IN_CODE: &str = "docs-only-in-code";
    pub const INCOMPLETE: &str = "incomplete";
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Issue {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            path: None,
            line: None,
            system: None,
            id: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>, line: Option<usize>) -> Self {
        self.path = Some(path.into());
        self.line = line;
        self
    }

    pub fn in_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn for_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// `path:line`, `path`, `system:<slug>`, or `registry`.
    pub fn location(&self) -> String {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => format!("{path}:{line}"),
            (Some(path), None) => path.clone(),
            (None, _) => match &self.system {
                Some(system) => format!("system:{system}"),
                None => "registry".to_string(),
            },
        }
    }
}

impl Ord for Issue {
    fn cmp(&self, other: &Self) -> Ordering {
        // Issues without a path (registry-level) sort first.
        self.path
            .cmp(&other.path)
            .then(self.line.cmp(&other.line))
            .then(self.code.cmp(other.code))
            .then(self.message.cmp(&other.message))
            .then(self.severity.cmp(&other.severity))
            .then(self.system.cmp(&other.system))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for Issue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pass,
    Fail,
    Incomplete,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Pass => EXIT_PASS,
            RunStatus::Fail => EXIT_FAIL,
            RunStatus::Incomplete => EXIT_USAGE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
            RunStatus::Incomplete => "INCOMPLETE",
        }
    }
}

/// Final report for `validate` and `validate-kits`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Report {
    pub status: RunStatus,
    pub error_count: usize,
    pub warning_count: usize,
    pub artifacts_scanned: usize,
    pub code_files_scanned: usize,
    pub issues: Vec<Issue>,
}

impl Report {
    /// Sort, dedupe, and classify issues into a final verdict.
    pub fn from_issues(
        mut issues: Vec<Issue>,
        artifacts_scanned: usize,
        code_files_scanned: usize,
    ) -> Self {
        issues.sort();
        issues.dedup();
        let error_count = issues.iter().filter(|issue| issue.is_error()).count();
        let warning_count = issues.len() - error_count;
        let status = if error_count == 0 {
            RunStatus::Pass
        } else {
            RunStatus::Fail
        };
        Self {
            status,
            error_count,
            warning_count,
            artifacts_scanned,
            code_files_scanned,
            issues,
        }
    }

    /// A cancelled run: partial results are discarded, never a verdict.
    pub fn incomplete(reason: &str) -> Self {
        Self {
            status: RunStatus::Incomplete,
            error_count: 0,
            warning_count: 1,
            artifacts_scanned: 0,
            code_files_scanned: 0,
            issues: vec![Issue::warning(codes::INCOMPLETE, reason.to_string())],
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for issue in &self.issues {
            out.push_str(&format!(
                "{} {} [{}] {}\n",
                issue.severity,
                issue.location(),
                issue.code,
                issue.message
            ));
        }
        out.push_str(&format!(
            "{}: {} error(s), {} warning(s); {} artifact(s), {} code file(s) scanned\n",
            self.status.as_str(),
            self.error_count,
            self.warning_count,
            self.artifacts_scanned,
            self.code_files_scanned
        ));
        out
    }

    pub fn render_json(&self) -> anyhow::Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}
