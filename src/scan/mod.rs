//! Per-file scanning on a worker pool.
//!
//! Each file is read and scanned independently into an immutable
//! [`FileScan`]; the collect at the end of [`run_scan`] is the barrier before
//! graph building. A [`CancelToken`] is checked before every file and a
//! cancelled run yields no results at all.
pub mod code;
pub mod document;
pub mod ids;

pub use code::CommentSyntax;
pub use ids::Patterns;

use crate::autodetect::FileLister;
use crate::registry::{ArtifactEntry, CodebaseEntry};
use crate::report::{codes, Issue};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// `from_kind` recorded for references found in source code.
pub const CODE_KIND: &str = "CODE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub id: String,
    /// Kind named by a structured marker; otherwise derived from the id later.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_kind: Option<String>,
    pub path: String,
    pub line: usize,
    pub heading_path: Vec<String>,
    pub has_task: bool,
    pub done: bool,
    pub has_priority: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub id: String,
    pub path: String,
    pub line: usize,
    /// Artifact kind of the referencing document, or `CODE`.
    pub from_kind: String,
    pub heading_path: Vec<String>,
    pub has_task: bool,
    pub has_priority: bool,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// Result of scanning one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileScan {
    pub path: String,
    pub definitions: Vec<Definition>,
    pub references: Vec<Reference>,
    pub issues: Vec<Issue>,
}

impl FileScan {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }
}

/// Cooperative cancellation: an explicit flag plus an optional deadline.
#[derive(Debug)]
pub struct CancelToken {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            deadline: timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.cancel();
            return true;
        }
        false
    }
}

/// One unit of scanning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanJob {
    Document { path: String, kind: String },
    Code { path: String, syntax: CommentSyntax },
}

impl ScanJob {
    pub fn path(&self) -> &str {
        match self {
            ScanJob::Document { path, .. } | ScanJob::Code { path, .. } => path,
        }
    }
}

/// Scan jobs for resolved artifacts followed by code files.
pub fn plan_jobs(
    artifacts: &[ArtifactEntry],
    codebase: &[CodebaseEntry],
    lister: &dyn FileLister,
) -> Result<Vec<ScanJob>> {
    let mut jobs: Vec<ScanJob> = artifacts
        .iter()
        .map(|artifact| ScanJob::Document {
            path: artifact.path.clone(),
            kind: artifact.kind.clone(),
        })
        .collect();
    let documents: BTreeSet<&str> = artifacts.iter().map(|artifact| artifact.path.as_str()).collect();
    let mut seen = BTreeSet::new();
    for entry in codebase {
        let files = lister
            .files_under(&entry.path)
            .with_context(|| format!("list codebase {}", entry.path))?;
        for file in files {
            let extension = Path::new(&file)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            let wanted = if entry.extensions.is_empty() {
                !extension.is_empty() && extension != "md"
            } else {
                entry.extensions.contains(&extension)
            };
            if !wanted || documents.contains(file.as_str()) || !seen.insert(file.clone()) {
                continue;
            }
            jobs.push(ScanJob::Code {
                syntax: CommentSyntax::for_file(&extension, Some(entry)),
                path: file,
            });
        }
    }
    Ok(jobs)
}

/// Run every job on a rayon pool of `workers` threads (rayon's default when
/// `None`). Returns `None` when the token fired before every file was done.
pub fn run_scan(
    root: &Path,
    jobs: &[ScanJob],
    patterns: &Patterns,
    workers: Option<usize>,
    cancel: &CancelToken,
) -> Result<Option<Vec<FileScan>>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(workers) = workers {
        builder = builder.num_threads(workers);
    }
    let pool = builder.build().context("build scan worker pool")?;
    let results: Option<Vec<FileScan>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(scan_job(root, job, patterns))
            })
            .collect()
    });
    match &results {
        Some(scans) => tracing::info!(files = scans.len(), "scan complete"),
        None => tracing::warn!("scan cancelled; discarding partial results"),
    }
    Ok(results)
}

/// Scan one job synchronously.
pub fn scan_job(root: &Path, job: &ScanJob, patterns: &Patterns) -> FileScan {
    let path = job.path();
    let abs = root.join(path);
    let text = match fs::read(&abs) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            let mut scan = FileScan::new(path);
            scan.issues.push(
                Issue::error(codes::READ_FAILED, format!("read {}: {err}", abs.display()))
                    .at(path, None),
            );
            return scan;
        }
    };
    tracing::debug!(path, "scanning");
    match job {
        ScanJob::Document { kind, .. } => document::scan_document(path, kind, &text, patterns),
        ScanJob::Code { syntax, .. } => code::scan_code(path, &text, syntax, patterns),
    }
}
