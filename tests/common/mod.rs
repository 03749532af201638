//! Shared test infrastructure for integration tests.
//!
//! A [`Project`] is a temp directory laid out like a real adapter: the
//! registry lives at `.cypilot/artifacts.json` and the `sdlc` kit under
//! `.cypilot/kits/sdlc` with PRD and DESIGN templates.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Captured result of one `cypilot` invocation.
#[derive(Debug)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[allow(dead_code)]
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("parse stdout as JSON: {err}\n{}", self.stdout))
    }
}

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let project = Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        };
        project.write(".cypilot/kits/sdlc/artifacts/PRD/template.md", "# PRD\n");
        project.write(".cypilot/kits/sdlc/artifacts/DESIGN/template.md", "# Design\n");
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents.as_bytes()).expect("write file");
        self
    }

    /// Write the registry with the given `systems` JSON and optional extra
    /// top-level fields (e.g. `"namespace": "fdd",`).
    pub fn registry(&self, extra: &str, systems: &str) -> &Self {
        self.write(
            ".cypilot/artifacts.json",
            &format!(
                r#"{{"version": "1.0", {extra} "kits": {{"sdlc": {{"format": "Cypilot", "path": "kits/sdlc"}}}}, "systems": {systems}}}"#
            ),
        )
    }

    #[allow(dead_code)]
    pub fn constraints(&self, json: &str) -> &Self {
        self.write(".cypilot/kits/sdlc/constraints.json", json)
    }

    /// Run the binary from the project root with a clean log environment.
    pub fn run(&self, args: &[&str]) -> RunOutput {
        run_in(self.root(), args)
    }
}

pub fn run_in(dir: &Path, args: &[&str]) -> RunOutput {
    let output = Command::new(env!("CARGO_BIN_EXE_cypilot"))
        .args(args)
        .current_dir(dir)
        .env_remove("CYPILOT_LOG")
        .output()
        .expect("run cypilot");
    RunOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
