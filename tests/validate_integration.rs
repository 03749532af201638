mod common;

use common::Project;

const FR_HEADINGS: &str =
    r#"{"PRD": {"identifiers": {"req": {"headings": ["Functional Requirements"]}}}}"#;

fn heading_project() -> Project {
    let project = Project::new();
    project
        .registry(
            "",
            r#"[{"slug": "x", "kit": "sdlc", "artifacts": [{"path": "docs/PRD.md", "kind": "PRD"}]}]"#,
        )
        .constraints(FR_HEADINGS)
        .write(
            "docs/PRD.md",
            "# PRD\n\
             ## Functional Requirements\n\
             **ID**: `cpt-x-req-y`\n\
             ## Notes\n\
             **ID**: `cpt-x-req-z`\n",
        );
    project
}

#[test]
fn required_autodetect_pattern_without_match_fails() {
    let project = Project::new();
    project.registry(
        "",
        r#"[{"slug": "core", "kit": "sdlc",
             "autodetect": [{"artifacts": {"PRD": {"pattern": "PRD.md", "required": true}}}]}]"#,
    );
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 1, "{out:?}");
    assert!(out.stdout.contains(
        "ERROR system:core [required-pattern-unmatched] PRD: required pattern \"PRD.md\" matched zero files"
    ));
    assert!(out.stdout.starts_with("ERROR"));
    assert!(out.stdout.contains("FAIL: 1 error(s), 0 warning(s)"));
}

#[test]
fn definition_outside_listed_heading_fails() {
    let project = heading_project();
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 1, "{out:?}");
    let errors: Vec<&str> = out
        .stdout
        .lines()
        .filter(|line| line.starts_with("ERROR"))
        .collect();
    assert_eq!(errors.len(), 1, "{}", out.stdout);
    assert!(errors[0].starts_with("ERROR docs/PRD.md:5 [heading-scope]"));
}

#[test]
fn coverage_target_outside_scope_only_warns() {
    let project = Project::new();
    project
        .registry(
            "",
            r#"[{"slug": "x", "kit": "sdlc", "artifacts": [{"path": "PRD.md", "kind": "PRD"}]}]"#,
        )
        .constraints(
            r#"{"PRD": {"identifiers": {"fr": {"references": {"DESIGN": {"coverage": "required"}}}}}}"#,
        )
        .write("PRD.md", "**ID**: `cpt-x-fr-login`\n");
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert!(out.stdout.contains("WARN PRD.md:1 [target-not-in-scope]"));
    assert!(out
        .stdout
        .contains("PASS: 0 error(s), 1 warning(s); 1 artifact(s), 0 code file(s) scanned"));
}

#[test]
fn unbalanced_code_marker_fails() {
    let project = Project::new();
    project
        .registry(
            r#""namespace": "fdd","#,
            r#"[{"slug": "x", "kit": "sdlc", "codebase": [{"path": "src", "extensions": [".py"]}]}]"#,
        )
        .write("src/app.py", "# fdd-begin fdd-x:p1:inst-a\nrun()\n");
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 1, "{out:?}");
    assert!(out.stdout.contains("ERROR src/app.py:1 [marker-unbalanced]"));
    assert!(out.stdout.contains("0 artifact(s), 1 code file(s) scanned"));
}

#[test]
fn output_is_identical_across_runs_and_pool_sizes() {
    let project = heading_project();
    project
        .write("docs/extra.md", "Refers to `cpt-x-req-missing`.\n")
        .registry(
            "",
            r#"[{"slug": "x", "kit": "sdlc",
                 "artifacts": [{"path": "docs/PRD.md", "kind": "PRD"}],
                 "autodetect": [{"artifacts_root": "docs",
                                 "artifacts": {"DESIGN": {"pattern": "extra.md", "required": false}}}],
                 "codebase": [{"path": "src", "extensions": ["rs"]}]}]"#,
        )
        .write(
            "src/lib.rs",
            "// [@]cpt-begin cpt-x-req-y:p1:inst-a\nfn a() {}\n// [@]cpt-end cpt-x-req-y:p1:inst-a\n",
        );
    let first = project.run(&["validate"]);
    let second = project.run(&["validate"]);
    let serial = project.run(&["--jobs", "1", "validate"]);
    let wide = project.run(&["validate", "--jobs", "8"]);
    assert_eq!(first.code, 1, "{first:?}");
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(first.stdout, serial.stdout);
    assert_eq!(first.stdout, wide.stdout);
    assert!(first.stdout.contains("docs/extra.md:1 [undefined-reference]"));
}

#[test]
fn json_report_has_summary_fields() {
    let project = heading_project();
    let out = project.run(&["--json", "validate"]);
    assert_eq!(out.code, 1);
    let report = out.json();
    assert_eq!(report["status"], "FAIL");
    assert_eq!(report["error_count"], 1);
    assert_eq!(report["warning_count"], 0);
    assert_eq!(report["artifacts_scanned"], 1);
    assert_eq!(report["code_files_scanned"], 0);
    let issue = &report["issues"][0];
    assert_eq!(issue["code"], "heading-scope");
    assert_eq!(issue["path"], "docs/PRD.md");
    assert_eq!(issue["line"], 5);
    assert_eq!(issue["id"], "cpt-x-req-z");
}

#[test]
fn artifact_filter_limits_reported_issues() {
    let project = heading_project();
    project
        .registry(
            "",
            r#"[{"slug": "x", "kit": "sdlc", "artifacts": [
                {"path": "docs/PRD.md", "kind": "PRD"},
                {"path": "docs/other/PRD.md", "kind": "PRD"}]}]"#,
        )
        .write("docs/other/PRD.md", "# Other\n");

    let all = project.run(&["validate"]);
    assert!(all.stdout.contains("docs/other/PRD.md [required-missing]"));

    let only = project.run(&["validate", "--artifact", "./docs/PRD.md"]);
    assert_eq!(only.code, 1);
    assert!(!only.stdout.contains("docs/other/PRD.md"));
    assert!(only.stdout.contains("docs/PRD.md:5 [heading-scope]"));

    let unknown = project.run(&["validate", "--artifact", "docs/nope.md"]);
    assert_eq!(unknown.code, 2);
    assert!(unknown.stderr.contains("docs/nope.md is not a registered artifact"));
}

#[test]
fn registry_problems_stop_with_exit_two() {
    let project = Project::new();
    project.write(".cypilot/artifacts.json", "{ \"version\": ");
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 2);
    assert!(out.stderr.starts_with("error: parse registry JSON"), "{}", out.stderr);
    assert!(out.stdout.is_empty());

    let empty = tempfile::tempdir().expect("create temp dir");
    let out = common::run_in(empty.path(), &["validate"]);
    assert_eq!(out.code, 2);
    assert!(out.stderr.contains("no .cypilot/artifacts.json found"));
}

#[test]
fn kit_contradiction_stops_validation() {
    let project = Project::new();
    project
        .registry("", r#"[{"slug": "x", "kit": "sdlc"}]"#)
        .write(
            ".cypilot/kits/sdlc/artifacts/PRD/template.md",
            "# PRD\n<!-- cpt:id:fr task=\"required\" -->\n",
        )
        .constraints(r#"{"PRD": {"identifiers": {"fr": {"task": "prohibited"}}}}"#);
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 2, "{out:?}");
    assert!(out.stderr.contains("kit constraints contradict their templates"));
    assert!(out.stderr.contains("PRD.fr contradicts template marker"));
}

#[test]
fn expired_deadline_reports_incomplete_run() {
    let project = heading_project();
    let out = project.run(&["--timeout-ms", "0", "validate"]);
    assert_eq!(out.code, 2, "{out:?}");
    assert!(out.stdout.contains("[incomplete]"));
    assert!(out.stdout.contains("INCOMPLETE"));
    assert!(!out.stdout.contains("heading-scope"));

    let json = project.run(&["--json", "--timeout-ms", "0", "validate"]);
    assert_eq!(json.code, 2);
    let report = json.json();
    assert_eq!(report["status"], "INCOMPLETE");
    assert_eq!(report["warning_count"], 1);
    assert_eq!(report["issues"].as_array().map(Vec::len), Some(1));
}

#[test]
fn ignored_and_excluded_content_is_skipped() {
    let project = Project::new();
    project
        .write(
            ".cypilot/artifacts.json",
            r#"{"version": "1.0",
                "kits": {"sdlc": {"format": "Cypilot", "path": "kits/sdlc"}},
                "ignore": [{"reason": "vendored docs", "patterns": ["vendor"]}],
                "systems": [{"slug": "x", "kit": "sdlc",
                             "autodetect": [{"artifacts": {"PRD": {"pattern": "**/PRD.md", "required": true}}}]}]}"#,
        )
        .write("vendor/PRD.md", "See `cpt-x-fr-ghost`.\n")
        .write(
            "PRD.md",
            "**ID**: `cpt-x-fr-a`\n<!-- !no-cpt-begin -->\nSee `cpt-x-fr-ghost`.\n<!-- !no-cpt-end -->\n",
        );
    let out = project.run(&["validate"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert!(out.stdout.contains("1 artifact(s)"));
}

#[test]
fn log_level_flag_does_not_touch_stdout() {
    let project = heading_project();
    let quiet = project.run(&["validate"]);
    let chatty = project.run(&["--log-level", "debug", "validate"]);
    assert_eq!(quiet.stdout, chatty.stdout);
    assert!(chatty.stderr.contains("loaded registry"));

    let bad = project.run(&["--jobs", "0", "validate"]);
    assert_eq!(bad.code, 2);
    assert!(bad.stderr.contains("--jobs must be at least 1"));
}
