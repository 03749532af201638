mod common;

use common::Project;

fn traced_project() -> Project {
    let project = Project::new();
    project
        .registry(
            "",
            r#"[{"name": "Application", "slug": "app", "kit": "sdlc",
                 "artifacts": [{"path": "PRD.md", "kind": "PRD", "traceability": "FULL"},
                               {"path": "DESIGN.md", "kind": "DESIGN"}],
                 "codebase": [{"path": "src", "extensions": ["rs"]}],
                 "children": [{"slug": "auth"}]}]"#,
        )
        .constraints(r#"{"PRD": {"identifiers": {"fr": {}, "nfr": {"required": false}}}}"#)
        .write(
            "PRD.md",
            "# PRD\n\
             ## Functional Requirements\n\
             **ID**: `cpt-app-fr-login`\n\
             **ID**: `cpt-app-auth-fr-token`\n",
        )
        .write("DESIGN.md", "# Design\nImplements `cpt-app-fr-login:p2`.\n")
        .write(
            "src/login.rs",
            "// [@]cpt-begin cpt-app-fr-login:p1:inst-check\ncheck();\n// [@]cpt-end cpt-app-fr-login:p1:inst-check\n",
        );
    project
}

#[test]
fn where_defined_reports_location_and_heading_path() {
    let project = traced_project();
    let out = project.run(&["where-defined", "--id", "cpt-app-fr-login"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert_eq!(out.stdout, "PRD.md:3 (PRD > Functional Requirements)\n");

    let missing = project.run(&["where-defined", "--id", "cpt-app-fr-nope"]);
    assert_eq!(missing.code, 1);
    assert_eq!(missing.stdout, "cpt-app-fr-nope: not defined\n");
}

#[test]
fn where_defined_json_carries_scope() {
    let project = traced_project();
    let out = project.run(&["--json", "where-defined", "--id", "cpt-app-auth-fr-token"]);
    assert_eq!(out.code, 0, "{out:?}");
    let found = out.json();
    assert_eq!(found["system"], "app-auth");
    assert_eq!(found["kind"], "fr");
    assert_eq!(found["definitions"][0]["line"], 4);
}

#[test]
fn where_used_lists_document_and_code_references() {
    let project = traced_project();
    let out = project.run(&["where-used", "--id", "cpt-app-fr-login"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert_eq!(
        out.stdout,
        "DESIGN.md:2 [DESIGN] p2\nsrc/login.rs:1 [CODE] p1 inst-check\n"
    );

    let unused = project.run(&["where-used", "--id", "cpt-app-auth-fr-token"]);
    assert_eq!(unused.code, 1);
}

#[test]
fn list_ids_filters_by_kind_and_artifact() {
    let project = traced_project();
    let out = project.run(&["list-ids"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert_eq!(
        out.stdout,
        "cpt-app-auth-fr-token fr PRD.md:4\ncpt-app-fr-login fr PRD.md:3\n"
    );

    let none = project.run(&["list-ids", "--kind", "NFR"]);
    assert_eq!(none.code, 0);
    assert!(none.stdout.is_empty());

    let json = project.run(&["--json", "list-ids", "--artifact", "DESIGN.md"]);
    assert_eq!(json.json()["ids"].as_array().map(Vec::len), Some(0));
}

#[test]
fn adapter_info_describes_the_registry() {
    let project = traced_project();
    let out = project.run(&["adapter-info"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert!(out.stdout.contains("registry: .cypilot/artifacts.json"));
    assert!(out.stdout.contains("namespace: cpt"));
    assert!(out.stdout.contains("- sdlc format=Cypilot path=.cypilot/kits/sdlc kinds=DESIGN,PRD"));
    assert!(out.stdout.contains("- app (Application) kit=sdlc artifacts=2 codebase=1"));
    assert!(out.stdout.contains("  - app-auth"));

    let json = project.run(&["--json", "adapter-info", "--root", "src"]);
    assert_eq!(json.code, 0);
    assert_eq!(json.json()["systems"][0]["children"][0]["full_slug"], "app-auth");
}

#[test]
fn adapter_info_without_registry_is_not_found() {
    let empty = tempfile::tempdir().expect("create temp dir");
    let out = common::run_in(empty.path(), &["--json", "adapter-info"]);
    assert_eq!(out.code, 1);
    assert_eq!(out.json()["found"], false);
}

#[test]
fn validate_kits_reports_instead_of_stopping() {
    let project = Project::new();
    project
        .registry("", r#"[{"slug": "x", "kit": "sdlc"}]"#)
        .write(
            ".cypilot/kits/sdlc/artifacts/PRD/template.md",
            "# PRD\n<!-- cpt:id:fr task=\"required\" -->\n",
        )
        .constraints(
            r#"{"PRD": {"identifiers": {"fr": {"task": "prohibited"}}},
                "ADR": {"identifiers": {"decision": {}}}}"#,
        );
    let out = project.run(&["validate-kits"]);
    assert_eq!(out.code, 1, "{out:?}");
    assert!(out
        .stdout
        .contains("ERROR .cypilot/kits/sdlc/artifacts/PRD/template.md:2 [constraints-invalid]"));
    assert!(out.stdout.contains("[template-missing] kit sdlc: constraints declare ADR"));

    let clean = Project::new();
    clean
        .registry("", r#"[{"slug": "x", "kit": "sdlc"}]"#)
        .constraints(r#"{"PRD": {"identifiers": {"fr": {}}}}"#)
        .write(
            ".cypilot/kits/sdlc/artifacts/PRD/template.md",
            "# PRD\n<!-- cpt:id:fr -->\n",
        );
    let out = clean.run(&["validate-kits"]);
    assert_eq!(out.code, 0, "{out:?}");
    assert!(out.stdout.starts_with("PASS"));
}

#[test]
fn validate_kits_keeps_kit_load_problems_only() {
    let project = Project::new();
    project
        .registry("", r#"[{"slug": "Bad_Slug", "kit": "sdlc"}]"#)
        .constraints("{ not json");
    let out = project.run(&["validate-kits"]);
    assert_eq!(out.code, 1, "{out:?}");
    assert!(out
        .stdout
        .contains("ERROR .cypilot/kits/sdlc/constraints.json [constraints-invalid] kit sdlc:"));
    assert!(!out.stdout.contains("invalid-slug"), "{}", out.stdout);
    assert!(out.stdout.contains("2 artifact(s), 0 code file(s) scanned"));
}
