use super::*;

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, contents.as_bytes()).expect("write file");
}

fn adapter_project(registry: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_file(
        &dir.path().join(".cypilot/kits/sdlc/artifacts/PRD/template.md"),
        "# PRD\n",
    );
    write_file(&dir.path().join(".cypilot").join(REGISTRY_FILE), registry);
    dir
}

fn registry_json(systems: &str) -> String {
    format!(
        r#"{{"version": "1.0", "kits": {{"sdlc": {{"format": "Cypilot", "path": "kits/sdlc"}}}}, "systems": {systems}}}"#
    )
}

fn load(dir: &Path) -> (Registry, Vec<Issue>) {
    load_registry(&dir.join(".cypilot").join(REGISTRY_FILE)).expect("load registry")
}

#[test]
fn adapter_registry_defaults_project_root_to_parent() {
    let dir = adapter_project(&registry_json(
        r#"[{"slug": "core", "kit": "sdlc", "artifacts": [{"path": "docs/PRD.md", "kind": "PRD"}]}]"#,
    ));
    write_file(&dir.path().join("docs/PRD.md"), "# PRD\n");
    let (registry, issues) = load(dir.path());
    assert!(issues.is_empty(), "{issues:?}");
    assert_eq!(registry.project_root, dir.path().canonicalize().unwrap());
    assert_eq!(registry.namespace, DEFAULT_NAMESPACE);
    let core = &registry.systems[0];
    assert_eq!(core.artifacts[0].traceability, Traceability::DocsOnly);
    assert_eq!(core.artifacts[0].kit.as_deref(), Some("sdlc"));
}

#[test]
fn discovery_walks_up_from_nested_directory() {
    let dir = adapter_project(&registry_json("[]"));
    let nested = dir.path().join("a/b");
    fs::create_dir_all(&nested).unwrap();
    let found = discover_registry(None, &nested).unwrap();
    assert!(found.ends_with(".cypilot/artifacts.json"));
    assert!(discover_registry(Some(&dir.path().join("nope.json")), &nested).is_err());
}

#[test]
fn slug_errors_are_collected_per_node() {
    let dir = adapter_project(&registry_json(
        r#"[{"slug": "core", "kit": "sdlc", "children": [
              {"slug": "Bad_Slug"},
              {"slug": "auth"},
              {"slug": "auth"}]}]"#,
    ));
    let (registry, issues) = load(dir.path());
    let found: Vec<_> = issues
        .iter()
        .map(|issue| (issue.code, issue.system.as_deref()))
        .collect();
    assert_eq!(
        found,
        vec![
            (codes::INVALID_SLUG, Some("core-Bad_Slug")),
            (codes::DUPLICATE_SLUG, Some("core-auth")),
        ]
    );
    assert_eq!(registry.all_systems().len(), 2);
    assert_eq!(registry.systems[0].children[0].kit.as_deref(), Some("sdlc"));
}

#[test]
fn unknown_kit_and_missing_artifacts_do_not_stop_loading() {
    let dir = adapter_project(&registry_json(
        r#"[{"slug": "core", "kit": "ghost",
             "artifacts": [{"path": "docs/missing.md", "kind": "PRD"},
                           {"path": "../escape.md", "kind": "PRD"}]}]"#,
    ));
    let (registry, issues) = load(dir.path());
    let codes_found: Vec<_> = issues.iter().map(|issue| issue.code).collect();
    assert_eq!(
        codes_found,
        vec![codes::UNKNOWN_KIT, codes::ARTIFACT_MISSING, codes::INVALID_PATH]
    );
    assert!(registry.systems[0].artifacts.is_empty());
}

#[test]
fn ignored_artifact_counts_as_missing() {
    let dir = adapter_project(
        r#"{"version": 1, "kits": {"sdlc": {"format": "Cypilot", "path": "kits/sdlc"}},
            "ignore": [{"reason": "archived", "patterns": ["archive"]}],
            "systems": [{"slug": "core", "kit": "sdlc",
                         "artifacts": [{"path": "archive/PRD.md", "kind": "PRD"}]}]}"#,
    );
    write_file(&dir.path().join("archive/PRD.md"), "# old\n");
    let (_, issues) = load(dir.path());
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, codes::ARTIFACT_MISSING);
    assert!(issues[0].message.contains("archived"));
}

#[test]
fn unknown_artifact_kind_is_reported_for_tooled_kits() {
    let dir = adapter_project(&registry_json(
        r#"[{"slug": "core", "kit": "sdlc", "artifacts": [{"path": "docs/X.md", "kind": "WHITEPAPER"}]}]"#,
    ));
    write_file(&dir.path().join("docs/X.md"), "# X\n");
    let (registry, issues) = load(dir.path());
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, codes::UNKNOWN_KIND);
    assert_eq!(registry.systems[0].artifacts.len(), 1);
}

#[test]
fn structural_failures_stop_the_run() {
    for (label, text) in [
        ("syntax", "{ not json".to_string()),
        ("missing systems", r#"{"version": "1.0", "kits": {"a": {"format": "x", "path": "."}}}"#.to_string()),
        ("empty kits", r#"{"version": "1.0", "kits": {}, "systems": []}"#.to_string()),
        ("version", r#"{"version": "2.0", "kits": {"a": {"format": "x", "path": "."}}, "systems": []}"#.to_string()),
        ("bad ignore", r#"{"version": "1.0", "kits": {"a": {"format": "x", "path": "."}}, "ignore": [{"reason": "r", "patterns": ["[oops"]}], "systems": []}"#.to_string()),
    ] {
        let dir = adapter_project(&text);
        let result = load_registry(&dir.path().join(".cypilot").join(REGISTRY_FILE));
        assert!(result.is_err(), "{label} should stop loading");
    }
}

#[test]
fn full_slug_collisions_are_reported() {
    let dir = adapter_project(&registry_json(
        r#"[{"slug": "a", "kit": "sdlc", "children": [{"slug": "b-c"}]},
            {"slug": "a-b", "kit": "sdlc", "children": [{"slug": "c"}]}]"#,
    ));
    let (_, issues) = load(dir.path());
    assert_eq!(issues.len(), 1, "{issues:?}");
    assert_eq!(issues[0].code, codes::DUPLICATE_SLUG);
    assert_eq!(issues[0].system.as_deref(), Some("a-b-c"));
}
