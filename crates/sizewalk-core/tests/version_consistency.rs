//! Ensures all workspace crates use `version.workspace = true` and that
//! the workspace version is the one this crate was built with.

use std::path::Path;

fn workspace_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .expect("crate lives under <root>/crates/")
}

fn manifest(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    text.parse().unwrap()
}

/// `"workspace"` when the crate inherits its version, else the literal.
fn crate_version(manifest_dir: &Path) -> String {
    let doc = manifest(manifest_dir);
    let version = doc
        .get("package")
        .and_then(|pkg| pkg.get("version"))
        .unwrap_or_else(|| panic!("{} has no package.version", manifest_dir.display()));

    match version {
        toml::Value::Table(table)
            if table.get("workspace").and_then(|v| v.as_bool()) == Some(true) =>
        {
            "workspace".to_string()
        }
        toml::Value::String(v) => v.clone(),
        other => panic!("unexpected version entry {other:?}"),
    }
}

#[test]
fn all_crates_use_workspace_version() {
    let root = workspace_root();
    let members = manifest(root)["workspace"]["members"]
        .as_array()
        .expect("workspace.members")
        .clone();
    assert!(!members.is_empty());

    for member in members {
        let krate = member.as_str().unwrap();
        let version = crate_version(&root.join(krate));
        assert_eq!(
            version, "workspace",
            "{} should use version.workspace = true, got version = {:?}",
            krate, version
        );
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let doc = manifest(workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, sizewalk_core::VERSION);
}

#[test]
fn internal_dependency_pins_workspace_version() {
    let doc = manifest(workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    let core = &doc["workspace"]["dependencies"]["sizewalk-core"];
    assert_eq!(core["version"].as_str(), Some(ws_version));
}
