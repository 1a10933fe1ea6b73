use bytecache_core::engine::Engine;
use bytecache_core::{CliOverrides, LoaderConfig, LoaderError};
use bytecache_test_helpers::{create_test_container_with, MockEngine, MockResolver};
use indoc::indoc;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, text: &str) -> LoaderConfig {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    LoaderConfig::from_file(&path).unwrap()
}

fn load_across_builds(version: &str, config: LoaderConfig) -> Result<serde_json::Value, LoaderError> {
    let blob = MockEngine::with_build(version, 7)
        .compile_module("export default \"ok\";", None)
        .unwrap();
    let (container, _fs) = create_test_container_with(
        config,
        Arc::new(MockEngine::with_build(version, 8)),
        MockResolver::new(),
    );
    let ns = container.run_namespace(blob, None)?;
    Ok(ns.default_export().cloned().unwrap_or_default())
}

#[test]
fn test_yaml_recipes_replace_builtin_table() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "bytecache.yaml",
        indoc! {"
            patchRecipes:
              - name: wide
                when:
                  - kind: majorRange
                    min: 22
                    max: 30
                ranges:
                  - { start: 12, end: 24 }
        "},
    );

    assert_eq!(config.patch_table().recipes()[0].name, "wide");
    assert_eq!(load_across_builds("v22.3.0", config).unwrap(), json!("ok"));
}

#[test]
fn test_recipes_without_match_leave_blob_unpatched() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "bytecache.json",
        indoc! {r#"
            {
              "patchRecipes": [
                {
                  "name": "old-only",
                  "when": [{ "kind": "majorMinor", "major": 8, "minor": 9 }],
                  "ranges": [{ "start": 16, "end": 24 }]
                }
              ]
            }
        "#},
    );

    let err = load_across_builds("v18.0.0", config).unwrap_err();
    assert!(matches!(err, LoaderError::CacheRejected { .. }));
}

#[test]
fn test_extension_and_root_from_file_with_overrides() {
    let dir = TempDir::new().unwrap();
    let mut config = write_config(
        &dir,
        "bytecache.yml",
        indoc! {"
            bytecodeExtension: .bc
            rootDir: /srv/app
            bundle:
              minify: true
        "},
    );
    config.merge(&CliOverrides {
        root_dir: Some("/opt/app".to_string()),
        minify: Some(false),
        ..CliOverrides::default()
    });

    let (container, fs) = create_test_container_with(
        config,
        Arc::new(MockEngine::new("v16.0.0")),
        MockResolver::new(),
    );
    assert!(!container.config().bundle.minify);

    fs.add_file(
        "/opt/app/dep.bc",
        container.compile_text("export default 11;").unwrap(),
    );
    let main = container
        .compile_text("import d from \"dep.bc\"; export default d;")
        .unwrap();
    let ns = container.run_namespace(main, None).unwrap();
    assert_eq!(ns.default_export(), Some(&json!(11)));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let err = LoaderConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, LoaderError::Io(_)));
}
