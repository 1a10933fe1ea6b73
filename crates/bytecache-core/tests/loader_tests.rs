use bytecache_core::engine::Engine;
use bytecache_core::fs::FileSystem;
use bytecache_core::header::{read_source_length, HEADER_LEN, MAX_SOURCE_LENGTH, MODULE_FLAG};
use bytecache_core::{BlobSource, BundleFormat, Container, LoaderConfig, LoaderError};
use bytecache_test_helpers::{
    create_test_container, create_test_container_with, fixtures, MockBundler, MockContext,
    MockEngine, MockResolver, ModuleStatus,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn cfg_resolver() -> MockResolver {
    MockResolver::new().with_module("cfg", json!({ "foo": 1, "bar": 2 }))
}

// ============================================================================
// END-TO-END
// ============================================================================

#[test]
fn test_compile_persist_and_run_default_export() {
    let (container, fs) = create_test_container("v14.17.0", MockResolver::new());

    let blob = container.compile_text(fixtures::default_42()).unwrap();
    fs.write_file(Path::new("/app/main.jsc"), &blob).unwrap();

    let ns = container
        .run_namespace(PathBuf::from("/app/main.jsc"), None)
        .unwrap();
    assert_eq!(ns.default_export(), Some(&json!(42)));
}

#[test]
fn test_run_from_bytes() {
    let (container, _fs) = create_test_container("v18.12.0", MockResolver::new());

    let blob = container.compile_text(fixtures::greeting()).unwrap();
    let ns = container.run_namespace(blob, None).unwrap();

    assert_eq!(ns.default_export(), Some(&json!("hi")));
    assert_eq!(ns.get("greeting"), Some(&json!({ "hello": "bytecache" })));
}

#[test]
fn test_instantiate_returns_default_export() {
    let (container, fs) = create_test_container("v16.20.0", MockResolver::new());
    fs.add_file("/app/main.mjs", fixtures::default_42());

    container
        .compile_file_to(Path::new("/app/main.mjs"), Path::new("/app/main.jsc"))
        .unwrap();
    assert!(fs.exists(Path::new("/app/main.jsc")));

    let value = container.instantiate(Path::new("/app/main.jsc")).unwrap();
    assert_eq!(value, Some(json!(42)));
}

#[test]
fn test_instantiate_without_default_export() {
    let (container, fs) = create_test_container("v16.20.0", MockResolver::new());
    let blob = container.compile_text("export const x = 1;").unwrap();
    fs.add_file("/lib.jsc", blob);

    assert_eq!(container.instantiate(Path::new("/lib.jsc")).unwrap(), None);
}

#[test]
fn test_real_file_system_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("main.mjs");
    let output = dir.path().join("dist/main.jsc");
    std::fs::write(&source, fixtures::default_42()).unwrap();

    let container = Container::new(
        LoaderConfig::default(),
        Arc::new(MockEngine::new("v20.11.1")),
        MockResolver::new().into_arc(),
    );
    container.compile_file_to(&source, &output).unwrap();

    assert_eq!(container.instantiate(&output).unwrap(), Some(json!(42)));
}

// ============================================================================
// HEADER RECONCILIATION
// ============================================================================

fn cross_build_load(version: &str, config: LoaderConfig) -> Result<serde_json::Value, LoaderError> {
    let producer = MockEngine::with_build(version, 1);
    let blob = producer.compile_module(fixtures::default_42(), None).unwrap();

    let consumer = Arc::new(MockEngine::with_build(version, 2));
    let (container, _fs) = create_test_container_with(config, consumer, MockResolver::new());
    let ns = container.run_namespace(blob, None)?;
    Ok(ns.default_export().cloned().unwrap_or_default())
}

#[test]
fn test_blob_from_other_build_loads_after_patch() {
    for version in ["v8.9.4", "v12.22.12", "v14.17.0", "v16.20.2", "v18.19.0", "v20.11.1"] {
        let value = cross_build_load(version, LoaderConfig::default())
            .unwrap_or_else(|e| panic!("{}: {}", version, e));
        assert_eq!(value, json!(42), "{}", version);
    }
}

#[test]
fn test_blob_from_other_build_rejected_without_recipe() {
    let config = LoaderConfig {
        patch_recipes: Some(Vec::new()),
        ..LoaderConfig::default()
    };
    let err = cross_build_load("v14.17.0", config).unwrap_err();
    assert!(matches!(err, LoaderError::CacheRejected { .. }));
}

#[test]
fn test_patch_reports_recipe_for_engine_version() {
    let (container, _fs) = create_test_container("v8.8.0", MockResolver::new());
    let mut blob = container.compile_text(fixtures::default_42()).unwrap();
    let recipe = container.loader().patch(&mut blob).unwrap();
    assert_eq!(recipe.as_deref(), Some("legacy"));
}

#[test]
fn test_corrupted_payload_is_rejected_not_executed() {
    let (container, fs) = create_test_container("v14.17.0", MockResolver::new());
    let mut blob = container.compile_text(fixtures::throws()).unwrap();
    assert!(blob.len() > HEADER_LEN);

    let last = blob.len() - 1;
    blob[last] ^= 0xFF;
    fs.add_file("/app/bad.jsc", blob);

    let before = container.engine().module_count();
    let err = container
        .run_from_blob(PathBuf::from("/app/bad.jsc"), None)
        .unwrap_err();

    match err {
        LoaderError::CacheRejected { origin } => assert_eq!(origin, "/app/bad.jsc"),
        other => panic!("expected cache rejection, got {:?}", other),
    }
    // The placeholder module was created but never linked or evaluated.
    let engine = container.engine();
    assert_eq!(engine.module_count(), before + 1);
}

#[test]
fn test_placeholder_matches_recorded_length() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let source = "export const s = \"héllo wörld ಠ_ಠ\";";
    let blob = container.compile_text(source).unwrap();

    assert_eq!(
        read_source_length(&blob).unwrap() as usize,
        source.encode_utf16().count()
    );
}

// ============================================================================
// LINKING
// ============================================================================

#[test]
fn test_linker_fan_out() {
    let engine = Arc::new(MockEngine::new("v14.17.0"));
    let resolver = cfg_resolver();
    let (container, fs) =
        create_test_container_with(LoaderConfig::default(), engine.clone(), resolver);

    let dep = container.compile_text("export default \"dep\";").unwrap();
    fs.add_file("./lib/dep.jsc", dep);
    let main = container
        .compile_text(&fixtures::fan_out("./lib/dep.jsc"))
        .unwrap();

    let module = container.run_from_blob(main, None).unwrap();
    let ns = engine.namespace(&module).unwrap();

    assert_eq!(ns.default_export(), Some(&json!({ "foo": 1, "bar": 2 })));
    assert_eq!(ns.get("first"), Some(&json!(1)));
    assert_eq!(ns.get("second"), Some(&json!(2)));
    assert_eq!(ns.get("fromDep"), Some(&json!("dep")));

    let deps = engine.dependencies(&module);
    assert_eq!(deps.len(), 2);

    let (bytecode_spec, bytecode_dep) = &deps[0];
    assert_eq!(bytecode_spec, "./lib/dep.jsc");
    assert!(!engine.is_synthetic(bytecode_dep));
    assert_eq!(engine.status(bytecode_dep), ModuleStatus::Evaluated);

    let (cfg_spec, cfg_dep) = &deps[1];
    assert_eq!(cfg_spec, "cfg");
    assert!(engine.is_synthetic(cfg_dep));
    let cfg_ns = engine.namespace(cfg_dep).unwrap();
    assert_eq!(cfg_ns.names().collect::<Vec<_>>(), vec!["default", "foo", "bar"]);
    assert_eq!(cfg_ns.default_export(), Some(&json!({ "foo": 1, "bar": 2 })));
    assert_eq!(cfg_ns.get("foo"), Some(&json!(1)));
    assert_eq!(cfg_ns.get("bar"), Some(&json!(2)));
}

#[test]
fn test_repeated_specifier_resolved_once_per_link() {
    let resolver = Arc::new(cfg_resolver());
    let engine = Arc::new(MockEngine::new("v18.0.0"));
    let container = Container::with_dependencies(
        LoaderConfig::default(),
        engine,
        resolver.clone(),
        Arc::new(bytecache_core::fs::MockFileSystem::new()),
    );

    let blob = container
        .compile_text("import a from \"cfg\"; import { foo } from \"cfg\"; export default foo;")
        .unwrap();
    let ns = container.run_namespace(blob, None).unwrap();

    assert_eq!(ns.default_export(), Some(&json!(1)));
    assert_eq!(resolver.requests(), vec!["cfg"]);
}

#[test]
fn test_nested_bytecode_chain() {
    let (container, fs) = create_test_container("v20.0.0", MockResolver::new());

    let leaf = container.compile_text("export default 3;").unwrap();
    let mid = container
        .compile_text("import leaf from \"/m/leaf.jsc\"; export default { leaf };")
        .unwrap();
    fs.add_file("/m/leaf.jsc", leaf);
    fs.add_file("/m/mid.jsc", mid);

    let top = container
        .compile_text("import * as mid from \"/m/mid.jsc\"; export default mid.default.leaf;")
        .unwrap();
    let ns = container.run_namespace(top, None).unwrap();

    assert_eq!(ns.default_export(), Some(&json!(3)));
}

#[test]
fn test_bytecode_specifier_resolved_against_root_dir() {
    let config = LoaderConfig {
        root_dir: Some("/srv/app".to_string()),
        ..LoaderConfig::default()
    };
    let (container, fs) = create_test_container_with(
        config,
        Arc::new(MockEngine::new("v14.0.0")),
        MockResolver::new(),
    );

    let dep = container.compile_text("export default 5;").unwrap();
    fs.add_file("/srv/app/lib/five.jsc", dep);
    let main = container
        .compile_text("import five from \"lib/five.jsc\"; export default five;")
        .unwrap();

    let ns = container.run_namespace(main, None).unwrap();
    assert_eq!(ns.default_export(), Some(&json!(5)));
}

#[test]
fn test_custom_bytecode_extension() {
    let config = LoaderConfig {
        bytecode_extension: ".bc".to_string(),
        ..LoaderConfig::default()
    };
    let (container, fs) = create_test_container_with(
        config,
        Arc::new(MockEngine::new("v18.0.0")),
        MockResolver::new(),
    );

    fs.add_file("/x.bc", container.compile_text("export default 1;").unwrap());
    let main = container
        .compile_text("import x from \"/x.bc\"; export default x;")
        .unwrap();

    assert_eq!(
        container.run_namespace(main, None).unwrap().default_export(),
        Some(&json!(1))
    );
}

#[test]
fn test_own_default_key_is_not_reexported() {
    let engine = Arc::new(MockEngine::new("v16.0.0"));
    let resolver = MockResolver::new().with_module("legacy", json!({ "default": 5, "x": 1 }));
    let (container, _fs) =
        create_test_container_with(LoaderConfig::default(), engine.clone(), resolver);

    let blob = container
        .compile_text("import d, { x } from \"legacy\"; export const named = x; export default d;")
        .unwrap();
    let module = container.run_from_blob(blob, None).unwrap();

    let ns = engine.namespace(&module).unwrap();
    assert_eq!(ns.default_export(), Some(&json!({ "default": 5, "x": 1 })));
    assert_eq!(ns.get("named"), Some(&json!(1)));

    let deps = engine.dependencies(&module);
    let legacy_ns = engine.namespace(&deps[0].1).unwrap();
    assert_eq!(legacy_ns.names().collect::<Vec<_>>(), vec!["default", "x"]);
}

#[test]
fn test_diamond_bytecode_imports_load() {
    let (container, fs) = create_test_container("v18.0.0", MockResolver::new());

    fs.add_file("/d/shared.jsc", container.compile_text("export default 2;").unwrap());
    fs.add_file(
        "/d/left.jsc",
        container
            .compile_text("import s from \"/d/shared.jsc\"; export default s;")
            .unwrap(),
    );
    fs.add_file(
        "/d/right.jsc",
        container
            .compile_text("import s from \"/d/shared.jsc\"; export default s;")
            .unwrap(),
    );

    let top = container
        .compile_text(
            "import l from \"/d/left.jsc\"; import r from \"/d/right.jsc\"; export default [l, r];",
        )
        .unwrap();
    let ns = container.run_namespace(top, None).unwrap();
    assert_eq!(ns.default_export(), Some(&json!([2, 2])));
}

// ============================================================================
// CONTEXTS AND INDEPENDENCE
// ============================================================================

#[test]
fn test_same_blob_in_isolated_contexts() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let blob = container.compile_text(fixtures::reads_global()).unwrap();

    let a = MockContext::new("a").with_global("answer", json!("A"));
    let b = MockContext::new("b").with_global("answer", json!("B"));

    let ns_a = container.run_namespace(blob.clone(), Some(&a)).unwrap();
    let ns_b = container.run_namespace(blob, Some(&b)).unwrap();

    assert_eq!(ns_a.default_export(), Some(&json!("A")));
    assert_eq!(ns_b.default_export(), Some(&json!("B")));
}

#[test]
fn test_dependency_inherits_referrer_context() {
    let engine = Arc::new(MockEngine::new("v14.17.0"));
    let (container, fs) =
        create_test_container_with(LoaderConfig::default(), engine.clone(), cfg_resolver());

    fs.add_file(
        "/ctx/global.jsc",
        container.compile_text(fixtures::reads_global()).unwrap(),
    );
    let main = container
        .compile_text("import g from \"/ctx/global.jsc\"; import \"cfg\"; export default g;")
        .unwrap();

    let ctx = MockContext::new("sandbox").with_global("answer", json!(99));
    let module = container.run_from_blob(main, Some(&ctx)).unwrap();

    assert_eq!(
        engine.namespace(&module).unwrap().default_export(),
        Some(&json!(99))
    );
    for (_, dep) in engine.dependencies(&module) {
        let dep_ctx = engine.module_context(&dep).expect("dependency context");
        assert_eq!(dep_ctx.name(), "sandbox");
    }
}

#[test]
fn test_each_run_builds_fresh_module() {
    let engine = Arc::new(MockEngine::new("v18.0.0"));
    let (container, _fs) =
        create_test_container_with(LoaderConfig::default(), engine, MockResolver::new());
    let blob = container.compile_text(fixtures::default_42()).unwrap();

    let first = container.run_from_blob(blob.clone(), None).unwrap();
    let second = container
        .run_from_blob(BlobSource::Bytes(blob), None)
        .unwrap();
    assert_ne!(first, second);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_unresolvable_dependency_propagates() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let blob = container
        .compile_text("import x from \"left-pad\"; export default x;")
        .unwrap();

    let err = container.run_from_blob(blob, None).unwrap_err();
    match err {
        LoaderError::Resolution { specifier, message } => {
            assert_eq!(specifier, "left-pad");
            assert_eq!(message, "Cannot find module 'left-pad'");
        }
        other => panic!("expected resolution failure, got {:?}", other),
    }
}

#[test]
fn test_missing_bytecode_dependency_is_io_error() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let blob = container
        .compile_text("import x from \"/nowhere.jsc\"; export default x;")
        .unwrap();

    let err = container.run_from_blob(blob, None).unwrap_err();
    assert!(matches!(err, LoaderError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
}

#[test]
fn test_bytecode_import_cycle_is_link_error() {
    let (container, fs) = create_test_container("v14.17.0", MockResolver::new());
    fs.add_file(
        "/c/a.jsc",
        container
            .compile_text("import b from \"/c/b.jsc\"; export default b;")
            .unwrap(),
    );
    fs.add_file(
        "/c/b.jsc",
        container
            .compile_text("import a from \"/c/a.jsc\"; export default a;")
            .unwrap(),
    );

    let err = container
        .run_from_blob(PathBuf::from("/c/a.jsc"), None)
        .unwrap_err();
    match err {
        LoaderError::Link(message) => {
            assert!(message.contains("cycle"), "{}", message);
            assert!(message.contains("/c/a.jsc -> /c/b.jsc -> /c/a.jsc"), "{}", message);
        }
        other => panic!("expected link failure, got {:?}", other),
    }
}

#[test]
fn test_blob_importing_itself_is_link_error() {
    let (container, fs) = create_test_container("v14.17.0", MockResolver::new());
    fs.add_file(
        "/c/self.jsc",
        container
            .compile_text("import me from \"/c/self.jsc\"; export default me;")
            .unwrap(),
    );

    let err = container
        .run_from_blob(PathBuf::from("/c/self.jsc"), None)
        .unwrap_err();
    assert!(matches!(err, LoaderError::Link(ref m) if m.contains("cycle")));
}

#[test]
fn test_evaluation_failure_propagates() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let blob = container.compile_text(fixtures::throws()).unwrap();

    let err = container.run_from_blob(blob, None).unwrap_err();
    match err {
        LoaderError::Evaluation(message) => assert_eq!(message, "Uncaught kaboom"),
        other => panic!("expected evaluation failure, got {:?}", other),
    }
}

#[test]
fn test_compile_failure_propagates() {
    let (container, fs) = create_test_container("v14.17.0", MockResolver::new());
    assert!(matches!(
        container.compile_text(fixtures::syntax_error()),
        Err(LoaderError::Compile(_))
    ));

    fs.add_file("/bad.mjs", fixtures::syntax_error());
    assert!(matches!(
        container.compile_file(Path::new("/bad.mjs")),
        Err(LoaderError::Compile(_))
    ));
}

#[test]
fn test_truncated_blob() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let err = container.run_from_blob(vec![0u8; 10], None).unwrap_err();
    assert!(matches!(err, LoaderError::TruncatedHeader { len: 10, .. }));
}

#[test]
fn test_corrupted_length_field_is_load_error() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let mut blob = container.compile_text(fixtures::default_42()).unwrap();
    blob[8..12].copy_from_slice(&(0x7FFF_FFFFu32 | MODULE_FLAG).to_le_bytes());

    let before = container.engine().module_count();
    let err = container.run_from_blob(blob, None).unwrap_err();

    assert!(matches!(
        err,
        LoaderError::SourceTooLong {
            length: 0x7FFF_FFFF,
            max: MAX_SOURCE_LENGTH
        }
    ));
    assert_eq!(container.engine().module_count(), before);
}

// ============================================================================
// BUNDLER FRONT-END
// ============================================================================

#[test]
fn test_bundle_and_compile() {
    let bundler = Arc::new(MockBundler::returning("export default 7;"));
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let container = container.with_bundler(bundler.clone());

    let blob = container
        .bundle_and_compile(Path::new("src/index.mjs"))
        .unwrap();
    let ns = container.run_namespace(blob, None).unwrap();
    assert_eq!(ns.default_export(), Some(&json!(7)));

    let calls = bundler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PathBuf::from("src/index.mjs"));
    assert_eq!(calls[0].1.format, BundleFormat::Es);
    assert!(calls[0].1.minify);
    assert!(calls[0].1.silence_warnings);
}

#[test]
fn test_bundler_failure_propagates() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    let container = container.with_bundler(Arc::new(MockBundler::failing("entry not found")));

    let err = container
        .bundle_and_compile(Path::new("missing.mjs"))
        .unwrap_err();
    match err {
        LoaderError::Bundle(message) => assert_eq!(message, "entry not found"),
        other => panic!("expected bundle failure, got {:?}", other),
    }
}

#[test]
fn test_bundle_without_bundler() {
    let (container, _fs) = create_test_container("v14.17.0", MockResolver::new());
    assert!(matches!(
        container.bundle_and_compile(Path::new("a.mjs")),
        Err(LoaderError::Bundle(_))
    ));
}
