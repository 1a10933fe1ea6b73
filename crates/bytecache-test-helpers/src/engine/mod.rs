//! Reference engine for tests.
//!
//! Compiles a small module language (see [`script`]) into blobs with the
//! same header shape the loader patches, and behaves like a real engine at
//! every step the loader depends on: it refuses caches whose source length
//! or build fingerprint does not match, falls back to compiling the supplied
//! source when it does, links through the caller's resolver, and evaluates
//! dependencies before dependents.

pub mod blob;
pub mod script;

use bytecache_core::engine::{Engine, ExportSetter, Namespace, ResolveFn, SyntheticInit};
use bytecache_core::header::{EngineVersion, PatchTable};
use bytecache_core::{LoaderError, Result};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use blob::Rejection;
use script::{eval, Expr, ImportBinding, Scope, Script, Stmt};

/// Handle to a module created by a [`MockEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockModule(usize);

/// Isolated global scope. Clones share the same globals.
#[derive(Debug, Clone)]
pub struct MockContext {
    name: String,
    globals: Arc<Mutex<IndexMap<String, Value>>>,
}

impl MockContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Arc::default(),
        }
    }

    pub fn with_global(self, name: impl Into<String>, value: Value) -> Self {
        self.set_global(name, value);
        self
    }

    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        self.globals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    Evaluated,
    Errored(String),
}

enum ModuleKind {
    Source(Script),
    Synthetic {
        names: Vec<String>,
        init: Option<SyntheticInit<Value>>,
    },
}

struct ModuleRecord {
    kind: ModuleKind,
    context: Option<MockContext>,
    rejection: Option<Rejection>,
    status: ModuleStatus,
    deps: Vec<(String, MockModule)>,
    exports: IndexMap<String, Value>,
}

pub struct MockEngine {
    version: String,
    fingerprint: [u32; 3],
    checked_offsets: Vec<usize>,
    flags: Mutex<Vec<String>>,
    modules: Mutex<Vec<ModuleRecord>>,
}

impl MockEngine {
    /// Engine reporting `version`, build id 0.
    pub fn new(version: &str) -> Self {
        Self::with_build(version, 0)
    }

    /// Engine reporting `version` whose fingerprint depends on `build`.
    /// Two engines of the same version but different builds produce blobs
    /// that only load across each other after header patching.
    pub fn with_build(version: &str, build: u64) -> Self {
        let digest = blake3::hash(format!("{}#{}", version, build).as_bytes());
        let bytes = digest.as_bytes();
        let word =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let fingerprint = [word(0), word(4), word(8)];

        // The words this engine checks are the ones the built-in table
        // patches for its version line.
        let checked_offsets = EngineVersion::parse(version)
            .ok()
            .and_then(|v| PatchTable::builtin().select(&v).cloned())
            .map(|recipe| {
                recipe
                    .ranges
                    .iter()
                    .flat_map(|r| (r.start..r.end).step_by(4))
                    .filter(|offset| (12..24).contains(offset))
                    .collect()
            })
            .unwrap_or_else(|| vec![12, 16, 20]);

        Self {
            version: version.to_string(),
            fingerprint,
            checked_offsets,
            flags: Mutex::new(Vec::new()),
            modules: Mutex::new(Vec::new()),
        }
    }

    pub fn flags(&self) -> Vec<String> {
        self.flags.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fingerprint(&self) -> [u32; 3] {
        self.fingerprint
    }

    /// Header offsets whose fingerprint word must match on load.
    pub fn checked_offsets(&self) -> &[usize] {
        &self.checked_offsets
    }

    pub fn module_count(&self) -> usize {
        self.records().len()
    }

    pub fn status(&self, module: &MockModule) -> ModuleStatus {
        self.records()[module.0].status.clone()
    }

    pub fn rejection(&self, module: &MockModule) -> Option<Rejection> {
        self.records()[module.0].rejection.clone()
    }

    /// Specifier -> module pairs `module` was linked against.
    pub fn dependencies(&self, module: &MockModule) -> Vec<(String, MockModule)> {
        self.records()[module.0].deps.clone()
    }

    pub fn is_synthetic(&self, module: &MockModule) -> bool {
        matches!(self.records()[module.0].kind, ModuleKind::Synthetic { .. })
    }

    fn records(&self) -> MutexGuard<'_, Vec<ModuleRecord>> {
        self.modules.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, record: ModuleRecord) -> MockModule {
        let mut records = self.records();
        records.push(record);
        MockModule(records.len() - 1)
    }

    fn parse(source: &str) -> Result<Script> {
        script::parse(source).map_err(|e| LoaderError::Compile(format!("SyntaxError: {}", e)))
    }

    fn link_inner(
        &self,
        module: MockModule,
        resolve: &mut ResolveFn<'_, MockModule>,
        seen: &mut FxHashMap<String, MockModule>,
    ) -> Result<()> {
        let specifiers = {
            let mut records = self.records();
            let record = &mut records[module.0];
            match &record.status {
                ModuleStatus::Unlinked => {}
                ModuleStatus::Errored(msg) => return Err(LoaderError::Link(msg.clone())),
                _ => return Ok(()),
            }
            record.status = ModuleStatus::Linking;
            match &record.kind {
                ModuleKind::Source(script) => script.specifiers(),
                ModuleKind::Synthetic { .. } => Vec::new(),
            }
        };

        let mut deps = Vec::with_capacity(specifiers.len());
        for specifier in specifiers {
            let resolved = match seen.get(&specifier) {
                Some(dep) => Ok(*dep),
                None => resolve(&specifier, &module),
            };
            let dep = match resolved {
                Ok(dep) => dep,
                Err(e) => {
                    self.records()[module.0].status = ModuleStatus::Unlinked;
                    return Err(e);
                }
            };
            seen.insert(specifier.clone(), dep);
            if let Err(e) = self.link_inner(dep, resolve, seen) {
                self.records()[module.0].status = ModuleStatus::Unlinked;
                return Err(e);
            }
            deps.push((specifier, dep));
        }

        let mut records = self.records();
        records[module.0].deps = deps;
        records[module.0].status = ModuleStatus::Linked;
        Ok(())
    }

    fn evaluate_source(
        &self,
        script: &Script,
        deps: &[(String, MockModule)],
        context: Option<&MockContext>,
    ) -> Result<IndexMap<String, Value>> {
        for (_, dep) in deps {
            self.evaluate(dep)?;
        }

        let mut env = ModuleScope {
            locals: FxHashMap::default(),
            context,
        };

        for import in &script.imports {
            let dep = deps
                .iter()
                .find(|(s, _)| s == &import.specifier)
                .map(|(_, m)| *m)
                .ok_or_else(|| LoaderError::Link(format!("unlinked import '{}'", import.specifier)))?;
            let namespace = self.namespace(&dep)?;

            for binding in &import.bindings {
                let (local, value) = match binding {
                    ImportBinding::Default { local } => {
                        (local, export_of(&namespace, "default", &import.specifier)?)
                    }
                    ImportBinding::Named { imported, local } => {
                        (local, export_of(&namespace, imported, &import.specifier)?)
                    }
                    ImportBinding::Namespace { local } => (
                        local,
                        Value::Object(namespace.clone().into_inner().into_iter().collect()),
                    ),
                };
                env.locals.insert(local.clone(), value);
            }
        }

        let mut exports = IndexMap::new();
        for stmt in &script.body {
            let run = |expr: &Expr| eval(expr, &env).map_err(LoaderError::Evaluation);
            match stmt {
                Stmt::Declare {
                    name,
                    init,
                    exported,
                } => {
                    let value = run(init)?;
                    if *exported {
                        exports.insert(name.clone(), value.clone());
                    }
                    env.locals.insert(name.clone(), value);
                }
                Stmt::ExportDefault(expr) => {
                    exports.insert("default".to_string(), run(expr)?);
                }
                Stmt::ExportList(list) => {
                    for (local, exported) in list {
                        let value = env.lookup(local).ok_or_else(|| {
                            LoaderError::Evaluation(format!(
                                "SyntaxError: Export '{}' is not defined in module",
                                local
                            ))
                        })?;
                        exports.insert(exported.clone(), value);
                    }
                }
                Stmt::Throw(expr) => {
                    let value = run(expr)?;
                    let message = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    return Err(LoaderError::Evaluation(format!("Uncaught {}", message)));
                }
                Stmt::Expr(expr) => {
                    run(expr)?;
                }
            }
        }
        Ok(exports)
    }
}

fn export_of(namespace: &Namespace<Value>, name: &str, specifier: &str) -> Result<Value> {
    namespace.get(name).cloned().ok_or_else(|| {
        LoaderError::Link(format!(
            "SyntaxError: The requested module '{}' does not provide an export named '{}'",
            specifier, name
        ))
    })
}

struct ModuleScope<'a> {
    locals: FxHashMap<String, Value>,
    context: Option<&'a MockContext>,
}

impl Scope for ModuleScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.context.and_then(|c| c.global(name)))
    }
}

struct SyntheticExports {
    values: IndexMap<String, Value>,
}

impl ExportSetter<Value> for SyntheticExports {
    fn set_export(&mut self, name: &str, value: Value) -> Result<()> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(LoaderError::Evaluation(format!(
                "ReferenceError: Export '{}' is not defined in module",
                name
            ))),
        }
    }
}

impl Engine for MockEngine {
    type Module = MockModule;
    type Value = Value;
    type Context = MockContext;

    fn version(&self) -> &str {
        &self.version
    }

    fn set_flags(&self, flags: &str) {
        self.flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(flags.to_string());
    }

    fn compile_module(&self, source: &str, _context: Option<&MockContext>) -> Result<Vec<u8>> {
        let script = Self::parse(source)?;
        blob::encode(&script, source, &self.fingerprint).map_err(LoaderError::Compile)
    }

    fn source_text_module(
        &self,
        source: &str,
        cached_data: Option<&[u8]>,
        context: Option<&MockContext>,
    ) -> Result<MockModule> {
        let (script, rejection) = match cached_data {
            Some(data) => {
                match blob::decode(data, source, &self.fingerprint, &self.checked_offsets) {
                    Ok(script) => (script, None),
                    Err(rejection) => {
                        debug!(?rejection, "cached data rejected, compiling source");
                        (Self::parse(source)?, Some(rejection))
                    }
                }
            }
            None => (Self::parse(source)?, None),
        };

        Ok(self.push(ModuleRecord {
            kind: ModuleKind::Source(script),
            context: context.cloned(),
            rejection,
            status: ModuleStatus::Unlinked,
            deps: Vec::new(),
            exports: IndexMap::new(),
        }))
    }

    fn cached_data_rejected(&self, module: &MockModule) -> bool {
        self.records()[module.0].rejection.is_some()
    }

    fn synthetic_module(
        &self,
        export_names: Vec<String>,
        init: SyntheticInit<Value>,
        context: Option<&MockContext>,
    ) -> Result<MockModule> {
        Ok(self.push(ModuleRecord {
            kind: ModuleKind::Synthetic {
                names: export_names,
                init: Some(init),
            },
            context: context.cloned(),
            rejection: None,
            status: ModuleStatus::Unlinked,
            deps: Vec::new(),
            exports: IndexMap::new(),
        }))
    }

    fn module_context(&self, module: &MockModule) -> Option<MockContext> {
        self.records()[module.0].context.clone()
    }

    fn link(&self, module: &MockModule, resolve: &mut ResolveFn<'_, MockModule>) -> Result<()> {
        let mut seen = FxHashMap::default();
        self.link_inner(*module, resolve, &mut seen)
    }

    fn evaluate(&self, module: &MockModule) -> Result<()> {
        enum Work {
            Source(Script, Vec<(String, MockModule)>, Option<MockContext>),
            Synthetic(Vec<String>, Option<SyntheticInit<Value>>),
        }

        let work = {
            let mut records = self.records();
            let record = &mut records[module.0];
            match &record.status {
                ModuleStatus::Linked => {}
                ModuleStatus::Evaluated | ModuleStatus::Evaluating => return Ok(()),
                ModuleStatus::Errored(msg) => return Err(LoaderError::Evaluation(msg.clone())),
                ModuleStatus::Unlinked | ModuleStatus::Linking => {
                    return Err(LoaderError::Link(
                        "module must be linked before evaluation".to_string(),
                    ))
                }
            }
            record.status = ModuleStatus::Evaluating;
            match &mut record.kind {
                ModuleKind::Source(script) => Work::Source(
                    script.clone(),
                    record.deps.clone(),
                    record.context.clone(),
                ),
                ModuleKind::Synthetic { names, init } => Work::Synthetic(names.clone(), init.take()),
            }
        };

        let result = match work {
            Work::Source(script, deps, context) => {
                self.evaluate_source(&script, &deps, context.as_ref())
            }
            Work::Synthetic(names, init) => {
                let mut setter = SyntheticExports {
                    values: names.into_iter().map(|n| (n, Value::Null)).collect(),
                };
                match init {
                    Some(init) => init(&mut setter).map(|()| setter.values),
                    None => Ok(setter.values),
                }
            }
        };

        let mut records = self.records();
        let record = &mut records[module.0];
        match result {
            Ok(exports) => {
                record.exports = exports;
                record.status = ModuleStatus::Evaluated;
                Ok(())
            }
            Err(e) => {
                record.status = ModuleStatus::Errored(e.to_string());
                Err(e)
            }
        }
    }

    fn namespace(&self, module: &MockModule) -> Result<Namespace<Value>> {
        let records = self.records();
        let record = &records[module.0];
        if record.status != ModuleStatus::Evaluated {
            return Err(LoaderError::Evaluation(format!(
                "module namespace is not available in state {:?}",
                record.status
            )));
        }
        Ok(Namespace::new(record.exports.clone()))
    }
}
