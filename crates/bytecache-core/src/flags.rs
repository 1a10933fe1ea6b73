//! One-time engine flag configuration.
//!
//! Blobs are only complete if the engine compiled every function eagerly,
//! and bytecode must not be flushed from functions that are never run.
//! Both are process-wide engine flags, so they are set once and never reset.

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::engine::Engine;
use crate::errors::Result;
use crate::header::EngineVersion;

pub const NO_LAZY: &str = "--no-lazy";
pub const NO_FLUSH_BYTECODE: &str = "--no-flush-bytecode";

/// Flags applied by [`initialize_engine_flags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagReport {
    pub engine_version: EngineVersion,
    pub flags: Vec<&'static str>,
}

static ENGINE_FLAGS: OnceCell<FlagReport> = OnceCell::new();

/// Flags for an engine of `version`.
pub fn flags_for(version: &EngineVersion, config: &LoaderConfig) -> Vec<&'static str> {
    let mut flags = vec![NO_LAZY];
    if version.major >= config.flush_bytecode_min_major {
        flags.push(NO_FLUSH_BYTECODE);
    }
    flags
}

/// Apply the eager-compilation flags to `engine`, once per process.
///
/// Later calls do nothing and return the report of the first call.
pub fn initialize_engine_flags<E: Engine>(engine: &E, config: &LoaderConfig) -> Result<FlagReport> {
    if let Some(report) = ENGINE_FLAGS.get() {
        debug!("engine flags already initialized");
        return Ok(report.clone());
    }

    let report = ENGINE_FLAGS.get_or_try_init(|| {
        let engine_version = EngineVersion::parse(engine.version())?;
        let flags = flags_for(&engine_version, config);
        for flag in &flags {
            engine.set_flags(flag);
        }
        info!(version = %engine_version, ?flags, "engine flags initialized");
        Ok::<_, crate::LoaderError>(FlagReport {
            engine_version,
            flags,
        })
    })?;
    Ok(report.clone())
}

/// The report of the first successful initialization, if any.
pub fn engine_flags() -> Option<&'static FlagReport> {
    ENGINE_FLAGS.get()
}
