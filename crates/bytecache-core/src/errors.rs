use thiserror::Error;

/// Errors surfaced by the compile / load / link / evaluate pipeline.
///
/// None of these are recovered locally: each one is an environment or
/// programmer error (wrong engine build, corrupted blob, missing dependency,
/// bad source), so they are handed straight back to the caller.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine refused the supplied cached data after instantiation.
    #[error("[VM] Cached data rejected: {origin}")]
    CacheRejected { origin: String },

    #[error("Cannot resolve module '{specifier}': {message}")]
    Resolution { specifier: String, message: String },

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Link error: {0}")]
    Link(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Blob header truncated: {len} bytes, need at least {needed}")]
    TruncatedHeader { len: usize, needed: usize },

    /// The header records a source longer than any engine string.
    #[error("Blob header records source length {length}, above the maximum {max}")]
    SourceTooLong { length: u32, max: u32 },

    #[error("Invalid engine version string '{0}'")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    pub fn resolution(specifier: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::Resolution {
            specifier: specifier.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_rejected_message() {
        let err = LoaderError::CacheRejected {
            origin: "app.jsc".to_string(),
        };
        assert_eq!(err.to_string(), "[VM] Cached data rejected: app.jsc");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LoaderError = io.into();
        assert!(matches!(err, LoaderError::Io(_)));
    }

    #[test]
    fn test_resolution_helper() {
        let err = LoaderError::resolution("left-pad", "not installed");
        assert_eq!(
            err.to_string(),
            "Cannot resolve module 'left-pad': not installed"
        );
    }
}
