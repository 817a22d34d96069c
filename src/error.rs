use std::path::PathBuf;
use thiserror::Error;

/// Fault classes surfaced by layerlens operations.
///
/// Every variant renders as a single human-readable line; the binary prints
/// it to stderr and exits nonzero without a backtrace.
#[derive(Error, Debug)]
pub enum LensError {
    /// Malformed user input: image reference, layer index, setting key
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image metadata contradicts itself (history vs. manifest layers)
    #[error("inconsistent image metadata: {0}")]
    DataInconsistency(String),

    /// Manifest is neither a single-platform manifest nor a resolvable index
    #[error("unsupported manifest media type: {0}")]
    UnsupportedMediaType(String),

    /// A manifest list did not resolve to exactly one platform
    #[error("platform resolution failed: {0}")]
    PlatformResolution(String),

    /// Registry request failed for a reason other than authentication
    #[error("registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Registry rejected our credentials (or their absence)
    #[error("authentication failed for {registry}: {message} - store credentials in the REGISTRY_USERNAME and REGISTRY_PASSWORD environment variables and retry")]
    RegistryAuth { registry: String, message: String },

    /// Local filesystem operation failed
    #[error("filesystem error at {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },

    /// Symlink creation failed; some platforms gate this behind privileges
    #[error("could not create symlink at {}: {message} - on Windows this requires Developer Mode or elevated privileges", path.display())]
    SymlinkCreate { path: PathBuf, message: String },

    /// I/O error without a more specific classification
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LensError {
    /// Filesystem failure tied to a concrete path.
    pub fn filesystem(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        LensError::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Symlink-creation failure tied to the link path.
    pub fn symlink(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        LensError::SymlinkCreate {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LensError {
    fn from(err: serde_json::Error) -> Self {
        LensError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LensError>;
