//! User metadata sidecar files.
//!
//! An artifact such as `models/detail.safetensors` may have a sidecar
//! `models/detail.json` holding user-supplied key/value metadata. Missing or
//! broken sidecars never fail the caller: [`SidecarReader::read`] returns an
//! empty document and logs the problem.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use xnet_meta::SidecarReader;
//!
//! let reader = SidecarReader::new().with_read_file(|_| Ok(r#"{"activation text": "ink"}"#.to_owned()))
//!     .with_exists(|_| true);
//!
//! let meta = reader.read(Some(Path::new("models/ink.safetensors")));
//! assert_eq!(meta["activation text"], "ink");
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Flat key/value metadata document.
pub type UserMetadata = serde_json::Map<String, serde_json::Value>;

/// Type alias for the existence check callback.
pub type ExistsFn = dyn Fn(&Path) -> bool + Send + Sync;

/// Type alias for the file reading callback.
pub type ReadFileFn = dyn Fn(&Path) -> io::Result<String> + Send + Sync;

/// Sidecar file extension.
const SIDECAR_EXTENSION: &str = "json";

/// Error reading a sidecar document.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The sidecar exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The sidecar is not valid JSON.
    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The sidecar is valid JSON but not an object.
    #[error("{} does not contain a JSON object", path.display())]
    NotAnObject {
        /// Sidecar path.
        path: PathBuf,
    },
}

/// Reads user metadata sidecars.
///
/// File system access goes through optional callbacks so hosts can route it
/// through their own listing (e.g. a cached directory scan). Both default to
/// the real file system.
#[derive(Default)]
pub struct SidecarReader {
    exists: Option<Box<ExistsFn>>,
    read_file: Option<Box<ReadFileFn>>,
}

impl SidecarReader {
    /// Create a reader backed by the file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the existence check callback.
    #[must_use]
    pub fn with_exists<F>(mut self, exists: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.exists = Some(Box::new(exists));
        self
    }

    /// Set the file reading callback.
    #[must_use]
    pub fn with_read_file<F>(mut self, read_file: F) -> Self
    where
        F: Fn(&Path) -> io::Result<String> + Send + Sync + 'static,
    {
        self.read_file = Some(Box::new(read_file));
        self
    }

    /// Sidecar path for an artifact: same basename, `.json` extension.
    #[must_use]
    pub fn sidecar_path(artifact: &Path) -> PathBuf {
        artifact.with_extension(SIDECAR_EXTENSION)
    }

    /// Read the sidecar of `artifact`.
    ///
    /// Returns `Ok(None)` if there is no sidecar.
    pub fn try_read(&self, artifact: &Path) -> Result<Option<UserMetadata>, MetadataError> {
        let path = Self::sidecar_path(artifact);

        let exists = self
            .exists
            .as_ref()
            .map_or_else(|| path.exists(), |exists| exists(&path));
        if !exists {
            return Ok(None);
        }

        let content = match &self.read_file {
            Some(read_file) => read_file(&path),
            None => std::fs::read_to_string(&path),
        }
        .map_err(|source| MetadataError::Io {
            path: path.clone(),
            source,
        })?;

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| MetadataError::Parse {
                path: path.clone(),
                source,
            })?;

        match value {
            serde_json::Value::Object(map) => Ok(Some(map)),
            _ => Err(MetadataError::NotAnObject { path }),
        }
    }

    /// Read the sidecar of `artifact`, falling back to an empty document.
    ///
    /// `None` (no artifact) and missing sidecars yield an empty document
    /// silently; read and parse failures are logged as warnings.
    #[must_use]
    pub fn read(&self, artifact: Option<&Path>) -> UserMetadata {
        let Some(artifact) = artifact else {
            return UserMetadata::new();
        };

        match self.try_read(artifact) {
            Ok(metadata) => metadata.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(artifact = %artifact.display(), error = %e, "Failed to read user metadata");
                UserMetadata::new()
            }
        }
    }
}
