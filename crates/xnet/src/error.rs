//! CLI error types.

use xnet_config::ConfigError;
use xnet_dispatch::RegistryError;
use xnet_meta::MetadataError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}
