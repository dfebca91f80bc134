use thiserror::Error;

use crate::handle::AssetHandle;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0} not found in registry")]
    NotFound(AssetHandle),

    #[error("asset {0} has no backing file (memory-only)")]
    MemoryOnly(AssetHandle),

    #[error("failed to read registry file: {0}")]
    RegistryIo(#[from] std::io::Error),

    #[error("registry file is missing required key '{0}'")]
    RegistryCorrupt(&'static str),

    #[error("registry entry on line {line} could not be parsed: {reason}")]
    RegistryParse { line: usize, reason: String },

    #[error("import failed for '{path}': {reason}")]
    ImportFailed { path: String, reason: String },

    #[error("asset loader thread has already shut down")]
    LoaderShutDown,
}

pub type Result<T> = std::result::Result<T, AssetError>;
