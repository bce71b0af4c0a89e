use std::path::PathBuf;

use thiserror::Error;

/// Why a plugin archive did not yield an installer. Always recoverable:
/// the registry logs it and moves on to the next archive.
#[derive(Error, Debug)]
pub enum IntrospectError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid module.toml in {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} declares no entry point")]
    NoEntryPointDeclared(PathBuf),

    #[error("entry point '{0}' cannot be resolved")]
    EntryPointNotFound(String),

    #[error("failed to construct '{identity}': {reason}")]
    ConstructionFailed { identity: String, reason: String },

    #[error("'{identity}' implements '{contract}', not an installer")]
    CapabilityMismatch { identity: String, contract: String },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no installer modules were loaded")]
    Empty,
}
