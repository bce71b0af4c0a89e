//! Installer module contract.
//!
//! An installer knows how to list the versions of one server distribution,
//! put a chosen version into the program root, and describe how to launch it.
//! All methods block; callers run them on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::fetch::{Fetch, FetchError, FetchOrigin};
use crate::supervisor::LaunchSpec;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid manifest from {source_name}: {reason}")]
    Manifest { source_name: String, reason: String },

    #[error("version '{0}' is not available")]
    UnknownVersion(String),

    #[error("no server download for version '{0}'")]
    NoServerDownload(String),

    #[error("a sub-version is required for version '{0}'")]
    MissingSubVersion(String),

    #[error("installer step failed: {0}")]
    Step(String),

    #[error("no server artifact found in {0}")]
    ArtifactNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn manifest(source_name: impl Into<String>, reason: impl ToString) -> Self {
        InstallError::Manifest {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Environment handed to every installer call.
#[derive(Clone)]
pub struct InstallContext {
    /// Where server files are installed and launched from
    pub root_dir: PathBuf,
    /// Manifest and installer download cache
    pub cache_dir: PathBuf,
    pub cache_max_age: Duration,
    pub fetcher: Arc<dyn Fetch>,
    /// Runtime executable used by installers that run helper programs
    pub java: String,
}

impl InstallContext {
    pub fn cache_file(&self, name: &str) -> PathBuf {
        self.cache_dir.join(name)
    }

    /// Fetch `url` through the cache file `cache_name`.
    pub fn fetch_cached(&self, url: &str, cache_name: &str) -> Result<String, InstallError> {
        let cache_path = self.cache_file(cache_name);
        let (content, origin) = self
            .fetcher
            .fetch_or_cache(url, &cache_path, self.cache_max_age)?;
        match origin {
            FetchOrigin::Fresh => tracing::info!("Fetched {}", url),
            FetchOrigin::Cache => tracing::info!("Loaded {} from cache", cache_name),
            FetchOrigin::StaleCache => tracing::warn!("Using stale cache {}", cache_name),
        }
        Ok(content)
    }

    /// Download `url` into the program root under `file_name`.
    pub fn download_to_root(&self, url: &str, file_name: &str) -> Result<PathBuf, InstallError> {
        let target = self.root_dir.join(file_name);
        self.fetcher.download(url, &target)?;
        Ok(target)
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }
}

/// What the user picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub version: String,
    pub sub_version: Option<String>,
    pub channel: Option<String>,
}

impl InstallRequest {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            sub_version: None,
            channel: None,
        }
    }

    pub fn sub_version(mut self, sub_version: impl Into<String>) -> Self {
        self.sub_version = Some(sub_version.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

pub trait ServerInstaller: Send + Sync {
    /// Human readable name shown in the module table.
    fn display_name(&self) -> &str;

    /// Release channels (e.g. Release / Snapshot). Empty when the module has none.
    fn available_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn available_versions(
        &self,
        ctx: &InstallContext,
        channel: Option<&str>,
    ) -> Result<Vec<String>, InstallError>;

    fn available_sub_versions(
        &self,
        _ctx: &InstallContext,
        _version: &str,
    ) -> Result<Vec<String>, InstallError> {
        Ok(Vec::new())
    }

    /// Install the requested version and describe how to launch it.
    fn install(
        &self,
        ctx: &InstallContext,
        request: &InstallRequest,
    ) -> Result<LaunchSpec, InstallError>;

    /// File name pattern of the server artifact this module produces.
    fn artifact_pattern(&self) -> Option<&Regex> {
        None
    }
}
