//! Installer configuration at `installer_data/config/installer.toml`
//!
//! Directory layout and settings are resolved once at start-up and passed
//! explicitly to the registry, the install context and the supervisor.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::launch::{OutputMode, StdinMode};

pub const DATA_DIR_NAME: &str = "installer_data";
pub const CONFIG_FILE_NAME: &str = "installer.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write default config {path}: {source}")]
    WriteDefault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ─── Paths ───────────────────────────────────────────────────

/// Every on-disk location the installer uses.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Server root: artifacts are installed and launched here
    pub root: PathBuf,
    pub data: PathBuf,
    pub config: PathBuf,
    pub logs: PathBuf,
    /// External plugin archives
    pub modules: PathBuf,
    /// Manifest caches and installer downloads
    pub temp: PathBuf,
}

impl AppPaths {
    /// Layout below an explicit root directory.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data = root.join(DATA_DIR_NAME);
        Self {
            config: data.join("config"),
            logs: data.join("logs"),
            modules: data.join("modules"),
            temp: data.join("temp"),
            data,
            root,
        }
    }

    /// Resolve from the environment.
    ///
    /// `SERVER_INSTALLER_ROOT` overrides the current directory and
    /// `SERVER_INSTALLER_MODULES_PATH` overrides the modules directory
    /// (both mainly for tests and development).
    pub fn resolve() -> Self {
        let root = std::env::var("SERVER_INSTALLER_ROOT")
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())
            .unwrap_or_else(|_| PathBuf::from("."));
        let mut paths = Self::under(root);
        if let Ok(dir) = std::env::var("SERVER_INSTALLER_MODULES_PATH") {
            paths.modules = PathBuf::from(dir);
        }
        paths
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join(CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs.join("latest.log")
    }

    /// Create every missing directory of the layout.
    pub fn bootstrap(&self) -> Result<(), ConfigError> {
        for dir in [&self.data, &self.config, &self.logs, &self.modules, &self.temp] {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
                tracing::debug!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

// ─── Settings ────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    pub log_to_file: bool,
    /// Include targets and line numbers in log output
    pub detailed_log: bool,
    /// Maximum age of cached version manifests
    pub cache_max_age_secs: u64,
    pub runtime: RuntimeConfig,
    pub console: ConsoleConfig,
}

/// The runtime engine used to launch server artifacts.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub executable: String,
    /// Arguments the host considers active for the engine; every child inherits them
    pub args: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub output: OutputMode,
    pub stdin: StdinMode,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            detailed_log: false,
            cache_max_age_secs: 60,
            runtime: RuntimeConfig::default(),
            console: ConsoleConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executable: "java".to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            output: OutputMode::Captured,
            stdin: StdinMode::Open,
        }
    }
}

impl GlobalConfig {
    /// Load the config file, writing a default one when it does not exist.
    /// An unparsable file falls back to defaults with a warning.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let cfg = Self::default();
            cfg.save(path)?;
            tracing::warn!("Configuration file not found, created default at {}", path.display());
            return Ok(cfg);
        }

        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    "Cannot read configuration {}: {}, using default settings",
                    path.display(),
                    e
                );
                return Ok(Self::default());
            }
        };
        match toml::from_str(&s) {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::warn!(
                    "Invalid configuration {}: {}, using default settings",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::WriteDefault {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Runtime arguments the host treats as active: configured ones first,
    /// then `SERVER_INSTALLER_RUNTIME_ARGS` (whitespace separated).
    pub fn inherited_runtime_args(&self) -> Vec<String> {
        let mut args = self.runtime.args.clone();
        if let Ok(extra) = std::env::var("SERVER_INSTALLER_RUNTIME_ARGS") {
            args.extend(extra.split_whitespace().map(str::to_string));
        }
        args
    }
}
