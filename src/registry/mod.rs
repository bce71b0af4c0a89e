//! Module Registry - discovers, instantiates and deduplicates installer modules
//!
//! Two origins feed the registry, in this order:
//! 1. the host [`Catalog`] (built-in modules, self-named units only)
//! 2. `.zip` plugin archives in the modules directory
//!
//! Identities are unique: an external module with a known identity replaces
//! the registered one at the same ordinal.

pub mod archive;
pub mod catalog;
pub mod error;
pub mod scripted;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use catalog::{Catalog, Constructor};
pub use error::{IntrospectError, RegistryError};

use crate::installer::ServerInstaller;

pub const PLUGIN_EXTENSION: &str = "zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Internal,
    External(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Internal => write!(f, "internal"),
            Origin::External(path) => write!(f, "external ({})", path.display()),
        }
    }
}

/// One registered installer module.
#[derive(Clone)]
pub struct ModuleDescriptor {
    /// Fully-qualified type path
    pub identity: String,
    pub display_name: String,
    pub origin: Origin,
    /// Channels reported at registration
    pub channels: Vec<String>,
    installer: Arc<dyn ServerInstaller>,
}

impl ModuleDescriptor {
    pub fn new(identity: impl Into<String>, origin: Origin, installer: Box<dyn ServerInstaller>) -> Self {
        let installer: Arc<dyn ServerInstaller> = Arc::from(installer);
        Self {
            identity: identity.into(),
            display_name: installer.display_name().to_string(),
            origin,
            channels: installer.available_types(),
            installer,
        }
    }

    pub fn installer(&self) -> Arc<dyn ServerInstaller> {
        self.installer.clone()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("identity", &self.identity)
            .field("display_name", &self.display_name)
            .field("origin", &self.origin)
            .field("channels", &self.channels)
            .finish()
    }
}

// ─── Discovery report ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// Replaced the module with this display name
    Overwrite(String),
    SkippedNamespace,
    SkippedNoEntryPoint,
    SkippedLoadError,
}

impl LoadStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, LoadStatus::Loaded | LoadStatus::Overwrite(_))
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Overwrite(name) => write!(f, "overwrite({})", name),
            LoadStatus::SkippedNamespace => write!(f, "skipped(not in allowed namespace)"),
            LoadStatus::SkippedNoEntryPoint => write!(f, "skipped(no entry point)"),
            LoadStatus::SkippedLoadError => write!(f, "skipped(load error)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub archive: PathBuf,
    pub identity: Option<String>,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub outcomes: Vec<ArchiveOutcome>,
}

impl DiscoveryReport {
    pub fn registered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_registered()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.registered()
    }

    pub fn status_of(&self, file_name: &str) -> Option<&LoadStatus> {
        self.outcomes
            .iter()
            .find(|o| o.archive.file_name().and_then(|n| n.to_str()) == Some(file_name))
            .map(|o| &o.status)
    }
}

// ─── Registry ────────────────────────────────────────────────

pub struct ModuleRegistry {
    namespace: String,
    catalog: Catalog,
    modules: Vec<ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Registry over `catalog` using the built-in module namespace.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_namespace(catalog, crate::installer_modules::NAMESPACE)
    }

    pub fn with_namespace(catalog: Catalog, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            catalog,
            modules: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Construct every self-named unit of the host catalog. Returns how many
    /// were registered; construction failures are logged and skipped.
    pub fn discover_internal(&mut self) -> usize {
        tracing::info!("Loading internal installer modules...");
        let mut count = 0;
        let units: Vec<(String, Constructor)> = self
            .catalog
            .iter()
            .filter(|(path, _)| catalog::is_self_named_unit(&self.namespace, path))
            .map(|(path, ctor)| (path.to_string(), ctor))
            .collect();

        for (identity, ctor) in units {
            match ctor() {
                Ok(installer) => {
                    let descriptor = ModuleDescriptor::new(identity.clone(), Origin::Internal, installer);
                    tracing::info!("Loaded internal installer: {} ({})", descriptor.display_name, identity);
                    self.upsert(descriptor);
                    count += 1;
                }
                Err(e) => tracing::error!("Failed to construct internal installer {}: {:#}", identity, e),
            }
        }
        count
    }

    /// Load every `.zip` archive directly inside `dir`, in file-name order.
    pub fn discover_external(&mut self, dir: &Path) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        tracing::info!("Scanning {} for plugin archives...", dir.display());

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Modules directory {} is not readable: {}", dir.display(), e);
                return report;
            }
        };

        let mut archives: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(PLUGIN_EXTENSION)
            })
            .collect();
        archives.sort();

        if archives.is_empty() {
            tracing::warn!("No plugin archives found in {}", dir.display());
        }

        for path in archives {
            let outcome = self.load_archive(&path);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tracing::info!("Found plugin archive: {} - {}", file_name, outcome.status);
            report.outcomes.push(outcome);
        }
        report
    }

    fn load_archive(&mut self, path: &Path) -> ArchiveOutcome {
        let mut outcome = ArchiveOutcome {
            archive: path.to_path_buf(),
            identity: None,
            status: LoadStatus::SkippedLoadError,
        };

        let handle = match archive::open_entry_point(path, &self.catalog) {
            Ok(handle) => handle,
            Err(IntrospectError::NoEntryPointDeclared(_)) => {
                outcome.status = LoadStatus::SkippedNoEntryPoint;
                return outcome;
            }
            Err(e) => {
                tracing::error!("{}", e);
                return outcome;
            }
        };

        let identity = handle.identity().to_string();
        outcome.identity = Some(identity.clone());
        if !catalog::in_namespace(&self.namespace, &identity) {
            tracing::debug!("{} is outside {}", identity, self.namespace);
            outcome.status = LoadStatus::SkippedNamespace;
            return outcome;
        }

        tracing::debug!("Instantiating {} from {}", handle.label(), path.display());
        let installer = match handle.instantiate() {
            Ok(installer) => installer,
            Err(e) => {
                tracing::error!("{}", e);
                return outcome;
            }
        };

        let descriptor = ModuleDescriptor::new(identity, Origin::External(path.to_path_buf()), installer);
        outcome.status = match self.upsert(descriptor) {
            Some(replaced) => LoadStatus::Overwrite(replaced),
            None => LoadStatus::Loaded,
        };
        outcome
    }

    /// Replace the module with the same identity in place, or append.
    /// Returns the display name of the replaced module.
    pub fn upsert(&mut self, descriptor: ModuleDescriptor) -> Option<String> {
        match self.modules.iter_mut().find(|m| m.identity == descriptor.identity) {
            Some(slot) => {
                let replaced = std::mem::replace(slot, descriptor);
                Some(replaced.display_name)
            }
            None => {
                self.modules.push(descriptor);
                None
            }
        }
    }

    pub fn all(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Zero-based ordinal.
    pub fn get(&self, ordinal: usize) -> Option<&ModuleDescriptor> {
        self.modules.get(ordinal)
    }

    pub fn find(&self, identity: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn ensure_not_empty(&self) -> Result<(), RegistryError> {
        if self.modules.is_empty() {
            Err(RegistryError::Empty)
        } else {
            Ok(())
        }
    }
}
