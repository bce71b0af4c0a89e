//! Plugin archive introspection.
//!
//! A plugin archive is a `.zip` with a `module.toml` at its root:
//!
//! ```toml
//! [module]
//! entry = "server_installer::installer_modules::vanilla::Vanilla"
//!
//! [[types]]
//! name = "server_installer::installer_modules::vanilla::Vanilla"
//! display_name = "Minecraft Vanilla (pinned)"
//! versions = ["1.20.4"]
//! download_url = "https://example.invalid/{version}/server.jar"
//! ```
//!
//! The entry point is resolved in a [`LoadScope`]: the archive's own
//! declarations first, then the host [`Catalog`].

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use zip::result::ZipError;
use zip::ZipArchive;

use super::catalog::Catalog;
use super::error::IntrospectError;
use super::scripted::{ScriptedInstaller, TypeDeclaration, INSTALLER_CONTRACT};
use crate::installer::ServerInstaller;

pub const MANIFEST_NAME: &str = "module.toml";

#[derive(Debug, Deserialize)]
struct ModuleManifest {
    module: Option<ModuleSection>,
    #[serde(default)]
    types: Vec<TypeDeclaration>,
}

#[derive(Debug, Deserialize)]
struct ModuleSection {
    entry: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

/// Type resolution for one archive.
pub struct LoadScope<'a> {
    archive: PathBuf,
    declarations: Vec<TypeDeclaration>,
    host: &'a Catalog,
}

impl<'a> LoadScope<'a> {
    pub fn resolve(&self, identity: &str) -> Result<Box<dyn ServerInstaller>, IntrospectError> {
        if let Some(decl) = self.declarations.iter().find(|d| d.name == identity) {
            if decl.contract != INSTALLER_CONTRACT {
                return Err(IntrospectError::CapabilityMismatch {
                    identity: identity.to_string(),
                    contract: decl.contract.clone(),
                });
            }
            let installer = ScriptedInstaller::from_declaration(decl.clone(), &self.archive)
                .map_err(|reason| IntrospectError::ConstructionFailed {
                    identity: identity.to_string(),
                    reason,
                })?;
            return Ok(Box::new(installer));
        }

        match self.host.get(identity) {
            Some(ctor) => ctor().map_err(|e| IntrospectError::ConstructionFailed {
                identity: identity.to_string(),
                reason: format!("{:#}", e),
            }),
            None => Err(IntrospectError::EntryPointNotFound(identity.to_string())),
        }
    }
}

/// The declared entry point of an archive, not yet constructed.
pub struct EntryPointHandle<'a> {
    identity: String,
    label: String,
    scope: LoadScope<'a>,
}

impl<'a> EntryPointHandle<'a> {
    /// Declared type path.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `name vversion` from `[module]` when present, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn archive(&self) -> &Path {
        &self.scope.archive
    }

    pub fn instantiate(self) -> Result<Box<dyn ServerInstaller>, IntrospectError> {
        self.scope.resolve(&self.identity)
    }
}

/// Read the archive's `module.toml` and prepare its entry point.
pub fn open_entry_point<'a>(
    path: &Path,
    host: &'a Catalog,
) -> Result<EntryPointHandle<'a>, IntrospectError> {
    let content = read_manifest(path)?;
    let manifest: ModuleManifest =
        toml::from_str(&content).map_err(|source| IntrospectError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;

    let section = manifest.module;
    let identity = section
        .as_ref()
        .and_then(|m| m.entry.as_deref())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .ok_or_else(|| IntrospectError::NoEntryPointDeclared(path.to_path_buf()))?
        .to_string();

    let label = match section.as_ref().and_then(|m| m.name.as_deref()) {
        Some(name) => match section.as_ref().and_then(|m| m.version.as_deref()) {
            Some(version) => format!("{} v{}", name, version),
            None => name.to_string(),
        },
        None => identity.clone(),
    };

    Ok(EntryPointHandle {
        identity,
        label,
        scope: LoadScope {
            archive: path.to_path_buf(),
            declarations: manifest.types,
            host,
        },
    })
}

fn read_manifest(path: &Path) -> Result<String, IntrospectError> {
    let archive_err = |source: ZipError| IntrospectError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).map_err(|source| IntrospectError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(archive_err)?;

    let mut entry = match archive.by_name(MANIFEST_NAME) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(IntrospectError::NoEntryPointDeclared(path.to_path_buf()))
        }
        Err(e) => return Err(archive_err(e)),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| archive_err(ZipError::Io(e)))?;
    Ok(content)
}
