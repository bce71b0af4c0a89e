//! Data-driven installers declared by a plugin archive's `[[types]]` tables.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use zip::ZipArchive;

use crate::installer::{InstallContext, InstallError, InstallRequest, ServerInstaller};
use crate::supervisor::LaunchSpec;
use crate::utils::expand_template;

pub const INSTALLER_CONTRACT: &str = "installer";

fn default_contract() -> String {
    INSTALLER_CONTRACT.to_string()
}

/// One `[[types]]` entry of `module.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDeclaration {
    /// Fully-qualified type path
    pub name: String,
    #[serde(default = "default_contract")]
    pub contract: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub channel_versions: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub sub_versions: HashMap<String, Vec<String>>,
    pub download_url: Option<String>,
    /// Archive entry holding the artifact
    pub bundled: Option<String>,
    /// Target file name template; defaults to the source's file name
    pub artifact: Option<String>,
    #[serde(default)]
    pub runtime_args: Vec<String>,
    #[serde(default)]
    pub app_args: Vec<String>,
    pub artifact_pattern: Option<String>,
    pub log_pattern: Option<String>,
    pub stop_command: Option<String>,
}

#[derive(Debug, Clone)]
enum ArtifactSource {
    Download(String),
    Bundled { archive: PathBuf, entry: String },
}

#[derive(Debug)]
pub struct ScriptedInstaller {
    display_name: String,
    decl: TypeDeclaration,
    source: ArtifactSource,
    artifact_regex: Option<Regex>,
}

impl ScriptedInstaller {
    /// Validate a declaration coming from `archive`.
    pub fn from_declaration(decl: TypeDeclaration, archive: &Path) -> Result<Self, String> {
        let source = match (&decl.download_url, &decl.bundled) {
            (Some(url), None) => ArtifactSource::Download(url.clone()),
            (None, Some(entry)) => ArtifactSource::Bundled {
                archive: archive.to_path_buf(),
                entry: entry.clone(),
            },
            _ => return Err("exactly one of download_url or bundled is required".into()),
        };

        let artifact_regex = decl
            .artifact_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| format!("invalid artifact_pattern: {}", e))?;
        if let Some(pattern) = &decl.log_pattern {
            Regex::new(pattern).map_err(|e| format!("invalid log_pattern: {}", e))?;
        }

        let display_name = decl
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| decl.name.rsplit("::").next().unwrap_or(&decl.name).to_string());

        Ok(Self {
            display_name,
            decl,
            source,
            artifact_regex,
        })
    }

    fn versions_for(&self, channel: Option<&str>) -> Vec<String> {
        if let Some(channel) = channel {
            let found = self
                .decl
                .channel_versions
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(channel));
            if let Some((_, versions)) = found {
                return versions.clone();
            }
        }
        self.decl.versions.clone()
    }

    fn artifact_name(&self, source: &str, version: &str, sub_version: Option<&str>) -> String {
        match &self.decl.artifact {
            Some(template) => expand_template(template, version, sub_version),
            None => source.rsplit('/').next().unwrap_or(source).to_string(),
        }
    }
}

impl ServerInstaller for ScriptedInstaller {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn available_types(&self) -> Vec<String> {
        self.decl.channels.clone()
    }

    fn available_versions(
        &self,
        _ctx: &InstallContext,
        channel: Option<&str>,
    ) -> Result<Vec<String>, InstallError> {
        Ok(self.versions_for(channel))
    }

    fn available_sub_versions(
        &self,
        _ctx: &InstallContext,
        version: &str,
    ) -> Result<Vec<String>, InstallError> {
        Ok(self.decl.sub_versions.get(version).cloned().unwrap_or_default())
    }

    fn install(
        &self,
        ctx: &InstallContext,
        request: &InstallRequest,
    ) -> Result<LaunchSpec, InstallError> {
        let known = self.versions_for(request.channel.as_deref());
        let listed_anywhere = known.contains(&request.version)
            || self.decl.channel_versions.values().any(|v| v.contains(&request.version));
        if !listed_anywhere {
            return Err(InstallError::UnknownVersion(request.version.clone()));
        }
        let has_subs = self
            .decl
            .sub_versions
            .get(&request.version)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if has_subs && request.sub_version.is_none() {
            return Err(InstallError::MissingSubVersion(request.version.clone()));
        }

        let version = request.version.as_str();
        let sub_version = request.sub_version.as_deref();
        fs::create_dir_all(ctx.root())?;

        let artifact = match &self.source {
            ArtifactSource::Download(template) => {
                let url = expand_template(template, version, sub_version);
                let name = self.artifact_name(&url, version, sub_version);
                tracing::info!("Installing {} {} from {}", self.display_name, version, url);
                ctx.download_to_root(&url, &name)?
            }
            ArtifactSource::Bundled { archive, entry } => {
                let entry = expand_template(entry, version, sub_version);
                let name = self.artifact_name(&entry, version, sub_version);
                let target = ctx.root().join(&name);
                tracing::info!("Installing {} {} from bundled {}", self.display_name, version, entry);
                extract_entry(archive, &entry, &target)?;
                target
            }
        };

        let mut spec = LaunchSpec::new(artifact).working_dir(ctx.root());
        spec.runtime_args = self.decl.runtime_args.clone();
        spec.app_args = self.decl.app_args.clone();
        spec.stop_command = self.decl.stop_command.clone();
        spec.log_pattern = self.decl.log_pattern.clone();
        Ok(spec)
    }

    fn artifact_pattern(&self) -> Option<&Regex> {
        self.artifact_regex.as_ref()
    }
}

fn extract_entry(archive: &Path, entry: &str, target: &Path) -> Result<(), InstallError> {
    let file = fs::File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| InstallError::Step(format!("cannot reopen {}: {}", archive.display(), e)))?;
    let mut source = zip
        .by_name(entry)
        .map_err(|e| InstallError::Step(format!("bundled entry '{}': {}", entry, e)))?;
    let mut out = fs::File::create(target)?;
    io::copy(&mut source, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(toml_text: &str) -> TypeDeclaration {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_declaration_defaults() {
        let d = decl(
            r#"
            name = "acme::paper::Paper"
            download_url = "https://example.invalid/paper-{version}.jar"
            "#,
        );
        assert_eq!(d.contract, INSTALLER_CONTRACT);
        let installer = ScriptedInstaller::from_declaration(d, Path::new("a.zip")).unwrap();
        assert_eq!(installer.display_name(), "Paper");
        assert!(installer.available_types().is_empty());
    }

    #[test]
    fn test_requires_single_artifact_source() {
        let both = decl(
            r#"
            name = "a::b::C"
            download_url = "https://x/y.jar"
            bundled = "y.jar"
            "#,
        );
        assert!(ScriptedInstaller::from_declaration(both, Path::new("a.zip")).is_err());

        let none = decl(r#"name = "a::b::C""#);
        assert!(ScriptedInstaller::from_declaration(none, Path::new("a.zip")).is_err());
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        let d = decl(
            r#"
            name = "a::b::C"
            bundled = "y.jar"
            log_pattern = "(?P<level>"
            "#,
        );
        let err = ScriptedInstaller::from_declaration(d, Path::new("a.zip")).unwrap_err();
        assert!(err.contains("log_pattern"));
    }

    #[test]
    fn test_channel_versions() {
        let d = decl(
            r#"
            name = "a::b::C"
            bundled = "server.jar"
            channels = ["Release", "Beta"]
            versions = ["1.0", "1.1", "2.0-beta"]
            [channel_versions]
            Release = ["1.0", "1.1"]
            [sub_versions]
            "1.1" = ["b1", "b2"]
            "#,
        );
        let installer = ScriptedInstaller::from_declaration(d, Path::new("a.zip")).unwrap();
        assert_eq!(installer.versions_for(Some("release")), vec!["1.0", "1.1"]);
        assert_eq!(installer.versions_for(Some("Beta")).len(), 3);
        assert_eq!(installer.versions_for(None).len(), 3);
        assert_eq!(installer.artifact_name("dir/server.jar", "1.1", None), "server.jar");
    }
}
