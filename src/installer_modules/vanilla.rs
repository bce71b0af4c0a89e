//! Minecraft vanilla server from Mojang's version manifest.

use regex::Regex;
use serde::Deserialize;

use super::{MINECRAFT_LOG_PATTERN, MINECRAFT_STOP_COMMAND};
use crate::installer::{InstallContext, InstallError, InstallRequest, ServerInstaller};
use crate::supervisor::LaunchSpec;

pub const MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest.json";
const MANIFEST_CACHE: &str = "vanilla_versions.json";

pub const CHANNELS: [&str; 3] = ["Release", "Snapshot", "All"];

#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(rename = "releaseTime", default)]
    pub release_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionDetails {
    downloads: Option<Downloads>,
}

#[derive(Debug, Deserialize)]
struct Downloads {
    server: Option<Download>,
}

#[derive(Debug, Deserialize)]
struct Download {
    url: String,
    size: Option<u64>,
}

pub struct Vanilla {
    artifact_pattern: Regex,
}

impl Vanilla {
    pub const TYPE_PATH: &'static str = concat!(module_path!(), "::Vanilla");

    pub fn construct() -> anyhow::Result<Box<dyn ServerInstaller>> {
        Ok(Box::new(Self {
            artifact_pattern: Regex::new(r"^(server|minecraft_server.*)\.jar$")?,
        }))
    }

    fn manifest(&self, ctx: &InstallContext) -> Result<VersionManifest, InstallError> {
        let content = ctx.fetch_cached(MANIFEST_URL, MANIFEST_CACHE)?;
        parse_manifest(&content)
    }
}

pub fn parse_manifest(content: &str) -> Result<VersionManifest, InstallError> {
    serde_json::from_str(content).map_err(|e| InstallError::manifest(MANIFEST_URL, e))
}

/// Version ids of `channel` in manifest order (newest first).
/// `All` or no channel keeps everything.
pub fn filter_versions(manifest: &VersionManifest, channel: Option<&str>) -> Vec<String> {
    manifest
        .versions
        .iter()
        .filter(|v| match channel {
            None => true,
            Some(c) if c.eq_ignore_ascii_case("all") => true,
            Some(c) => v.kind.eq_ignore_ascii_case(c),
        })
        .map(|v| v.id.clone())
        .collect()
}

impl ServerInstaller for Vanilla {
    fn display_name(&self) -> &str {
        "Minecraft-Vanilla"
    }

    fn available_types(&self) -> Vec<String> {
        CHANNELS.iter().map(|c| c.to_string()).collect()
    }

    fn available_versions(
        &self,
        ctx: &InstallContext,
        channel: Option<&str>,
    ) -> Result<Vec<String>, InstallError> {
        Ok(filter_versions(&self.manifest(ctx)?, channel))
    }

    fn install(
        &self,
        ctx: &InstallContext,
        request: &InstallRequest,
    ) -> Result<LaunchSpec, InstallError> {
        tracing::info!("Installing Vanilla Minecraft version: {}", request.version);
        let manifest = self.manifest(ctx)?;
        let entry = manifest
            .versions
            .iter()
            .find(|v| v.id == request.version)
            .ok_or_else(|| InstallError::UnknownVersion(request.version.clone()))?;
        tracing::info!(
            "Version {} ({}), released {}",
            entry.id,
            entry.kind,
            entry.release_time.as_deref().unwrap_or("unknown")
        );

        let details_cache = format!("vanilla_{}.json", entry.id);
        let details: VersionDetails = serde_json::from_str(&ctx.fetch_cached(&entry.url, &details_cache)?)
            .map_err(|e| InstallError::manifest(&entry.url, e))?;
        let server = details
            .downloads
            .and_then(|d| d.server)
            .ok_or_else(|| InstallError::NoServerDownload(entry.id.clone()))?;
        if let Some(size) = server.size {
            tracing::debug!("Server jar is {} bytes", size);
        }

        let file_name = server
            .url
            .rsplit('/')
            .next()
            .filter(|name| name.ends_with(".jar"))
            .unwrap_or("server.jar")
            .to_string();
        let artifact = ctx.download_to_root(&server.url, &file_name)?;

        Ok(LaunchSpec::new(artifact)
            .working_dir(ctx.root())
            .app_arg("nogui")
            .stop_command(MINECRAFT_STOP_COMMAND)
            .log_pattern(MINECRAFT_LOG_PATTERN))
    }

    fn artifact_pattern(&self) -> Option<&Regex> {
        Some(&self.artifact_pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use std::sync::Arc;
    use std::time::Duration;

    const MANIFEST: &str = r#"{
        "latest": {"release": "1.20.4", "snapshot": "24w03a"},
        "versions": [
            {"id": "24w03a", "type": "snapshot", "url": "https://meta.invalid/24w03a.json", "time": "t", "releaseTime": "t"},
            {"id": "1.20.4", "type": "release", "url": "https://meta.invalid/1.20.4.json", "time": "t", "releaseTime": "2023-12-07T12:56:20+00:00"},
            {"id": "b1.7.3", "type": "old_beta", "url": "https://meta.invalid/b1.7.3.json", "time": "t", "releaseTime": "t"}
        ]
    }"#;

    fn context(root: &std::path::Path, fetcher: StaticFetcher) -> InstallContext {
        InstallContext {
            root_dir: root.to_path_buf(),
            cache_dir: root.join("cache"),
            cache_max_age: Duration::from_secs(60),
            fetcher: Arc::new(fetcher),
            java: "java".into(),
        }
    }

    #[test]
    fn test_filter_versions_by_channel() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        assert_eq!(filter_versions(&manifest, Some("Release")), vec!["1.20.4"]);
        assert_eq!(filter_versions(&manifest, Some("Snapshot")), vec!["24w03a"]);
        assert_eq!(filter_versions(&manifest, Some("All")).len(), 3);
        assert_eq!(filter_versions(&manifest, None).len(), 3);
    }

    #[test]
    fn test_install_downloads_server_jar() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::default()
            .text(MANIFEST_URL, MANIFEST)
            .text(
                "https://meta.invalid/1.20.4.json",
                r#"{"downloads": {"server": {"url": "https://cdn.invalid/abc/server.jar", "size": 4}}}"#,
            )
            .file("https://cdn.invalid/abc/server.jar", b"jar!");
        let ctx = context(tmp.path(), fetcher);

        let vanilla = Vanilla::construct().unwrap();
        let spec = vanilla.install(&ctx, &InstallRequest::new("1.20.4")).unwrap();

        assert_eq!(spec.artifact, tmp.path().join("server.jar"));
        assert_eq!(std::fs::read(&spec.artifact).unwrap(), b"jar!");
        assert_eq!(spec.app_args, vec!["nogui".to_string()]);
        assert_eq!(spec.stop_command.as_deref(), Some("stop"));
        assert!(vanilla.artifact_pattern().unwrap().is_match("server.jar"));
    }

    #[test]
    fn test_install_without_server_download() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::default()
            .text(MANIFEST_URL, MANIFEST)
            .text("https://meta.invalid/b1.7.3.json", r#"{"downloads": {"client": {"url": "x"}}}"#);
        let ctx = context(tmp.path(), fetcher);

        let err = Vanilla::construct()
            .unwrap()
            .install(&ctx, &InstallRequest::new("b1.7.3"))
            .unwrap_err();
        assert!(matches!(err, InstallError::NoServerDownload(ref v) if v == "b1.7.3"));
    }

    #[test]
    fn test_install_unknown_version() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), StaticFetcher::default().text(MANIFEST_URL, MANIFEST));
        let err = Vanilla::construct()
            .unwrap()
            .install(&ctx, &InstallRequest::new("9.9"))
            .unwrap_err();
        assert!(matches!(err, InstallError::UnknownVersion(_)));
    }
}
