//! Minecraft Forge server: promotions manifest, installer download and
//! `--installServer` run.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;
use serde::Deserialize;

use super::{MINECRAFT_LOG_PATTERN, MINECRAFT_STOP_COMMAND};
use crate::artifact;
use crate::installer::{InstallContext, InstallError, InstallRequest, ServerInstaller};
use crate::supervisor::LaunchSpec;

pub const PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";
const PROMOTIONS_CACHE: &str = "forge_promotions.json";
const MAVEN_BASE: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";

#[derive(Debug, Deserialize)]
pub struct Promotions {
    pub promos: HashMap<String, String>,
}

impl Promotions {
    /// Distinct Minecraft versions, newest first.
    pub fn minecraft_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .promos
            .keys()
            .filter_map(|key| split_promo_key(key).map(|(mc, _)| mc.to_string()))
            .collect();
        versions.sort_by(|a, b| compare_versions(b, a));
        versions.dedup();
        versions
    }

    /// Recommended build first, then latest, without duplicates.
    pub fn builds(&self, mc_version: &str) -> Vec<String> {
        let mut builds = Vec::new();
        for kind in ["recommended", "latest"] {
            if let Some(build) = self.promos.get(&format!("{}-{}", mc_version, kind)) {
                if !builds.contains(build) {
                    builds.push(build.clone());
                }
            }
        }
        builds
    }
}

/// `1.20.1-recommended` → (`1.20.1`, `recommended`)
fn split_promo_key(key: &str) -> Option<(&str, &str)> {
    let (mc, kind) = key.rsplit_once('-')?;
    matches!(kind, "latest" | "recommended").then_some((mc, kind))
}

/// Numeric comparison of dotted versions; `1.7.10_pre4` compares as `1.7.10`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(v: &str) -> Vec<u64> {
        v.split('.')
            .map(|p| {
                let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }
    parts(a).cmp(&parts(b)).then_with(|| a.cmp(b))
}

pub struct Forge {
    artifact_pattern: Regex,
}

impl Forge {
    pub const TYPE_PATH: &'static str = concat!(module_path!(), "::Forge");

    pub fn construct() -> anyhow::Result<Box<dyn ServerInstaller>> {
        Ok(Box::new(Self {
            artifact_pattern: Regex::new(r"^forge-.+\.jar$")?,
        }))
    }

    fn promotions(&self, ctx: &InstallContext) -> Result<Promotions, InstallError> {
        let content = ctx.fetch_cached(PROMOTIONS_URL, PROMOTIONS_CACHE)?;
        serde_json::from_str(&content).map_err(|e| InstallError::manifest(PROMOTIONS_URL, e))
    }

    fn download_installer(&self, ctx: &InstallContext, coordinate: &str) -> Result<PathBuf, InstallError> {
        let file_name = format!("forge-{}-installer.jar", coordinate);
        let target = ctx.cache_file(&file_name);
        if target.is_file() {
            tracing::info!("Using cached {}", file_name);
            return Ok(target);
        }
        let url = format!("{}/{}/{}", MAVEN_BASE, coordinate, file_name);
        ctx.fetcher.download(&url, &target)?;
        Ok(target)
    }

    fn run_installer(&self, ctx: &InstallContext, installer: &Path) -> Result<(), InstallError> {
        tracing::info!("Running Forge installer (this may take a while)...");
        let status = Command::new(&ctx.java)
            .arg("-jar")
            .arg(installer)
            .arg("--installServer")
            .arg(ctx.root())
            .current_dir(ctx.root())
            .stdin(Stdio::null())
            .status()
            .map_err(|e| InstallError::Step(format!("cannot run '{}': {}", ctx.java, e)))?;
        if !status.success() {
            return Err(InstallError::Step(format!("Forge installer exited with {}", status)));
        }
        Ok(())
    }

    /// Launch description for an installed server in `root`.
    fn launch_spec(&self, root: &Path, coordinate: &str) -> Result<LaunchSpec, InstallError> {
        let args_file = args_file(coordinate);
        let spec = if root.join(&args_file).is_file() {
            LaunchSpec::new(format!("@{}", args_file.to_string_lossy())).artifact_flag(None)
        } else {
            let jar = artifact::locate_all(root, &self.artifact_pattern)
                .into_iter()
                .find(|path| !is_installer_jar(path))
                .ok_or_else(|| InstallError::ArtifactNotFound(root.to_path_buf()))?;
            LaunchSpec::new(jar)
        };
        Ok(spec
            .working_dir(root)
            .app_arg("nogui")
            .stop_command(MINECRAFT_STOP_COMMAND)
            .log_pattern(MINECRAFT_LOG_PATTERN))
    }
}

/// Argument file written by installers for 1.17 and newer.
fn args_file(coordinate: &str) -> PathBuf {
    let name = if cfg!(windows) { "win_args.txt" } else { "unix_args.txt" };
    ["libraries", "net", "minecraftforge", "forge", coordinate, name]
        .iter()
        .collect()
}

fn is_installer_jar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with("-installer.jar"))
        .unwrap_or(false)
}

impl ServerInstaller for Forge {
    fn display_name(&self) -> &str {
        "Minecraft-FORGE"
    }

    fn available_versions(
        &self,
        ctx: &InstallContext,
        _channel: Option<&str>,
    ) -> Result<Vec<String>, InstallError> {
        Ok(self.promotions(ctx)?.minecraft_versions())
    }

    fn available_sub_versions(
        &self,
        ctx: &InstallContext,
        version: &str,
    ) -> Result<Vec<String>, InstallError> {
        Ok(self.promotions(ctx)?.builds(version))
    }

    fn install(
        &self,
        ctx: &InstallContext,
        request: &InstallRequest,
    ) -> Result<LaunchSpec, InstallError> {
        let builds = self.promotions(ctx)?.builds(&request.version);
        if builds.is_empty() {
            return Err(InstallError::UnknownVersion(request.version.clone()));
        }
        let build = match &request.sub_version {
            Some(build) => build.clone(),
            None => return Err(InstallError::MissingSubVersion(request.version.clone())),
        };
        if !builds.contains(&build) {
            return Err(InstallError::UnknownVersion(format!("{}-{}", request.version, build)));
        }
        tracing::info!(
            "Installing Forge Minecraft version: {}, Forge version: {}",
            request.version,
            build
        );

        let coordinate = format!("{}-{}", request.version, build);
        std::fs::create_dir_all(ctx.root())?;
        let installer = self.download_installer(ctx, &coordinate)?;
        self.run_installer(ctx, &installer)?;
        self.launch_spec(ctx.root(), &coordinate)
    }

    fn artifact_pattern(&self) -> Option<&Regex> {
        Some(&self.artifact_pattern)
    }
}
