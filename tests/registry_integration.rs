//! Registry discovery against real plugin archives on disk.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use server_installer::fetch::{Fetch, FetchError};
use server_installer::installer::{InstallContext, InstallRequest};
use server_installer::installer_modules::{builtin_catalog, forge::Forge, vanilla::Vanilla, NAMESPACE};
use server_installer::registry::{Catalog, LoadStatus, ModuleRegistry, Origin, RegistryError};
use zip::write::FileOptions;

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in files {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

fn write_plugin(dir: &Path, file_name: &str, manifest: &str) {
    write_zip(&dir.join(file_name), &[("module.toml", manifest.as_bytes())]);
}

fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new(builtin_catalog());
    assert_eq!(registry.discover_internal(), 2);
    registry
}

/// Offline fetcher: every request fails.
struct Offline;

impl Fetch for Offline {
    fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Http {
            url: url.to_string(),
            reason: "offline".into(),
        })
    }

    fn download(&self, url: &str, _target: &Path) -> Result<u64, FetchError> {
        self.fetch_text(url).map(|_| 0)
    }
}

#[test]
fn test_external_module_replaces_builtin_in_place() {
    let plugins = tempfile::tempdir().unwrap();
    write_plugin(
        plugins.path(),
        "vanilla-pinned.zip",
        &format!(
            r#"
[module]
name = "vanilla-pinned"
version = "1.0.0"
entry = "{path}"

[[types]]
name = "{path}"
display_name = "Vanilla (pinned)"
channels = ["Release"]
versions = ["1.20.4"]
download_url = "https://example.invalid/{{version}}/server.jar"
"#,
            path = Vanilla::TYPE_PATH
        ),
    );

    let mut registry = builtin_registry();
    assert_eq!(registry.get(0).unwrap().display_name, "Minecraft-Vanilla");
    assert_eq!(registry.get(1).unwrap().display_name, "Minecraft-FORGE");

    let report = registry.discover_external(plugins.path());
    assert_eq!(
        report.status_of("vanilla-pinned.zip"),
        Some(&LoadStatus::Overwrite("Minecraft-Vanilla".into()))
    );

    // Vanilla, Vanilla (external), Forge → two modules, external Vanilla first
    assert_eq!(registry.len(), 2);
    let first = registry.get(0).unwrap();
    assert_eq!(first.identity, Vanilla::TYPE_PATH);
    assert_eq!(first.display_name, "Vanilla (pinned)");
    assert_eq!(first.channels, vec!["Release".to_string()]);
    assert_eq!(
        first.origin,
        Origin::External(plugins.path().join("vanilla-pinned.zip"))
    );
    let second = registry.get(1).unwrap();
    assert_eq!(second.identity, Forge::TYPE_PATH);
    assert_eq!(second.origin, Origin::Internal);
}

#[test]
fn test_internal_vanilla_with_external_vanilla_and_forge() {
    let plugins = tempfile::tempdir().unwrap();
    write_plugin(
        plugins.path(),
        "forge.zip",
        &format!(
            r#"
[module]
entry = "{path}"

[[types]]
name = "{path}"
display_name = "Forge (external)"
versions = ["1.20.1"]
download_url = "https://example.invalid/forge-{{version}}.jar"
"#,
            path = Forge::TYPE_PATH
        ),
    );
    write_plugin(
        plugins.path(),
        "vanilla.zip",
        &format!(
            r#"
[module]
entry = "{path}"

[[types]]
name = "{path}"
display_name = "Vanilla (external)"
versions = ["1.20.4"]
download_url = "https://example.invalid/{{version}}/server.jar"
"#,
            path = Vanilla::TYPE_PATH
        ),
    );

    let catalog = Catalog::new().with(Vanilla::TYPE_PATH, Vanilla::construct);
    let mut registry = ModuleRegistry::new(catalog);
    assert_eq!(registry.discover_internal(), 1);

    let report = registry.discover_external(plugins.path());
    assert_eq!(report.status_of("forge.zip"), Some(&LoadStatus::Loaded));
    assert_eq!(
        report.status_of("vanilla.zip"),
        Some(&LoadStatus::Overwrite("Minecraft-Vanilla".into()))
    );

    assert_eq!(registry.len(), 2);
    let first = registry.get(0).unwrap();
    assert_eq!(first.identity, Vanilla::TYPE_PATH);
    assert_eq!(first.display_name, "Vanilla (external)");
    assert_eq!(first.origin, Origin::External(plugins.path().join("vanilla.zip")));
    let second = registry.get(1).unwrap();
    assert_eq!(second.identity, Forge::TYPE_PATH);
    assert_eq!(second.display_name, "Forge (external)");
    assert_eq!(second.origin, Origin::External(plugins.path().join("forge.zip")));
}

#[test]
fn test_archive_may_name_host_type() {
    let plugins = tempfile::tempdir().unwrap();
    write_plugin(
        plugins.path(),
        "forge.zip",
        &format!("[module]\nentry = \"{}\"\n", Forge::TYPE_PATH),
    );

    let mut registry = builtin_registry();
    let report = registry.discover_external(plugins.path());
    assert_eq!(
        report.status_of("forge.zip"),
        Some(&LoadStatus::Overwrite("Minecraft-FORGE".into()))
    );
    assert_eq!(registry.len(), 2);
    assert!(matches!(registry.get(1).unwrap().origin, Origin::External(_)));
}

#[test]
fn test_bad_archives_do_not_stop_the_scan() {
    let plugins = tempfile::tempdir().unwrap();
    let dir = plugins.path();
    fs::write(dir.join("a_corrupt.zip"), &b"PK\x03\x04 truncated"[..]).unwrap();
    write_zip(&dir.join("b_no_manifest.zip"), &[("readme.txt", &b"hello"[..])]);
    write_plugin(
        dir,
        "c_paper.zip",
        &format!(
            r#"
[module]
entry = "{ns}::paper_mc::PaperMc"

[[types]]
name = "{ns}::paper_mc::PaperMc"
display_name = "Paper"
versions = ["1.20.4"]
download_url = "https://example.invalid/paper-{{version}}.jar"
"#,
            ns = NAMESPACE
        ),
    );
    write_plugin(
        dir,
        "d_unknown_type.zip",
        &format!("[module]\nentry = \"{}::ghost::Ghost\"\n", NAMESPACE),
    );
    fs::write(dir.join("notes.txt"), "not a plugin").unwrap();
    fs::create_dir(dir.join("e_directory.zip")).unwrap();

    let mut registry = builtin_registry();
    let report = registry.discover_external(dir);

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.status_of("a_corrupt.zip"), Some(&LoadStatus::SkippedLoadError));
    assert_eq!(report.status_of("b_no_manifest.zip"), Some(&LoadStatus::SkippedNoEntryPoint));
    assert_eq!(report.status_of("c_paper.zip"), Some(&LoadStatus::Loaded));
    assert_eq!(report.status_of("d_unknown_type.zip"), Some(&LoadStatus::SkippedLoadError));
    assert_eq!(report.registered(), 1);
    assert_eq!(report.skipped(), 3);

    // archives are visited in file-name order
    let names: Vec<String> = report
        .outcomes
        .iter()
        .map(|o| o.archive.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["a_corrupt.zip", "b_no_manifest.zip", "c_paper.zip", "d_unknown_type.zip"]
    );

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get(2).unwrap().display_name, "Paper");
}

#[test]
fn test_foreign_namespace_rejected_before_construction() {
    let plugins = tempfile::tempdir().unwrap();
    // Invalid declaration: constructing it would fail with a load error
    write_plugin(
        plugins.path(),
        "foreign.zip",
        r#"
[module]
entry = "acme::mods::evil::Evil"

[[types]]
name = "acme::mods::evil::Evil"
"#,
    );

    let mut registry = builtin_registry();
    let report = registry.discover_external(plugins.path());
    assert_eq!(report.status_of("foreign.zip"), Some(&LoadStatus::SkippedNamespace));
    assert_eq!(
        report.outcomes[0].identity.as_deref(),
        Some("acme::mods::evil::Evil")
    );
    assert_eq!(registry.len(), 2);
    assert!(registry.find("acme::mods::evil::Evil").is_none());
}

#[test]
fn test_empty_registry_is_reported() {
    let plugins = tempfile::tempdir().unwrap();
    let mut registry = ModuleRegistry::new(Catalog::new());
    assert_eq!(registry.discover_internal(), 0);
    let report = registry.discover_external(plugins.path());
    assert!(report.outcomes.is_empty());
    assert!(matches!(registry.ensure_not_empty(), Err(RegistryError::Empty)));
}

#[test]
fn test_bundled_artifact_installs_from_archive() {
    let plugins = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let manifest = format!(
        r#"
[module]
entry = "{ns}::bundled_demo::BundledDemo"

[[types]]
name = "{ns}::bundled_demo::BundledDemo"
display_name = "Bundled demo"
versions = ["1.0", "2.0"]
bundled = "files/demo-{{version}}.jar"
artifact = "demo-server.jar"
runtime_args = ["-Xmx1G"]
app_args = ["--port", "25565"]
stop_command = "shutdown"

[types.sub_versions]
"2.0" = ["rc1"]
"#,
        ns = NAMESPACE
    );
    write_zip(
        &plugins.path().join("demo.zip"),
        &[
            ("module.toml", manifest.as_bytes()),
            ("files/demo-1.0.jar", &b"one"[..]),
            ("files/demo-2.0.jar", &b"two"[..]),
        ],
    );

    let mut registry = ModuleRegistry::new(Catalog::new());
    registry.discover_external(plugins.path());
    registry.ensure_not_empty().unwrap();
    let installer = registry.get(0).unwrap().installer();

    let ctx = InstallContext {
        root_dir: root.path().to_path_buf(),
        cache_dir: root.path().join("cache"),
        cache_max_age: Duration::from_secs(60),
        fetcher: Arc::new(Offline),
        java: "java".into(),
    };
    assert_eq!(installer.available_versions(&ctx, None).unwrap(), vec!["1.0", "2.0"]);
    assert_eq!(installer.available_sub_versions(&ctx, "2.0").unwrap(), vec!["rc1"]);

    let spec = installer.install(&ctx, &InstallRequest::new("1.0")).unwrap();
    assert_eq!(spec.artifact, root.path().join("demo-server.jar"));
    assert_eq!(fs::read(&spec.artifact).unwrap(), b"one");
    assert_eq!(spec.runtime_args, vec!["-Xmx1G".to_string()]);
    assert_eq!(spec.app_args, vec!["--port".to_string(), "25565".to_string()]);
    assert_eq!(spec.stop_command.as_deref(), Some("shutdown"));

    // 2.0 has sub-versions, one must be chosen
    assert!(installer.install(&ctx, &InstallRequest::new("2.0")).is_err());
    assert!(installer.install(&ctx, &InstallRequest::new("3.0")).is_err());
}
