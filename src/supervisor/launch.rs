//! Launch specification and command assembly.
//!
//! A [`LaunchSpec`] is what an installer module hands back after `install`.
//! The supervisor turns it into a concrete command line by merging the host's
//! inherited runtime arguments with the module's own.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default flag placed in front of the artifact (`java -jar server.jar`).
pub const DEFAULT_ARTIFACT_FLAG: &str = "-jar";

/// JVM flags that carry their value glued to the flag (`-Xmx2G`).
const SIZED_FLAGS: &[&str] = &["-Xms", "-Xmx", "-Xss", "-Xmn"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Child stdout/stderr go straight to the host console
    Inherited,
    /// Child output is read line by line and forwarded to an output sink
    Captured,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StdinMode {
    /// stdin is piped and owned by the supervisor for command injection
    Open,
    Disabled,
}

/// How to start a produced server artifact. Immutable once handed to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub artifact: PathBuf,
    /// Overrides the configured runtime executable
    pub executable: Option<String>,
    /// Flag placed before the artifact; `None` passes the artifact as a bare argument
    pub artifact_flag: Option<String>,
    pub runtime_args: Vec<String>,
    pub app_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
    pub stdin: StdinMode,
    /// Console command that asks the server to shut down cleanly
    pub stop_command: Option<String>,
    /// Regex with a named `level` group used to classify captured lines
    pub log_pattern: Option<String>,
}

impl LaunchSpec {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            executable: None,
            artifact_flag: Some(DEFAULT_ARTIFACT_FLAG.to_string()),
            runtime_args: Vec::new(),
            app_args: Vec::new(),
            working_dir: None,
            output: OutputMode::Captured,
            stdin: StdinMode::Open,
            stop_command: None,
            log_pattern: None,
        }
    }

    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn artifact_flag(mut self, flag: Option<&str>) -> Self {
        self.artifact_flag = flag.map(str::to_string);
        self
    }

    /// Add a runtime-engine argument (e.g. `-Xmx1024M`).
    pub fn runtime_arg(mut self, arg: impl Into<String>) -> Self {
        self.runtime_args.push(arg.into());
        self
    }

    /// Add an application argument (e.g. `nogui`).
    pub fn app_arg(mut self, arg: impl Into<String>) -> Self {
        self.app_args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    pub fn stdin(mut self, mode: StdinMode) -> Self {
        self.stdin = mode;
        self
    }

    pub fn stop_command(mut self, command: impl Into<String>) -> Self {
        self.stop_command = Some(command.into());
        self
    }

    pub fn log_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.log_pattern = Some(pattern.into());
        self
    }
}

/// Host-side launch settings shared by every process the supervisor starts.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub executable: String,
    /// The host's active runtime arguments, inherited by every child
    pub inherited_args: Vec<String>,
    /// Working directory used when a spec leaves it unset
    pub root_dir: PathBuf,
}

impl SupervisorConfig {
    pub fn new(executable: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            inherited_args: Vec::new(),
            root_dir: root_dir.into(),
        }
    }

    pub fn inherit(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.inherited_args.extend(args);
        self
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl AssembledCommand {
    /// executable + merged runtime args + artifact flag + artifact + app args
    pub fn assemble(config: &SupervisorConfig, spec: &LaunchSpec) -> Self {
        let program = spec
            .executable
            .clone()
            .unwrap_or_else(|| config.executable.clone());

        let inherited: Vec<String> = config
            .inherited_args
            .iter()
            .filter(|arg| {
                let keep = arg.starts_with('-');
                if !keep {
                    tracing::debug!("Ignoring inherited non-flag argument '{}'", arg);
                }
                keep
            })
            .cloned()
            .collect();

        let mut args = merge_runtime_args(&inherited, &spec.runtime_args);
        if let Some(flag) = &spec.artifact_flag {
            args.push(flag.clone());
        }
        args.push(spec.artifact.to_string_lossy().to_string());
        args.extend(spec.app_args.iter().cloned());

        let working_dir = spec
            .working_dir
            .clone()
            .unwrap_or_else(|| config.root_dir.clone());

        Self {
            program,
            args,
            working_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Printable form for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Merge runtime arguments. Later entries win on key collision and take the
/// slot of the entry they replace; non-colliding entries keep their order.
pub fn merge_runtime_args(inherited: &[String], specific: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(inherited.len() + specific.len());
    for arg in inherited.iter().chain(specific.iter()) {
        let key = runtime_arg_key(arg);
        match merged.iter().position(|existing| runtime_arg_key(existing) == key) {
            Some(pos) => merged[pos] = arg.clone(),
            None => merged.push(arg.clone()),
        }
    }
    merged
}

/// Collision key of a runtime argument.
///
/// `-Dfoo=bar` → `-Dfoo`, `-Xmx2G` → `-Xmx`, `-XX:+UseG1GC` and
/// `-XX:-UseG1GC` → `UseG1GC`, anything else is keyed by the whole token.
pub fn runtime_arg_key(arg: &str) -> &str {
    if let Some((key, _)) = arg.split_once('=') {
        return key;
    }
    if let Some(prefix) = SIZED_FLAGS.iter().find(|p| arg.starts_with(**p)) {
        return *prefix;
    }
    if let Some(rest) = arg.strip_prefix("-XX:") {
        if rest.starts_with('+') || rest.starts_with('-') {
            return &rest[1..];
        }
    }
    arg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_module_args_override_inherited() {
        let merged = merge_runtime_args(
            &strings(&["-Xms256M"]),
            &strings(&["-Xms512M", "-Xmx1024M"]),
        );
        assert_eq!(merged, strings(&["-Xms512M", "-Xmx1024M"]));
    }

    #[test]
    fn test_merge_keeps_non_colliding_inherited() {
        let merged = merge_runtime_args(
            &strings(&["-Dfile.encoding=UTF-8", "-Xmx1G", "-server"]),
            &strings(&["-Xmx4G", "-Dfile.encoding=ISO-8859-1"]),
        );
        assert_eq!(
            merged,
            strings(&["-Dfile.encoding=ISO-8859-1", "-Xmx4G", "-server"])
        );
    }

    #[test]
    fn test_merge_xx_toggle_collides() {
        let merged = merge_runtime_args(
            &strings(&["-XX:+UseG1GC"]),
            &strings(&["-XX:-UseG1GC", "-XX:+AlwaysPreTouch"]),
        );
        assert_eq!(merged, strings(&["-XX:-UseG1GC", "-XX:+AlwaysPreTouch"]));
    }

    #[test]
    fn test_merge_dedups_within_one_list() {
        let merged = merge_runtime_args(&[], &strings(&["-Xmx1G", "-Xmx2G"]));
        assert_eq!(merged, strings(&["-Xmx2G"]));
    }

    #[test]
    fn test_runtime_arg_key() {
        assert_eq!(runtime_arg_key("-Xms512M"), "-Xms");
        assert_eq!(runtime_arg_key("-Dlog4j2.formatMsgNoLookups=true"), "-Dlog4j2.formatMsgNoLookups");
        assert_eq!(runtime_arg_key("-XX:+UseG1GC"), "UseG1GC");
        assert_eq!(runtime_arg_key("-XX:MaxGCPauseMillis=200"), "-XX:MaxGCPauseMillis");
        assert_eq!(runtime_arg_key("-server"), "-server");
    }

    #[test]
    fn test_assemble_command_order() {
        let config = SupervisorConfig::new("java", "/srv/root")
            .inherit(strings(&["-Xms256M", "stray"]));
        let spec = LaunchSpec::new("/srv/root/server.jar")
            .runtime_arg("-Xms512M")
            .runtime_arg("-Xmx1024M")
            .app_arg("nogui");

        let cmd = AssembledCommand::assemble(&config, &spec);
        assert_eq!(cmd.program, "java");
        assert_eq!(
            cmd.args,
            strings(&["-Xms512M", "-Xmx1024M", "-jar", "/srv/root/server.jar", "nogui"])
        );
        assert_eq!(cmd.working_dir, PathBuf::from("/srv/root"));
    }

    #[test]
    fn test_assemble_without_artifact_flag() {
        let config = SupervisorConfig::new("java", "/srv");
        let spec = LaunchSpec::new("@libraries/unix_args.txt")
            .artifact_flag(None)
            .working_dir("/srv/forge")
            .executable("/opt/jdk/bin/java");

        let cmd = AssembledCommand::assemble(&config, &spec);
        assert_eq!(cmd.program, "/opt/jdk/bin/java");
        assert_eq!(cmd.args, strings(&["@libraries/unix_args.txt"]));
        assert_eq!(cmd.working_dir(), Path::new("/srv/forge"));
    }
}
