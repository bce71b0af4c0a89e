//! Session driver: registry → selection → install → supervisor → console.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::config::{AppPaths, GlobalConfig};
use crate::fetch::HttpFetcher;
use crate::installer::InstallContext;
use crate::installer_modules;
use crate::registry::ModuleRegistry;
use crate::supervisor::{
    ConsoleSink, LaunchSpec, ProcessExit, ProcessSupervisor, SendOutcome, SupervisorConfig,
    SupervisorError,
};
use crate::ui::Prompter;

pub const HELP: &str = "\
Console commands:
  /restart  stop the server and start it again
  /stop     ask the server to stop
  /kill     terminate the server immediately
  /help     show this help
Any other line is sent to the server.";

/// Run one installer session and return the server's exit.
pub async fn run(paths: &AppPaths, config: &GlobalConfig) -> anyhow::Result<ProcessExit> {
    // ── 1. modules ───────────────────────────────────────────
    let mut registry = ModuleRegistry::new(installer_modules::builtin_catalog());
    registry.discover_internal();
    let report = registry.discover_external(&paths.modules);
    tracing::info!(
        "{} installer module(s) available ({} archive(s) loaded, {} skipped)",
        registry.len(),
        report.registered(),
        report.skipped()
    );
    registry.ensure_not_empty()?;

    // ── 2. selection + install (blocking) ────────────────────
    let ctx = InstallContext {
        root_dir: paths.root.clone(),
        cache_dir: paths.temp.clone(),
        cache_max_age: config.cache_max_age(),
        fetcher: Arc::new(HttpFetcher::new()),
        java: config.runtime.executable.clone(),
    };
    let modules = registry.all().to_vec();
    let mut spec = tokio::task::spawn_blocking(move || -> anyhow::Result<LaunchSpec> {
        let mut prompter = Prompter::stdio();
        let selection = prompter.select_installation(&modules, &ctx)?;
        let module = &modules[selection.ordinal];
        module
            .installer()
            .install(&ctx, &selection.request)
            .with_context(|| format!("{} failed to install {}", module.display_name, selection.request.version))
    })
    .await
    .context("installer task panicked")??;
    tracing::info!("Installation finished: {}", spec.artifact.display());

    spec.output = config.console.output;
    spec.stdin = config.console.stdin;

    // ── 3. supervise ─────────────────────────────────────────
    let sup_config = SupervisorConfig::new(config.runtime.executable.clone(), paths.root.clone())
        .inherit(config.inherited_runtime_args());
    let mut supervisor = ProcessSupervisor::with_sink(sup_config, Arc::new(ConsoleSink));
    supervisor.start(&spec).await?;
    println!("{}", HELP);

    let stdin = BufReader::new(tokio::io::stdin());
    console_loop(&mut supervisor, stdin).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// The process did not exit cleanly and was not started again
    Stopped(ProcessExit),
}

/// Stop the current process, wait for it, and start it again from the same
/// launch spec when it exited with code 0.
pub async fn restart(supervisor: &mut ProcessSupervisor) -> Result<RestartOutcome, SupervisorError> {
    let spec = supervisor
        .last_spec()
        .cloned()
        .ok_or(SupervisorError::NoProcess)?;
    supervisor.stop().await;
    let exit = supervisor.await_exit().await?;
    if !exit.is_clean() {
        tracing::warn!("Server ended with {}, not restarting", exit);
        return Ok(RestartOutcome::Stopped(exit));
    }
    tracing::info!("Restarting server...");
    supervisor.start(&spec).await?;
    Ok(RestartOutcome::Restarted)
}

/// Forward console lines to the running process until it exits.
pub async fn console_loop<R>(supervisor: &mut ProcessSupervisor, input: R) -> anyhow::Result<ProcessExit>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut input_open = true;
    let mut interrupt_armed = true;

    loop {
        let mut exit_rx = supervisor
            .exit_watch()
            .ok_or(SupervisorError::NoProcess)?;

        tokio::select! {
            _ = wait_exited(&mut exit_rx) => {
                return Ok(supervisor.await_exit().await?);
            }
            signal = tokio::signal::ctrl_c(), if interrupt_armed => {
                match signal {
                    Ok(()) => {
                        tracing::info!("Interrupt received, stopping server...");
                        supervisor.stop().await;
                    }
                    Err(e) => {
                        tracing::warn!("Cannot listen for interrupts: {}", e);
                        interrupt_armed = false;
                    }
                }
            }
            line = lines.next_line(), if input_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::debug!("Console input closed");
                        input_open = false;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Console input error: {}", e);
                        input_open = false;
                        continue;
                    }
                };
                match line.trim() {
                    "" => {}
                    "/help" => println!("{}", HELP),
                    "/stop" => supervisor.stop().await,
                    "/kill" => supervisor.kill(),
                    "/restart" => {
                        if let RestartOutcome::Stopped(exit) = restart(supervisor).await? {
                            return Ok(exit);
                        }
                    }
                    _ => {
                        if let SendOutcome::Unavailable(reason) = supervisor.send_line(&line).await {
                            tracing::warn!("Command {}", reason);
                        }
                    }
                }
            }
        }
    }
}

async fn wait_exited(rx: &mut watch::Receiver<Option<ProcessExit>>) {
    loop {
        if rx.borrow().is_some() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
