// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod port;
pub mod types;
pub mod watch;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::{CliArgs, Commands, RunArgs, WatchArgs};
use crate::config::loader::load_project;
use crate::config::model::ProjectConfig;
use crate::exec::run_script;
use crate::watch::path_utils::relative_str;
use crate::watch::{PathMatcher, WatchConfiguration, WatchController, WatchedDirectorySet};

/// High-level entry point used by `main.rs`.
///
/// Locates and loads `goforge.yml` from the working directory upwards, then
/// dispatches to the requested command.
pub async fn run(args: CliArgs) -> Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let (project, root) = load_project(&cwd)?;
    debug!(root = ?root, project = %project.project_name, "loaded project");

    match args.command {
        Commands::Watch(watch) => run_watch(&project, &root, watch).await,
        Commands::Run(run) => run_once(&project, &root, run).await,
    }
}

/// `goforge watch`: supervise a script until Ctrl-C or a fatal error.
async fn run_watch(project: &ProjectConfig, root: &Path, args: WatchArgs) -> Result<()> {
    let command = project.script(&args.script)?;
    let mut cfg = WatchConfiguration::from_project(project, root, command)?
        .with_verbose(args.verbose);
    if args.no_port {
        cfg = cfg.with_port(None);
    } else if let Some(port) = args.port {
        cfg = cfg.with_port(Some(port));
    }
    if let Some(debounce) = args.debounce {
        cfg = cfg.with_debounce(debounce);
    }

    if args.dry_run {
        return print_dry_run(&args.script, &cfg);
    }

    let mut controller = WatchController::new(cfg)?;
    controller.start().await?;

    let failure = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down");
            None
        }
        err = controller.session_failed() => Some(err),
    };

    let stopped = controller.stop().await;
    if let Some(err) = failure {
        return Err(err).context("watch session failed");
    }
    stopped.context("stopping watch session")
}

/// `goforge run`: run a script once with inherited stdio.
async fn run_once(project: &ProjectConfig, root: &Path, args: RunArgs) -> Result<()> {
    let command = project.script(&args.script)?;
    run_script(root, &args.script, command).await?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                eprintln!("failed to listen for SIGTERM: {e}");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Print the watch configuration and the directories that would be watched.
fn print_dry_run(script: &str, cfg: &WatchConfiguration) -> Result<()> {
    let root = cfg.root.canonicalize().unwrap_or_else(|_| cfg.root.clone());
    let matcher = PathMatcher::new(&root, &cfg.include, &cfg.exclude)?;
    let watched = WatchedDirectorySet::collect(&matcher)?;

    println!("goforge watch dry-run");
    println!("  script = {script}");
    println!("  command = {}", cfg.command);
    println!("  root = {}", root.display());
    match cfg.port {
        Some(port) => println!("  port = {port}"),
        None => println!("  port = (none, reclamation disabled)"),
    }
    println!("  debounce = {:?}", cfg.debounce);
    println!("  cooldown = {:?}", cfg.cooldown);
    println!("  grace_period = {:?}", cfg.grace_period);
    println!("  include = {:?}", cfg.include);
    println!("  exclude = {:?}", cfg.exclude);
    println!();

    println!("watched directories ({}):", watched.len());
    for dir in watched.iter() {
        let rel = relative_str(&root, dir).unwrap_or_default();
        if rel.is_empty() {
            println!("  .");
        } else {
            println!("  {rel}");
        }
    }

    debug!("dry-run complete (no process started)");
    Ok(())
}
