//! molehunt command line entry point.

mod args;
mod config;
#[cfg(feature = "desktop")]
mod desktop;
mod project;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use molehunt_core::matcher::{Frame, TemplateMatcher};
use tracing::{error, info};

use crate::args::{Cli, Commands, MatchArgs, RunArgs};
use crate::project::{has_errors, Project};

fn main() {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run_command(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Run one subcommand and return the process exit code.
fn run_command(cli: Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Examples => {
            println!("{}", args::EXAMPLES_TEXT);
            println!("{}", args::EXAMPLE_PROJECT);
            Ok(0)
        }
        Commands::Match(args) => match_offline(args),
        Commands::Validate => validate(cli.project.as_deref()),
        Commands::Run(args) => hunt(cli.project.as_deref(), args),
    }
}

fn load_project(flag: Option<&Path>) -> anyhow::Result<Project> {
    let path = config::project_path(flag);
    info!("Using project {}", path.display());
    Project::load(&path).with_context(|| "Failed to load project (see 'molehunt examples')")
}

fn validate(flag: Option<&Path>) -> anyhow::Result<i32> {
    let project = load_project(flag)?;
    let findings = project.findings();

    for finding in &findings {
        println!("{}", finding);
    }
    let errors = findings
        .iter()
        .filter(|f| f.severity == molehunt_core::model::Severity::Error)
        .count();
    println!(
        "{} group(s), {} error(s), {} warning(s)",
        project.groups.groups().len(),
        errors,
        findings.len() - errors
    );

    Ok(if has_errors(&findings) { 1 } else { 0 })
}

fn match_offline(args: &MatchArgs) -> anyhow::Result<i32> {
    let screen = image::open(&args.screenshot)
        .with_context(|| format!("Failed to open screenshot {}", args.screenshot.display()))?
        .to_rgba8();
    let frame = Frame::from_rgba(&screen);
    let matcher = TemplateMatcher::new();

    let result = matcher.find(&frame, &args.template.to_string_lossy(), args.threshold);
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.found { 0 } else { 1 })
}

#[cfg(not(feature = "desktop"))]
fn hunt(flag: Option<&Path>, _args: &RunArgs) -> anyhow::Result<i32> {
    // Still load the project so configuration mistakes surface
    load_project(flag)?;
    anyhow::bail!(
        "this molehunt binary was built without desktop support; rebuild with '--features desktop'"
    )
}

/// Hunt on the live desktop until the run ends or a signal arrives.
#[cfg(feature = "desktop")]
fn hunt(flag: Option<&Path>, args: &RunArgs) -> anyhow::Result<i32> {
    use std::sync::Arc;

    use molehunt_core::events::{HuntEvent, StopReason};
    use molehunt_core::hunter::{HuntMode, MoleHunter};

    let mut project = load_project(flag)?;
    config::apply_overrides(&mut project.settings, args);

    for finding in project.findings() {
        tracing::warn!("{}", finding);
    }

    let group = match &args.group {
        Some(group) => group.clone(),
        None => project
            .default_group()
            .context("The project defines no groups")?
            .to_string(),
    };
    let mode = args.mode.map(HuntMode::from).unwrap_or(project.mode);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async move {
        let (hunter, mut events) = MoleHunter::new(
            Arc::new(TemplateMatcher::new()),
            Arc::new(desktop::XcapScreen),
            Arc::new(desktop::EnigoActuator::new()),
            project.settings,
        );
        hunter.start(&group, project.groups, mode)?;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        return Ok(0);
                    };
                    println!("{}", serde_json::to_string(&event)?);
                    if let HuntEvent::HuntingStopped { reason, .. } = event {
                        return Ok(match reason {
                            StopReason::Failed { .. } => 1,
                            _ => 0,
                        });
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, stopping hunt");
                    hunter.stop();
                }
                _ = sigterm() => {
                    info!("Received SIGTERM, stopping hunt");
                    hunter.stop();
                }
            }
        }
    })
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
#[cfg(all(unix, feature = "desktop"))]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, only Ctrl+C will stop the hunt",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM is not available on non-Unix platforms; use a never-completing future.
#[cfg(all(not(unix), feature = "desktop"))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
