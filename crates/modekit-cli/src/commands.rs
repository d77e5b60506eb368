//! Subcommand implementations

use anyhow::{bail, Context, Result};
use modekit_codec::SourceFile;
use modekit_core::{MigrationOutcome, ModeRegistry, RefreshCause, RegistryEvent};
use modekit_model::{ModeScope, Severity, Slug};
use serde_json::json;
use std::path::Path;
use tokio::sync::broadcast;

pub(crate) async fn list(registry: &ModeRegistry, as_json: bool) -> Result<()> {
    let view = registry.view().await;
    if as_json {
        let modes: Vec<_> = view
            .modes()
            .map(|mode| {
                json!({
                    "source": mode.store_id().to_string(),
                    "mode": mode,
                })
            })
            .collect();
        let out = json!({ "modes": modes, "diagnostics": view.diagnostics() });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if view.is_empty() {
        println!("No modes defined.");
    }
    let width = view.modes().map(|m| m.slug.as_str().len()).max().unwrap_or(0);
    for mode in view.modes() {
        println!(
            "{:<width$}  {:<16}  {}",
            mode.slug.as_str(),
            mode.store_id().to_string(),
            mode.name
        );
    }
    for diag in view.diagnostics() {
        if diag.severity > Severity::Info {
            eprintln!("warning: {diag}");
        }
    }
    Ok(())
}

pub(crate) async fn show(registry: &ModeRegistry, slug: &Slug, as_json: bool) -> Result<()> {
    let Some(mode) = registry.get(slug).await else {
        bail!("no mode named '{slug}'");
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&mode)?);
        return Ok(());
    }

    println!("{} ({})", mode.name, mode.slug);
    println!("  source: {}", mode.store_id());
    if let Some(when) = &mode.when_to_use {
        println!("  when to use: {when}");
    }
    if let Some(description) = &mode.description {
        println!("  description: {description}");
    }
    let groups: Vec<_> = mode.groups.iter().map(|g| g.group.as_str()).collect();
    println!("  groups: {}", groups.join(", "));
    println!();
    println!("{}", mode.role_definition);
    if let Some(instructions) = &mode.custom_instructions {
        println!();
        println!("{instructions}");
    }
    Ok(())
}

pub(crate) async fn delete(registry: &ModeRegistry, slug: &Slug) -> Result<()> {
    if registry.get(slug).await.is_none() {
        println!("No mode named '{slug}'; nothing to delete.");
        return Ok(());
    }
    registry.delete(slug).await?;
    println!("Deleted '{slug}'.");
    Ok(())
}

pub(crate) async fn migrate(registry: &ModeRegistry, scopes: &[ModeScope]) -> Result<()> {
    let mut failed = false;
    for &scope in scopes {
        let report = registry.migrate_legacy_if_needed(scope).await;
        match &report.outcome {
            MigrationOutcome::Migrated => {
                println!("{scope}: migrated {} modes", report.migrated_count());
                for diag in &report.skipped {
                    eprintln!("  skipped: {diag}");
                }
            }
            MigrationOutcome::NotNeeded { reason } => println!("{scope}: nothing to do ({reason})"),
            MigrationOutcome::AlreadyAttempted => println!("{scope}: already attempted"),
            MigrationOutcome::Failed { message } => {
                eprintln!("{scope}: migration failed: {message}");
                failed = true;
            }
        }
    }
    if failed {
        bail!("migration failed; legacy files are still in use");
    }
    Ok(())
}

pub(crate) async fn export(registry: &ModeRegistry, slug: &Slug) -> Result<()> {
    let text = registry.export_mode(slug).await?;
    print!("{text}");
    Ok(())
}

pub(crate) async fn import(registry: &ModeRegistry, file: &Path, scope: ModeScope) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let report = registry
        .import_modes(&SourceFile::new(file, &text), scope)
        .await?;
    for diag in &report.skipped {
        eprintln!("skipped: {diag}");
    }
    println!("Imported {} modes into {scope}.", report.imported.len());
    Ok(())
}

pub(crate) async fn reset(registry: &ModeRegistry, scope: ModeScope) -> Result<()> {
    let removed = registry.reset_scope(scope).await?;
    println!("Removed {removed} {scope} modes.");
    Ok(())
}

pub(crate) async fn watch(registry: &ModeRegistry) -> Result<()> {
    let mut events = registry.subscribe();
    let handle = registry.watch()?;
    println!("Watching {} locations; Ctrl-C to stop.", handle.watcher().watched().len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let cause = match event {
                    Ok(RegistryEvent::Refreshed { cause }) => cause,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let count = registry.get_all().await.len();
                match cause {
                    RefreshCause::ExternalChange { path } => {
                        println!("changed: {} ({count} modes)", path.display());
                    }
                    other => println!("refreshed: {other:?} ({count} modes)"),
                }
            }
        }
    }
    handle.stop();
    Ok(())
}
