//! Legacy-to-split migration through the registry

use modekit_core::{MigrationOutcome, ModeRegistry, RegistryConfig};
use modekit_model::{DiagnosticKind, ModeFormat, ModeScope};
use modekit_test_utils::{legacy_doc, slug, write_file, TestWorkspace};
use pretty_assertions::assert_eq;

fn registry(ws: &TestWorkspace) -> ModeRegistry {
    ModeRegistry::new(
        RegistryConfig::new(ws.global_root()).with_project_root(ws.project_root()),
    )
}

#[tokio::test]
async fn migration_preserves_resolved_modes_and_legacy_bytes() {
    let ws = TestWorkspace::new();
    let legacy = ws.write_legacy(
        ModeScope::Project,
        &legacy_doc(&[("architect", "Architect"), ("bad slug", "Bad"), ("writer", "Writer")]),
    );
    let before_bytes = ws.read(&legacy);
    let registry = registry(&ws);
    let before: Vec<_> = registry.get_all().await;

    let report = registry.migrate_legacy_if_needed(ModeScope::Project).await;
    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(report.migrated, vec![slug("architect"), slug("writer")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].kind, DiagnosticKind::Migration);

    assert_eq!(
        ws.split_files(ModeScope::Project),
        vec!["architect.yaml", "writer.yaml"]
    );
    assert_eq!(ws.read(&legacy), before_bytes);

    let after = registry.get_all().await;
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert!(new.same_content(old), "{} changed", old.slug);
        assert_eq!(new.format, ModeFormat::Split);
    }
}

#[tokio::test]
async fn migration_runs_once_per_registry() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Global, &legacy_doc(&[("a", "A")]));
    let first = registry(&ws);

    assert!(first.migrate_legacy_if_needed(ModeScope::Global).await.is_migrated());
    let again = first.migrate_legacy_if_needed(ModeScope::Global).await;
    assert_eq!(again.outcome, MigrationOutcome::AlreadyAttempted);
    assert_eq!(again.migrated_count(), 0);

    // A fresh registry sees the split directory and leaves it alone
    let fresh = registry(&ws);
    let report = fresh.migrate_legacy_if_needed(ModeScope::Global).await;
    assert!(matches!(report.outcome, MigrationOutcome::NotNeeded { .. }));
    assert_eq!(ws.split_files(ModeScope::Global), vec!["a.yaml"]);
}

#[tokio::test]
async fn nothing_to_migrate_without_legacy_file() {
    let ws = TestWorkspace::new();
    let registry = registry(&ws);
    let report = registry.migrate_legacy_if_needed(ModeScope::Project).await;
    assert!(matches!(report.outcome, MigrationOutcome::NotNeeded { .. }));
    assert!(ws.split_files(ModeScope::Project).is_empty());
}

#[tokio::test]
async fn unconfigured_scope_is_not_needed() {
    let ws = TestWorkspace::new();
    let registry = ModeRegistry::new(RegistryConfig::new(ws.global_root()));
    let report = registry.migrate_legacy_if_needed(ModeScope::Project).await;
    assert!(matches!(report.outcome, MigrationOutcome::NotNeeded { .. }));
}

#[tokio::test]
async fn malformed_legacy_file_fails_without_side_effects() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Project, "customModes: [unclosed\n");
    let registry = registry(&ws);

    let report = registry.migrate_legacy_if_needed(ModeScope::Project).await;
    assert!(matches!(report.outcome, MigrationOutcome::Failed { .. }));
    assert!(report.clone().into_result().is_err());
    assert!(!ws.split_dir(ModeScope::Project).exists());
}

#[tokio::test]
async fn failed_migration_keeps_serving_legacy_records() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Project, &legacy_doc(&[("keep", "Keep")]));
    // `.roo` as a regular file blocks the split directory
    write_file(&ws.project_root().join(".roo"), "");
    let registry = registry(&ws);

    let report = registry.migrate_legacy_if_needed(ModeScope::Project).await;
    assert!(matches!(report.outcome, MigrationOutcome::Failed { .. }));

    let kept = registry.get(&slug("keep")).await.unwrap();
    assert_eq!(kept.format, ModeFormat::Legacy);
}
