//! Merge precedence and failure isolation across the four stores

use modekit_core::{ModeRegistry, RegistryConfig};
use modekit_model::{AccessKind, DiagnosticKind, ModeFormat, ModeScope};
use modekit_test_utils::{legacy_doc, slug, split_doc, TestWorkspace};
use pretty_assertions::assert_eq;

fn registry(ws: &TestWorkspace) -> ModeRegistry {
    ModeRegistry::new(
        RegistryConfig::new(ws.global_root()).with_project_root(ws.project_root()),
    )
}

#[tokio::test]
async fn legacy_record_is_served_until_split_file_shadows_it() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Project, &legacy_doc(&[("architect", "Architect")]));
    let registry = registry(&ws);

    let all = registry.get_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].slug.as_str(), "architect");
    assert_eq!(all[0].scope, ModeScope::Project);
    assert_eq!(all[0].format, ModeFormat::Legacy);

    ws.write_split(ModeScope::Project, "architect.yaml", &split_doc("Architect2"));
    registry.invalidate();

    let all = registry.get_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Architect2");
    assert_eq!(all[0].format, ModeFormat::Split);
}

#[tokio::test]
async fn full_precedence_order() {
    let ws = TestWorkspace::new();
    ws.write_legacy(
        ModeScope::Global,
        &legacy_doc(&[("a", "GL"), ("b", "GL"), ("c", "GL"), ("d", "GL")]),
    );
    ws.write_split(ModeScope::Global, "a.yaml", &split_doc("GS"));
    ws.write_split(ModeScope::Global, "b.yaml", &split_doc("GS"));
    ws.write_split(ModeScope::Global, "c.yaml", &split_doc("GS"));
    ws.write_legacy(ModeScope::Project, &legacy_doc(&[("a", "PL"), ("b", "PL")]));
    ws.write_split(ModeScope::Project, "a.yaml", &split_doc("PS"));

    let view = registry(&ws).view().await;
    let name = |s: &str| view.get(&slug(s)).map(|m| m.name.clone());
    assert_eq!(name("a").as_deref(), Some("PS"));
    assert_eq!(name("b").as_deref(), Some("PL"));
    assert_eq!(name("c").as_deref(), Some("GS"));
    assert_eq!(name("d").as_deref(), Some("GL"));
    assert_eq!(view.len(), 4);
}

#[tokio::test]
async fn invalid_slugs_never_resolve() {
    let ws = TestWorkspace::new();
    ws.write_legacy(
        ModeScope::Project,
        &legacy_doc(&[("good", "Good"), ("has space", "Bad"), ("under_score", "Bad")]),
    );
    ws.write_split(ModeScope::Global, "not.valid!.yaml", &split_doc("Bad"));
    ws.write_split(ModeScope::Global, "fine.yml", &split_doc("Fine"));

    let view = registry(&ws).view().await;
    let mut slugs: Vec<_> = view.modes().map(|m| m.slug.to_string()).collect();
    slugs.sort();
    assert_eq!(slugs, vec!["fine", "good"]);
    let validation = view
        .diagnostics()
        .iter()
        .filter(|d| d.kind == DiagnosticKind::Validation)
        .count();
    assert_eq!(validation, 3);
}

#[tokio::test]
async fn broken_store_does_not_hide_the_others() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Global, &legacy_doc(&[("g", "Global")]));
    // A file where the project split directory should be
    modekit_test_utils::write_file(&ws.project_root().join(".roo"), "oops");
    ws.write_legacy(ModeScope::Project, "customModes: [unclosed\n");

    let view = registry(&ws).view().await;
    assert_eq!(view.len(), 1);
    assert!(view.get(&slug("g")).is_some());

    let kinds: Vec<_> = view.diagnostics().iter().map(|d| d.kind.clone()).collect();
    assert!(kinds.contains(&DiagnosticKind::Access {
        kind: AccessKind::MalformedParent
    }));
    assert!(kinds
        .iter()
        .any(|k| matches!(k, DiagnosticKind::Parse { line: Some(_), .. })));
}

#[tokio::test]
async fn no_project_root_serves_global_only() {
    let ws = TestWorkspace::new();
    ws.write_legacy(ModeScope::Global, &legacy_doc(&[("g", "Global")]));
    ws.write_legacy(ModeScope::Project, &legacy_doc(&[("p", "Project")]));

    let registry = ModeRegistry::new(RegistryConfig::new(ws.global_root()));
    let slugs: Vec<_> = registry
        .get_all()
        .await
        .into_iter()
        .map(|m| m.slug.to_string())
        .collect();
    assert_eq!(slugs, vec!["g"]);
}

#[tokio::test]
async fn cached_view_is_reused_until_invalidated() {
    let ws = TestWorkspace::new();
    let registry = registry(&ws);
    assert!(registry.get_all().await.is_empty());

    ws.write_split(ModeScope::Project, "late.yaml", &split_doc("Late"));
    assert!(registry.get_all().await.is_empty());

    registry.invalidate();
    assert_eq!(registry.get_all().await.len(), 1);
}
