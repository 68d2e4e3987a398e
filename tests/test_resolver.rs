//! Resource resolution: metadata labels, portal membership and the
//! never-failing fallback.

mod common;

use common::*;
use portalytics::ResourceResolver;
use serde_json::json;
use std::collections::HashSet;

fn known(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_resolves_labels_and_memberships() {
    let backend = ScriptedBackend::new();
    backend.add_document(
        "r1",
        resource("Parabeln", &[&["root", "p1", "sub"], &["root", "p2"], &["root", "other"]]),
    );
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("r1", &known(&["p1", "p2", "p3"])).await;
    assert!(info.found);
    assert_eq!(info.display_title.as_deref(), Some("Parabeln"));
    assert_eq!(info.display_name.as_deref(), Some("parabeln.html"));
    assert_eq!(info.source_crawler.as_deref(), Some("test_spider"));
    assert_eq!(info.creator.as_deref(), Some("editor"));
    let portals: Vec<&str> = info.portal_memberships.iter().map(String::as_str).collect();
    assert_eq!(portals, vec!["p1", "p2"]);

    let (target, body) = backend.requests().into_iter().next().unwrap();
    assert_eq!(target, WORKSPACE);
    assert_eq!(body["query"]["match"]["nodeRef.id"], "r1");
    assert!(body["_source"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "collections.path"));
}

#[tokio::test]
async fn test_unknown_resource_yields_default() {
    let backend = ScriptedBackend::new();
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("ghost", &known(&["p1"])).await;
    assert!(!info.found);
    assert!(info.portal_memberships.is_empty());
    assert_eq!(info.display_title, None);
}

#[tokio::test]
async fn test_backend_error_yields_default() {
    let backend = ScriptedBackend::new();
    backend.add_document("r1", resource("Parabeln", &[&["root", "p1"]]));
    backend.break_document("r1");
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("r1", &known(&["p1"])).await;
    assert_eq!(info, portalytics::ResolvedInfo::default());
}

#[tokio::test]
async fn test_outage_yields_default() {
    let backend = ScriptedBackend::new();
    backend.add_document("r1", resource("Parabeln", &[&["root", "p1"]]));
    backend.fail_next(10);
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("r1", &known(&["p1"])).await;
    assert!(!info.found);
    // Ceiling of 2 retries: three attempts, then the fallback.
    assert_eq!(backend.request_count(WORKSPACE), 3);
}

#[tokio::test]
async fn test_no_known_portals_means_unattributed() {
    let backend = ScriptedBackend::new();
    backend.add_document("r1", resource("Parabeln", &[&["root", "p1"]]));
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("r1", &HashSet::new()).await;
    assert!(info.found);
    assert!(info.portal_memberships.is_empty());
}

#[tokio::test]
async fn test_found_document_with_null_collections_keeps_labels() {
    let backend = ScriptedBackend::new();
    backend.add_document(
        "r1",
        json!({"properties": {"cclom:title": ["Parabeln"]}, "collections": null}),
    );
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);

    let info = resolver.resolve("r1", &known(&["p1"])).await;
    assert!(info.found);
    assert_eq!(info.display_title.as_deref(), Some("Parabeln"));
    assert!(info.portal_memberships.is_empty());
}

#[tokio::test]
async fn test_classification_is_stable_across_calls() {
    let backend = ScriptedBackend::new();
    backend.add_document(
        "r1",
        resource("Parabeln", &[&["root", "p2", "sub"], &["root", "p1"]]),
    );
    let resolver = ResourceResolver::new(client(&backend), WORKSPACE);
    let portals = known(&["p1", "p2", "p3"]);

    let first = resolver.resolve("r1", &portals).await;
    let second = resolver.resolve("r1", &portals).await;
    assert_eq!(first.portal_memberships, second.portal_memberships);
    assert_eq!(first.display_name, second.display_name);
    assert_eq!(first.display_title, second.display_title);
    assert_eq!(first.source_crawler, second.source_crawler);
    assert_eq!(first.creator, second.creator);
    assert_eq!(first, second);
}
