//! Unit tests for the watch manager

use super::*;
use crate::label::CelEvaluator;
use crate::test_utils::{database, eventually, label_node};
use cluster_client::MockCluster;

struct Fixture {
    manager: WatchManager,
    multiplexer: Arc<Multiplexer>,
    styling: Arc<Styling>,
}

fn fixture() -> Fixture {
    let multiplexer = Arc::new(Multiplexer::new());
    let styling = Arc::new(Styling::new());
    let manager = WatchManager::new(
        Arc::clone(&multiplexer),
        Arc::new(CelEvaluator::new()),
        Arc::clone(&styling),
        CancellationToken::new(),
    );
    Fixture {
        manager,
        multiplexer,
        styling,
    }
}

fn nodes(entries: &[(&str, Node)]) -> BTreeMap<String, Node> {
    entries
        .iter()
        .map(|(name, node)| ((*name).to_string(), node.clone()))
        .collect()
}

#[test]
fn test_hash_is_stable_and_sensitive() {
    let node = label_node("c1", "payments");
    assert_eq!(hash_node("db", &node), hash_node("db", &node.clone()));
    assert_ne!(hash_node("db", &node), hash_node("db2", &node), "Name is part of the identity");

    let mut changed = node.clone();
    changed.health.want_present_only = false;
    assert_ne!(hash_node("db", &node), hash_node("db", &changed), "Any field change is a new identity");
}

#[tokio::test]
async fn test_update_is_idempotent() {
    let f = fixture();
    let config = nodes(&[("db", label_node("c1", "payments")), ("api", label_node("c1", "api"))]);

    f.manager.update(&config).unwrap();
    let first = f.manager.stats();
    assert_eq!(first.started, 2);
    assert_eq!(f.multiplexer.watcher_count(), 2);

    f.manager.update(&config.clone()).unwrap();
    assert_eq!(f.manager.stats(), first, "Identical config must not start or stop anything");
}

#[tokio::test]
async fn test_changed_node_is_restarted_unchanged_kept() {
    let f = fixture();
    f.manager
        .update(&nodes(&[("db", label_node("c1", "payments")), ("api", label_node("c1", "api"))]))
        .unwrap();
    let api_before = f.manager.watcher("api").unwrap();

    f.manager
        .update(&nodes(&[("db", label_node("c1", "billing")), ("api", label_node("c1", "api"))]))
        .unwrap();

    let stats = f.manager.stats();
    assert_eq!((stats.started, stats.stopped, stats.running), (3, 1, 2));
    assert_eq!(f.manager.watcher("api").unwrap().id(), api_before.id());
    assert!(!api_before.is_stopped(), "Unchanged node keeps its watcher");
    assert!(f.styling.fragment("db").is_some(), "Changed node is rendered by its new watcher");
}

#[tokio::test]
async fn test_removed_node_drops_fragment() {
    let f = fixture();
    f.manager.update(&nodes(&[("db", label_node("c1", "payments"))])).unwrap();
    assert_eq!(f.styling.render(), "style db stroke:#808080\n", "New node renders as absent");
    let watcher = f.manager.watcher("db").unwrap();

    f.manager.update(&BTreeMap::new()).unwrap();

    assert!(watcher.is_stopped());
    assert_eq!(f.styling.render(), "");
    assert_eq!(f.multiplexer.watcher_count(), 0);
    assert!(f.manager.tracked("db").is_none());
}

#[tokio::test]
async fn test_round_trip_starts_fresh() {
    let f = fixture();
    let cluster = MockCluster::new("c1");
    cluster.apply(database("default", "main", "payments"));
    f.multiplexer.engage("c1", Arc::new(cluster.clone())).unwrap();

    let config = nodes(&[("db", label_node("c1", "payments"))]);
    f.manager.update(&config).unwrap();
    eventually("tracked", || f.manager.tracked("db").is_some_and(|t| t.len() == 1)).await;

    f.manager.update(&BTreeMap::new()).unwrap();
    f.manager.update(&config).unwrap();

    // Checked before yielding to the runtime, so no event can have arrived yet
    assert_eq!(f.manager.tracked("db"), Some(Vec::new()), "Re-added node must start empty");
    assert_eq!(f.manager.stats().started, 2);
}

#[tokio::test]
async fn test_invalid_node_is_reported_and_retried() {
    let f = fixture();
    let broken = label_node("", "payments");
    let config = nodes(&[("bad", broken), ("db", label_node("c1", "payments"))]);

    let err = f.manager.update(&config).unwrap_err();
    assert!(matches!(err, StylerError::InvalidSelector { ref node, .. } if node == "bad"), "Got {err:?}");
    assert!(f.manager.watcher("db").is_some(), "Other nodes still start");
    assert!(f.styling.fragment("bad").is_none());

    assert!(f.manager.update(&config).is_err(), "Failed node is retried and fails again");
    assert_eq!(f.manager.stats().started, 1);
}

#[tokio::test]
async fn test_failures_of_several_nodes_are_joined() {
    let f = fixture();
    let mut unversioned = label_node("c1", "payments");
    unversioned.selector.gvk.version = String::new();
    let config = nodes(&[
        ("bad-cluster", label_node("", "payments")),
        ("bad-kind", unversioned),
        ("db", label_node("c1", "payments")),
    ]);

    let err = f.manager.update(&config).unwrap_err();
    let StylerError::Aggregate(ref errors) = err else {
        panic!("Expected an aggregate error, got {err:?}");
    };
    assert_eq!(err.count(), 2);
    assert!(
        errors.iter().all(|e| matches!(e, StylerError::InvalidSelector { .. })),
        "Got {errors:?}"
    );
    assert!(err.to_string().contains("bad-cluster"), "Got {err}");
    assert!(err.to_string().contains("bad-kind"), "Got {err}");

    assert!(f.manager.watcher("db").is_some(), "Valid node still starts");
    assert_eq!(f.styling.render(), "style db stroke:#808080\n", "Only the valid node renders");
}

#[tokio::test]
async fn test_label_compile_error_is_reported_but_node_runs() {
    let f = fixture();
    let mut node = label_node("c1", "payments");
    node.label = Some(r#""unterminated"#.to_string());

    let err = f.manager.update(&nodes(&[("db", node)])).unwrap_err();
    assert!(matches!(err, StylerError::Label { .. }), "Got {err:?}");
    assert!(err.to_string().contains("unterminated"));
    assert_eq!(f.styling.render(), "style db stroke:#808080\n", "Style-only fragment");
}

#[tokio::test]
async fn test_style_change_refreshes_nodes() {
    let f = fixture();
    f.manager.update(&nodes(&[("db", label_node("c1", "payments"))])).unwrap();

    let mut style = Style::default();
    style
        .status
        .insert(diagram_config::ResourceStatus::Absent, "stroke:#000".to_string());
    f.manager.set_style(&style);

    assert_eq!(f.styling.render(), "style db stroke:#000\n");
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let f = fixture();
    f.manager.update(&nodes(&[("db", label_node("c1", "payments"))])).unwrap();
    let watcher = f.manager.watcher("db").unwrap();

    f.manager.shutdown();

    assert!(watcher.is_stopped());
    assert_eq!(f.multiplexer.watcher_count(), 0);
    assert_eq!(f.manager.stats().running, 0);
}
