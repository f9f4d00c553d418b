//! Unit tests for the node watcher

use super::*;
use crate::label::{CelEvaluator, LabelEvaluator};
use crate::test_utils::{database, database_gvk, eventually, label_node};
use cluster_client::MockCluster;
use diagram_config::ResourceStatus;

struct Fixture {
    watcher: NodeWatcher,
    styling: Arc<Styling>,
    cluster: MockCluster,
    token: CancellationToken,
}

fn fixture(node: Node, label: Option<&str>) -> Fixture {
    let styling = Arc::new(Styling::new());
    let token = CancellationToken::new();
    let label = label.map(|template| CelEvaluator::new().compile(template).unwrap());
    let watcher = NodeWatcher::new(
        "db",
        "hash-1",
        node,
        label,
        Arc::new(RwLock::new(Style::default())),
        Arc::clone(&styling),
        token.child_token(),
    );
    Fixture {
        watcher,
        styling,
        cluster: MockCluster::new("c1"),
        token,
    }
}

fn style_of(styling: &Styling) -> String {
    styling
        .fragment("db")
        .map(|f| f.style_line().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_refresh_publishes_absent_fragment() {
    let f = fixture(label_node("c1", "payments"), None);
    f.watcher.refresh();
    assert_eq!(style_of(&f.styling), "style db stroke:#808080\n");
    assert_eq!(f.watcher.state().status, ResourceStatus::Absent);
}

#[tokio::test]
async fn test_ignores_other_clusters() {
    let f = fixture(label_node("c1", "payments"), None);
    let other = MockCluster::new("c2");

    f.watcher.engage("c2", Arc::new(other.clone())).unwrap();

    assert!(f.watcher.engaged_clusters().is_empty());
    assert_eq!(other.watches_opened(), 0, "No watch for a foreign cluster");
}

#[tokio::test]
async fn test_tracks_matching_resources() {
    let f = fixture(label_node("c1", "payments"), None);
    f.cluster.apply(database("default", "main", "payments"));
    f.cluster.apply(database("default", "other", "billing"));

    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("initial listing", || f.watcher.tracked().len() == 1).await;
    assert_eq!(style_of(&f.styling), "style db stroke:#00FF00\n");

    f.cluster.apply(database("default", "replica", "payments"));
    eventually("replica tracked", || f.watcher.tracked().len() == 2).await;

    f.cluster.delete(&database_gvk(), Some("default"), "main");
    f.cluster.delete(&database_gvk(), Some("default"), "replica");
    eventually("all deleted", || f.watcher.tracked().is_empty()).await;
    assert_eq!(style_of(&f.styling), "style db stroke:#808080\n");
}

#[tokio::test]
async fn test_label_drift_untracks_resource() {
    let f = fixture(label_node("c1", "payments"), None);
    f.cluster.apply(database("default", "main", "payments"));
    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("tracked", || f.watcher.tracked().len() == 1).await;

    f.cluster.apply(database("default", "main", "billing"));
    eventually("untracked after relabel", || f.watcher.tracked().is_empty()).await;
}

#[tokio::test]
async fn test_label_is_rendered_and_failures_fall_back_to_style() {
    let f = fixture(
        label_node("c1", "payments"),
        Some(r#"resources[0].metadata.name + " x" + string(size(resources))"#),
    );

    // Index 0 on an empty list fails: style only
    f.watcher.refresh();
    let fragment = f.styling.fragment("db").unwrap();
    assert!(fragment.label_line().is_none(), "Failed label must be omitted");

    f.cluster.apply(database("default", "main", "payments"));
    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("label rendered", || {
        f.styling
            .fragment("db")
            .and_then(|f| f.label_line().map(str::to_string))
            .as_deref()
            == Some("db[main x1]\n")
    })
    .await;
}

#[tokio::test]
async fn test_disengage_clears_tracked_resources() {
    let f = fixture(label_node("c1", "payments"), None);
    f.cluster.apply(database("default", "main", "payments"));
    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("tracked", || f.watcher.tracked().len() == 1).await;

    f.watcher.disengage("c1");

    assert!(f.watcher.tracked().is_empty());
    assert!(f.watcher.engaged_clusters().is_empty());
    assert_eq!(style_of(&f.styling), "style db stroke:#808080\n");
}

#[tokio::test]
async fn test_replacing_cluster_resyncs() {
    let f = fixture(label_node("c1", "payments"), None);
    f.cluster.apply(database("default", "old", "payments"));
    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("old tracked", || f.watcher.tracked().len() == 1).await;

    let replacement = MockCluster::new("c1");
    replacement.apply(database("default", "new", "payments"));
    f.watcher.engage("c1", Arc::new(replacement.clone())).unwrap();

    eventually("resynced to replacement", || {
        f.watcher
            .tracked()
            .iter()
            .map(|k| k.name.as_str())
            .eq(["new"])
    })
    .await;
    assert_eq!(f.watcher.engaged_clusters(), vec!["c1"]);
}

#[tokio::test]
async fn test_stopped_watcher_does_not_publish() {
    let f = fixture(label_node("c1", "payments"), None);
    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    eventually("listing done", || f.styling.fragment("db").is_some()).await;

    f.token.cancel();
    assert!(f.watcher.is_stopped(), "Parent cancellation stops the watcher");
    f.styling.remove_fragment("db");

    f.cluster.apply(database("default", "main", "payments"));
    f.watcher.refresh();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(f.styling.fragment("db").is_none(), "Stopped watcher must not resurrect its fragment");
    assert!(f.watcher.engage("c1", Arc::new(f.cluster.clone())).is_ok());
    assert_eq!(f.cluster.watches_opened(), 1, "Stopped watcher opens no new watch");
}

#[tokio::test]
async fn test_engage_without_runtime_fails() {
    let f = fixture(label_node("c1", "payments"), None);
    let watcher = f.watcher.clone();
    let cluster: Arc<dyn ClusterClient> = Arc::new(f.cluster.clone());

    let result = std::thread::spawn(move || watcher.engage("c1", cluster))
        .join()
        .unwrap();
    assert!(matches!(result, Err(StylerError::Engage { .. })));
}

#[tokio::test]
async fn test_selector_matching_nothing_opens_no_watch() {
    let mut node = label_node("c1", "payments");
    node.selector.label_selector = None;
    let f = fixture(node, None);

    f.watcher.engage("c1", Arc::new(f.cluster.clone())).unwrap();
    assert_eq!(f.cluster.watches_opened(), 0);
    assert_eq!(f.watcher.predicate(), &ResourcePredicate::Nothing);
}

#[tokio::test]
async fn test_apply_event_relist_prunes_unseen() {
    let f = fixture(label_node("c1", "payments"), None);
    let token = CancellationToken::new();
    let state = &f.watcher.inner;
    let mut relist = None;

    state.apply_event("c1", watcher::Event::Apply(database("default", "a", "payments")), &mut relist, &token);
    state.apply_event("c1", watcher::Event::Apply(database("default", "b", "payments")), &mut relist, &token);
    assert_eq!(f.watcher.tracked().len(), 2);

    assert!(!state.apply_event("c1", watcher::Event::Init, &mut relist, &token));
    assert!(!state.apply_event(
        "c1",
        watcher::Event::InitApply(database("default", "b", "payments")),
        &mut relist,
        &token
    ));
    assert!(state.apply_event("c1", watcher::Event::InitDone, &mut relist, &token));

    let names: Vec<String> = f.watcher.tracked().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["b"], "Resources missing from the re-list are pruned");

    token.cancel();
    assert!(
        !state.apply_event("c1", watcher::Event::Delete(database("default", "b", "payments")), &mut relist, &token),
        "Cancelled engagements must not mutate"
    );
    assert_eq!(f.watcher.tracked().len(), 1);
}

#[tokio::test]
async fn test_recheck_drops_missing_resources() {
    let f = fixture(label_node("c1", "payments"), None);
    let token = CancellationToken::new();
    let state = &f.watcher.inner;
    let mut relist = None;
    state.apply_event("c1", watcher::Event::Apply(database("default", "gone", "payments")), &mut relist, &token);
    state.apply_event("c1", watcher::Event::Apply(database("default", "kept", "payments")), &mut relist, &token);
    f.cluster.apply(database("default", "kept", "payments"));

    assert!(state.recheck(&f.cluster, &token).await);
    let names: Vec<String> = f.watcher.tracked().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["kept"]);

    // Transient errors keep what is tracked
    f.cluster.set_unavailable(true);
    assert!(!state.recheck(&f.cluster, &token).await);
    assert_eq!(f.watcher.tracked().len(), 1);
}
