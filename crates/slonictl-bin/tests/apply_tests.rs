//! Integration tests for the apply loop.
//!
//! Drives a manifest end-to-end: parse, resolve, reconcile over the
//! in-memory store with the recording runner, and assert both the summary
//! and the dispatched scripts.

use std::sync::Arc;

use slonictl_bin::apply;
use slonictl_config::manifest::Manifest;
use slonictl_config::secrets::{SecretError, SecretProvider};
use slonictl_config::Config;
use slonictl_core::Reconciler;
use slonictl_script::RecordingRunner;
use slonictl_store::MemoryBackend;
use slonictl_types::{ClusterName, ConnInfo, NodeId, SequenceId, SetId, TableId};

const MANIFEST: &str = r#"
cluster:
  name: replication
  node: 1
nodes:
  - id: 1
    host: db1
    db: app
  - id: 2
    host: db2
    db: app
paths:
  - server: 1
    client: 2
sets:
  - id: 10
    origin: 1
    receiver: 2
    comment: main set
    tables:
      - id: 1
        fqname: public.users
    sequences:
      - id: 1
        fqname: public.users_id_seq
subscriptions:
  - set: 10
    provider: 1
    receiver: 2
"#;

struct NoSecrets;

impl SecretProvider for NoSecrets {
    fn get(&self, key: &str) -> Result<String, SecretError> {
        Err(SecretError::NotFound(key.to_string()))
    }

    fn has(&self, _key: &str) -> bool {
        false
    }
}

fn cluster() -> ClusterName {
    ClusterName::parse("replication").unwrap()
}

fn conn(host: &str) -> ConnInfo {
    ConnInfo::new(host, "app", "postgres", 5432)
}

#[tokio::test]
async fn bootstrap_from_empty_cluster_runs_everything_in_order() {
    let manifest = Manifest::from_yaml(MANIFEST).unwrap();
    let state = manifest.resolve(&Config::default(), &NoSecrets).unwrap();

    let store = Arc::new(MemoryBackend::new());
    let runner = Arc::new(RecordingRunner::new());
    let reconciler = Reconciler::new(cluster(), store, runner.clone());

    let summary = apply::run(&reconciler, &state).await.unwrap();

    assert_eq!(summary.results.len(), 6);
    assert!(summary.changed());
    assert_eq!(summary.changed_count(), 6);

    let scripts = runner.recorded();
    assert_eq!(scripts.len(), 7);
    assert!(scripts[0].contains("init cluster (id = 1"));
    assert!(scripts[1].contains("store node (id = 2"));
    assert!(scripts[2].contains("store path (server = 2, client = 1"));
    assert!(scripts[2].contains("store path (server = 1, client = 2"));
    assert!(scripts[3].contains("create set (id = 10, origin = 1"));
    assert!(scripts[4].contains("set add table (set id = 10, origin = 1, id = 1"));
    assert!(scripts[5].contains("set add sequence (set id = 10, origin = 1, id = 1"));
    assert!(scripts[6].contains("subscribe set (id = 10, provider = 1, receiver = 2, forward = yes)"));
}

#[tokio::test]
async fn converged_cluster_reports_no_changes_and_no_scripts() {
    let manifest = Manifest::from_yaml(MANIFEST).unwrap();
    let state = manifest.resolve(&Config::default(), &NoSecrets).unwrap();

    // Stage the store exactly as the manifest wants it.
    let store = Arc::new(MemoryBackend::new());
    let c = cluster();
    store.install_schema(&conn("db1"), &c).await;
    store.install_schema(&conn("db2"), &c).await;
    store.store_path(&conn("db1"), &c, NodeId(2), NodeId(1)).await;
    store.store_path(&conn("db2"), &c, NodeId(1), NodeId(2)).await;
    store.create_set(&conn("db1"), &c, SetId(10), NodeId(1)).await;
    store.add_table(&conn("db1"), &c, SetId(10), TableId(1)).await;
    store.add_sequence(&conn("db1"), &c, SetId(10), SequenceId(1)).await;
    store.subscribe(&conn("db1"), &c, SetId(10), NodeId(1), NodeId(2)).await;

    let runner = Arc::new(RecordingRunner::new());
    let reconciler = Reconciler::new(c, store, runner.clone());

    let summary = apply::run(&reconciler, &state).await.unwrap();

    assert!(!summary.changed());
    assert_eq!(summary.changed_count(), 0);
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn live_set_membership_grows_through_merge_during_apply() {
    let manifest = Manifest::from_yaml(MANIFEST).unwrap();
    let state = manifest.resolve(&Config::default(), &NoSecrets).unwrap();

    // Converged except table 1 is missing from the live set.
    let store = Arc::new(MemoryBackend::new());
    let c = cluster();
    store.install_schema(&conn("db1"), &c).await;
    store.install_schema(&conn("db2"), &c).await;
    store.store_path(&conn("db1"), &c, NodeId(2), NodeId(1)).await;
    store.store_path(&conn("db2"), &c, NodeId(1), NodeId(2)).await;
    store.create_set(&conn("db1"), &c, SetId(10), NodeId(1)).await;
    store.add_sequence(&conn("db1"), &c, SetId(10), SequenceId(1)).await;
    store.subscribe(&conn("db1"), &c, SetId(10), NodeId(1), NodeId(2)).await;

    let runner = Arc::new(RecordingRunner::new());
    let reconciler = Reconciler::new(c, store, runner.clone());

    let summary = apply::run(&reconciler, &state).await.unwrap();

    assert_eq!(summary.changed_count(), 1);
    let scripts = runner.recorded();
    assert_eq!(scripts.len(), 1, "the merge is a single script");
    assert!(scripts[0].contains("create set (id = 99"));
    assert!(scripts[0].contains("merge set (id = 10, add id = 99, origin = 1)"));
}
