//! In-memory control-store backend for testing and development.
//!
//! Models each node's control schema as plain collections behind an async
//! `RwLock`, with mutators mirroring the administrative operations so tests
//! can stage any cluster shape, including unreachable nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use slonictl_types::{
    ClusterName, ConnInfo, NodeId, Reachability, SequenceId, SetId, StoreError, TableId,
};
use tokio::sync::RwLock;

use crate::{ControlStore, Result};

/// One replication set as a node's control schema sees it.
#[derive(Debug, Default, Clone)]
struct SetModel {
    origin: Option<NodeId>,
    tables: BTreeSet<TableId>,
    sequences: BTreeSet<SequenceId>,
    /// (provider, receiver) subscription edges.
    subscriptions: BTreeSet<(NodeId, NodeId)>,
}

/// One node's view of one cluster.
#[derive(Debug, Default, Clone)]
struct SchemaModel {
    sets: BTreeMap<SetId, SetModel>,
    /// Directed (server, client) path rows.
    paths: BTreeSet<(NodeId, NodeId)>,
}

#[derive(Debug, Default)]
struct State {
    /// Endpoint keys of nodes simulated as down.
    unreachable: HashSet<String>,
    /// (endpoint, cluster name) -> control schema contents.
    schemas: HashMap<(String, String), SchemaModel>,
}

/// In-memory control store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(node: &ConnInfo, cluster: &ClusterName) -> (String, String) {
        (node.endpoint(), cluster.as_str().to_string())
    }

    /// Simulate the node being down. Queries against it return connection
    /// errors and `probe` reports it unreachable.
    pub async fn mark_unreachable(&self, node: &ConnInfo) {
        self.state.write().await.unreachable.insert(node.endpoint());
    }

    /// Bring a previously downed node back.
    pub async fn mark_reachable(&self, node: &ConnInfo) {
        self.state.write().await.unreachable.remove(&node.endpoint());
    }

    /// Install the `_<cluster>` control schema on the node.
    pub async fn install_schema(&self, node: &ConnInfo, cluster: &ClusterName) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default();
    }

    /// Drop the control schema from the node.
    pub async fn uninstall_schema(&self, node: &ConnInfo, cluster: &ClusterName) {
        self.state.write().await.schemas.remove(&Self::key(node, cluster));
    }

    /// Record a directed path row on the node.
    pub async fn store_path(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        server: NodeId,
        client: NodeId,
    ) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default()
            .paths
            .insert((server, client));
    }

    /// Record a replication set on the node.
    pub async fn create_set(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        origin: NodeId,
    ) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default()
            .sets
            .entry(set)
            .or_default()
            .origin = Some(origin);
    }

    /// Record a table as member of the set.
    pub async fn add_table(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        table: TableId,
    ) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default()
            .sets
            .entry(set)
            .or_default()
            .tables
            .insert(table);
    }

    /// Record a sequence as member of the set.
    pub async fn add_sequence(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        sequence: SequenceId,
    ) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default()
            .sets
            .entry(set)
            .or_default()
            .sequences
            .insert(sequence);
    }

    /// Record a subscription edge, marking the set live.
    pub async fn subscribe(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        provider: NodeId,
        receiver: NodeId,
    ) {
        self.state
            .write()
            .await
            .schemas
            .entry(Self::key(node, cluster))
            .or_default()
            .sets
            .entry(set)
            .or_default()
            .subscriptions
            .insert((provider, receiver));
    }

    async fn guard(&self, node: &ConnInfo) -> Result<()> {
        if self.state.read().await.unreachable.contains(&node.endpoint()) {
            return Err(StoreError::Connection {
                endpoint: node.endpoint(),
                reason: "connection refused (simulated)".to_string(),
            });
        }
        Ok(())
    }

    async fn with_schema<T>(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        f: impl FnOnce(Option<&SchemaModel>) -> T,
    ) -> Result<T> {
        self.guard(node).await?;
        let state = self.state.read().await;
        Ok(f(state.schemas.get(&Self::key(node, cluster))))
    }
}

#[async_trait]
impl ControlStore for MemoryBackend {
    async fn probe(&self, node: &ConnInfo) -> Reachability {
        if self.state.read().await.unreachable.contains(&node.endpoint()) {
            Reachability::Unreachable("connection refused (simulated)".to_string())
        } else {
            Reachability::Reachable
        }
    }

    async fn schema_exists(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<bool> {
        self.with_schema(node, cluster, |schema| schema.is_some()).await
    }

    async fn path_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        server: NodeId,
        client: NodeId,
    ) -> Result<bool> {
        self.with_schema(node, cluster, |schema| {
            schema.is_some_and(|s| s.paths.contains(&(server, client)))
        })
        .await
    }

    async fn set_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<bool> {
        self.with_schema(node, cluster, |schema| {
            schema.is_some_and(|s| s.sets.contains_key(&set))
        })
        .await
    }

    async fn cluster_sets(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<Vec<SetId>> {
        self.with_schema(node, cluster, |schema| {
            schema.map(|s| s.sets.keys().copied().collect()).unwrap_or_default()
        })
        .await
    }

    async fn set_tables(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<TableId>> {
        self.with_schema(node, cluster, |schema| {
            schema
                .and_then(|s| s.sets.get(&set))
                .map(|s| s.tables.iter().copied().collect())
                .unwrap_or_default()
        })
        .await
    }

    async fn set_sequences(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<SequenceId>> {
        self.with_schema(node, cluster, |schema| {
            schema
                .and_then(|s| s.sets.get(&set))
                .map(|s| s.sequences.iter().copied().collect())
                .unwrap_or_default()
        })
        .await
    }

    async fn set_is_subscribed(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<bool> {
        self.with_schema(node, cluster, |schema| {
            schema
                .and_then(|s| s.sets.get(&set))
                .is_some_and(|s| !s.subscriptions.is_empty())
        })
        .await
    }

    async fn subscription_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        provider: NodeId,
        receiver: NodeId,
    ) -> Result<bool> {
        self.with_schema(node, cluster, |schema| {
            schema
                .and_then(|s| s.sets.get(&set))
                .is_some_and(|s| s.subscriptions.contains(&(provider, receiver)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterName {
        ClusterName::parse("replication").unwrap()
    }

    fn node(host: &str) -> ConnInfo {
        ConnInfo::new(host, "app", "postgres", 5432)
    }

    #[tokio::test]
    async fn test_schema_lifecycle() {
        let store = MemoryBackend::new();
        let n = node("db1");
        assert!(!store.schema_exists(&n, &cluster()).await.unwrap());

        store.install_schema(&n, &cluster()).await;
        assert!(store.schema_exists(&n, &cluster()).await.unwrap());

        store.uninstall_schema(&n, &cluster()).await;
        assert!(!store.schema_exists(&n, &cluster()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_schema_reads_as_empty_not_error() {
        let store = MemoryBackend::new();
        let n = node("db1");
        assert!(store.cluster_sets(&n, &cluster()).await.unwrap().is_empty());
        assert!(store.set_tables(&n, &cluster(), SetId(1)).await.unwrap().is_empty());
        assert!(!store.set_is_subscribed(&n, &cluster(), SetId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership_queries() {
        let store = MemoryBackend::new();
        let n = node("db1");
        store.install_schema(&n, &cluster()).await;
        store.create_set(&n, &cluster(), SetId(10), NodeId(1)).await;
        store.add_table(&n, &cluster(), SetId(10), TableId(1)).await;
        store.add_table(&n, &cluster(), SetId(10), TableId(2)).await;
        store.add_sequence(&n, &cluster(), SetId(10), SequenceId(7)).await;

        assert!(store.set_exists(&n, &cluster(), SetId(10)).await.unwrap());
        assert_eq!(store.cluster_sets(&n, &cluster()).await.unwrap(), vec![SetId(10)]);
        assert_eq!(
            store.set_tables(&n, &cluster(), SetId(10)).await.unwrap(),
            vec![TableId(1), TableId(2)]
        );
        assert_eq!(
            store.set_sequences(&n, &cluster(), SetId(10)).await.unwrap(),
            vec![SequenceId(7)]
        );
    }

    #[tokio::test]
    async fn test_subscription_marks_set_live() {
        let store = MemoryBackend::new();
        let n = node("db1");
        store.install_schema(&n, &cluster()).await;
        store.create_set(&n, &cluster(), SetId(10), NodeId(1)).await;
        assert!(!store.set_is_subscribed(&n, &cluster(), SetId(10)).await.unwrap());

        store.subscribe(&n, &cluster(), SetId(10), NodeId(1), NodeId(2)).await;
        assert!(store.set_is_subscribed(&n, &cluster(), SetId(10)).await.unwrap());
        assert!(store
            .subscription_exists(&n, &cluster(), SetId(10), NodeId(1), NodeId(2))
            .await
            .unwrap());
        assert!(!store
            .subscription_exists(&n, &cluster(), SetId(10), NodeId(2), NodeId(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let store = MemoryBackend::new();
        let n = node("db2");
        store.install_schema(&n, &cluster()).await;
        store.mark_unreachable(&n).await;

        assert!(!store.probe(&n).await.is_reachable());
        assert!(matches!(
            store.schema_exists(&n, &cluster()).await,
            Err(StoreError::Connection { .. })
        ));

        store.mark_reachable(&n).await;
        assert!(store.probe(&n).await.is_reachable());
        assert!(store.schema_exists(&n, &cluster()).await.unwrap());
    }

    #[tokio::test]
    async fn test_path_rows_are_directional() {
        let store = MemoryBackend::new();
        let n = node("db1");
        store.install_schema(&n, &cluster()).await;
        store.store_path(&n, &cluster(), NodeId(1), NodeId(2)).await;

        assert!(store.path_exists(&n, &cluster(), NodeId(1), NodeId(2)).await.unwrap());
        assert!(!store.path_exists(&n, &cluster(), NodeId(2), NodeId(1)).await.unwrap());
    }
}
