//! # Slonictl Store - Control-Store Reader
//!
//! Queries live topology facts (schema, paths, sets, members, subscriptions)
//! from a cluster's `_<name>` control schema. All predicates are
//! set-membership queries ("does X exist"), never record diffs, and every
//! reconciliation run re-reads them immediately before acting — the control
//! store is the single source of truth and nothing here is cached.

use async_trait::async_trait;
use slonictl_types::{
    ClusterName, ConnInfo, NodeId, Reachability, SequenceId, SetId, StoreResult, TableId,
};

pub mod factory;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use factory::{BackendType, StoreFactory};
pub use memory::MemoryBackend;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;

type Result<T> = StoreResult<T>;

/// The abstract control-store reader.
///
/// Every query is keyed by the node to ask and the cluster name scoping the
/// control schema. A missing control schema means "cluster uninitialized"
/// and is reported through `schema_exists`, not as an error.
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Probe whether the node's control store answers at all. Never errors;
    /// unreachability is a value, because for the merge-validation path it
    /// degrades the available operations instead of aborting the run.
    async fn probe(&self, node: &ConnInfo) -> Reachability;

    /// Whether the `_<cluster>` control schema exists on the node.
    async fn schema_exists(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<bool>;

    /// Whether a directed path row (server -> client) exists on the node.
    async fn path_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        server: NodeId,
        client: NodeId,
    ) -> Result<bool>;

    /// Whether the replication set exists on the node.
    async fn set_exists(&self, node: &ConnInfo, cluster: &ClusterName, set: SetId)
        -> Result<bool>;

    /// All replication set ids known to the node.
    async fn cluster_sets(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<Vec<SetId>>;

    /// Ids of the tables currently member of the set.
    async fn set_tables(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<TableId>>;

    /// Ids of the sequences currently member of the set.
    async fn set_sequences(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<SequenceId>>;

    /// Whether any subscription row exists for the set — the set-wide "live"
    /// flag, independent of which receiver subscribed.
    async fn set_is_subscribed(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<bool>;

    /// Whether the exact (set, provider, receiver) subscription edge exists.
    async fn subscription_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        provider: NodeId,
        receiver: NodeId,
    ) -> Result<bool>;
}
