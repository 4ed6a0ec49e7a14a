//! PostgreSQL control-store backend.
//!
//! Reads the `_<cluster>` catalog tables (`sl_path`, `sl_set`, `sl_table`,
//! `sl_sequence`, `sl_subscribe`) over short-lived connections, one per
//! query, so every reconciliation run observes the store as it is right
//! now. A missing control schema reads as "cluster uninitialized" (empty
//! results), never as an error. The schema name is the only interpolated
//! fragment and comes from a [`ClusterName`], which is identifier-checked
//! at construction; every value travels as a bound parameter.

use async_trait::async_trait;
use slonictl_types::{
    ClusterName, ConnInfo, NodeId, Reachability, SequenceId, SetId, StoreError, TableId,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use crate::{ControlStore, Result};

/// Control-store reader over a live PostgreSQL catalog.
#[derive(Debug, Default)]
pub struct PostgresBackend;

impl PostgresBackend {
    pub fn new() -> Self {
        Self
    }

    async fn client(&self, node: &ConnInfo) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(&node.conninfo(), NoTls)
            .await
            .map_err(|e| StoreError::Connection {
                endpoint: node.endpoint(),
                reason: e.to_string(),
            })?;
        let endpoint = node.endpoint();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(endpoint = %endpoint, error = %e, "control-store connection closed");
            }
        });
        Ok(client)
    }

    /// The control schema not existing yet means "cluster uninitialized",
    /// not a failure.
    fn schema_missing(e: &tokio_postgres::Error) -> bool {
        matches!(
            e.code(),
            Some(code) if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME
        )
    }

    /// Run one catalog query; a missing control schema reads as zero rows.
    async fn catalog_rows(
        &self,
        node: &ConnInfo,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let client = self.client(node).await?;
        match client.query(query, params).await {
            Ok(rows) => Ok(rows),
            Err(e) if Self::schema_missing(&e) => Ok(Vec::new()),
            Err(e) => Err(StoreError::Query {
                endpoint: node.endpoint(),
                reason: e.to_string(),
            }),
        }
    }

    async fn catalog_exists(
        &self,
        node: &ConnInfo,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<bool> {
        Ok(!self.catalog_rows(node, query, params).await?.is_empty())
    }
}

#[async_trait]
impl ControlStore for PostgresBackend {
    async fn probe(&self, node: &ConnInfo) -> Reachability {
        match self.client(node).await {
            Ok(_) => Reachability::Reachable,
            Err(e) => Reachability::Unreachable(e.to_string()),
        }
    }

    async fn schema_exists(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<bool> {
        self.catalog_exists(
            node,
            "SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1",
            &[&cluster.schema()],
        )
        .await
    }

    async fn path_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        server: NodeId,
        client: NodeId,
    ) -> Result<bool> {
        let query = format!(
            "SELECT 1 FROM {}.sl_path WHERE pa_server = $1 AND pa_client = $2",
            cluster.schema()
        );
        self.catalog_exists(node, &query, &[&(server.0 as i32), &(client.0 as i32)]).await
    }

    async fn set_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<bool> {
        let query = format!("SELECT 1 FROM {}.sl_set WHERE set_id = $1", cluster.schema());
        self.catalog_exists(node, &query, &[&(set.0 as i32)]).await
    }

    async fn cluster_sets(&self, node: &ConnInfo, cluster: &ClusterName) -> Result<Vec<SetId>> {
        let query = format!("SELECT set_id FROM {}.sl_set ORDER BY set_id", cluster.schema());
        let rows = self.catalog_rows(node, &query, &[]).await?;
        Ok(rows.iter().map(|r| SetId(r.get::<_, i32>(0) as u32)).collect())
    }

    async fn set_tables(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<TableId>> {
        let query = format!(
            "SELECT tab_id FROM {}.sl_table WHERE tab_set = $1 ORDER BY tab_id",
            cluster.schema()
        );
        let rows = self.catalog_rows(node, &query, &[&(set.0 as i32)]).await?;
        Ok(rows.iter().map(|r| TableId(r.get::<_, i32>(0) as u32)).collect())
    }

    async fn set_sequences(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<Vec<SequenceId>> {
        let query = format!(
            "SELECT seq_id FROM {}.sl_sequence WHERE seq_set = $1 ORDER BY seq_id",
            cluster.schema()
        );
        let rows = self.catalog_rows(node, &query, &[&(set.0 as i32)]).await?;
        Ok(rows.iter().map(|r| SequenceId(r.get::<_, i32>(0) as u32)).collect())
    }

    async fn set_is_subscribed(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
    ) -> Result<bool> {
        let query =
            format!("SELECT 1 FROM {}.sl_subscribe WHERE sub_set = $1 LIMIT 1", cluster.schema());
        self.catalog_exists(node, &query, &[&(set.0 as i32)]).await
    }

    async fn subscription_exists(
        &self,
        node: &ConnInfo,
        cluster: &ClusterName,
        set: SetId,
        provider: NodeId,
        receiver: NodeId,
    ) -> Result<bool> {
        let query = format!(
            "SELECT 1 FROM {}.sl_subscribe \
             WHERE sub_set = $1 AND sub_provider = $2 AND sub_receiver = $3",
            cluster.schema()
        );
        self.catalog_exists(
            node,
            &query,
            &[&(set.0 as i32), &(provider.0 as i32), &(receiver.0 as i32)],
        )
        .await
    }
}
