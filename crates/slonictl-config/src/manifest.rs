//! Desired-state manifest.
//!
//! One YAML document declares everything the cluster should contain. Node
//! declarations are referenced by id everywhere else, so connection
//! descriptors are written once; resolution turns the declarations into the
//! typed targets the reconcilers consume, filling in cluster defaults and
//! pulling passwords from the secret provider.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use slonictl_types::{
    ClusterName, ClusterTarget, ConnInfo, InvalidClusterName, MembershipTarget, NodeEndpoint,
    NodeId, NodeTarget, PathTarget, Presence, SequenceSpec, SetId, SetTarget, SubscriptionTarget,
    TableSpec,
};
use thiserror::Error;

use crate::secrets::{SecretError, SecretProvider};
use crate::Config;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{referenced_by} references unknown node {id}")]
    UnknownNode { id: u32, referenced_by: String },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    InvalidClusterName(#[from] InvalidClusterName),
}

/// The raw manifest as declared by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub cluster: ClusterDecl,
    #[serde(default)]
    pub nodes: Vec<NodeDecl>,
    #[serde(default)]
    pub paths: Vec<PathDecl>,
    #[serde(default)]
    pub sets: Vec<SetDecl>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDecl {
    /// Cluster name; falls back to the configured default.
    #[serde(default)]
    pub name: Option<String>,
    /// The node whose control schema anchors init/uninstall.
    pub node: u32,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDecl {
    pub id: u32,
    pub host: String,
    pub db: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Name of the secret holding this node's password, if any.
    #[serde(default)]
    pub password_secret: Option<String>,
    /// Already-enrolled node announcing the join; defaults to the cluster
    /// anchor node.
    #[serde(default)]
    pub event_node: Option<u32>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDecl {
    pub server: u32,
    pub client: u32,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDecl {
    pub id: u32,
    pub origin: u32,
    /// Receiver consulted by the live-set merge orchestration.
    pub receiver: u32,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub sequences: Vec<SequenceSpec>,
    #[serde(default)]
    pub state: Presence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDecl {
    pub set: u32,
    pub provider: u32,
    pub receiver: u32,
    #[serde(default = "default_forward")]
    pub forward: bool,
    #[serde(default)]
    pub state: Presence,
}

fn default_forward() -> bool {
    true
}

/// The fully-resolved desired state, ready for the reconcilers, in
/// dependency order: cluster, nodes, paths, sets, memberships,
/// subscriptions.
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub cluster_name: ClusterName,
    pub cluster: ClusterTarget,
    pub nodes: Vec<NodeTarget>,
    pub paths: Vec<PathTarget>,
    pub sets: Vec<SetTarget>,
    pub memberships: Vec<MembershipTarget>,
    pub subscriptions: Vec<SubscriptionTarget>,
}

impl Manifest {
    /// Load a manifest from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Parse a manifest from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn endpoint(
        &self,
        id: u32,
        referenced_by: &str,
        config: &Config,
        secrets: &dyn SecretProvider,
    ) -> Result<NodeEndpoint, ManifestError> {
        let decl = self.nodes.iter().find(|n| n.id == id).ok_or_else(|| {
            ManifestError::UnknownNode { id, referenced_by: referenced_by.to_string() }
        })?;

        let mut conn = ConnInfo::new(
            decl.host.clone(),
            decl.db.clone(),
            decl.user.clone().unwrap_or_else(|| config.cluster.replication_user.clone()),
            decl.port.unwrap_or(config.cluster.port),
        );
        if let Some(secret) = &decl.password_secret {
            conn = conn.with_password(secrets.get(secret)?);
        }
        Ok(NodeEndpoint::new(NodeId(id), conn))
    }

    /// Resolve the manifest into typed reconciliation targets.
    pub fn resolve(
        &self,
        config: &Config,
        secrets: &dyn SecretProvider,
    ) -> Result<DesiredState, ManifestError> {
        let cluster_name = ClusterName::parse(
            self.cluster.name.clone().unwrap_or_else(|| config.cluster.name.clone()),
        )?;

        let cluster = ClusterTarget {
            node: self.endpoint(self.cluster.node, "cluster", config, secrets)?,
            presence: self.cluster.state,
        };

        let mut nodes = Vec::new();
        for decl in &self.nodes {
            // The anchor node is materialized by init cluster, not store
            // node, so it never becomes a node target of its own.
            if decl.id == self.cluster.node {
                continue;
            }
            let referenced_by = format!("node {}", decl.id);
            let event_node = decl.event_node.unwrap_or(self.cluster.node);
            nodes.push(NodeTarget {
                node: self.endpoint(decl.id, &referenced_by, config, secrets)?,
                event_node: self.endpoint(event_node, &referenced_by, config, secrets)?,
                comment: decl.comment.clone(),
                presence: decl.state,
            });
        }

        let mut paths = Vec::new();
        for decl in &self.paths {
            let referenced_by = format!("path {}->{}", decl.server, decl.client);
            paths.push(PathTarget {
                server: self.endpoint(decl.server, &referenced_by, config, secrets)?,
                client: self.endpoint(decl.client, &referenced_by, config, secrets)?,
                presence: decl.state,
            });
        }

        let mut sets = Vec::new();
        let mut memberships = Vec::new();
        for decl in &self.sets {
            let referenced_by = format!("set {}", decl.id);
            let origin = self.endpoint(decl.origin, &referenced_by, config, secrets)?;
            sets.push(SetTarget {
                set: SetId(decl.id),
                origin: origin.clone(),
                comment: decl.comment.clone(),
                presence: decl.state,
            });
            // Membership only applies to sets that should exist; a dropped
            // set takes its members with it.
            if decl.state == Presence::Present {
                memberships.push(MembershipTarget {
                    set: SetId(decl.id),
                    origin,
                    receiver: self.endpoint(decl.receiver, &referenced_by, config, secrets)?,
                    tables: decl.tables.clone(),
                    sequences: decl.sequences.clone(),
                });
            }
        }

        let mut subscriptions = Vec::new();
        for decl in &self.subscriptions {
            let referenced_by = format!("subscription set {}", decl.set);
            subscriptions.push(SubscriptionTarget {
                set: SetId(decl.set),
                provider: self.endpoint(decl.provider, &referenced_by, config, secrets)?,
                receiver: self.endpoint(decl.receiver, &referenced_by, config, secrets)?,
                forward: decl.forward,
                presence: decl.state,
            });
        }

        Ok(DesiredState {
            cluster_name,
            cluster,
            nodes,
            paths,
            sets,
            memberships,
            subscriptions,
        })
    }
}
