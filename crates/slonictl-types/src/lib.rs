//! # Slonictl Types
//!
//! Shared type definitions for the slonictl cluster reconciler.
//!
//! This crate provides all core types used across the slonictl workspace,
//! ensuring a single source of truth and preventing circular dependencies.
//! Entity identifiers are newtypes over the integer ids Slony-I assigns
//! within a cluster; holding a typed id means the value has already been
//! validated as an integer, which is the first half of the injection-safety
//! story (the second half is the script serializer's literal quoting).

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a node within a cluster
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a replication set within a cluster
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SetId(pub u32);

impl SetId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a replicated table, cluster-wide
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TableId(pub u32);

impl TableId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a replicated sequence, cluster-wide
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequenceId(pub u32);

impl SequenceId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The cluster name, doubling as the control-schema key (`_<name>`).
///
/// The name is interpolated into schema-qualified catalog queries and into
/// the script preamble, so it is validated as a strict identifier at
/// construction and cannot carry quoting metacharacters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    /// Parse a cluster name, enforcing the identifier shape
    /// (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidClusterName> {
        let name = name.into();
        let mut chars = name.chars();
        let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if name.is_empty() || !head_ok || !tail_ok {
            return Err(InvalidClusterName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The control schema backing this cluster (`_<name>`).
    pub fn schema(&self) -> String {
        format!("_{}", self.0)
    }
}

impl std::fmt::Display for ClusterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ClusterName {
    type Error = InvalidClusterName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ClusterName> for String {
    fn from(value: ClusterName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid cluster name {0:?}: must match [A-Za-z_][A-Za-z0-9_]*")]
pub struct InvalidClusterName(pub String);

// ============================================================================
// Connection descriptors
// ============================================================================

/// Admin connection descriptor for one database instance.
///
/// Renders to a libpq conninfo string; values are escaped per the libpq
/// quoting rules so a hostname or password can never splice extra key/value
/// pairs into the string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnInfo {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnInfo {
    pub fn new(
        host: impl Into<String>,
        dbname: impl Into<String>,
        user: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            dbname: dbname.into(),
            user: user.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Render the libpq conninfo string.
    pub fn conninfo(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote_conninfo_value(&self.host)),
            format!("dbname={}", quote_conninfo_value(&self.dbname)),
            format!("user={}", quote_conninfo_value(&self.user)),
            format!("port={}", self.port),
        ];
        if let Some(password) = &self.password {
            parts.push(format!("password={}", quote_conninfo_value(password)));
        }
        parts.join(" ")
    }

    /// A stable key identifying the endpoint, without credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.dbname)
    }
}

impl std::fmt::Display for ConnInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials are deliberately absent from the Display form.
        write!(f, "{}", self.endpoint())
    }
}

/// Escape one conninfo value per libpq rules: values containing spaces,
/// quotes, or backslashes (or empty values) are single-quoted with `\`
/// escapes for `'` and `\`.
fn quote_conninfo_value(value: &str) -> String {
    let needs_quoting =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quoting {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// A node id paired with its admin connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub id: NodeId,
    pub conn: ConnInfo,
}

impl NodeEndpoint {
    pub fn new(id: NodeId, conn: ConnInfo) -> Self {
        Self { id, conn }
    }
}

// ============================================================================
// Desired state
// ============================================================================

/// Whether an entity should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// Desired state of the cluster control schema on its anchor node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub node: NodeEndpoint,
    #[serde(default)]
    pub presence: Presence,
}

/// Desired state of one node's cluster membership.
///
/// `event_node` is the already-enrolled node that relays the configuration
/// event announcing the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTarget {
    pub node: NodeEndpoint,
    pub event_node: NodeEndpoint,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub presence: Presence,
}

/// Desired state of the bidirectional path between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTarget {
    pub server: NodeEndpoint,
    pub client: NodeEndpoint,
    #[serde(default)]
    pub presence: Presence,
}

/// Desired state of one replication set (the container, not its members).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTarget {
    pub set: SetId,
    pub origin: NodeEndpoint,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub presence: Presence,
}

/// A table wanted in a replication set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub id: TableId,
    pub fqname: String,
    #[serde(default)]
    pub comment: String,
}

/// A sequence wanted in a replication set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub id: SequenceId,
    pub fqname: String,
    #[serde(default)]
    pub comment: String,
}

/// The full wanted membership of one replication set.
///
/// `receiver` is the subscribed node that the merge orchestration must be
/// able to reach when the set is live; it is not consulted for removals or
/// for adds to an unsubscribed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipTarget {
    pub set: SetId,
    pub origin: NodeEndpoint,
    pub receiver: NodeEndpoint,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub sequences: Vec<SequenceSpec>,
}

/// Desired state of one subscription edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTarget {
    pub set: SetId,
    pub provider: NodeEndpoint,
    pub receiver: NodeEndpoint,
    #[serde(default = "default_forward")]
    pub forward: bool,
    #[serde(default)]
    pub presence: Presence,
}

fn default_forward() -> bool {
    true
}

// ============================================================================
// Observed state
// ============================================================================

/// Result of probing a node's control store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable(String),
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

/// The caller-facing result of one reconciliation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub changed: bool,
}

impl Outcome {
    pub fn changed() -> Self {
        Self { changed: true }
    }

    pub fn unchanged() -> Self {
        Self { changed: false }
    }
}

// ============================================================================
// Error types
// ============================================================================

/// Failures raised by the control-store reader.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("query against {endpoint} failed: {reason}")]
    Query { endpoint: String, reason: String },

    #[error(transparent)]
    InvalidClusterName(#[from] InvalidClusterName),

    #[error("unknown store backend: {0}")]
    UnknownBackend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Fatal conditions surfaced by a reconciliation run.
///
/// Nothing here is retried or downgraded; every variant carries enough
/// context for manual remediation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A node required by the chosen operation could not be reached.
    #[error("node {node} is unreachable: {reason}")]
    NodeUnreachable { node: NodeId, reason: String },

    /// The path exists on one side of the pair only. Never auto-repaired.
    #[error(
        "path between server {server} and client {client} is configured on \
         part of the cluster only; the cluster config is in a broken state"
    )]
    AsymmetricPath { server: NodeId, client: NodeId },

    /// A merge into a live set was requested while its receiver is down.
    /// Raised before any mutation is attempted.
    #[error("cannot merge into subscribed set {set}: receiver {receiver} is unreachable")]
    UnsafeMerge { set: SetId, receiver: NodeId },

    /// The configured temporary set id already names an existing set.
    #[error("temporary set id {temp} collides with an existing replication set")]
    TempSetCollision { temp: SetId },

    /// The scripting interpreter exited non-zero. Diagnostics are verbatim.
    #[error("slonik exited with status {status}: {stderr}")]
    Interpreter {
        status: i32,
        stdout: String,
        stderr: String,
    },

    /// The interpreter process could not be spawned or driven at all.
    #[error("failed to run slonik: {0}")]
    Spawn(String),

    /// Neither directional drop of a path succeeded.
    #[error(
        "failed to drop path in either direction between server {server} and \
         client {client}: {stderr}"
    )]
    BothPathDropsFailed {
        server: NodeId,
        client: NodeId,
        stderr: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_accepts_identifiers() {
        assert!(ClusterName::parse("replication").is_ok());
        assert!(ClusterName::parse("_private").is_ok());
        assert!(ClusterName::parse("cluster_2").is_ok());
    }

    #[test]
    fn test_cluster_name_rejects_metacharacters() {
        assert!(ClusterName::parse("").is_err());
        assert!(ClusterName::parse("2fast").is_err());
        assert!(ClusterName::parse("a.b").is_err());
        assert!(ClusterName::parse("x; DROP SCHEMA _x").is_err());
        assert!(ClusterName::parse("name'").is_err());
    }

    #[test]
    fn test_cluster_name_schema() {
        let name = ClusterName::parse("replication").unwrap();
        assert_eq!(name.schema(), "_replication");
    }

    #[test]
    fn test_conninfo_rendering() {
        let conn = ConnInfo::new("db1", "app", "postgres", 5432);
        assert_eq!(conn.conninfo(), "host=db1 dbname=app user=postgres port=5432");
    }

    #[test]
    fn test_conninfo_quotes_awkward_values() {
        let conn = ConnInfo::new("db1", "app", "postgres", 5432).with_password("p'w s\\d");
        assert_eq!(
            conn.conninfo(),
            "host=db1 dbname=app user=postgres port=5432 password='p\\'w s\\\\d'"
        );
    }

    #[test]
    fn test_conninfo_display_hides_credentials() {
        let conn = ConnInfo::new("db1", "app", "postgres", 5432).with_password("secret");
        assert_eq!(format!("{}", conn), "db1:5432/app");
    }

    #[test]
    fn test_presence_default_is_present() {
        assert_eq!(Presence::default(), Presence::Present);
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(Outcome::changed().changed);
        assert!(!Outcome::unchanged().changed);
    }

    #[test]
    fn test_reachability() {
        assert!(Reachability::Reachable.is_reachable());
        assert!(!Reachability::Unreachable("refused".into()).is_reachable());
    }
}
