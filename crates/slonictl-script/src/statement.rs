//! Typed slonik mutation statements and their serializer.
//!
//! Each administrative mutation slonictl can issue is a tagged variant;
//! `render` is the only place statement text is produced. Free-text fields
//! (comments, fully-qualified names) are quoted here; ids arrive as typed
//! integers and need no quoting.

use slonictl_types::{NodeId, SequenceId, SetId, TableId};

/// Quote a string as a slonik string literal: wrap in single quotes, with
/// embedded quotes doubled (the interpreter's own escape mechanism).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// One slonik mutation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Install the control schema and register the first node.
    InitCluster { id: NodeId, comment: String },
    /// Remove the control schema from a node.
    UninstallNode { id: NodeId },
    /// Enroll a node, announced through an already-enrolled event node.
    StoreNode {
        id: NodeId,
        comment: String,
        event_node: NodeId,
    },
    /// Retire a node from the cluster.
    DropNode { id: NodeId, event_node: NodeId },
    /// Declare how `client` reaches `server`.
    StorePath {
        server: NodeId,
        client: NodeId,
        conninfo: String,
    },
    /// Remove one directed path declaration.
    DropPath { server: NodeId, client: NodeId },
    /// Create a replication set on its origin.
    CreateSet {
        id: SetId,
        origin: NodeId,
        comment: String,
    },
    /// Drop a replication set.
    DropSet { id: SetId, origin: NodeId },
    /// Add a table to a set.
    AddTable {
        set: SetId,
        origin: NodeId,
        id: TableId,
        fqname: String,
        comment: String,
    },
    /// Remove a table from its set.
    DropTable { origin: NodeId, id: TableId },
    /// Add a sequence to a set.
    AddSequence {
        set: SetId,
        origin: NodeId,
        id: SequenceId,
        fqname: String,
        comment: String,
    },
    /// Remove a sequence from its set.
    DropSequence { origin: NodeId, id: SequenceId },
    /// Enroll a receiver for a set's changes. `forward: None` leaves the
    /// forwarding behavior to the interpreter's default (used inside the
    /// merge orchestration, where the temporary subscription is transient).
    SubscribeSet {
        id: SetId,
        provider: NodeId,
        receiver: NodeId,
        forward: Option<bool>,
    },
    /// Withdraw a receiver's subscription.
    UnsubscribeSet { id: SetId, receiver: NodeId },
    /// Fold set `add` into set `id` on their shared origin.
    MergeSet {
        id: SetId,
        add: SetId,
        origin: NodeId,
    },
}

impl Statement {
    /// Render the statement, terminated with `;`.
    pub fn render(&self) -> String {
        match self {
            Statement::InitCluster { id, comment } => {
                format!("init cluster (id = {}, comment = {});", id, quote_literal(comment))
            }
            Statement::UninstallNode { id } => {
                format!("uninstall node (id = {});", id)
            }
            Statement::StoreNode { id, comment, event_node } => {
                format!(
                    "store node (id = {}, comment = {}, event node = {});",
                    id,
                    quote_literal(comment),
                    event_node
                )
            }
            Statement::DropNode { id, event_node } => {
                format!("drop node (id = {}, event node = {});", id, event_node)
            }
            Statement::StorePath { server, client, conninfo } => {
                format!(
                    "store path (server = {}, client = {}, conninfo = {});",
                    server,
                    client,
                    quote_literal(conninfo)
                )
            }
            Statement::DropPath { server, client } => {
                format!("drop path (server = {}, client = {});", server, client)
            }
            Statement::CreateSet { id, origin, comment } => {
                format!(
                    "create set (id = {}, origin = {}, comment = {});",
                    id,
                    origin,
                    quote_literal(comment)
                )
            }
            Statement::DropSet { id, origin } => {
                format!("drop set (id = {}, origin = {});", id, origin)
            }
            Statement::AddTable { set, origin, id, fqname, comment } => {
                format!(
                    "set add table (set id = {}, origin = {}, id = {}, \
                     fully qualified name = {}, comment = {});",
                    set,
                    origin,
                    id,
                    quote_literal(fqname),
                    quote_literal(comment)
                )
            }
            Statement::DropTable { origin, id } => {
                format!("set drop table (origin = {}, id = {});", origin, id)
            }
            Statement::AddSequence { set, origin, id, fqname, comment } => {
                format!(
                    "set add sequence (set id = {}, origin = {}, id = {}, \
                     fully qualified name = {}, comment = {});",
                    set,
                    origin,
                    id,
                    quote_literal(fqname),
                    quote_literal(comment)
                )
            }
            Statement::DropSequence { origin, id } => {
                format!("set drop sequence (origin = {}, id = {});", origin, id)
            }
            Statement::SubscribeSet { id, provider, receiver, forward } => match forward {
                Some(forward) => format!(
                    "subscribe set (id = {}, provider = {}, receiver = {}, forward = {});",
                    id,
                    provider,
                    receiver,
                    yes_no(*forward)
                ),
                None => format!(
                    "subscribe set (id = {}, provider = {}, receiver = {});",
                    id, provider, receiver
                ),
            },
            Statement::UnsubscribeSet { id, receiver } => {
                format!("unsubscribe set (id = {}, receiver = {});", id, receiver)
            }
            Statement::MergeSet { id, add, origin } => {
                format!("merge set (id = {}, add id = {}, origin = {});", id, add, origin)
            }
        }
    }
}
