//! # Slonictl Script - Slonik Statement Builder and Executor
//!
//! Administrative operations are assembled as typed statement lists and
//! rendered by a single serializer, then handed to the `slonik` interpreter
//! as one script per logical operation. Identifiers enter the statements as
//! typed integers; every free-text field passes through slonik's own
//! string-literal quoting. Nothing in this crate concatenates raw user text
//! into a script.

pub mod runner;
pub mod statement;

pub use runner::{RecordingRunner, ScriptOutput, ScriptRunner, SlonikRunner};
pub use statement::Statement;

use slonictl_types::{ClusterName, ConnInfo, NodeId};

/// One slonik script: the cluster declaration, the admin conninfo
/// declarations for every node the statements touch, and the ordered
/// statement list. Rendered and executed as a single unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    cluster: ClusterName,
    admin_nodes: Vec<(NodeId, String)>,
    statements: Vec<Statement>,
}

impl Script {
    pub fn new(cluster: &ClusterName) -> Self {
        Self {
            cluster: cluster.clone(),
            admin_nodes: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Declare an admin connection for a node. Declaration order is
    /// preserved in the rendered preamble.
    pub fn admin_node(mut self, id: NodeId, conn: &ConnInfo) -> Self {
        self.admin_nodes.push((id, conn.conninfo()));
        self
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Render the complete script text fed to slonik's stdin.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("cluster name = {};\n", self.cluster.as_str()));
        for (id, conninfo) in &self.admin_nodes {
            out.push_str(&format!(
                "node {} admin conninfo = {};\n",
                id,
                statement::quote_literal(conninfo)
            ));
        }
        for statement in &self.statements {
            out.push_str(&statement.render());
            out.push('\n');
        }
        out
    }
}
