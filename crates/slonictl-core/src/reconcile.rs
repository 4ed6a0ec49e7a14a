//! Per-entity reconciliation entry points.
//!
//! Each `ensure_*` method is one read-decide-act pass: query the control
//! store, compare with the declared target, and issue the administrative
//! scripts needed to converge. All methods are stateless across calls and
//! fail fast on the first interpreter error; already-committed operations
//! stay committed and are observed as actual state by the next run.

use std::sync::Arc;

use slonictl_script::{Script, ScriptOutput, ScriptRunner, Statement};
use slonictl_store::ControlStore;
use slonictl_types::{
    ClusterName, ClusterTarget, MembershipTarget, NodeTarget, Outcome, PathTarget, Presence,
    ReconcileError, ReconcileResult, SequenceSpec, SetId, SetTarget, SubscriptionTarget,
    TableSpec,
};

use crate::planner::{plan_membership, MemberDrop, MembershipPlan, ObservedMembership, DEFAULT_TEMP_SET};

/// Drives convergence for one named cluster.
pub struct Reconciler {
    cluster: ClusterName,
    store: Arc<dyn ControlStore>,
    runner: Arc<dyn ScriptRunner>,
    temp_set: SetId,
}

impl Reconciler {
    pub fn new(
        cluster: ClusterName,
        store: Arc<dyn ControlStore>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            cluster,
            store,
            runner,
            temp_set: DEFAULT_TEMP_SET,
        }
    }

    /// Override the scratch set id used by the merge orchestration.
    pub fn with_temp_set(mut self, temp_set: SetId) -> Self {
        self.temp_set = temp_set;
        self
    }

    pub fn cluster(&self) -> &ClusterName {
        &self.cluster
    }

    async fn execute(&self, script: Script) -> ReconcileResult<ScriptOutput> {
        self.runner.run(&script).await?.into_result()
    }

    /// Ensure the control schema exists (or not) on the cluster's anchor
    /// node.
    pub async fn ensure_cluster(&self, target: &ClusterTarget) -> ReconcileResult<Outcome> {
        let installed = self.store.schema_exists(&target.node.conn, &self.cluster).await?;

        match (target.presence, installed) {
            (Presence::Present, true) | (Presence::Absent, false) => Ok(Outcome::unchanged()),
            (Presence::Present, false) => {
                tracing::info!(
                    cluster = %self.cluster,
                    node = %target.node.id,
                    "initializing cluster"
                );
                let comment = format!(
                    "Node {} - {}@{}",
                    target.node.id, target.node.conn.dbname, target.node.conn.host
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.node.id, &target.node.conn)
                    .statement(Statement::InitCluster { id: target.node.id, comment });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
            (Presence::Absent, true) => {
                tracing::info!(
                    cluster = %self.cluster,
                    node = %target.node.id,
                    "uninstalling cluster"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.node.id, &target.node.conn)
                    .statement(Statement::UninstallNode { id: target.node.id });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
        }
    }

    /// Ensure a node is enrolled in (or retired from) the cluster.
    ///
    /// Enrollment is keyed on the control schema existing on the joining
    /// node itself; the event node relays the configuration event.
    pub async fn ensure_node(&self, target: &NodeTarget) -> ReconcileResult<Outcome> {
        let enrolled = self.store.schema_exists(&target.node.conn, &self.cluster).await?;

        match (target.presence, enrolled) {
            (Presence::Present, true) | (Presence::Absent, false) => Ok(Outcome::unchanged()),
            (Presence::Present, false) => {
                tracing::info!(
                    cluster = %self.cluster,
                    node = %target.node.id,
                    event_node = %target.event_node.id,
                    "storing node"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.event_node.id, &target.event_node.conn)
                    .admin_node(target.node.id, &target.node.conn)
                    .statement(Statement::StoreNode {
                        id: target.node.id,
                        comment: target.comment.clone(),
                        event_node: target.event_node.id,
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
            (Presence::Absent, true) => {
                tracing::info!(
                    cluster = %self.cluster,
                    node = %target.node.id,
                    "dropping node"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.event_node.id, &target.event_node.conn)
                    .admin_node(target.node.id, &target.node.conn)
                    .statement(Statement::DropNode {
                        id: target.node.id,
                        event_node: target.event_node.id,
                    })
                    .statement(Statement::UninstallNode { id: target.node.id });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
        }
    }

    /// Ensure the bidirectional path between two nodes exists (or not).
    ///
    /// Both sides are checked first: the server must see the client as its
    /// server and vice versa. A one-sided path is a broken topology and is
    /// surfaced as [`ReconcileError::AsymmetricPath`] with no mutation
    /// attempted.
    pub async fn ensure_path(&self, target: &PathTarget) -> ReconcileResult<Outcome> {
        let server = &target.server;
        let client = &target.client;

        let on_server = self
            .store
            .path_exists(&server.conn, &self.cluster, client.id, server.id)
            .await?;
        let on_client = self
            .store
            .path_exists(&client.conn, &self.cluster, server.id, client.id)
            .await?;

        if on_server != on_client {
            return Err(ReconcileError::AsymmetricPath {
                server: server.id,
                client: client.id,
            });
        }
        let present = on_server && on_client;

        match (target.presence, present) {
            (Presence::Present, true) | (Presence::Absent, false) => Ok(Outcome::unchanged()),
            (Presence::Present, false) => {
                tracing::info!(
                    cluster = %self.cluster,
                    server = %server.id,
                    client = %client.id,
                    "storing path in both directions"
                );
                // Both directions in one script; the conninfo stored with
                // each direction is the address of that direction's server.
                let script = Script::new(&self.cluster)
                    .admin_node(server.id, &server.conn)
                    .admin_node(client.id, &client.conn)
                    .statement(Statement::StorePath {
                        server: client.id,
                        client: server.id,
                        conninfo: client.conn.conninfo(),
                    })
                    .statement(Statement::StorePath {
                        server: server.id,
                        client: client.id,
                        conninfo: server.conn.conninfo(),
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
            (Presence::Absent, true) => self.drop_path_pair(target).await,
        }
    }

    /// Drop both directions of a path, independently.
    ///
    /// Dropping both in one script locks up the interpreter, so each
    /// direction is its own script and both are attempted regardless of the
    /// first result. The run fails only when neither direction could be
    /// dropped; a one-sided success is reported as changed, with a warning
    /// naming the direction still present — the next reconciliation of
    /// this path will refuse to touch the asymmetric remains.
    async fn drop_path_pair(&self, target: &PathTarget) -> ReconcileResult<Outcome> {
        let server = &target.server;
        let client = &target.client;

        let drop_direction = |s, c| {
            Script::new(&self.cluster)
                .admin_node(server.id, &server.conn)
                .admin_node(client.id, &client.conn)
                .statement(Statement::DropPath { server: s, client: c })
        };

        let forward = self.runner.run(&drop_direction(server.id, client.id)).await?;
        let reverse = self.runner.run(&drop_direction(client.id, server.id)).await?;

        match (forward.success(), reverse.success()) {
            (false, false) => Err(ReconcileError::BothPathDropsFailed {
                server: server.id,
                client: client.id,
                stderr: reverse.stderr,
            }),
            (true, false) => {
                tracing::warn!(
                    cluster = %self.cluster,
                    server = %client.id,
                    client = %server.id,
                    stderr = %reverse.stderr,
                    "path drop succeeded in one direction only; reverse direction still present"
                );
                Ok(Outcome::changed())
            }
            (false, true) => {
                tracing::warn!(
                    cluster = %self.cluster,
                    server = %server.id,
                    client = %client.id,
                    stderr = %forward.stderr,
                    "path drop succeeded in one direction only; forward direction still present"
                );
                Ok(Outcome::changed())
            }
            (true, true) => Ok(Outcome::changed()),
        }
    }

    /// Ensure a replication set exists (or not) on its origin.
    pub async fn ensure_set(&self, target: &SetTarget) -> ReconcileResult<Outcome> {
        let exists = self
            .store
            .set_exists(&target.origin.conn, &self.cluster, target.set)
            .await?;

        match (target.presence, exists) {
            (Presence::Present, true) | (Presence::Absent, false) => Ok(Outcome::unchanged()),
            (Presence::Present, false) => {
                tracing::info!(
                    cluster = %self.cluster,
                    set = %target.set,
                    origin = %target.origin.id,
                    "creating replication set"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.origin.id, &target.origin.conn)
                    .statement(Statement::CreateSet {
                        id: target.set,
                        origin: target.origin.id,
                        comment: target.comment.clone(),
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
            (Presence::Absent, true) => {
                tracing::info!(
                    cluster = %self.cluster,
                    set = %target.set,
                    origin = %target.origin.id,
                    "dropping replication set"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.origin.id, &target.origin.conn)
                    .statement(Statement::DropSet {
                        id: target.set,
                        origin: target.origin.id,
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
        }
    }

    /// Converge the table/sequence membership of one set.
    ///
    /// The planner decides between direct additions and the temporary-set
    /// merge orchestration; this method reads the observed state, executes
    /// whichever plan comes back, and maps the result to an outcome.
    pub async fn ensure_members(&self, target: &MembershipTarget) -> ReconcileResult<Outcome> {
        let origin = &target.origin;

        let tables = self
            .store
            .set_tables(&origin.conn, &self.cluster, target.set)
            .await?
            .into_iter()
            .collect();
        let sequences = self
            .store
            .set_sequences(&origin.conn, &self.cluster, target.set)
            .await?
            .into_iter()
            .collect();
        let live = self
            .store
            .set_is_subscribed(&origin.conn, &self.cluster, target.set)
            .await?;
        let existing_sets = self
            .store
            .cluster_sets(&origin.conn, &self.cluster)
            .await?
            .into_iter()
            .collect();
        // The receiver probe is tolerated failing: it only gates the merge
        // branch, and the planner is the one to decide that.
        let receiver = self.store.probe(&target.receiver.conn).await;

        let observed = ObservedMembership {
            tables,
            sequences,
            live,
            receiver,
            existing_sets,
        };
        let plan = plan_membership(target, &observed, self.temp_set)?;
        tracing::info!(
            cluster = %self.cluster,
            set = %target.set,
            plan = plan.kind(),
            live = observed.live,
            "membership plan selected"
        );

        let changed = plan.changes();
        match plan {
            MembershipPlan::NoOp => {}
            MembershipPlan::RemoveOnly { drops } => {
                self.run_member_drops(target, &drops).await?;
            }
            MembershipPlan::DirectAdd { drops, tables, sequences } => {
                self.run_member_drops(target, &drops).await?;
                self.run_direct_adds(target, &tables, &sequences).await?;
            }
            MembershipPlan::MergeAdd { drops, temp_set, tables, sequences } => {
                self.run_member_drops(target, &drops).await?;
                self.run_merge(target, temp_set, &tables, &sequences).await?;
            }
        }

        Ok(if changed { Outcome::changed() } else { Outcome::unchanged() })
    }

    /// Issue one independent drop script per removed member, fail-fast.
    async fn run_member_drops(
        &self,
        target: &MembershipTarget,
        drops: &[MemberDrop],
    ) -> ReconcileResult<()> {
        let origin = &target.origin;
        for drop in drops {
            let statement = match drop {
                MemberDrop::Table(id) => {
                    tracing::info!(cluster = %self.cluster, set = %target.set, table = %id, "dropping table from set");
                    Statement::DropTable { origin: origin.id, id: *id }
                }
                MemberDrop::Sequence(id) => {
                    tracing::info!(cluster = %self.cluster, set = %target.set, sequence = %id, "dropping sequence from set");
                    Statement::DropSequence { origin: origin.id, id: *id }
                }
            };
            let script = Script::new(&self.cluster)
                .admin_node(origin.id, &origin.conn)
                .statement(statement);
            self.execute(script).await?;
        }
        Ok(())
    }

    /// Issue one independent add script per new member, fail-fast.
    async fn run_direct_adds(
        &self,
        target: &MembershipTarget,
        tables: &[TableSpec],
        sequences: &[SequenceSpec],
    ) -> ReconcileResult<()> {
        let origin = &target.origin;
        for table in tables {
            tracing::info!(cluster = %self.cluster, set = %target.set, table = %table.id, "adding table to set");
            let script = Script::new(&self.cluster)
                .admin_node(origin.id, &origin.conn)
                .statement(Statement::AddTable {
                    set: target.set,
                    origin: origin.id,
                    id: table.id,
                    fqname: table.fqname.clone(),
                    comment: table.comment.clone(),
                });
            self.execute(script).await?;
        }
        for sequence in sequences {
            tracing::info!(cluster = %self.cluster, set = %target.set, sequence = %sequence.id, "adding sequence to set");
            let script = Script::new(&self.cluster)
                .admin_node(origin.id, &origin.conn)
                .statement(Statement::AddSequence {
                    set: target.set,
                    origin: origin.id,
                    id: sequence.id,
                    fqname: sequence.fqname.clone(),
                    comment: sequence.comment.clone(),
                });
            self.execute(script).await?;
        }
        Ok(())
    }

    /// The merge orchestration: create the temporary set, populate it,
    /// subscribe it to the existing receiver, and merge it into the target
    /// set — all in one script so the interpreter executes the sequence as
    /// a single ordered unit.
    async fn run_merge(
        &self,
        target: &MembershipTarget,
        temp_set: SetId,
        tables: &[TableSpec],
        sequences: &[SequenceSpec],
    ) -> ReconcileResult<()> {
        let origin = &target.origin;
        let receiver = &target.receiver;
        tracing::info!(
            cluster = %self.cluster,
            set = %target.set,
            temp_set = %temp_set,
            tables = tables.len(),
            sequences = sequences.len(),
            receiver = %receiver.id,
            "merging new members through temporary set"
        );

        let mut script = Script::new(&self.cluster)
            .admin_node(origin.id, &origin.conn)
            .admin_node(receiver.id, &receiver.conn)
            .statement(Statement::CreateSet {
                id: temp_set,
                origin: origin.id,
                comment: "temporary replication set to be merged".to_string(),
            });
        for sequence in sequences {
            script = script.statement(Statement::AddSequence {
                set: temp_set,
                origin: origin.id,
                id: sequence.id,
                fqname: sequence.fqname.clone(),
                comment: sequence.comment.clone(),
            });
        }
        for table in tables {
            script = script.statement(Statement::AddTable {
                set: temp_set,
                origin: origin.id,
                id: table.id,
                fqname: table.fqname.clone(),
                comment: table.comment.clone(),
            });
        }
        script = script
            .statement(Statement::SubscribeSet {
                id: temp_set,
                provider: origin.id,
                receiver: receiver.id,
                forward: None,
            })
            .statement(Statement::MergeSet {
                id: target.set,
                add: temp_set,
                origin: origin.id,
            });

        self.execute(script).await?;
        Ok(())
    }

    /// Ensure one subscription edge exists (or not).
    pub async fn ensure_subscription(
        &self,
        target: &SubscriptionTarget,
    ) -> ReconcileResult<Outcome> {
        let exists = self
            .store
            .subscription_exists(
                &target.provider.conn,
                &self.cluster,
                target.set,
                target.provider.id,
                target.receiver.id,
            )
            .await?;

        match (target.presence, exists) {
            (Presence::Present, true) | (Presence::Absent, false) => Ok(Outcome::unchanged()),
            (Presence::Present, false) => {
                tracing::info!(
                    cluster = %self.cluster,
                    set = %target.set,
                    provider = %target.provider.id,
                    receiver = %target.receiver.id,
                    forward = target.forward,
                    "subscribing set"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.provider.id, &target.provider.conn)
                    .admin_node(target.receiver.id, &target.receiver.conn)
                    .statement(Statement::SubscribeSet {
                        id: target.set,
                        provider: target.provider.id,
                        receiver: target.receiver.id,
                        forward: Some(target.forward),
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
            (Presence::Absent, true) => {
                tracing::info!(
                    cluster = %self.cluster,
                    set = %target.set,
                    receiver = %target.receiver.id,
                    "unsubscribing set"
                );
                let script = Script::new(&self.cluster)
                    .admin_node(target.provider.id, &target.provider.conn)
                    .admin_node(target.receiver.id, &target.receiver.conn)
                    .statement(Statement::UnsubscribeSet {
                        id: target.set,
                        receiver: target.receiver.id,
                    });
                self.execute(script).await?;
                Ok(Outcome::changed())
            }
        }
    }
}
