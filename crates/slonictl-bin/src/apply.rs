//! The apply loop.
//!
//! Walks a resolved desired state through the reconcilers in dependency
//! order — cluster, nodes, paths, sets, memberships, subscriptions — and
//! collects a per-entity summary. The first fatal error aborts the run;
//! everything already applied stays applied and is observed as actual
//! state by the next invocation.

use slonictl_config::manifest::DesiredState;
use slonictl_core::Reconciler;
use slonictl_types::ReconcileResult;

/// Outcome of one reconciled entity.
#[derive(Debug, Clone)]
pub struct EntityResult {
    /// Human-readable entity label, e.g. `set 10` or `path 1->2`.
    pub entity: String,
    pub changed: bool,
}

/// Per-entity results of one apply run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub results: Vec<EntityResult>,
}

impl Summary {
    pub fn changed_count(&self) -> usize {
        self.results.iter().filter(|r| r.changed).count()
    }

    pub fn changed(&self) -> bool {
        self.changed_count() > 0
    }

    fn push(&mut self, entity: String, changed: bool) {
        tracing::info!(entity = %entity, changed, "entity reconciled");
        self.results.push(EntityResult { entity, changed });
    }
}

/// Reconcile every entity of the desired state, in dependency order.
pub async fn run(reconciler: &Reconciler, state: &DesiredState) -> ReconcileResult<Summary> {
    let mut summary = Summary::default();

    let outcome = reconciler.ensure_cluster(&state.cluster).await?;
    summary.push(format!("cluster {}", state.cluster_name), outcome.changed);

    for target in &state.nodes {
        let outcome = reconciler.ensure_node(target).await?;
        summary.push(format!("node {}", target.node.id), outcome.changed);
    }

    for target in &state.paths {
        let outcome = reconciler.ensure_path(target).await?;
        summary.push(
            format!("path {}->{}", target.server.id, target.client.id),
            outcome.changed,
        );
    }

    for target in &state.sets {
        let outcome = reconciler.ensure_set(target).await?;
        summary.push(format!("set {}", target.set), outcome.changed);
    }

    for target in &state.memberships {
        let outcome = reconciler.ensure_members(target).await?;
        summary.push(format!("set {} members", target.set), outcome.changed);
    }

    for target in &state.subscriptions {
        let outcome = reconciler.ensure_subscription(target).await?;
        summary.push(
            format!(
                "subscription set {} {}->{}",
                target.set, target.provider.id, target.receiver.id
            ),
            outcome.changed,
        );
    }

    Ok(summary)
}
