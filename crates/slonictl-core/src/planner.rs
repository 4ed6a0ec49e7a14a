//! The convergence planner.
//!
//! A pure function from (desired membership, observed state) to one of the
//! terminal plans `NoOp`, `RemoveOnly`, `DirectAdd`, `MergeAdd` — or a
//! fatal precondition error where the decision procedure would reach the
//! `Blocked` state. No script is generated, and no mutation attempted, for
//! a plan that never materializes: the fatal cases return before the
//! generator ever runs.
//!
//! The live/not-live branch exists because the replication engine forbids
//! structural changes to a set that already has flowing data; additions to
//! a live set must ride through a subscribed temporary set that is merged
//! back in a single script. Removals never need the branch.

use std::collections::BTreeSet;

use slonictl_types::{
    MembershipTarget, Reachability, ReconcileError, ReconcileResult, SequenceId, SequenceSpec,
    SetId, TableId, TableSpec,
};

use crate::diff::diff;

/// The reserved scratch set id used when none is configured.
pub const DEFAULT_TEMP_SET: SetId = SetId(99);

/// Everything the planner needs to know about the world, read immediately
/// before planning. A value type so the decision procedure stays pure and
/// testable without a store.
#[derive(Debug, Clone)]
pub struct ObservedMembership {
    /// Table ids currently member of the target set.
    pub tables: BTreeSet<TableId>,
    /// Sequence ids currently member of the target set.
    pub sequences: BTreeSet<SequenceId>,
    /// Whether any subscription row exists for the set.
    pub live: bool,
    /// Reachability of the subscribed receiver (only consulted when live).
    pub receiver: Reachability,
    /// Every set id that exists on the origin, live or not; guards the
    /// temporary-set allocation.
    pub existing_sets: BTreeSet<SetId>,
}

/// One membership removal, issued independently against the set origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberDrop {
    Table(TableId),
    Sequence(SequenceId),
}

/// A terminal convergence plan.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipPlan {
    /// Desired and actual already coincide.
    NoOp,
    /// Only removals are needed.
    RemoveOnly { drops: Vec<MemberDrop> },
    /// The set is not live: each addition is an independent operation.
    DirectAdd {
        drops: Vec<MemberDrop>,
        tables: Vec<TableSpec>,
        sequences: Vec<SequenceSpec>,
    },
    /// The set is live: all additions fold into one temporary set that is
    /// created, populated, subscribed, and merged in a single script.
    MergeAdd {
        drops: Vec<MemberDrop>,
        temp_set: SetId,
        tables: Vec<TableSpec>,
        sequences: Vec<SequenceSpec>,
    },
}

impl MembershipPlan {
    /// Whether executing the plan mutates the cluster.
    pub fn changes(&self) -> bool {
        !matches!(self, MembershipPlan::NoOp)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MembershipPlan::NoOp => "no-op",
            MembershipPlan::RemoveOnly { .. } => "remove-only",
            MembershipPlan::DirectAdd { .. } => "direct-add",
            MembershipPlan::MergeAdd { .. } => "merge-add",
        }
    }
}

/// Decide how to converge the set's membership.
pub fn plan_membership(
    target: &MembershipTarget,
    observed: &ObservedMembership,
    temp_set: SetId,
) -> ReconcileResult<MembershipPlan> {
    let desired_tables: BTreeSet<TableId> = target.tables.iter().map(|t| t.id).collect();
    let desired_sequences: BTreeSet<SequenceId> = target.sequences.iter().map(|s| s.id).collect();

    let table_diff = diff(&desired_tables, &observed.tables);
    let sequence_diff = diff(&desired_sequences, &observed.sequences);

    // Removals are independent and commutative; they go first and never
    // consult the live flag.
    let mut drops: Vec<MemberDrop> =
        table_diff.to_remove.iter().map(|id| MemberDrop::Table(*id)).collect();
    drops.extend(sequence_diff.to_remove.iter().map(|id| MemberDrop::Sequence(*id)));

    let tables: Vec<TableSpec> = target
        .tables
        .iter()
        .filter(|t| table_diff.to_add.contains(&t.id))
        .cloned()
        .collect();
    let sequences: Vec<SequenceSpec> = target
        .sequences
        .iter()
        .filter(|s| sequence_diff.to_add.contains(&s.id))
        .cloned()
        .collect();

    if tables.is_empty() && sequences.is_empty() {
        return Ok(if drops.is_empty() {
            MembershipPlan::NoOp
        } else {
            MembershipPlan::RemoveOnly { drops }
        });
    }

    if !observed.live {
        return Ok(MembershipPlan::DirectAdd { drops, tables, sequences });
    }

    // Live set: the merge must run commands against every participating
    // node within one script, so partial execution is unsafe. Fail before
    // planning any mutation if the receiver cannot be reached.
    if let Reachability::Unreachable(_) = observed.receiver {
        return Err(ReconcileError::UnsafeMerge {
            set: target.set,
            receiver: target.receiver.id,
        });
    }

    // The scratch set must not collide with anything that exists, live or
    // not; merging would otherwise target the wrong set id.
    if observed.existing_sets.contains(&temp_set) {
        return Err(ReconcileError::TempSetCollision { temp: temp_set });
    }

    Ok(MembershipPlan::MergeAdd { drops, temp_set, tables, sequences })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slonictl_types::{ConnInfo, NodeEndpoint, NodeId};

    fn endpoint(id: u32, host: &str) -> NodeEndpoint {
        NodeEndpoint::new(NodeId(id), ConnInfo::new(host, "app", "postgres", 5432))
    }

    fn table(id: u32) -> TableSpec {
        TableSpec {
            id: TableId(id),
            fqname: format!("public.t{}", id),
            comment: String::new(),
        }
    }

    fn sequence(id: u32) -> SequenceSpec {
        SequenceSpec {
            id: SequenceId(id),
            fqname: format!("public.s{}", id),
            comment: String::new(),
        }
    }

    fn target(tables: Vec<TableSpec>, sequences: Vec<SequenceSpec>) -> MembershipTarget {
        MembershipTarget {
            set: SetId(10),
            origin: endpoint(1, "db1"),
            receiver: endpoint(2, "db2"),
            tables,
            sequences,
        }
    }

    fn observed(tables: &[u32], live: bool) -> ObservedMembership {
        ObservedMembership {
            tables: tables.iter().map(|id| TableId(*id)).collect(),
            sequences: BTreeSet::new(),
            live,
            receiver: Reachability::Reachable,
            existing_sets: [SetId(10)].into_iter().collect(),
        }
    }

    #[test]
    fn test_converged_is_noop() {
        let t = target(vec![table(1)], vec![]);
        let plan = plan_membership(&t, &observed(&[1], true), DEFAULT_TEMP_SET).unwrap();
        assert_eq!(plan, MembershipPlan::NoOp);
        assert!(!plan.changes());
    }

    #[test]
    fn test_unsubscribed_set_gets_direct_add() {
        let t = target(vec![table(1), table(2), table(3)], vec![]);
        let plan = plan_membership(&t, &observed(&[1], false), DEFAULT_TEMP_SET).unwrap();
        match plan {
            MembershipPlan::DirectAdd { drops, tables, sequences } => {
                assert!(drops.is_empty());
                assert_eq!(tables, vec![table(2), table(3)]);
                assert!(sequences.is_empty());
            }
            other => panic!("expected DirectAdd, got {:?}", other),
        }
    }

    #[test]
    fn test_live_set_gets_merge_add() {
        let t = target(vec![table(1), table(2), table(3)], vec![]);
        let plan = plan_membership(&t, &observed(&[1, 2], true), DEFAULT_TEMP_SET).unwrap();
        match plan {
            MembershipPlan::MergeAdd { temp_set, tables, .. } => {
                assert_eq!(temp_set, DEFAULT_TEMP_SET);
                assert_eq!(tables, vec![table(3)]);
            }
            other => panic!("expected MergeAdd, got {:?}", other),
        }
    }

    #[test]
    fn test_live_set_never_selects_direct_add() {
        let t = target(vec![table(1), table(2)], vec![]);
        let plan = plan_membership(&t, &observed(&[1], true), DEFAULT_TEMP_SET).unwrap();
        assert!(matches!(plan, MembershipPlan::MergeAdd { .. }));
    }

    #[test]
    fn test_surplus_members_get_remove_only() {
        let t = target(vec![table(1), table(2)], vec![]);
        let plan = plan_membership(&t, &observed(&[1, 2, 5], true), DEFAULT_TEMP_SET).unwrap();
        assert_eq!(
            plan,
            MembershipPlan::RemoveOnly { drops: vec![MemberDrop::Table(TableId(5))] }
        );
    }

    #[test]
    fn test_mixed_adds_share_one_temporary_set() {
        let t = target(vec![table(1), table(2)], vec![sequence(7)]);
        let plan = plan_membership(&t, &observed(&[1], true), DEFAULT_TEMP_SET).unwrap();
        match plan {
            MembershipPlan::MergeAdd { tables, sequences, temp_set, .. } => {
                assert_eq!(tables, vec![table(2)]);
                assert_eq!(sequences, vec![sequence(7)]);
                assert_eq!(temp_set, DEFAULT_TEMP_SET);
            }
            other => panic!("expected MergeAdd, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_receiver_blocks_merge() {
        let t = target(vec![table(1), table(2)], vec![]);
        let mut obs = observed(&[1], true);
        obs.receiver = Reachability::Unreachable("connection refused".into());
        let err = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UnsafeMerge { set: SetId(10), receiver: NodeId(2) }
        ));
    }

    #[test]
    fn test_unreachable_receiver_tolerated_when_not_merging() {
        // The receiver probe only gates the merge branch; removals and
        // direct adds proceed without it.
        let t = target(vec![table(1)], vec![]);
        let mut obs = observed(&[1, 5], false);
        obs.receiver = Reachability::Unreachable("connection refused".into());
        let plan = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap();
        assert!(matches!(plan, MembershipPlan::RemoveOnly { .. }));
    }

    #[test]
    fn test_temp_set_collision_is_fatal() {
        let t = target(vec![table(1), table(2)], vec![]);
        let mut obs = observed(&[1], true);
        obs.existing_sets.insert(DEFAULT_TEMP_SET);
        let err = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap_err();
        assert!(matches!(err, ReconcileError::TempSetCollision { temp: DEFAULT_TEMP_SET }));
    }

    #[test]
    fn test_reachability_checked_before_collision() {
        let t = target(vec![table(1), table(2)], vec![]);
        let mut obs = observed(&[1], true);
        obs.receiver = Reachability::Unreachable("down".into());
        obs.existing_sets.insert(DEFAULT_TEMP_SET);
        let err = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap_err();
        assert!(matches!(err, ReconcileError::UnsafeMerge { .. }));
    }

    #[test]
    fn test_drops_and_adds_combine_in_direct_add() {
        let t = target(vec![table(2)], vec![]);
        let plan = plan_membership(&t, &observed(&[1], false), DEFAULT_TEMP_SET).unwrap();
        match plan {
            MembershipPlan::DirectAdd { drops, tables, .. } => {
                assert_eq!(drops, vec![MemberDrop::Table(TableId(1))]);
                assert_eq!(tables, vec![table(2)]);
            }
            other => panic!("expected DirectAdd, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_is_pure_and_repeatable() {
        let t = target(vec![table(1), table(2)], vec![sequence(7)]);
        let obs = observed(&[1], true);
        let first = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap();
        let second = plan_membership(&t, &obs, DEFAULT_TEMP_SET).unwrap();
        assert_eq!(first, second);
    }
}
