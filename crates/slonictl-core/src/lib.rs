//! # Slonictl Core - Reconciliation and Convergence Orchestration
//!
//! The stateful heart of slonictl: diff the declared membership of a
//! replication cluster against what the control store reports right now,
//! choose a convergence plan that respects the replication engine's
//! invariants, and drive the resulting scripts through the interpreter.
//!
//! Every entry point is read-decide-act: nothing is cached between
//! invocations, and re-running after a partial failure picks up exactly
//! where the cluster actually is.

pub mod diff;
pub mod planner;
pub mod reconcile;

pub use diff::{diff, MemberDiff};
pub use planner::{plan_membership, MemberDrop, MembershipPlan, ObservedMembership, DEFAULT_TEMP_SET};
pub use reconcile::Reconciler;
