//! Property-based tests for timeline derivation and permission resolution
//!
//! Random chain logs (grants and approval events in any interleaving) are
//! replayed through the timeline builder. Whatever the log looks like, the
//! derived stages must keep a single working pointer with finished stages
//! before it and untouched stages after it.

use proptest::prelude::*;
use transaction_routing::{
    context::{ApprovalStatus, ChainState, RouteContext},
    directory::UnnamedDirectory,
    grant::{ChainKey, GrantRequest, PermissionType, TimeStamp},
    permission::{ActingIdentity, resolve},
    timeline::{self, StageStatus, Timeline},
};

#[derive(Debug, Clone)]
enum Op {
    External {
        directorate: u64,
        permission: PermissionType,
    },
    Internal {
        user: u64,
        acting: Option<u64>,
        permission: PermissionType,
        approver: bool,
    },
    Event(ApprovalStatus),
}

fn permission_strategy() -> impl Strategy<Value = PermissionType> {
    prop_oneof![
        Just(PermissionType::View),
        Just(PermissionType::Comment),
        Just(PermissionType::Edit),
    ]
}

fn status_strategy() -> impl Strategy<Value = ApprovalStatus> {
    prop_oneof![
        Just(ApprovalStatus::UnderReview),
        Just(ApprovalStatus::Approved),
        Just(ApprovalStatus::Rejected),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..4, permission_strategy())
            .prop_map(|(directorate, permission)| Op::External { directorate, permission }),
        (0u64..4, prop::option::of(0u64..4), permission_strategy(), any::<bool>()).prop_map(
            |(user, acting, permission, approver)| Op::Internal {
                user,
                acting,
                permission,
                approver,
            }
        ),
        status_strategy().prop_map(Op::Event),
    ]
}

/// Builds a log. With `gated`, events are only written while a stage is
/// working, the way the approval gateway writes them.
fn apply(ops: &[Op], gated: bool) -> RouteContext {
    let mut ctx = RouteContext::new(ChainKey::new(100, 1));

    for op in ops {
        match op {
            Op::External {
                directorate,
                permission,
            } => {
                let grant = GrantRequest::external()
                    .set_transaction(100)
                    .set_sub_module(1)
                    .set_vessel(5)
                    .set_directorate(*directorate)
                    .set_permission(*permission)
                    .validate_and_finalise(None)
                    .unwrap();
                ctx.append_grant(grant, TimeStamp::new()).unwrap();
            }
            Op::Internal {
                user,
                acting,
                permission,
                approver,
            } => {
                let grant = GrantRequest::internal()
                    .set_transaction(100)
                    .set_sub_module(1)
                    .set_vessel(5)
                    .set_user(*user)
                    .set_permission(*permission)
                    .set_approver(*approver)
                    .validate_and_finalise(*acting)
                    .unwrap();
                ctx.append_grant(grant, TimeStamp::new()).unwrap();
            }
            Op::Event(status) => {
                if gated && ctx.current_state().working_stage().is_none() {
                    continue;
                }
                ctx.append_event(5, "remark", *status, TimeStamp::new())
                    .unwrap();
            }
        }
    }
    ctx
}

fn assert_single_working_pointer(timeline: &Timeline) -> Result<(), TestCaseError> {
    let statuses: Vec<StageStatus> = timeline.stages.iter().map(|s| s.status).collect();
    let working: Vec<usize> = statuses
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == StageStatus::Working)
        .map(|(i, _)| i)
        .collect();

    prop_assert!(working.len() <= 1, "more than one working stage: {:?}", statuses);

    match working.first() {
        Some(&w) => {
            prop_assert!(statuses[..w].iter().all(|s| *s == StageStatus::Completed));
            prop_assert!(statuses[w + 1..].iter().all(|s| *s == StageStatus::Pending));
            prop_assert!(timeline.stages[w + 1..]
                .iter()
                .all(|s| s.timestamp.is_none() && s.duration.is_none()));
            prop_assert_eq!(timeline.state.working_stage(), Some(w));
        }
        None => {
            prop_assert!(statuses.iter().all(|s| *s == StageStatus::Completed));
            prop_assert_eq!(&timeline.state, &ChainState::Completed);
        }
    }
    Ok(())
}

proptest! {
    /// Property: any log, including events nobody should have written, derives
    /// a single working pointer with completed stages before it and pending after.
    #[test]
    fn prop_single_working_pointer(ops in prop::collection::vec(op_strategy(), 1..=24)) {
        let ctx = apply(&ops, false);
        prop_assume!(ctx.is_routed());

        let timeline = timeline::build(&ctx, &UnnamedDirectory, &TimeStamp::new()).unwrap();
        assert_single_working_pointer(&timeline)?;
    }

    /// Property: the same holds for logs written the way the gateway writes them,
    /// and every event in such a log lands on a stage.
    #[test]
    fn prop_gated_events_always_land(ops in prop::collection::vec(op_strategy(), 1..=24)) {
        let ctx = apply(&ops, true);
        prop_assume!(ctx.is_routed());

        let timeline = timeline::build(&ctx, &UnnamedDirectory, &TimeStamp::new()).unwrap();
        assert_single_working_pointer(&timeline)?;

        let approvals = ctx
            .events
            .iter()
            .filter(|e| e.status == ApprovalStatus::Approved)
            .count();
        let participants: usize = timeline
            .stages
            .iter()
            .map(|s| s.internal_participants.len() + 1)
            .sum();
        prop_assert!(approvals <= participants);
    }

    /// Property: derivation is deterministic.
    #[test]
    fn prop_derivation_is_idempotent(ops in prop::collection::vec(op_strategy(), 1..=16)) {
        let ctx = apply(&ops, true);
        prop_assume!(ctx.is_routed());
        let now = TimeStamp::new();

        let first = timeline::build(&ctx, &UnnamedDirectory, &now).unwrap();
        let second = timeline::build(&ctx, &UnnamedDirectory, &now).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(ctx.current_state(), ctx.current_state());
    }

    /// Property: stages are one per distinct actor, never more than the grants.
    #[test]
    fn prop_stage_count_bounded_by_grants(ops in prop::collection::vec(op_strategy(), 1..=24)) {
        let ctx = apply(&ops, false);
        prop_assume!(ctx.is_routed());

        let timeline = timeline::build(&ctx, &UnnamedDirectory, &TimeStamp::new()).unwrap();
        let steps: usize = timeline
            .stages
            .iter()
            .map(|s| s.internal_participants.len() + 1)
            .sum();
        prop_assert!(steps <= ctx.grants.len());
    }

    /// Property: access flags are monotone and match the best applicable grant.
    #[test]
    fn prop_access_is_monotone(
        ops in prop::collection::vec(op_strategy(), 0..=16),
        user in 0u64..4,
        directorate in prop::option::of(0u64..4),
    ) {
        let ctx = apply(&ops, false);
        let actor = ActingIdentity::new(user, directorate);
        let access = resolve(&ctx.grants, &actor);

        prop_assert!(!access.can_edit || access.can_comment);
        prop_assert!(!access.can_comment || access.can_view);

        let expected = ops
            .iter()
            .filter_map(|op| match op {
                Op::Internal { user: u, permission, .. } if *u == user => Some(*permission),
                Op::External { directorate: d, permission } if Some(*d) == directorate => {
                    Some(*permission)
                }
                _ => None,
            })
            .max();
        prop_assert_eq!(access.level(), expected);
    }
}
