mod common;

use common::{ALICE, BOB, FRIENDS, empty_state, gap_fill, incoming, live, outgoing};
use std::collections::HashSet;
use syncfold::{FinalStateEvents, MessageId};

#[test]
fn test_live_edge_incoming_only() {
    let mut state = empty_state();
    state.add_operation(live(vec![incoming(ALICE, 1), outgoing(ALICE, 2)]));
    state.add_operation(gap_fill(vec![incoming(BOB, 3)]));
    state.add_operation(live(vec![incoming(FRIENDS, 4)]));

    let events = FinalStateEvents::from(&state);
    assert_eq!(
        events.added_incoming_message_ids(),
        &[MessageId::cloud(ALICE, 1), MessageId::cloud(FRIENDS, 4)]
    );
}

#[test]
fn test_gap_fill_never_notifies() {
    let mut state = empty_state();
    state.add_operation(gap_fill(vec![incoming(ALICE, 1), incoming(ALICE, 2)]));
    assert!(FinalStateEvents::from(&state).is_empty());
}

#[test]
fn test_events_from_final_state() {
    let mut state = empty_state();
    state.add_operation(live(vec![incoming(BOB, 7)]));
    let final_state = state.finish(false, false);

    let events = FinalStateEvents::from(&final_state);
    assert_eq!(
        events.message_ids(),
        HashSet::from([MessageId::cloud(BOB, 7)])
    );
}

#[test]
fn test_events_include_branch_history() {
    let mut parent = empty_state();
    parent.add_operation(live(vec![incoming(ALICE, 1)]));
    let mut child = parent.branch();
    child.add_operation(live(vec![incoming(ALICE, 2)]));
    parent.merge(child).unwrap();

    let ids = FinalStateEvents::from(&parent).message_ids();
    assert_eq!(
        ids,
        HashSet::from([MessageId::cloud(ALICE, 1), MessageId::cloud(ALICE, 2)])
    );
}

#[test]
fn test_union_concatenates() {
    let a = FinalStateEvents::new(vec![MessageId::cloud(ALICE, 1)]);
    let b = FinalStateEvents::new(vec![MessageId::cloud(BOB, 2)]);

    let joined = a.union(&b);
    assert_eq!(
        joined.added_incoming_message_ids(),
        &[MessageId::cloud(ALICE, 1), MessageId::cloud(BOB, 2)]
    );
    assert_eq!(joined.message_ids(), b.union(&a).message_ids());
}

#[test]
fn test_union_with_empty_is_identity() {
    let a = FinalStateEvents::new(vec![MessageId::cloud(ALICE, 1)]);
    let empty = FinalStateEvents::default();
    assert_eq!(a.union(&empty), a);
    assert_eq!(empty.union(&a), a);
    assert!(empty.union(&empty).is_empty());
}
