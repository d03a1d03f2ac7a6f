mod common;

use common::{ALICE, BOB, NEWS, empty_state, gap_fill, incoming, live, named_user, titled_chat};
use syncfold::{
    FinalStateEvents, MergeError, MessageId, Operation, Peer, PeerTransform, ResourceId,
};

#[test]
fn test_branch_starts_at_parent_log_end() {
    let mut parent = empty_state();
    parent.read_inbox(MessageId::cloud(ALICE, 1));
    parent.read_inbox(MessageId::cloud(ALICE, 2));

    let child = parent.branch();
    assert_eq!(child.branch_index(), 2);
    assert_eq!(child.operations().len(), 2);
    assert_eq!(
        child.read_inbox_max_id(ALICE),
        Some(MessageId::cloud(ALICE, 2))
    );
    assert!(child.inserted_peers().is_empty());
}

#[test]
fn test_branch_isolation() {
    let mut parent = empty_state();
    parent.merge_chats(vec![titled_chat(NEWS, "News")]);

    let mut child = parent.branch();
    child.add_operation(live(vec![incoming(ALICE, 10)]));
    child.read_inbox(MessageId::cloud(ALICE, 10));
    child.update_peer(NEWS, PeerTransform::SetTitle("Renamed".into()));
    child.add_precached_resource(ResourceId::new("thumb"), vec![0xff]);

    assert!(!parent.is_message_stored(MessageId::cloud(ALICE, 10)));
    assert_eq!(parent.read_inbox_max_id(ALICE), None);
    assert_eq!(parent.peer(NEWS).map(Peer::title), Some("News".to_string()));
    assert_eq!(parent.operations().len(), 1);
    assert!(parent.precached_resources().is_empty());
}

#[test]
fn test_abandoned_branch_has_no_effect() {
    let mut parent = empty_state();
    parent.read_inbox(MessageId::cloud(ALICE, 3));
    let before = parent.operations().len();

    {
        let mut child = parent.branch();
        child.read_inbox(MessageId::cloud(ALICE, 30));
        child.merge_users(vec![named_user(2, "Bob")]);
    }

    assert_eq!(parent.operations().len(), before);
    assert_eq!(
        parent.read_inbox_max_id(ALICE),
        Some(MessageId::cloud(ALICE, 3))
    );
    assert!(parent.peer(BOB).is_none());
}

#[test]
fn test_merge_replays_only_after_branch_point() {
    let mut parent = empty_state();
    parent.add_operation(live(vec![incoming(ALICE, 1)]));

    let mut child = parent.branch();
    child.add_operation(live(vec![incoming(ALICE, 2)]));
    parent.merge(child).unwrap();

    assert_eq!(parent.operations().len(), 2);
    assert_eq!(parent.stored_message_count(), 2);
}

#[test]
fn test_merge_equals_direct_application() {
    let mut parent = empty_state();
    parent.merge_chats(vec![titled_chat(NEWS, "News")]);
    parent.read_inbox(MessageId::cloud(ALICE, 4));

    let operations = vec![
        live(vec![incoming(ALICE, 5)]),
        Operation::ReadInbox(MessageId::cloud(ALICE, 5)),
        Operation::UpdatePeer(NEWS, PeerTransform::SetTitle("Daily".into())),
        gap_fill(vec![incoming(BOB, 1)]),
        Operation::AddHole(MessageId::cloud(BOB, 0)),
    ];

    let mut direct = parent.clone();
    for operation in operations.clone() {
        direct.add_operation(operation);
    }

    let mut child = parent.branch();
    for operation in operations {
        child.add_operation(operation);
    }
    parent.merge(child).unwrap();

    assert_eq!(
        parent.operations().collect::<Vec<_>>(),
        direct.operations().collect::<Vec<_>>()
    );
    assert_eq!(parent.stored_message_count(), direct.stored_message_count());
    assert_eq!(
        parent.read_inbox_max_id(ALICE),
        direct.read_inbox_max_id(ALICE)
    );
    assert_eq!(parent.peer(NEWS), direct.peer(NEWS));
}

#[test]
fn test_branch_peer_overwrites_replay() {
    let mut parent = empty_state();
    parent.merge_chats(vec![titled_chat(NEWS, "News")]);

    let mut child = parent.branch();
    child.update_peer(NEWS, PeerTransform::SetTitle("From branch".into()));

    // Parent-side edit after the branch point. Replay keeps it, the
    // overwrite from the branch does not.
    parent.update_peer(NEWS, PeerTransform::SetUsername(Some("news".into())));
    parent.merge(child).unwrap();

    let Some(Peer::Channel(channel)) = parent.peer(NEWS) else {
        panic!("expected channel");
    };
    assert_eq!(channel.title, "From branch");
    // The branch's copy predates the username edit and wins wholesale.
    assert_eq!(channel.username, None);
}

#[test]
fn test_last_merged_branch_wins() {
    let mut parent = empty_state();
    parent.merge_chats(vec![titled_chat(NEWS, "News")]);

    let mut first = parent.branch();
    first.update_peer(NEWS, PeerTransform::SetTitle("First".into()));
    let mut second = parent.branch();
    second.update_peer(NEWS, PeerTransform::SetTitle("Second".into()));

    let mut forward = parent.clone();
    forward.merge(first.clone()).unwrap();
    forward.merge(second.clone()).unwrap();

    parent.merge(second).unwrap();
    parent.merge(first).unwrap();

    assert_eq!(
        forward.peer(NEWS).map(Peer::title),
        Some("Second".to_string())
    );
    assert_eq!(
        parent.peer(NEWS).map(Peer::title),
        Some("First".to_string())
    );
}

#[test]
fn test_merge_appends_precached_resources_in_order() {
    let mut parent = empty_state();
    parent.add_precached_resource(ResourceId::new("a"), vec![1]);

    let mut first = parent.branch();
    first.add_precached_resource(ResourceId::new("b"), vec![2]);
    let mut second = parent.branch();
    second.add_precached_resource(ResourceId::new("c"), vec![3]);

    parent.merge(first).unwrap();
    parent.merge(second).unwrap();

    let ids: Vec<_> = parent
        .precached_resources()
        .iter()
        .map(|(id, _)| id.0.as_str())
        .collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[test]
fn test_merge_rejects_foreign_branch() {
    let mut parent = empty_state();
    let stranger = empty_state();
    let child = stranger.branch();

    let err = parent.merge(child).unwrap_err();
    assert!(matches!(err, MergeError::NotParent { .. }));
    assert_eq!(parent.operations().len(), 0);
}

#[test]
fn test_merge_rejects_grandchild() {
    let mut root = empty_state();
    let child = root.branch();
    let mut grandchild = child.branch();
    grandchild.read_inbox(MessageId::cloud(ALICE, 1));

    assert!(matches!(
        root.merge(grandchild),
        Err(MergeError::NotParent { .. })
    ));
}

#[test]
fn test_merge_rejects_double_merge() {
    let mut parent = empty_state();
    let mut child = parent.branch();
    child.read_inbox(MessageId::cloud(ALICE, 1));

    parent.merge(child.clone()).unwrap();
    let err = parent.merge(child).unwrap_err();
    assert!(matches!(err, MergeError::AlreadyMerged { .. }));
    assert_eq!(parent.operations().len(), 1);
    assert!(err.to_string().contains("already merged"));
}

#[test]
fn test_nested_branches_merge_upwards() {
    let mut root = empty_state();
    let mut child = root.branch();
    child.read_inbox(MessageId::cloud(ALICE, 1));

    let mut grandchild = child.branch();
    grandchild.read_inbox(MessageId::cloud(ALICE, 7));
    child.merge(grandchild).unwrap();
    root.merge(child).unwrap();

    assert_eq!(root.operations().len(), 2);
    assert_eq!(
        root.read_inbox_max_id(ALICE),
        Some(MessageId::cloud(ALICE, 7))
    );
}

#[test]
fn test_scenario_read_then_branch_merge_and_notify() {
    let mut state = empty_state();
    state.read_inbox(MessageId::cloud(ALICE, 5));
    state.read_inbox(MessageId::cloud(ALICE, 3));
    assert_eq!(
        state.read_inbox_max_id(ALICE),
        Some(MessageId::cloud(ALICE, 5))
    );

    let mut branch = state.branch();
    branch.add_operation(live(vec![incoming(ALICE, 10)]));
    state.merge(branch).unwrap();

    assert!(state.is_message_stored(MessageId::cloud(ALICE, 10)));
    let events = FinalStateEvents::from(&state);
    assert!(events.message_ids().contains(&MessageId::cloud(ALICE, 10)));
}
