#![allow(dead_code)]

use syncfold::{
    AddMessagesLocation, InitialState, MessageFlags, MessageId, MutableState, Operation, Peer,
    PeerId, RemoteChat, RemoteUser, StoreMessage, merge_group_or_channel,
};

pub const ALICE: PeerId = PeerId::user(1);
pub const BOB: PeerId = PeerId::user(2);
pub const FRIENDS: PeerId = PeerId::group(10);
pub const NEWS: PeerId = PeerId::channel(100);

pub fn empty_state() -> MutableState {
    MutableState::new(InitialState::default())
}

pub fn incoming(peer: PeerId, id: i32) -> StoreMessage {
    outgoing(peer, id).with_flags(MessageFlags::INCOMING)
}

pub fn outgoing(peer: PeerId, id: i32) -> StoreMessage {
    let text = format!("message {id}");
    StoreMessage::new(MessageId::cloud(peer, id), 1_000 + id, text)
}

pub fn live(messages: Vec<StoreMessage>) -> Operation {
    Operation::AddMessages(messages, AddMessagesLocation::LiveEdge)
}

pub fn gap_fill(messages: Vec<StoreMessage>) -> Operation {
    Operation::AddMessages(messages, AddMessagesLocation::GapFill)
}

pub fn named_user(id: i64, first_name: &str) -> RemoteUser {
    RemoteUser {
        first_name: Some(first_name.to_string()),
        ..RemoteUser::new(id)
    }
}

pub fn titled_chat(id: PeerId, title: &str) -> RemoteChat {
    RemoteChat {
        title: Some(title.to_string()),
        ..RemoteChat::new(id)
    }
}

/// A group or channel as it would sit in the store after a first merge.
pub fn stored_chat(id: PeerId, title: &str) -> Peer {
    let chat = titled_chat(id, title);
    merge_group_or_channel(None, &chat).unwrap()
}
