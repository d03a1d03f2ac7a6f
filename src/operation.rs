use crate::ids::{MediaId, MessageId, Namespace, PeerId};
use crate::message::{AddMessagesLocation, Media, StoreMessage};
use crate::peer::{
    AccountState, AdminRights, ChannelCursor, NotificationSettings, Peer, PeerPhoto, PeerPresence,
    RemoteChat, RemoteUser,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A named edit applied to a locally known peer.
///
/// Kinds that do not fit the peer's variant (a title on a user, admin rights
/// on a group) leave the peer unchanged.
///
/// # Examples
///
/// ```
/// use syncfold::{merge_group_or_channel, PeerId, PeerTransform, RemoteChat};
///
/// let group = merge_group_or_channel(None, &RemoteChat::new(PeerId::group(1))).unwrap();
/// let renamed = PeerTransform::SetTitle("Book club".into()).apply(&group);
/// assert_eq!(renamed.title(), "Book club");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerTransform {
    SetTitle(String),
    SetUsername(Option<String>),
    SetPhoto(Option<PeerPhoto>),
    SetAdminRights(Option<AdminRights>),
    SetParticipantCount(i32),
    SetAccessHash(i64),
}

impl PeerTransform {
    /// Apply the edit, returning the updated peer.
    pub fn apply(&self, peer: &Peer) -> Peer {
        let mut peer = peer.clone();
        match (self, &mut peer) {
            (PeerTransform::SetTitle(title), Peer::Group(group)) => group.title = title.clone(),
            (PeerTransform::SetTitle(title), Peer::Channel(channel)) => {
                channel.title = title.clone()
            }
            (PeerTransform::SetUsername(username), Peer::User(user)) => {
                user.username = username.clone()
            }
            (PeerTransform::SetUsername(username), Peer::Channel(channel)) => {
                channel.username = username.clone()
            }
            (PeerTransform::SetPhoto(photo), Peer::User(user)) => user.photo = *photo,
            (PeerTransform::SetPhoto(photo), Peer::Group(group)) => group.photo = *photo,
            (PeerTransform::SetPhoto(photo), Peer::Channel(channel)) => channel.photo = *photo,
            (PeerTransform::SetAdminRights(rights), Peer::Channel(channel)) => {
                channel.admin_rights = *rights
            }
            (PeerTransform::SetParticipantCount(count), Peer::Group(group)) => {
                group.participant_count = *count
            }
            (PeerTransform::SetAccessHash(hash), Peer::User(user)) => {
                user.access_hash = Some(*hash)
            }
            (PeerTransform::SetAccessHash(hash), Peer::Channel(channel)) => {
                channel.access_hash = Some(*hash)
            }
            (transform, peer) => {
                log::trace!(
                    "syncfold: {transform:?} does not apply to peer {}",
                    peer.id()
                );
            }
        }
        peer
    }
}

/// One semantic change to the account projection.
///
/// Operations are immutable once recorded. The log of operations is what a
/// branch hands back to its parent on merge and what the committer replays
/// into durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    AddMessages(Vec<StoreMessage>, AddMessagesLocation),
    DeleteMessagesByGlobalId(Vec<i32>),
    DeleteMessages(Vec<MessageId>),
    EditMessage(MessageId, StoreMessage),
    UpdateMedia(MediaId, Option<Media>),
    ReadInbox(MessageId),
    ReadOutbox(MessageId),
    ResetReadState {
        peer_id: PeerId,
        namespace: Namespace,
        max_incoming_read_id: i32,
        max_outgoing_read_id: i32,
        max_known_id: i32,
        count: i32,
    },
    UpdateAccountState(AccountState),
    UpdateChannelCursor(PeerId, ChannelCursor),
    UpdatePeerNotificationSettings(PeerId, NotificationSettings),
    AddHole(MessageId),
    MergeRemoteChats(Vec<RemoteChat>),
    UpdatePeer(PeerId, PeerTransform),
    MergeRemoteUsers(Vec<RemoteUser>),
    MergePresences(HashMap<PeerId, PeerPresence>),
}

impl Operation {
    /// Short name of the variant, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddMessages(..) => "add_messages",
            Operation::DeleteMessagesByGlobalId(_) => "delete_messages_by_global_id",
            Operation::DeleteMessages(_) => "delete_messages",
            Operation::EditMessage(..) => "edit_message",
            Operation::UpdateMedia(..) => "update_media",
            Operation::ReadInbox(_) => "read_inbox",
            Operation::ReadOutbox(_) => "read_outbox",
            Operation::ResetReadState { .. } => "reset_read_state",
            Operation::UpdateAccountState(_) => "update_account_state",
            Operation::UpdateChannelCursor(..) => "update_channel_cursor",
            Operation::UpdatePeerNotificationSettings(..) => "update_peer_notification_settings",
            Operation::AddHole(_) => "add_hole",
            Operation::MergeRemoteChats(_) => "merge_remote_chats",
            Operation::UpdatePeer(..) => "update_peer",
            Operation::MergeRemoteUsers(_) => "merge_remote_users",
            Operation::MergePresences(_) => "merge_presences",
        }
    }

    /// Peers this operation reads or writes.
    ///
    /// The coordinator preloads these into the initial state before folding.
    pub fn referenced_peer_ids(&self) -> BTreeSet<PeerId> {
        let mut ids = BTreeSet::new();
        match self {
            Operation::AddMessages(messages, _) => {
                for message in messages {
                    ids.insert(message.id.peer_id());
                    ids.extend(message.author_id);
                }
            }
            Operation::DeleteMessages(message_ids) => {
                ids.extend(message_ids.iter().map(|id| id.peer_id));
            }
            Operation::EditMessage(id, message) => {
                ids.insert(id.peer_id);
                ids.extend(message.author_id);
            }
            Operation::ReadInbox(id) | Operation::ReadOutbox(id) | Operation::AddHole(id) => {
                ids.insert(id.peer_id);
            }
            Operation::ResetReadState { peer_id, .. }
            | Operation::UpdateChannelCursor(peer_id, _)
            | Operation::UpdatePeerNotificationSettings(peer_id, _)
            | Operation::UpdatePeer(peer_id, _) => {
                ids.insert(*peer_id);
            }
            Operation::MergeRemoteChats(chats) => ids.extend(chats.iter().map(|c| c.id)),
            Operation::MergeRemoteUsers(users) => ids.extend(users.iter().map(|u| u.peer_id())),
            Operation::MergePresences(presences) => ids.extend(presences.keys().copied()),
            Operation::DeleteMessagesByGlobalId(_)
            | Operation::UpdateMedia(..)
            | Operation::UpdateAccountState(_) => {}
        }
        ids
    }

    /// Assigned message ids this operation inserts or touches.
    pub fn referenced_message_ids(&self) -> BTreeSet<MessageId> {
        match self {
            Operation::AddMessages(messages, _) => {
                messages.iter().filter_map(|m| m.id.assigned()).collect()
            }
            Operation::DeleteMessages(ids) => ids.iter().copied().collect(),
            Operation::EditMessage(id, _)
            | Operation::ReadInbox(id)
            | Operation::ReadOutbox(id) => BTreeSet::from([*id]),
            _ => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge_group_or_channel, merge_user};
    use crate::message::MessageFlags;

    #[test]
    fn transform_skips_mismatched_variant() {
        let user = merge_user(None, &RemoteUser::new(3)).unwrap();
        let unchanged = PeerTransform::SetAdminRights(Some(AdminRights::BAN_USERS)).apply(&user);
        assert_eq!(unchanged, user);
    }

    #[test]
    fn transform_sets_channel_admin_rights() {
        let channel = merge_group_or_channel(None, &RemoteChat::new(PeerId::channel(3))).unwrap();
        let Peer::Channel(updated) =
            PeerTransform::SetAdminRights(Some(AdminRights::BAN_USERS)).apply(&channel)
        else {
            panic!("expected a channel");
        };
        assert_eq!(updated.admin_rights, Some(AdminRights::BAN_USERS));
    }

    #[test]
    fn referenced_ids_cover_authors() {
        let peer = PeerId::group(1);
        let author = PeerId::user(2);
        let op = Operation::AddMessages(
            vec![
                StoreMessage::new(MessageId::cloud(peer, 10), 100, "hi")
                    .with_author(author)
                    .with_flags(MessageFlags::INCOMING),
            ],
            AddMessagesLocation::LiveEdge,
        );
        assert_eq!(op.referenced_peer_ids(), BTreeSet::from([peer, author]));
        assert_eq!(
            op.referenced_message_ids(),
            BTreeSet::from([MessageId::cloud(peer, 10)])
        );
    }

    #[test]
    fn operations_serialize_as_json() {
        let op = Operation::UpdatePeer(PeerId::channel(4), PeerTransform::SetTitle("x".into()));
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
