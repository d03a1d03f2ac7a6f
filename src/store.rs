//! The durable-store boundary.
//!
//! The reconciliation core never touches the store while folding. The
//! [`Coordinator`](crate::Coordinator) reads an initial state through these
//! traits before folding and writes the final projection back afterwards.

use crate::ids::{MediaId, MessageId, MessageIndex, Namespace, PeerId, PeerKind, ResourceId};
use crate::message::{AddMessagesLocation, Media, StoreMessage, StoreMessageId};
use crate::peer::{AccountState, ChannelCursor, NotificationSettings, Peer, PeerPresence};
use crate::snapshot::{self, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Server-reported read position of one peer's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadState {
    pub namespace: Namespace,
    pub max_incoming_read_id: i32,
    pub max_outgoing_read_id: i32,
    pub max_known_id: i32,
    pub count: i32,
}

/// Reads and writes available inside a store transaction.
pub trait StoreTxn {
    fn account_state(&self) -> AccountState;
    fn peer(&self, id: PeerId) -> Option<Peer>;
    fn message_exists(&self, id: MessageId) -> bool;
    fn channel_cursor(&self, peer_id: PeerId) -> Option<ChannelCursor>;
    fn notification_settings(&self, peer_id: PeerId) -> Option<NotificationSettings>;
    fn read_inbox_max_id(&self, peer_id: PeerId) -> Option<MessageId>;
    fn messages_by_timestamp(&self, peer_id: PeerId) -> BTreeSet<MessageIndex>;
    fn has_new_messages(&self, peer_id: PeerId) -> bool;
    fn locally_generated_timestamps(&self, peer_id: PeerId) -> Vec<(Namespace, i32)>;

    fn set_account_state(&mut self, state: AccountState);
    fn put_peer(&mut self, peer: Peer);
    fn add_messages(&mut self, messages: &[StoreMessage], location: AddMessagesLocation);
    fn delete_messages(&mut self, ids: &[MessageId]);
    fn delete_messages_by_global_id(&mut self, global_ids: &[i32]);
    fn edit_message(&mut self, id: MessageId, message: &StoreMessage);
    fn update_media(&mut self, id: MediaId, media: Option<&Media>);
    fn apply_inbox_read(&mut self, id: MessageId);
    fn apply_outbox_read(&mut self, id: MessageId);
    fn reset_read_state(&mut self, peer_id: PeerId, state: ReadState);
    fn set_channel_cursor(&mut self, peer_id: PeerId, cursor: ChannelCursor);
    fn set_notification_settings(&mut self, peer_id: PeerId, settings: NotificationSettings);
    fn add_hole(&mut self, id: MessageId);
    fn update_presences(&mut self, presences: &HashMap<PeerId, PeerPresence>);
    fn store_resource(&mut self, id: &ResourceId, data: &[u8]);
}

/// Durable storage consulted at the start of a cycle and written at commit.
pub trait PeerStore {
    type Txn: StoreTxn;

    fn get_peer(&self, id: PeerId) -> Option<Peer>;

    /// Run `f` inside a single transaction.
    fn transaction<T>(&mut self, f: impl FnOnce(&mut Self::Txn) -> T) -> T;
}

/// An in-memory [`PeerStore`], persistable with [`MemoryStore::save`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    account_state: AccountState,
    peers: HashMap<PeerId, Peer>,
    messages: BTreeMap<MessageId, StoreMessage>,
    unassigned_messages: Vec<StoreMessage>,
    media: HashMap<MediaId, Media>,
    read_inbox: HashMap<PeerId, MessageId>,
    read_outbox: HashMap<PeerId, MessageId>,
    read_states: HashMap<PeerId, ReadState>,
    channel_cursors: HashMap<PeerId, ChannelCursor>,
    notification_settings: HashMap<PeerId, NotificationSettings>,
    holes: BTreeSet<MessageId>,
    presences: HashMap<PeerId, PeerPresence>,
    resources: HashMap<ResourceId, Vec<u8>>,
    peers_with_new_messages: HashSet<PeerId>,
    locally_generated: HashMap<PeerId, Vec<(Namespace, i32)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Load a store image written by [`save`](Self::save).
    ///
    /// Returns `Ok(None)` if the file is missing or corrupt.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        snapshot::load(path)
    }

    /// Persist the store atomically to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serializing or writing the image fails.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        snapshot::save(path, self)
    }

    /// Note a message created on this device and not yet acknowledged.
    pub fn add_locally_generated(&mut self, peer_id: PeerId, namespace: Namespace, timestamp: i32) {
        self.locally_generated
            .entry(peer_id)
            .or_default()
            .push((namespace, timestamp));
    }

    pub fn message(&self, id: MessageId) -> Option<&StoreMessage> {
        self.messages.get(&id)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn unassigned_messages(&self) -> &[StoreMessage] {
        &self.unassigned_messages
    }

    pub fn read_outbox_max_id(&self, peer_id: PeerId) -> Option<MessageId> {
        self.read_outbox.get(&peer_id).copied()
    }

    pub fn read_state(&self, peer_id: PeerId) -> Option<ReadState> {
        self.read_states.get(&peer_id).copied()
    }

    pub fn has_hole(&self, id: MessageId) -> bool {
        self.holes.contains(&id)
    }

    pub fn presence(&self, peer_id: PeerId) -> Option<PeerPresence> {
        self.presences.get(&peer_id).copied()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&[u8]> {
        self.resources.get(id).map(Vec::as_slice)
    }

    pub fn media(&self, id: MediaId) -> Option<&Media> {
        self.media.get(&id)
    }
}

impl StoreTxn for MemoryStore {
    fn account_state(&self) -> AccountState {
        self.account_state
    }

    fn peer(&self, id: PeerId) -> Option<Peer> {
        self.peers.get(&id).cloned()
    }

    fn message_exists(&self, id: MessageId) -> bool {
        self.messages.contains_key(&id)
    }

    fn channel_cursor(&self, peer_id: PeerId) -> Option<ChannelCursor> {
        self.channel_cursors.get(&peer_id).copied()
    }

    fn notification_settings(&self, peer_id: PeerId) -> Option<NotificationSettings> {
        self.notification_settings.get(&peer_id).cloned()
    }

    fn read_inbox_max_id(&self, peer_id: PeerId) -> Option<MessageId> {
        self.read_inbox.get(&peer_id).copied()
    }

    fn messages_by_timestamp(&self, peer_id: PeerId) -> BTreeSet<MessageIndex> {
        self.messages
            .values()
            .filter(|message| message.id.peer_id() == peer_id)
            .filter_map(StoreMessage::index)
            .collect()
    }

    fn has_new_messages(&self, peer_id: PeerId) -> bool {
        self.peers_with_new_messages.contains(&peer_id)
    }

    fn locally_generated_timestamps(&self, peer_id: PeerId) -> Vec<(Namespace, i32)> {
        self.locally_generated
            .get(&peer_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_account_state(&mut self, state: AccountState) {
        self.account_state = state;
    }

    fn put_peer(&mut self, peer: Peer) {
        self.peers.insert(peer.id(), peer);
    }

    fn add_messages(&mut self, messages: &[StoreMessage], location: AddMessagesLocation) {
        for message in messages {
            for media in &message.media {
                self.media.insert(media.id, media.clone());
            }
            match message.id {
                StoreMessageId::Id(id) => {
                    if location == AddMessagesLocation::LiveEdge && message.is_incoming() {
                        self.peers_with_new_messages.insert(id.peer_id);
                    }
                    self.holes.remove(&id);
                    self.messages.entry(id).or_insert_with(|| message.clone());
                }
                StoreMessageId::Partial(..) => self.unassigned_messages.push(message.clone()),
            }
        }
    }

    fn delete_messages(&mut self, ids: &[MessageId]) {
        for id in ids {
            self.messages.remove(id);
        }
    }

    fn delete_messages_by_global_id(&mut self, global_ids: &[i32]) {
        // Global ids number cloud messages of users and groups; channels have
        // their own sequences.
        let global_ids: HashSet<i32> = global_ids.iter().copied().collect();
        self.messages.retain(|id, _| {
            id.namespace != Namespace::CLOUD
                || id.peer_id.kind == PeerKind::Channel
                || !global_ids.contains(&id.id)
        });
    }

    fn edit_message(&mut self, id: MessageId, message: &StoreMessage) {
        if let Some(stored) = self.messages.get_mut(&id) {
            *stored = message.clone();
        }
    }

    fn update_media(&mut self, id: MediaId, media: Option<&Media>) {
        match media {
            Some(media) => {
                self.media.insert(id, media.clone());
            }
            None => {
                self.media.remove(&id);
            }
        }
        for message in self.messages.values_mut() {
            match media {
                Some(media) => {
                    for attached in message.media.iter_mut().filter(|m| m.id == id) {
                        *attached = media.clone();
                    }
                }
                None => message.media.retain(|m| m.id != id),
            }
        }
    }

    fn apply_inbox_read(&mut self, id: MessageId) {
        let current = self.read_inbox.get(&id.peer_id);
        if current.is_none_or(|current| *current < id) {
            self.read_inbox.insert(id.peer_id, id);
            self.peers_with_new_messages.remove(&id.peer_id);
        }
        if let Some(state) = self.read_states.get_mut(&id.peer_id) {
            if state.namespace == id.namespace && state.max_incoming_read_id < id.id {
                state.max_incoming_read_id = id.id;
            }
        }
    }

    fn apply_outbox_read(&mut self, id: MessageId) {
        let current = self.read_outbox.get(&id.peer_id);
        if current.is_none_or(|current| *current < id) {
            self.read_outbox.insert(id.peer_id, id);
        }
        if let Some(state) = self.read_states.get_mut(&id.peer_id) {
            if state.namespace == id.namespace && state.max_outgoing_read_id < id.id {
                state.max_outgoing_read_id = id.id;
            }
        }
    }

    fn reset_read_state(&mut self, peer_id: PeerId, state: ReadState) {
        self.read_inbox.insert(
            peer_id,
            MessageId::new(peer_id, state.namespace, state.max_incoming_read_id),
        );
        self.read_outbox.insert(
            peer_id,
            MessageId::new(peer_id, state.namespace, state.max_outgoing_read_id),
        );
        if state.count == 0 {
            self.peers_with_new_messages.remove(&peer_id);
        }
        self.read_states.insert(peer_id, state);
    }

    fn set_channel_cursor(&mut self, peer_id: PeerId, cursor: ChannelCursor) {
        self.channel_cursors.insert(peer_id, cursor);
    }

    fn set_notification_settings(&mut self, peer_id: PeerId, settings: NotificationSettings) {
        self.notification_settings.insert(peer_id, settings);
    }

    fn add_hole(&mut self, id: MessageId) {
        self.holes.insert(id);
    }

    fn update_presences(&mut self, presences: &HashMap<PeerId, PeerPresence>) {
        self.presences
            .extend(presences.iter().map(|(id, presence)| (*id, *presence)));
    }

    fn store_resource(&mut self, id: &ResourceId, data: &[u8]) {
        self.resources.insert(id.clone(), data.to_vec());
    }
}

impl PeerStore for MemoryStore {
    type Txn = MemoryStore;

    fn get_peer(&self, id: PeerId) -> Option<Peer> {
        self.peers.get(&id).cloned()
    }

    fn transaction<T>(&mut self, f: impl FnOnce(&mut Self::Txn) -> T) -> T {
        f(self)
    }
}
