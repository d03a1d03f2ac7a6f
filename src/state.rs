//! The account projection and its operation log.
//!
//! A [`MutableState`] is seeded from a read-only [`InitialState`] and folds
//! [`Operation`]s into a projection of the remote account. Independent
//! batches of changes are folded in [branches](MutableState::branch) and
//! [merged](MutableState::merge) back into their parent in a fixed order.

use crate::ids::{MediaId, MessageId, MessageIndex, Namespace, PeerId, ResourceId};
use crate::merge::{merge_group_or_channel, merge_user};
use crate::message::{AddMessagesLocation, Media, StoreMessage};
use crate::operation::{Operation, PeerTransform};
use crate::peer::{
    AccountState, ChannelCursor, NotificationSettings, Peer, PeerPresence, RemoteChat, RemoteUser,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`MutableState`], used to check branch lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

impl StateId {
    fn next() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contract violations detected by [`MutableState::merge`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("state {child} was not branched from state {parent}")]
    NotParent { parent: StateId, child: StateId },
    #[error("state {child} was already merged into state {parent}")]
    AlreadyMerged { parent: StateId, child: StateId },
}

/// Read-only baseline loaded from the store at the start of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialState {
    pub account_state: AccountState,
    /// Referenced peers that already exist locally.
    pub peer_ids: HashSet<PeerId>,
    /// Referenced messages that already exist locally.
    pub message_ids: HashSet<MessageId>,
    pub channel_cursors: HashMap<PeerId, ChannelCursor>,
    pub notification_settings: HashMap<PeerId, NotificationSettings>,
    pub peer_ids_with_new_messages: HashSet<PeerId>,
    /// Timestamps of messages created on this device that the server has
    /// not acknowledged yet.
    pub locally_generated_message_timestamps: HashMap<PeerId, Vec<(Namespace, i32)>>,
}

impl InitialState {
    pub fn new(account_state: AccountState) -> Self {
        InitialState {
            account_state,
            ..InitialState::default()
        }
    }

    /// Whether a message created on this device at `timestamp` is still
    /// awaiting server acknowledgement.
    pub fn is_locally_generated(
        &self,
        peer_id: PeerId,
        namespace: Namespace,
        timestamp: i32,
    ) -> bool {
        self.locally_generated_message_timestamps
            .get(&peer_id)
            .is_some_and(|entries| entries.contains(&(namespace, timestamp)))
    }
}

/// The live account projection plus the log of operations that produced it.
///
/// Not safe for concurrent mutation. Concurrency comes from
/// [`branch`](Self::branch): each worker owns one branch, and branches are
/// merged back one at a time.
///
/// Large tables are shared with branches and copied on first write.
///
/// # Examples
///
/// ```
/// use syncfold::{AddMessagesLocation, FinalStateEvents, InitialState, MessageFlags,
///     MessageId, MutableState, PeerId, StoreMessage};
///
/// let peer = PeerId::user(1);
/// let mut state = MutableState::new(InitialState::default());
/// state.read_inbox(MessageId::cloud(peer, 5));
/// state.read_inbox(MessageId::cloud(peer, 3));
/// assert_eq!(state.read_inbox_max_id(peer), Some(MessageId::cloud(peer, 5)));
///
/// let mut branch = state.branch();
/// let message = StoreMessage::new(MessageId::cloud(peer, 10), 1_700_000_000, "hello")
///     .with_flags(MessageFlags::INCOMING);
/// branch.add_messages(vec![message], AddMessagesLocation::LiveEdge);
/// assert!(!state.is_message_stored(MessageId::cloud(peer, 10)));
///
/// state.merge(branch).unwrap();
/// assert!(state.is_message_stored(MessageId::cloud(peer, 10)));
///
/// let events = FinalStateEvents::from(&state);
/// assert_eq!(events.added_incoming_message_ids(), &[MessageId::cloud(peer, 10)]);
/// ```
#[derive(Debug, Clone)]
pub struct MutableState {
    initial: Arc<InitialState>,
    id: StateId,
    parent: Option<StateId>,
    branch_index: usize,
    merged_children: HashSet<StateId>,

    operations: Arc<Vec<Arc<Operation>>>,

    account_state: AccountState,
    peers: Arc<HashMap<PeerId, Peer>>,
    channel_cursors: Arc<HashMap<PeerId, ChannelCursor>>,
    notification_settings: Arc<HashMap<PeerId, NotificationSettings>>,
    stored_messages: Arc<HashSet<MessageId>>,
    read_inbox_max_ids: Arc<HashMap<PeerId, MessageId>>,
    stored_messages_by_peer_and_timestamp: Arc<HashMap<PeerId, BTreeSet<MessageIndex>>>,

    inserted_peers: HashMap<PeerId, Peer>,
    precached_resources: Vec<(ResourceId, Vec<u8>)>,
}

impl MutableState {
    /// Create a root state seeded from `initial`.
    ///
    /// The stored-message set starts with the initial state's message ids;
    /// use the `with_*` methods to seed the remaining tables loaded from the
    /// store.
    pub fn new(initial: impl Into<Arc<InitialState>>) -> Self {
        let initial = initial.into();
        MutableState {
            id: StateId::next(),
            parent: None,
            branch_index: 0,
            merged_children: HashSet::new(),
            operations: Arc::new(Vec::new()),
            account_state: initial.account_state,
            peers: Arc::new(HashMap::new()),
            channel_cursors: Arc::new(initial.channel_cursors.clone()),
            notification_settings: Arc::new(initial.notification_settings.clone()),
            stored_messages: Arc::new(initial.message_ids.clone()),
            read_inbox_max_ids: Arc::new(HashMap::new()),
            stored_messages_by_peer_and_timestamp: Arc::new(HashMap::new()),
            inserted_peers: HashMap::new(),
            precached_resources: Vec::new(),
            initial,
        }
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = Peer>) -> Self {
        self.peers = Arc::new(peers.into_iter().map(|p| (p.id(), p)).collect());
        self
    }

    pub fn with_read_inbox_max_ids(mut self, ids: impl IntoIterator<Item = MessageId>) -> Self {
        self.read_inbox_max_ids = Arc::new(ids.into_iter().map(|id| (id.peer_id, id)).collect());
        self
    }

    pub fn with_stored_messages_by_timestamp(
        mut self,
        index: HashMap<PeerId, BTreeSet<MessageIndex>>,
    ) -> Self {
        self.stored_messages_by_peer_and_timestamp = Arc::new(index);
        self
    }

    /// Fork an isolated child state.
    ///
    /// The child shares the initial state and, until either side writes, every
    /// projection table. Its inserted-peers delta and precached resources
    /// start empty.
    pub fn branch(&self) -> MutableState {
        MutableState {
            initial: Arc::clone(&self.initial),
            id: StateId::next(),
            parent: Some(self.id),
            branch_index: self.operations.len(),
            merged_children: HashSet::new(),
            operations: Arc::clone(&self.operations),
            account_state: self.account_state,
            peers: Arc::clone(&self.peers),
            channel_cursors: Arc::clone(&self.channel_cursors),
            notification_settings: Arc::clone(&self.notification_settings),
            stored_messages: Arc::clone(&self.stored_messages),
            read_inbox_max_ids: Arc::clone(&self.read_inbox_max_ids),
            stored_messages_by_peer_and_timestamp: Arc::clone(
                &self.stored_messages_by_peer_and_timestamp,
            ),
            inserted_peers: HashMap::new(),
            precached_resources: Vec::new(),
        }
    }

    /// Fold a child branch back into this state.
    ///
    /// Replays the operations the child recorded after its branch point, then
    /// overwrites this state's peers with every peer the child touched, then
    /// appends the child's precached resources.
    ///
    /// Merging is not commutative: when two children touch the same peer, the
    /// one merged last wins. Merge children in a fixed order.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::NotParent`] if `child` was not branched from this
    /// state and [`MergeError::AlreadyMerged`] if it (or a clone of it) was
    /// merged here before. The state is left untouched in both cases.
    pub fn merge(&mut self, child: MutableState) -> Result<(), MergeError> {
        if child.parent != Some(self.id) {
            return Err(MergeError::NotParent {
                parent: self.id,
                child: child.id,
            });
        }
        if !self.merged_children.insert(child.id) {
            return Err(MergeError::AlreadyMerged {
                parent: self.id,
                child: child.id,
            });
        }

        let replayed = &child.operations[child.branch_index..];
        log::debug!(
            "syncfold: merging state {} into {}: {} operations, {} peers, {} resources",
            child.id,
            self.id,
            replayed.len(),
            child.inserted_peers.len(),
            child.precached_resources.len()
        );

        for operation in replayed {
            self.apply(Arc::clone(operation));
        }
        if !child.inserted_peers.is_empty() {
            Arc::make_mut(&mut self.peers).extend(child.inserted_peers);
        }
        self.precached_resources.extend(child.precached_resources);
        Ok(())
    }

    /// Wrap this state up as the result of a sync cycle.
    pub fn finish(self, should_poll: bool, incomplete: bool) -> FinalState {
        FinalState::new(self, should_poll, incomplete)
    }

    pub fn add_precached_resource(&mut self, resource: ResourceId, data: Vec<u8>) {
        self.precached_resources.push((resource, data));
    }

    pub fn add_messages(&mut self, messages: Vec<StoreMessage>, location: AddMessagesLocation) {
        self.add_operation(Operation::AddMessages(messages, location));
    }

    pub fn delete_messages_by_global_id(&mut self, global_ids: Vec<i32>) {
        self.add_operation(Operation::DeleteMessagesByGlobalId(global_ids));
    }

    pub fn delete_messages(&mut self, ids: Vec<MessageId>) {
        self.add_operation(Operation::DeleteMessages(ids));
    }

    pub fn edit_message(&mut self, id: MessageId, message: StoreMessage) {
        self.add_operation(Operation::EditMessage(id, message));
    }

    pub fn update_media(&mut self, id: MediaId, media: Option<Media>) {
        self.add_operation(Operation::UpdateMedia(id, media));
    }

    pub fn read_inbox(&mut self, id: MessageId) {
        self.add_operation(Operation::ReadInbox(id));
    }

    pub fn read_outbox(&mut self, id: MessageId) {
        self.add_operation(Operation::ReadOutbox(id));
    }

    pub fn reset_read_state(
        &mut self,
        peer_id: PeerId,
        namespace: Namespace,
        max_incoming_read_id: i32,
        max_outgoing_read_id: i32,
        max_known_id: i32,
        count: i32,
    ) {
        self.add_operation(Operation::ResetReadState {
            peer_id,
            namespace,
            max_incoming_read_id,
            max_outgoing_read_id,
            max_known_id,
            count,
        });
    }

    pub fn update_account_state(&mut self, state: AccountState) {
        self.add_operation(Operation::UpdateAccountState(state));
    }

    pub fn update_channel_cursor(&mut self, peer_id: PeerId, cursor: ChannelCursor) {
        self.add_operation(Operation::UpdateChannelCursor(peer_id, cursor));
    }

    pub fn update_peer_notification_settings(
        &mut self,
        peer_id: PeerId,
        settings: NotificationSettings,
    ) {
        self.add_operation(Operation::UpdatePeerNotificationSettings(peer_id, settings));
    }

    pub fn add_hole(&mut self, id: MessageId) {
        self.add_operation(Operation::AddHole(id));
    }

    pub fn merge_chats(&mut self, chats: Vec<RemoteChat>) {
        self.add_operation(Operation::MergeRemoteChats(chats));
    }

    pub fn update_peer(&mut self, id: PeerId, transform: PeerTransform) {
        self.add_operation(Operation::UpdatePeer(id, transform));
    }

    /// Merge remote user records.
    ///
    /// Users that carry an online status additionally produce a
    /// [`Operation::MergePresences`] entry right after the user merge.
    pub fn merge_users(&mut self, users: Vec<RemoteUser>) {
        let presences: HashMap<PeerId, PeerPresence> = users
            .iter()
            .filter_map(|user| Some((user.peer_id(), PeerPresence::from(user.status?))))
            .collect();
        self.add_operation(Operation::MergeRemoteUsers(users));
        if !presences.is_empty() {
            self.add_operation(Operation::MergePresences(presences));
        }
    }

    pub fn merge_presences(&mut self, presences: HashMap<PeerId, PeerPresence>) {
        self.add_operation(Operation::MergePresences(presences));
    }

    /// Record an operation received from the change feed.
    ///
    /// Same as [`add_operation`](Self::add_operation), except user merges go
    /// through [`merge_users`](Self::merge_users) so presences are derived.
    pub fn record(&mut self, operation: Operation) {
        match operation {
            Operation::MergeRemoteUsers(users) => self.merge_users(users),
            operation => self.add_operation(operation),
        }
    }

    /// Apply an operation to the projection and append it to the log.
    ///
    /// Total: every operation is logged, and unknown peers or repeated
    /// inserts leave the projection unchanged.
    pub fn add_operation(&mut self, operation: Operation) {
        self.apply(Arc::new(operation));
    }

    fn apply(&mut self, operation: Arc<Operation>) {
        match &*operation {
            Operation::AddMessages(messages, _) => {
                for index in messages.iter().filter_map(StoreMessage::index) {
                    if !self.stored_messages.contains(&index.id) {
                        Arc::make_mut(&mut self.stored_messages).insert(index.id);
                    }
                    let known = self
                        .stored_messages_by_peer_and_timestamp
                        .get(&index.id.peer_id)
                        .is_some_and(|set| set.contains(&index));
                    if !known {
                        Arc::make_mut(&mut self.stored_messages_by_peer_and_timestamp)
                            .entry(index.id.peer_id)
                            .or_default()
                            .insert(index);
                    }
                }
            }
            Operation::UpdateAccountState(state) => self.account_state = *state,
            Operation::UpdateChannelCursor(peer_id, cursor) => {
                Arc::make_mut(&mut self.channel_cursors).insert(*peer_id, *cursor);
            }
            Operation::UpdatePeerNotificationSettings(peer_id, settings) => {
                Arc::make_mut(&mut self.notification_settings).insert(*peer_id, settings.clone());
            }
            Operation::MergeRemoteChats(chats) => {
                for chat in chats {
                    if let Some(peer) = merge_group_or_channel(self.peers.get(&chat.id), chat) {
                        self.insert_peer(peer);
                    }
                }
            }
            Operation::MergeRemoteUsers(users) => {
                for user in users {
                    if let Some(peer) = merge_user(self.peers.get(&user.peer_id()), user) {
                        self.insert_peer(peer);
                    }
                }
            }
            Operation::UpdatePeer(id, transform) => {
                if let Some(peer) = self.peers.get(id) {
                    let updated = transform.apply(peer);
                    self.insert_peer(updated);
                }
            }
            Operation::ReadInbox(id) => {
                let advances = self
                    .read_inbox_max_ids
                    .get(&id.peer_id)
                    .is_none_or(|current| current < id);
                if advances {
                    Arc::make_mut(&mut self.read_inbox_max_ids).insert(id.peer_id, *id);
                }
            }
            Operation::ResetReadState {
                peer_id,
                namespace,
                max_incoming_read_id,
                ..
            } => {
                if *namespace == Namespace::CLOUD {
                    let advances = self
                        .read_inbox_max_ids
                        .get(peer_id)
                        .is_none_or(|current| current.id < *max_incoming_read_id);
                    if advances {
                        Arc::make_mut(&mut self.read_inbox_max_ids).insert(
                            *peer_id,
                            MessageId::new(*peer_id, *namespace, *max_incoming_read_id),
                        );
                    }
                }
            }
            Operation::AddHole(_)
            | Operation::DeleteMessages(_)
            | Operation::DeleteMessagesByGlobalId(_)
            | Operation::EditMessage(..)
            | Operation::UpdateMedia(..)
            | Operation::ReadOutbox(_)
            | Operation::MergePresences(_) => {}
        }

        log::trace!("syncfold: state {} recorded {}", self.id, operation.name());
        Arc::make_mut(&mut self.operations).push(operation);
    }

    fn insert_peer(&mut self, peer: Peer) {
        let id = peer.id();
        self.inserted_peers.insert(id, peer.clone());
        Arc::make_mut(&mut self.peers).insert(id, peer);
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn initial_state(&self) -> &InitialState {
        &self.initial
    }

    pub fn account_state(&self) -> AccountState {
        self.account_state
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn channel_cursor(&self, peer_id: PeerId) -> Option<ChannelCursor> {
        self.channel_cursors.get(&peer_id).copied()
    }

    pub fn notification_settings(&self, peer_id: PeerId) -> Option<&NotificationSettings> {
        self.notification_settings.get(&peer_id)
    }

    pub fn is_message_stored(&self, id: MessageId) -> bool {
        self.stored_messages.contains(&id)
    }

    pub fn stored_message_count(&self) -> usize {
        self.stored_messages.len()
    }

    pub fn read_inbox_max_id(&self, peer_id: PeerId) -> Option<MessageId> {
        self.read_inbox_max_ids.get(&peer_id).copied()
    }

    /// Stored messages of `peer_id`, oldest first.
    pub fn stored_messages_by_timestamp(
        &self,
        peer_id: PeerId,
    ) -> impl Iterator<Item = &MessageIndex> {
        self.stored_messages_by_peer_and_timestamp
            .get(&peer_id)
            .into_iter()
            .flatten()
    }

    /// The full operation log, oldest first.
    pub fn operations(&self) -> impl ExactSizeIterator<Item = &Operation> {
        self.operations.iter().map(|op| &**op)
    }

    /// Log length at the moment this state was branched (0 for a root state).
    pub fn branch_index(&self) -> usize {
        self.branch_index
    }

    /// Peers touched since this state was created or branched.
    pub fn inserted_peers(&self) -> &HashMap<PeerId, Peer> {
        &self.inserted_peers
    }

    pub fn precached_resources(&self) -> &[(ResourceId, Vec<u8>)] {
        &self.precached_resources
    }
}

/// A finished state ready to be committed, plus the follow-up flags for the
/// coordinator.
#[derive(Debug, Clone)]
pub struct FinalState {
    state: MutableState,
    should_poll: bool,
    incomplete: bool,
}

impl FinalState {
    pub fn new(state: MutableState, should_poll: bool, incomplete: bool) -> Self {
        FinalState {
            state,
            should_poll,
            incomplete,
        }
    }

    pub fn state(&self) -> &MutableState {
        &self.state
    }

    /// Another sync round should start right after this commit.
    pub fn should_poll(&self) -> bool {
        self.should_poll
    }

    /// The batch was partial, e.g. it stopped at a hole.
    pub fn incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn into_state(self) -> MutableState {
        self.state
    }
}
