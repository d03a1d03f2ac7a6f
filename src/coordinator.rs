use crate::events::FinalStateEvents;
use crate::ids::PeerId;
use crate::operation::Operation;
use crate::state::{FinalState, InitialState, MergeError, MutableState};
use crate::store::{PeerStore, ReadState, StoreTxn};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::thread;

/// A chunk of operations from the change feed, folded in its own branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub operations: Vec<Operation>,
    /// The feed stopped early (e.g. the server reported a gap).
    pub incomplete: bool,
}

impl UpdateBatch {
    pub fn new(operations: Vec<Operation>) -> Self {
        UpdateBatch {
            operations,
            incomplete: false,
        }
    }

    pub fn partial(operations: Vec<Operation>) -> Self {
        UpdateBatch {
            operations,
            incomplete: true,
        }
    }
}

/// What a reconciliation cycle produced after committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Incoming live-edge messages for the notification sink.
    pub events: FinalStateEvents,
    pub should_poll: bool,
    pub incomplete: bool,
    pub committed_operations: usize,
}

/// Builder for configuring a [`Coordinator`].
///
/// # Examples
///
/// ```
/// use syncfold::Coordinator;
///
/// let coordinator = Coordinator::builder()
///     .max_parallel_branches(4)
///     .poll_on_hole(false)
///     .build();
/// assert_eq!(coordinator.max_parallel_branches(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorBuilder {
    max_parallel_branches: usize,
    poll_on_hole: bool,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        CoordinatorBuilder {
            max_parallel_branches: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            poll_on_hole: true,
        }
    }
}

impl CoordinatorBuilder {
    /// Upper bound on branches folded at the same time. Values below 1 are
    /// treated as 1.
    pub fn max_parallel_branches(mut self, n: usize) -> Self {
        self.max_parallel_branches = n.max(1);
        self
    }

    /// Request another cycle whenever the folded log recorded a hole.
    pub fn poll_on_hole(mut self, enabled: bool) -> Self {
        self.poll_on_hole = enabled;
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator { config: self }
    }
}

/// Drives one reconciliation cycle: load, fold in branches, merge, commit.
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: CoordinatorBuilder,
}

impl Default for Coordinator {
    fn default() -> Self {
        Coordinator::builder().build()
    }
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn max_parallel_branches(&self) -> usize {
        self.config.max_parallel_branches
    }

    /// Run a full cycle against `store`.
    ///
    /// # Errors
    ///
    /// Returns a [`MergeError`] only if branch bookkeeping is broken; nothing
    /// is committed in that case.
    pub fn reconcile<S: PeerStore>(
        &self,
        store: &mut S,
        batches: Vec<UpdateBatch>,
    ) -> Result<CycleOutcome, MergeError> {
        let root = self.load_state(store, &batches);
        let final_state = self.fold(root, batches)?;
        let events = FinalStateEvents::from(&final_state);
        let committed_operations = commit(store, &final_state);
        log::debug!(
            "syncfold: committed {} operations, {} notifications (poll={}, incomplete={})",
            committed_operations,
            events.added_incoming_message_ids().len(),
            final_state.should_poll(),
            final_state.incomplete()
        );
        Ok(CycleOutcome {
            events,
            should_poll: final_state.should_poll(),
            incomplete: final_state.incomplete(),
            committed_operations,
        })
    }

    /// Build the root state for `batches`, preloading every peer and message
    /// they reference.
    pub fn load_state<S: PeerStore>(&self, store: &mut S, batches: &[UpdateBatch]) -> MutableState {
        let operations = batches.iter().flat_map(|batch| &batch.operations);
        let mut peer_ids = BTreeSet::new();
        let mut message_ids = BTreeSet::new();
        for operation in operations {
            peer_ids.extend(operation.referenced_peer_ids());
            message_ids.extend(operation.referenced_message_ids());
        }

        let peers: Vec<_> = peer_ids
            .iter()
            .filter_map(|id| store.get_peer(*id))
            .collect();

        store.transaction(|txn| {
            let mut initial = InitialState::new(txn.account_state());
            initial.peer_ids = peers.iter().map(|peer| peer.id()).collect();
            initial.message_ids = message_ids
                .iter()
                .copied()
                .filter(|id| txn.message_exists(*id))
                .collect();

            let mut read_inbox_max_ids = Vec::new();
            let mut by_timestamp = HashMap::new();
            for &peer_id in &peer_ids {
                if let Some(cursor) = txn.channel_cursor(peer_id) {
                    initial.channel_cursors.insert(peer_id, cursor);
                }
                if let Some(settings) = txn.notification_settings(peer_id) {
                    initial.notification_settings.insert(peer_id, settings);
                }
                if txn.has_new_messages(peer_id) {
                    initial.peer_ids_with_new_messages.insert(peer_id);
                }
                let local = txn.locally_generated_timestamps(peer_id);
                if !local.is_empty() {
                    initial
                        .locally_generated_message_timestamps
                        .insert(peer_id, local);
                }
                read_inbox_max_ids.extend(txn.read_inbox_max_id(peer_id));
                let index = txn.messages_by_timestamp(peer_id);
                if !index.is_empty() {
                    by_timestamp.insert(peer_id, index);
                }
            }

            log::debug!(
                "syncfold: loaded initial state with {} of {} peers, {} of {} messages",
                initial.peer_ids.len(),
                peer_ids.len(),
                initial.message_ids.len(),
                message_ids.len()
            );

            MutableState::new(initial)
                .with_peers(peers)
                .with_read_inbox_max_ids(read_inbox_max_ids)
                .with_stored_messages_by_timestamp(by_timestamp)
        })
    }

    /// Fold each batch in its own branch of `root`, then merge the branches
    /// back in batch order.
    ///
    /// Branches are folded on scoped worker threads, at most
    /// `max_parallel_branches` at a time.
    ///
    /// # Errors
    ///
    /// Propagates [`MergeError`] from [`MutableState::merge`].
    pub fn fold(
        &self,
        mut root: MutableState,
        batches: Vec<UpdateBatch>,
    ) -> Result<FinalState, MergeError> {
        let incomplete = batches.iter().any(|batch| batch.incomplete);
        let branches: Vec<_> = batches
            .into_iter()
            .map(|batch| (root.branch(), batch))
            .collect();
        let mut pending = branches.into_iter();
        let mut folded = Vec::new();

        loop {
            let chunk: Vec<_> = pending
                .by_ref()
                .take(self.config.max_parallel_branches)
                .collect();
            if chunk.is_empty() {
                break;
            }
            log::trace!("syncfold: folding {} branches", chunk.len());
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .into_iter()
                    .map(|(branch, batch)| scope.spawn(move || fold_batch(branch, batch)))
                    .collect();
                for handle in handles {
                    match handle.join() {
                        Ok(branch) => folded.push(branch),
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
            });
        }

        for branch in folded {
            root.merge(branch)?;
        }

        let has_hole = root
            .operations()
            .any(|operation| matches!(operation, Operation::AddHole(_)));
        let should_poll = incomplete || (self.config.poll_on_hole && has_hole);
        Ok(root.finish(should_poll, incomplete))
    }
}

fn fold_batch(mut branch: MutableState, batch: UpdateBatch) -> MutableState {
    for operation in batch.operations {
        branch.record(operation);
    }
    branch
}

/// Write a final state into `store` in one transaction.
///
/// Replays the operation log into the store, then writes the current value
/// of every peer the log touched, then the precached resources. Returns the
/// number of operations replayed.
pub fn commit<S: PeerStore>(store: &mut S, final_state: &FinalState) -> usize {
    let state = final_state.state();
    store.transaction(|txn| {
        let mut touched_peers = BTreeSet::new();
        for operation in state.operations() {
            commit_operation(txn, operation, &mut touched_peers);
        }
        for id in touched_peers {
            if let Some(peer) = state.peer(id) {
                txn.put_peer(peer.clone());
            }
        }
        for (resource, data) in state.precached_resources() {
            txn.store_resource(resource, data);
        }
        state.operations().len()
    })
}

fn commit_operation<T: StoreTxn>(
    txn: &mut T,
    operation: &Operation,
    touched_peers: &mut BTreeSet<PeerId>,
) {
    match operation {
        Operation::AddMessages(messages, location) => txn.add_messages(messages, *location),
        Operation::DeleteMessagesByGlobalId(ids) => txn.delete_messages_by_global_id(ids),
        Operation::DeleteMessages(ids) => txn.delete_messages(ids),
        Operation::EditMessage(id, message) => txn.edit_message(*id, message),
        Operation::UpdateMedia(id, media) => txn.update_media(*id, media.as_ref()),
        Operation::ReadInbox(id) => txn.apply_inbox_read(*id),
        Operation::ReadOutbox(id) => txn.apply_outbox_read(*id),
        Operation::ResetReadState {
            peer_id,
            namespace,
            max_incoming_read_id,
            max_outgoing_read_id,
            max_known_id,
            count,
        } => txn.reset_read_state(
            *peer_id,
            ReadState {
                namespace: *namespace,
                max_incoming_read_id: *max_incoming_read_id,
                max_outgoing_read_id: *max_outgoing_read_id,
                max_known_id: *max_known_id,
                count: *count,
            },
        ),
        Operation::UpdateAccountState(state) => txn.set_account_state(*state),
        Operation::UpdateChannelCursor(peer_id, cursor) => {
            txn.set_channel_cursor(*peer_id, *cursor)
        }
        Operation::UpdatePeerNotificationSettings(peer_id, settings) => {
            txn.set_notification_settings(*peer_id, settings.clone())
        }
        Operation::AddHole(id) => txn.add_hole(*id),
        Operation::MergePresences(presences) => txn.update_presences(presences),
        Operation::MergeRemoteChats(_)
        | Operation::MergeRemoteUsers(_)
        | Operation::UpdatePeer(..) => {
            touched_peers.extend(operation.referenced_peer_ids());
        }
    }
}
