//! Account state reconciliation as a fold over mutation operations.
//!
//! Change notifications from a remote system become [`Operation`]s recorded
//! on a [`MutableState`]. Independent batches fold in isolated branches and
//! merge back deterministically; the finished [`FinalState`] is committed to
//! a [`PeerStore`] and yields [`FinalStateEvents`] for notification.

mod coordinator;
mod events;
mod ids;
mod merge;
mod message;
mod operation;
mod peer;
pub mod snapshot;
mod state;
mod store;

pub use coordinator::{Coordinator, CoordinatorBuilder, CycleOutcome, UpdateBatch, commit};
pub use events::FinalStateEvents;
pub use ids::{
    MediaId, MessageId, MessageIndex, Namespace, ParseIdError, PeerId, PeerKind, ResourceId,
};
pub use merge::{merge_group_or_channel, merge_user};
pub use message::{AddMessagesLocation, Media, MessageFlags, StoreMessage, StoreMessageId};
pub use operation::{Operation, PeerTransform};
pub use peer::{
    AccountState, AdminRights, Channel, ChannelCursor, Group, NotificationSettings, Peer, PeerPhoto,
    PeerPresence, RemoteChat, RemoteUser, User, UserStatus,
};
pub use snapshot::SnapshotError;
pub use state::{FinalState, InitialState, MergeError, MutableState, StateId};
pub use store::{MemoryStore, PeerStore, ReadState, StoreTxn};
