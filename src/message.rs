//! Message records as delivered by the remote change feed.

use crate::ids::{MediaId, MessageId, MessageIndex, Namespace, PeerId};
use serde::{Deserialize, Serialize};

/// Identity of a message being stored.
///
/// Messages that the server has not numbered yet carry only their peer and
/// namespace; they never enter the stored-message set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreMessageId {
    Id(MessageId),
    Partial(PeerId, Namespace),
}

impl StoreMessageId {
    pub fn peer_id(&self) -> PeerId {
        match self {
            StoreMessageId::Id(id) => id.peer_id,
            StoreMessageId::Partial(peer_id, _) => *peer_id,
        }
    }

    /// The assigned id, if the message has one.
    pub fn assigned(&self) -> Option<MessageId> {
        match self {
            StoreMessageId::Id(id) => Some(*id),
            StoreMessageId::Partial(..) => None,
        }
    }
}

bitflags::bitflags! {
    /// Bit set of per-message flags.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MessageFlags: u32 {
        const NONE = 0;
        /// Sent by someone else to this account.
        const INCOMING = 1 << 0;
        const UNSENT = 1 << 1;
        const FAILED = 1 << 2;
    }
}

/// A media attachment referenced by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A message ready to be written to local history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMessage {
    pub id: StoreMessageId,
    pub timestamp: i32,
    pub flags: MessageFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<PeerId>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Media>,
}

impl StoreMessage {
    pub fn new(id: MessageId, timestamp: i32, text: impl Into<String>) -> Self {
        StoreMessage {
            id: StoreMessageId::Id(id),
            timestamp,
            flags: MessageFlags::NONE,
            author_id: None,
            text: text.into(),
            media: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_author(mut self, author_id: PeerId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media.push(media);
        self
    }

    pub fn is_incoming(&self) -> bool {
        self.flags.contains(MessageFlags::INCOMING)
    }

    /// Timeline position, available once the server has assigned an id.
    pub fn index(&self) -> Option<MessageIndex> {
        self.id
            .assigned()
            .map(|id| MessageIndex::new(id, self.timestamp))
    }
}

/// Where in a peer's history a batch of messages is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddMessagesLocation {
    /// Backfill of an older gap. Never notifies.
    GapFill,
    /// Appended at the newest end of the history.
    LiveEdge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_contains_subsets() {
        let flags = MessageFlags::INCOMING | MessageFlags::UNSENT;
        assert!(flags.contains(MessageFlags::INCOMING));
        assert!(flags.contains(MessageFlags::UNSENT));
        assert!(!flags.contains(MessageFlags::FAILED));
        assert!(flags.contains(MessageFlags::NONE));
        assert_eq!(flags.bits(), 0b11);
    }

    #[test]
    fn flags_serialize_by_name() {
        let flags = MessageFlags::INCOMING | MessageFlags::FAILED;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "\"INCOMING | FAILED\"");
        let back: MessageFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
        assert_eq!(MessageFlags::default(), MessageFlags::NONE);
    }

    #[test]
    fn partial_ids_have_no_index() {
        let message = StoreMessage {
            id: StoreMessageId::Partial(PeerId::user(1), Namespace::LOCAL),
            timestamp: 10,
            flags: MessageFlags::NONE,
            author_id: None,
            text: "pending".into(),
            media: Vec::new(),
        };
        assert_eq!(message.index(), None);
        assert_eq!(message.id.peer_id(), PeerId::user(1));
    }
}
