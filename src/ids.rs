//! Identifiers for peers, messages, media, and cached resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when parsing a textual peer or message id fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id: {0:?}")]
pub struct ParseIdError(String);

/// The kind of entity a [`PeerId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeerKind {
    User,
    Group,
    Channel,
}

/// Identity of a user, group, or channel.
///
/// Serialized in its compact textual form (`u42`, `g7`, `c1001`) so it can
/// key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PeerId {
    pub kind: PeerKind,
    pub id: i64,
}

impl PeerId {
    pub const fn new(kind: PeerKind, id: i64) -> Self {
        PeerId { kind, id }
    }

    pub const fn user(id: i64) -> Self {
        PeerId::new(PeerKind::User, id)
    }

    pub const fn group(id: i64) -> Self {
        PeerId::new(PeerKind::Group, id)
    }

    pub const fn channel(id: i64) -> Self {
        PeerId::new(PeerKind::Channel, id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            PeerKind::User => "u",
            PeerKind::Group => "g",
            PeerKind::Channel => "c",
        };
        write!(f, "{prefix}{}", self.id)
    }
}

impl FromStr for PeerId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIdError(s.to_string());
        let kind = match s.get(..1) {
            Some("u") => PeerKind::User,
            Some("g") => PeerKind::Group,
            Some("c") => PeerKind::Channel,
            _ => return Err(invalid()),
        };
        let id = s[1..].parse().map_err(|_| invalid())?;
        Ok(PeerId { kind, id })
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for PeerId {
    type Error = ParseIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Message namespace within a peer's history.
///
/// Messages assigned by the server live in [`Namespace::CLOUD`]; messages
/// generated on this device before the server acknowledges them live in
/// [`Namespace::LOCAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(pub i32);

impl Namespace {
    /// The canonical cloud message namespace. Only this namespace drives
    /// read-cursor resets.
    pub const CLOUD: Namespace = Namespace(0);
    pub const LOCAL: Namespace = Namespace(1);
}

/// Fully assigned message identity.
///
/// Ordering is `(peer_id, namespace, id)`, so within one peer messages compare
/// by namespace first and then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MessageId {
    pub peer_id: PeerId,
    pub namespace: Namespace,
    pub id: i32,
}

impl MessageId {
    pub const fn new(peer_id: PeerId, namespace: Namespace, id: i32) -> Self {
        MessageId {
            peer_id,
            namespace,
            id,
        }
    }

    /// Shorthand for a message in the cloud namespace.
    pub const fn cloud(peer_id: PeerId, id: i32) -> Self {
        MessageId::new(peer_id, Namespace::CLOUD, id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.peer_id, self.namespace.0, self.id)
    }
}

impl FromStr for MessageId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIdError(s.to_string());
        let mut parts = s.split(':');
        let (Some(peer), Some(namespace), Some(id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(MessageId {
            peer_id: peer.parse()?,
            namespace: Namespace(namespace.parse().map_err(|_| invalid())?),
            id: id.parse().map_err(|_| invalid())?,
        })
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = ParseIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Position of a stored message in its peer's timeline.
///
/// Orders by timestamp first, so a `BTreeSet<MessageIndex>` iterates a peer's
/// history chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIndex {
    pub id: MessageId,
    pub timestamp: i32,
}

impl MessageIndex {
    pub const fn new(id: MessageId, timestamp: i32) -> Self {
        MessageIndex { id, timestamp }
    }
}

impl Ord for MessageIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for MessageIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Identity of a media object, serialized as `namespace:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MediaId {
    pub namespace: i32,
    pub id: i64,
}

impl MediaId {
    pub const fn new(namespace: i32, id: i64) -> Self {
        MediaId { namespace, id }
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for MediaId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseIdError(s.to_string());
        let (namespace, id) = s.split_once(':').ok_or_else(invalid)?;
        Ok(MediaId {
            namespace: namespace.parse().map_err(|_| invalid())?,
            id: id.parse().map_err(|_| invalid())?,
        })
    }
}

impl From<MediaId> for String {
    fn from(id: MediaId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for MediaId {
    type Error = ParseIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Key of a binary resource (photo thumbnail, file part) cached alongside a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_order_by_namespace_then_id() {
        let peer = PeerId::user(1);
        let a = MessageId::new(peer, Namespace::CLOUD, 90);
        let b = MessageId::new(peer, Namespace::LOCAL, 2);
        let c = MessageId::cloud(peer, 100);
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn message_index_orders_by_timestamp_first() {
        let peer = PeerId::group(7);
        let early = MessageIndex::new(MessageId::cloud(peer, 50), 1000);
        let late = MessageIndex::new(MessageId::cloud(peer, 10), 2000);
        assert!(early < late);
    }

    #[test]
    fn textual_ids_parse_back() {
        let id = MessageId::new(PeerId::channel(-5), Namespace::LOCAL, 12);
        assert_eq!(id.to_string().parse::<MessageId>(), Ok(id));
        assert!("x1".parse::<PeerId>().is_err());
        assert!("u1:0".parse::<MessageId>().is_err());
    }

    #[test]
    fn ids_key_json_maps() {
        let mut map = std::collections::HashMap::new();
        map.insert(PeerId::user(8), 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"u8":1}"#);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(PeerId::channel(42).to_string(), "c42");
        assert_eq!(MessageId::cloud(PeerId::user(3), 9).to_string(), "u3:0:9");
    }
}
