//! Peer records, per-peer settings, and the partial records received from
//! the remote system.

use crate::ids::{PeerId, PeerKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerPhoto {
    pub photo_id: i64,
    pub dc_id: i32,
}

bitflags::bitflags! {
    /// Bit set of administrative rights held in a channel.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AdminRights: u32 {
        const CHANGE_INFO = 1 << 0;
        const POST_MESSAGES = 1 << 1;
        const EDIT_MESSAGES = 1 << 2;
        const DELETE_MESSAGES = 1 << 3;
        const BAN_USERS = 1 << 4;
        const INVITE_USERS = 1 << 5;
        const PIN_MESSAGES = 1 << 6;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PeerId,
    pub access_hash: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<PeerPhoto>,
    pub is_bot: bool,
}

/// A basic (non-channel) group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: PeerId,
    pub title: String,
    pub photo: Option<PeerPhoto>,
    pub participant_count: i32,
    pub version: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: PeerId,
    pub access_hash: Option<i64>,
    pub title: String,
    pub username: Option<String>,
    pub photo: Option<PeerPhoto>,
    pub admin_rights: Option<AdminRights>,
    pub is_megagroup: bool,
}

/// A locally tracked user, group, or channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Peer {
    User(User),
    Group(Group),
    Channel(Channel),
}

impl Peer {
    pub fn id(&self) -> PeerId {
        match self {
            Peer::User(user) => user.id,
            Peer::Group(group) => group.id,
            Peer::Channel(channel) => channel.id,
        }
    }

    pub fn kind(&self) -> PeerKind {
        self.id().kind
    }

    /// Display title: the group/channel title, or the user's full name.
    pub fn title(&self) -> String {
        match self {
            Peer::User(user) => match (&user.first_name, &user.last_name) {
                (Some(first), Some(last)) => format!("{first} {last}"),
                (Some(name), None) | (None, Some(name)) => name.clone(),
                (None, None) => String::new(),
            },
            Peer::Group(group) => group.title.clone(),
            Peer::Channel(channel) => channel.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    Online { expires: i32 },
    Offline { was_online: i32 },
    Recently,
    LastWeek,
    LastMonth,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerPresence {
    pub status: UserStatus,
}

impl From<UserStatus> for PeerPresence {
    fn from(status: UserStatus) -> Self {
        PeerPresence { status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Unix time until which the peer is muted. `None` means not muted.
    pub muted_until: Option<i32>,
    pub sound: Option<String>,
    pub show_previews: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            muted_until: None,
            sound: None,
            show_previews: true,
        }
    }
}

/// Per-channel position in the channel's own update sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCursor {
    pub pts: i32,
    /// Set when the server reported the sequence as too long to replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidated_pts: Option<i32>,
}

impl ChannelCursor {
    pub const fn new(pts: i32) -> Self {
        ChannelCursor {
            pts,
            invalidated_pts: None,
        }
    }
}

/// Account-level sync position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub pts: i32,
    pub qts: i32,
    pub date: i32,
    pub seq: i32,
}

/// A user record as received from the remote system.
///
/// Every field other than `id` may be absent. Absent fields never erase what
/// is already known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    pub access_hash: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<PeerPhoto>,
    pub bot: Option<bool>,
    pub status: Option<UserStatus>,
}

impl RemoteUser {
    /// An otherwise empty record for `id`.
    pub fn new(id: i64) -> Self {
        RemoteUser {
            id,
            access_hash: None,
            first_name: None,
            last_name: None,
            username: None,
            phone: None,
            photo: None,
            bot: None,
            status: None,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::user(self.id)
    }
}

/// A group or channel record as received from the remote system.
///
/// `id.kind` decides whether the merged record is a [`Group`] or a
/// [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChat {
    pub id: PeerId,
    pub access_hash: Option<i64>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub photo: Option<PeerPhoto>,
    pub participant_count: Option<i32>,
    pub admin_rights: Option<AdminRights>,
    pub version: Option<i32>,
    pub megagroup: Option<bool>,
}

impl RemoteChat {
    pub fn new(id: PeerId) -> Self {
        RemoteChat {
            id,
            access_hash: None,
            title: None,
            username: None,
            photo: None,
            participant_count: None,
            admin_rights: None,
            version: None,
            megagroup: None,
        }
    }
}
