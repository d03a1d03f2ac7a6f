//! Field-by-field merging of remote peer records into local ones.
//!
//! Both functions take the locally known record (if any) and a freshly
//! received partial record. Incoming fields win when present; absent fields
//! keep the local value. The result is `None` when nothing would change, so
//! callers can skip recording the peer as touched.

use crate::ids::PeerKind;
use crate::peer::{Channel, Group, Peer, RemoteChat, RemoteUser, User};

fn prefer<T: Clone>(incoming: &Option<T>, local: Option<&Option<T>>) -> Option<T> {
    incoming
        .clone()
        .or_else(|| local.and_then(|value| value.clone()))
}

fn changed(local: Option<&Peer>, merged: Peer) -> Option<Peer> {
    match local {
        Some(current) if *current == merged => None,
        _ => Some(merged),
    }
}

/// Merge a remote user record into the local one.
///
/// A local record that is not a user is treated as absent.
///
/// # Examples
///
/// ```
/// use syncfold::{merge_user, RemoteUser};
///
/// let remote = RemoteUser {
///     first_name: Some("Ada".into()),
///     ..RemoteUser::new(1)
/// };
/// let merged = merge_user(None, &remote).unwrap();
/// assert_eq!(merged.title(), "Ada");
///
/// // Merging the same record again changes nothing.
/// assert_eq!(merge_user(Some(&merged), &remote), None);
/// ```
pub fn merge_user(local: Option<&Peer>, remote: &RemoteUser) -> Option<Peer> {
    let current = match local {
        Some(Peer::User(user)) => Some(user),
        _ => None,
    };

    let merged = User {
        id: remote.peer_id(),
        access_hash: remote
            .access_hash
            .or_else(|| current.and_then(|u| u.access_hash)),
        first_name: prefer(&remote.first_name, current.map(|u| &u.first_name)),
        last_name: prefer(&remote.last_name, current.map(|u| &u.last_name)),
        username: prefer(&remote.username, current.map(|u| &u.username)),
        phone: prefer(&remote.phone, current.map(|u| &u.phone)),
        photo: remote.photo.or_else(|| current.and_then(|u| u.photo)),
        is_bot: remote
            .bot
            .or_else(|| current.map(|u| u.is_bot))
            .unwrap_or(false),
    };

    changed(local, Peer::User(merged))
}

/// Merge a remote group or channel record into the local one.
///
/// Returns `None` for records whose id names a user, since those never
/// describe a chat.
pub fn merge_group_or_channel(local: Option<&Peer>, remote: &RemoteChat) -> Option<Peer> {
    let merged = match remote.id.kind {
        PeerKind::Group => {
            let current = match local {
                Some(Peer::Group(group)) => Some(group),
                _ => None,
            };
            Peer::Group(Group {
                id: remote.id,
                title: remote
                    .title
                    .clone()
                    .or_else(|| current.map(|g| g.title.clone()))
                    .unwrap_or_default(),
                photo: remote.photo.or_else(|| current.and_then(|g| g.photo)),
                participant_count: remote
                    .participant_count
                    .or_else(|| current.map(|g| g.participant_count))
                    .unwrap_or(0),
                version: remote
                    .version
                    .or_else(|| current.map(|g| g.version))
                    .unwrap_or(0),
            })
        }
        PeerKind::Channel => {
            let current = match local {
                Some(Peer::Channel(channel)) => Some(channel),
                _ => None,
            };
            Peer::Channel(Channel {
                id: remote.id,
                access_hash: remote
                    .access_hash
                    .or_else(|| current.and_then(|c| c.access_hash)),
                title: remote
                    .title
                    .clone()
                    .or_else(|| current.map(|c| c.title.clone()))
                    .unwrap_or_default(),
                username: prefer(&remote.username, current.map(|c| &c.username)),
                photo: remote.photo.or_else(|| current.and_then(|c| c.photo)),
                admin_rights: remote
                    .admin_rights
                    .or_else(|| current.and_then(|c| c.admin_rights)),
                is_megagroup: remote
                    .megagroup
                    .or_else(|| current.map(|c| c.is_megagroup))
                    .unwrap_or(false),
            })
        }
        PeerKind::User => {
            log::warn!("syncfold: ignoring chat record with user id {}", remote.id);
            return None;
        }
    };

    changed(local, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PeerId;
    use crate::peer::{AdminRights, PeerPhoto};

    fn channel(title: &str) -> Peer {
        Peer::Channel(Channel {
            id: PeerId::channel(5),
            access_hash: Some(77),
            title: title.to_string(),
            username: Some("news".into()),
            photo: Some(PeerPhoto {
                photo_id: 1,
                dc_id: 2,
            }),
            admin_rights: None,
            is_megagroup: false,
        })
    }

    #[test]
    fn partial_channel_record_keeps_local_fields() {
        let local = channel("News");
        let remote = RemoteChat {
            title: Some("Daily News".into()),
            ..RemoteChat::new(PeerId::channel(5))
        };

        let Some(Peer::Channel(merged)) = merge_group_or_channel(Some(&local), &remote) else {
            panic!("expected a channel");
        };
        assert_eq!(merged.title, "Daily News");
        assert_eq!(merged.access_hash, Some(77));
        assert_eq!(merged.username.as_deref(), Some("news"));
        assert!(merged.photo.is_some());
    }

    #[test]
    fn identical_merge_is_none() {
        let local = channel("News");
        let remote = RemoteChat {
            title: Some("News".into()),
            access_hash: Some(77),
            ..RemoteChat::new(PeerId::channel(5))
        };
        assert_eq!(merge_group_or_channel(Some(&local), &remote), None);
    }

    #[test]
    fn admin_rights_arrive_on_channel() {
        let remote = RemoteChat {
            admin_rights: Some(AdminRights::POST_MESSAGES | AdminRights::PIN_MESSAGES),
            ..RemoteChat::new(PeerId::channel(5))
        };
        let Some(Peer::Channel(merged)) = merge_group_or_channel(Some(&channel("News")), &remote)
        else {
            panic!("expected a channel");
        };
        let rights = merged.admin_rights.unwrap();
        assert!(rights.contains(AdminRights::POST_MESSAGES));
        assert!(!rights.contains(AdminRights::BAN_USERS));
        assert_eq!(rights.bits(), 0b100_0010);
    }

    #[test]
    fn user_id_in_chat_record_is_ignored() {
        let remote = RemoteChat::new(PeerId::user(5));
        assert_eq!(merge_group_or_channel(None, &remote), None);
    }

    #[test]
    fn group_created_from_scratch() {
        let remote = RemoteChat {
            title: Some("Friends".into()),
            participant_count: Some(4),
            ..RemoteChat::new(PeerId::group(9))
        };
        let merged = merge_group_or_channel(None, &remote).unwrap();
        assert_eq!(
            merged,
            Peer::Group(Group {
                id: PeerId::group(9),
                title: "Friends".into(),
                photo: None,
                participant_count: 4,
                version: 0,
            })
        );
    }

    #[test]
    fn user_fields_prefer_incoming() {
        let local = merge_user(
            None,
            &RemoteUser {
                first_name: Some("Ada".into()),
                phone: Some("555".into()),
                ..RemoteUser::new(1)
            },
        )
        .unwrap();

        let Some(Peer::User(merged)) = merge_user(
            Some(&local),
            &RemoteUser {
                first_name: Some("Augusta".into()),
                bot: Some(true),
                ..RemoteUser::new(1)
            },
        ) else {
            panic!("expected a user");
        };
        assert_eq!(merged.first_name.as_deref(), Some("Augusta"));
        assert_eq!(merged.phone.as_deref(), Some("555"));
        assert!(merged.is_bot);
    }
}
