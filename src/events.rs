use crate::ids::MessageId;
use crate::message::AddMessagesLocation;
use crate::operation::Operation;
use crate::state::{FinalState, MutableState};
use std::collections::HashSet;

/// Externally observable effects of a finished sync cycle.
///
/// Holds the ids of incoming messages that arrived at the live edge of a
/// peer's history. Gap fills never appear here. Consumers treat the ids as a
/// set, so [`union`](Self::union) is associative and commutative with respect
/// to [`message_ids`](Self::message_ids).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalStateEvents {
    added_incoming_message_ids: Vec<MessageId>,
}

impl FinalStateEvents {
    pub fn new(added_incoming_message_ids: Vec<MessageId>) -> Self {
        FinalStateEvents {
            added_incoming_message_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_incoming_message_ids.is_empty()
    }

    /// Ids in the order they were logged.
    pub fn added_incoming_message_ids(&self) -> &[MessageId] {
        &self.added_incoming_message_ids
    }

    pub fn message_ids(&self) -> HashSet<MessageId> {
        self.added_incoming_message_ids.iter().copied().collect()
    }

    /// Concatenate two event sets, `self` first.
    ///
    /// Order follows the operands, so compare results through
    /// [`message_ids`](Self::message_ids) rather than `==`.
    ///
    /// # Examples
    ///
    /// ```
    /// use syncfold::{FinalStateEvents, MessageId, PeerId};
    ///
    /// let a = FinalStateEvents::new(vec![MessageId::cloud(PeerId::user(1), 1)]);
    /// let b = FinalStateEvents::new(vec![MessageId::cloud(PeerId::user(2), 7)]);
    ///
    /// assert_eq!(a.union(&b).message_ids(), b.union(&a).message_ids());
    /// assert_ne!(a.union(&b), b.union(&a));
    /// ```
    pub fn union(&self, other: &FinalStateEvents) -> FinalStateEvents {
        let mut ids = self.added_incoming_message_ids.clone();
        ids.extend_from_slice(&other.added_incoming_message_ids);
        FinalStateEvents::new(ids)
    }
}

impl From<&MutableState> for FinalStateEvents {
    fn from(state: &MutableState) -> Self {
        let ids = state
            .operations()
            .filter_map(|operation| match operation {
                Operation::AddMessages(messages, AddMessagesLocation::LiveEdge) => Some(messages),
                _ => None,
            })
            .flatten()
            .filter(|message| message.is_incoming())
            .filter_map(|message| message.id.assigned())
            .collect();
        FinalStateEvents::new(ids)
    }
}

impl From<&FinalState> for FinalStateEvents {
    fn from(state: &FinalState) -> Self {
        FinalStateEvents::from(state.state())
    }
}
