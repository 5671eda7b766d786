//! Room struct definition
//!
//! A named broadcast group. Holds member ids only; the Hub owns the clients.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::client::Client;
use crate::message::WireMessage;
use crate::types::ClientId;

/// Room used by broadcasts that name no room
pub const DEFAULT_ROOM: &str = "general";

/// Chat room
///
/// Created lazily on first join and kept even when it empties out.
#[derive(Debug)]
pub struct Room {
    /// Room name (unique across the hub)
    pub name: String,
    /// Current members
    members: HashSet<ClientId>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashSet::new(),
        }
    }

    /// Add a member
    ///
    /// Returns false if the client was already a member.
    pub fn add(&mut self, client_id: ClientId) -> bool {
        self.members.insert(client_id)
    }

    /// Remove a member
    ///
    /// Returns false if the client was not a member.
    pub fn remove(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id)
    }

    /// Check if a client is in this room
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Number of current members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate over member ids
    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }

    /// Deliver `msg` to every member except `exclude`
    ///
    /// Each delivery is independent: a full or closed queue only affects that
    /// member. Returns how many members accepted the message.
    pub fn broadcast(
        &self,
        clients: &HashMap<ClientId, Client>,
        msg: &WireMessage,
        exclude: Option<ClientId>,
    ) -> usize {
        let mut delivered = 0;
        for member in self.members() {
            if Some(member) == exclude {
                continue;
            }
            let Some(client) = clients.get(&member) else {
                debug!(room = %self.name, client_id = %member, "member missing from registry");
                continue;
            };
            if client.enqueue(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Sorted usernames of members that have claimed one
    pub fn usernames(&self, clients: &HashMap<ClientId, Client>) -> Vec<String> {
        let mut names: Vec<String> = self
            .members()
            .filter_map(|id| clients.get(&id))
            .filter_map(|client| client.username.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn register(
        clients: &mut HashMap<ClientId, Client>,
        username: Option<&str>,
        capacity: usize,
    ) -> (ClientId, mpsc::Receiver<WireMessage>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(capacity);
        let mut client = Client::new(id, None, tx, CancellationToken::new());
        if let Some(name) = username {
            client.claim_username(name);
        }
        clients.insert(id, client);
        (id, rx)
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new("lobby");

        assert_eq!(room.name, "lobby");
        assert!(room.is_empty());
        assert_eq!(room.len(), 0);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let mut room = Room::new("lobby");
        let id = ClientId::new();
        let other = ClientId::new();

        assert!(room.add(id));
        assert!(!room.add(id));
        assert_eq!(room.len(), 1);
        assert!(room.contains(id));

        assert!(!room.remove(other));
        assert!(room.remove(id));
        assert!(!room.remove(id));
        assert!(room.is_empty());
    }

    #[test]
    fn test_membership_matches_join_leave_replay() {
        let ids: Vec<ClientId> = (0..5).map(|_| ClientId::new()).collect();
        let mut room = Room::new("replay");

        // (index, join?) sequence
        let ops = [
            (0, true),
            (1, true),
            (2, true),
            (1, false),
            (3, true),
            (0, false),
            (1, true),
            (4, true),
            (4, false),
        ];
        let mut expected = HashSet::new();
        for (idx, join) in ops {
            if join {
                room.add(ids[idx]);
                expected.insert(ids[idx]);
            } else {
                room.remove(ids[idx]);
                expected.remove(&ids[idx]);
            }
        }

        let actual: HashSet<ClientId> = room.members().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_broadcast_excludes_and_reaches_others_once() {
        let mut clients = HashMap::new();
        let (alice, mut alice_rx) = register(&mut clients, Some("alice"), 8);
        let (bob, mut bob_rx) = register(&mut clients, Some("bob"), 8);
        let (carol, mut carol_rx) = register(&mut clients, Some("carol"), 8);
        let (_outsider, mut outsider_rx) = register(&mut clients, Some("dave"), 8);

        let mut room = Room::new("lobby");
        room.add(alice);
        room.add(bob);
        room.add(carol);

        let msg = WireMessage::new(MessageKind::Pong);
        let delivered = room.broadcast(&clients, &msg, Some(alice));

        assert_eq!(delivered, 2);
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(bob_rx.try_recv().unwrap(), msg);
        assert!(bob_rx.try_recv().is_err());
        assert_eq!(carol_rx.try_recv().unwrap(), msg);
        assert!(carol_rx.try_recv().is_err());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_survives_full_member_queue() {
        let mut clients = HashMap::new();
        let (slow, mut slow_rx) = register(&mut clients, Some("slow"), 1);
        let (fast, mut fast_rx) = register(&mut clients, Some("fast"), 8);

        let mut room = Room::new("lobby");
        room.add(slow);
        room.add(fast);

        room.broadcast(&clients, &WireMessage::error("one"), None);
        let delivered = room.broadcast(&clients, &WireMessage::error("two"), None);

        assert_eq!(delivered, 1);
        assert_eq!(slow_rx.try_recv().unwrap().message.as_deref(), Some("one"));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(fast_rx.try_recv().unwrap().message.as_deref(), Some("one"));
        assert_eq!(fast_rx.try_recv().unwrap().message.as_deref(), Some("two"));
    }

    #[test]
    fn test_usernames_sorted_and_skip_anonymous() {
        let mut clients = HashMap::new();
        let (bob, _bob_rx) = register(&mut clients, Some("bob"), 1);
        let (alice, _alice_rx) = register(&mut clients, Some("alice"), 1);
        let (anon, _anon_rx) = register(&mut clients, None, 1);

        let mut room = Room::new("x");
        room.add(bob);
        room.add(alice);
        room.add(anon);

        assert_eq!(room.usernames(&clients), vec!["alice", "bob"]);
        assert!(Room::new("empty").usernames(&clients).is_empty());
    }
}
