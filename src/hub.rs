//! Hub actor implementation
//!
//! The central actor that owns every room and the client registry.
//! Connection tasks never touch this state; they send `HubEvent`s and the
//! hub applies them one at a time.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::message::{MessageKind, WireMessage};
use crate::room::{Room, DEFAULT_ROOM};
use crate::sanitize::sanitize;
use crate::types::ClientId;

/// Events sent from connection tasks to the Hub
#[derive(Debug)]
pub enum HubEvent {
    /// New client connected
    Connect {
        client_id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<WireMessage>,
        shutdown: CancellationToken,
    },
    /// Client's reader ended
    Disconnect { client_id: ClientId },
    /// Decoded message from a client
    Inbound {
        client_id: ClientId,
        message: WireMessage,
    },
}

/// The main Hub actor
///
/// Rooms live in a `BTreeMap` so `list_rooms` answers in name order.
pub struct Hub {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// All rooms ever joined: name -> Room
    rooms: BTreeMap<String, Room>,
    /// Event receiver channel
    receiver: mpsc::Receiver<HubEvent>,
}

impl Hub {
    /// Create a new Hub with the given event receiver
    pub fn new(receiver: mpsc::Receiver<HubEvent>) -> Self {
        Self {
            clients: HashMap::new(),
            rooms: BTreeMap::new(),
            receiver,
        }
    }

    /// Run the Hub event loop
    ///
    /// Processes events until `shutdown` fires or every sender is dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("hub started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.close_all();
                    break;
                }
                event = self.receiver.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        info!("hub shutting down");
    }

    /// Apply a single event
    pub fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect {
                client_id,
                peer,
                sender,
                shutdown,
            } => self.handle_connect(client_id, peer, sender, shutdown),
            HubEvent::Disconnect { client_id } => self.handle_disconnect(client_id),
            HubEvent::Inbound { client_id, message } => self.handle_inbound(client_id, message),
        }
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Number of rooms, including empty ones
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Handle new client connection
    fn handle_connect(
        &mut self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<WireMessage>,
        shutdown: CancellationToken,
    ) {
        info!(%client_id, ?peer, "client connected");
        let client = Client::new(client_id, peer, sender, shutdown);
        self.clients.insert(client_id, client);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Handle client disconnection
    fn handle_disconnect(&mut self, client_id: ClientId) {
        let Some(mut client) = self.clients.remove(&client_id) else {
            debug!(%client_id, "disconnect for unknown client");
            return;
        };
        info!(%client_id, username = client.display_name(), "client disconnected");

        let name = client.display_name().to_string();
        for room in self.rooms.values_mut() {
            if room.remove(client_id) {
                let notice = WireMessage::user_left(&room.name, &name);
                room.broadcast(&self.clients, &notice, None);
            }
        }

        client.close();

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Route one inbound message by kind
    fn handle_inbound(&mut self, client_id: ClientId, msg: WireMessage) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            debug!(%client_id, kind = ?msg.kind, "message from unknown client dropped");
            return;
        };

        if let Some(name) = msg.sender_name() {
            if client.claim_username(name) {
                info!(%client_id, username = name, "username claimed");
            }
        }

        match msg.kind {
            MessageKind::Join => self.handle_join(client_id, msg),
            MessageKind::Leave => self.handle_leave(client_id, msg),
            MessageKind::RoomMsg | MessageKind::Action => self.handle_room_msg(msg),
            MessageKind::Dm => self.handle_dm(msg),
            MessageKind::Echo => self.reply(client_id, msg),
            MessageKind::Ping => self.reply(client_id, WireMessage::new(MessageKind::Pong)),
            MessageKind::ListRooms => self.handle_list_rooms(client_id),
            MessageKind::ListUsers => self.handle_list_users(client_id, msg),
            other => warn!(%client_id, kind = ?other, "unhandled message kind dropped"),
        }
    }

    /// Handle room joining
    fn handle_join(&mut self, client_id: ClientId, msg: WireMessage) {
        let Some(room_name) = msg.room_name() else {
            debug!(%client_id, "join without room ignored");
            return;
        };

        let room = self
            .rooms
            .entry(room_name.to_string())
            .or_insert_with(|| {
                info!(room = room_name, "room created");
                Room::new(room_name)
            });

        if !room.add(client_id) {
            debug!(%client_id, room = room_name, "already a member");
            return;
        }

        let username = self
            .clients
            .get(&client_id)
            .map(|c| c.display_name().to_string())
            .unwrap_or_default();
        info!(%client_id, room = room_name, %username, "joined room");

        let notice = WireMessage::user_joined(room_name, &username);
        room.broadcast(&self.clients, &notice, Some(client_id));
    }

    /// Handle voluntary room leaving
    fn handle_leave(&mut self, client_id: ClientId, msg: WireMessage) {
        let Some(room_name) = msg.room_name() else {
            debug!(%client_id, "leave without room ignored");
            return;
        };

        let Some(room) = self.rooms.get_mut(room_name) else {
            debug!(%client_id, room = room_name, "leave for unknown room ignored");
            return;
        };

        if !room.remove(client_id) {
            debug!(%client_id, room = room_name, "leave from room not joined ignored");
            return;
        }

        let username = self
            .clients
            .get(&client_id)
            .map(|c| c.display_name().to_string())
            .unwrap_or_default();
        info!(%client_id, room = room_name, %username, "left room");

        let notice = WireMessage::user_left(room_name, &username);
        room.broadcast(&self.clients, &notice, None);
    }

    /// Handle room broadcast (plain and action)
    ///
    /// The sender is a member of the audience and receives its own message.
    fn handle_room_msg(&mut self, mut msg: WireMessage) {
        if msg.room_name().is_none() {
            msg.room = Some(DEFAULT_ROOM.to_string());
        }
        let room_name = msg.room.clone().unwrap_or_default();

        let Some(room) = self.rooms.get(&room_name) else {
            debug!(room = %room_name, kind = ?msg.kind, "message for unknown room dropped");
            return;
        };

        msg.body = msg.body.as_deref().map(sanitize);
        msg.timestamp.get_or_insert_with(Utc::now);

        let delivered = room.broadcast(&self.clients, &msg, None);
        debug!(room = %room_name, delivered, "room message broadcast");
    }

    /// Handle direct message
    fn handle_dm(&mut self, mut msg: WireMessage) {
        let Some(target) = msg.target_name() else {
            debug!("dm without target ignored");
            return;
        };

        let Some(recipient) = self
            .clients
            .values()
            .find(|c| c.username.as_deref() == Some(target))
        else {
            debug!(recipient = target, "dm for unknown user dropped");
            return;
        };

        msg.body = msg.body.as_deref().map(sanitize);
        msg.timestamp.get_or_insert_with(Utc::now);
        let _ = recipient.enqueue(msg);
    }

    /// Handle room listing
    fn handle_list_rooms(&mut self, client_id: ClientId) {
        let names = self.rooms.keys().cloned().collect();
        self.reply(client_id, WireMessage::rooms_list(names));
    }

    /// Handle user listing; an unknown room lists nobody
    fn handle_list_users(&mut self, client_id: ClientId, msg: WireMessage) {
        let Some(room_name) = msg.room_name() else {
            debug!(%client_id, "list_users without room ignored");
            return;
        };

        let users = self
            .rooms
            .get(room_name)
            .map(|room| room.usernames(&self.clients))
            .unwrap_or_default();
        self.reply(client_id, WireMessage::user_list(room_name, users));
    }

    /// Helper: queue a message for one client
    fn reply(&self, client_id: ClientId, msg: WireMessage) {
        if let Some(client) = self.clients.get(&client_id) {
            let _ = client.enqueue(msg);
        }
    }

    /// Helper: tell every client we are going away and close them
    fn close_all(&mut self) {
        info!(clients = self.clients.len(), "closing all clients");
        for (_, mut client) in self.clients.drain() {
            let _ = client.enqueue(WireMessage::error("server shutting down"));
            client.close();
        }
    }
}
