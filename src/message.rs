//! Message protocol definitions
//!
//! One flat JSON object per line. `type` is always present; which of the
//! optional fields matter depends on the kind.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Message kind carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Join a room (creates it on first use)
    Join,
    /// Leave a room
    Leave,
    /// Broadcast to a room
    RoomMsg,
    /// `/me` style broadcast to a room
    Action,
    /// Direct message to one username
    Dm,
    /// Request: all room names
    ListRooms,
    /// Response to `ListRooms`
    RoomsList,
    /// Request: usernames in a room
    ListUsers,
    /// Response to `ListUsers`
    UserList,
    /// Notification: someone joined a room
    UserJoined,
    /// Notification: someone left a room
    UserLeft,
    /// Sent straight back to the sender
    Echo,
    /// Error notice
    Error,
    Ping,
    Pong,
    /// Any `type` string this relay does not know
    #[serde(other)]
    Unknown,
}

/// A single wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Free-text system message (errors, notices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    /// Unparseable values decode as `None` instead of rejecting the message
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Create an empty message of the given kind
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            room: None,
            username: None,
            target: None,
            body: None,
            message: None,
            rooms: None,
            users: None,
            timestamp: None,
        }
    }

    /// Client request: join `room` as `username`
    pub fn join(room: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            username: Some(username.into()),
            ..Self::new(MessageKind::Join)
        }
    }

    /// Client request: broadcast `body` to `room`
    pub fn room_msg(
        room: impl Into<String>,
        username: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room: Some(room.into()),
            username: Some(username.into()),
            body: Some(body.into()),
            ..Self::new(MessageKind::RoomMsg)
        }
    }

    /// Client request: send `body` to the user named `target`
    pub fn dm(
        username: impl Into<String>,
        target: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            target: Some(target.into()),
            body: Some(body.into()),
            ..Self::new(MessageKind::Dm)
        }
    }

    /// Notification that `username` joined `room`
    pub fn user_joined(room: &str, username: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            username: Some(username.to_string()),
            body: Some(format!("{} joined the room.", username)),
            timestamp: Some(Utc::now()),
            ..Self::new(MessageKind::UserJoined)
        }
    }

    /// Notification that `username` left `room`
    pub fn user_left(room: &str, username: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            username: Some(username.to_string()),
            body: Some(format!("{} left the room.", username)),
            timestamp: Some(Utc::now()),
            ..Self::new(MessageKind::UserLeft)
        }
    }

    /// Response carrying every room name
    pub fn rooms_list(rooms: Vec<String>) -> Self {
        Self {
            rooms: Some(rooms),
            ..Self::new(MessageKind::RoomsList)
        }
    }

    /// Response carrying the usernames in `room`
    pub fn user_list(room: &str, users: Vec<String>) -> Self {
        Self {
            room: Some(room.to_string()),
            users: Some(users),
            ..Self::new(MessageKind::UserList)
        }
    }

    /// Error notice with a free-text message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(MessageKind::Error)
        }
    }

    /// `room`, if present and non-empty
    pub fn room_name(&self) -> Option<&str> {
        non_empty(&self.room)
    }

    /// `username`, if present and non-empty
    pub fn sender_name(&self) -> Option<&str> {
        non_empty(&self.username)
    }

    /// `target`, if present and non-empty
    pub fn target_name(&self) -> Option<&str> {
        non_empty(&self.target)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// Parse an ISO-8601 timestamp
///
/// RFC 3339 values keep their offset (converted to UTC); date-times without
/// an offset are read as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = value.as_str().and_then(parse_timestamp);
    if parsed.is_none() {
        warn!(timestamp = %value, "unparseable timestamp ignored");
    }
    Ok(parsed)
}
