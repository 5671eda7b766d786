//! Basic type definitions for the chat relay
//!
//! Provides the `ClientId` newtype used as the registry and room-membership key.

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Rooms store these instead of the handles themselves,
/// so the Hub stays the only owner of every `Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
