//! Remote cursor presence.
//!
//! Cursors are ephemeral and keyed by the connection that owns them. The
//! relay stamps the id, so a client can never move another client's cursor.

use std::collections::BTreeMap;

use crate::protocol::{ConnectionId, RemoteCursor};

/// Remote cursors currently visible to this client.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    cursors: BTreeMap<ConnectionId, RemoteCursor>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or move a cursor. Returns true if the cursor is new.
    pub fn upsert(&mut self, cursor: RemoteCursor) -> bool {
        self.cursors.insert(cursor.id.clone(), cursor).is_none()
    }

    /// Drop a cursor whose connection went away.
    pub fn remove(&mut self, id: &str) -> Option<RemoteCursor> {
        self.cursors.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&RemoteCursor> {
        self.cursors.get(id)
    }

    /// Cursors ordered by connection id.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Forget every cursor (e.g. after losing the connection).
    pub fn clear(&mut self) {
        self.cursors.clear();
    }
}
