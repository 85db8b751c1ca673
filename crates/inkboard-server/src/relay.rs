//! Session relay.
//!
//! One task owns the [`BoardStore`] and the registry of connected clients and
//! handles commands strictly one at a time, so every client observes the
//! store's mutations in the order they were applied. Connection tasks only
//! decode frames and forward them here.

use std::collections::HashMap;

use inkboard_core::board::AddOutcome;
use inkboard_core::protocol::{ClientEvent, ConnectionId, RemoteCursor, ServerEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::store::BoardStore;

/// Frames a connection may have queued before new ones are dropped.
pub const CHANNEL_CAPACITY: usize = 256;

/// Encoded frames queued for one connection.
pub type FrameSender = mpsc::Sender<String>;

/// Who receives a relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection except the one it came from.
    Others,
    /// Every connection, the sender included.
    Everyone,
}

/// An event to fan out after a store operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub event: ServerEvent,
    pub audience: Audience,
}

impl Broadcast {
    fn others(event: ServerEvent) -> Self {
        Self {
            event,
            audience: Audience::Others,
        }
    }
}

/// Apply one client event to the store and decide what to relay.
///
/// Returns None when the event changed nothing (duplicate add, unknown
/// identifier); such events are not relayed.
pub fn dispatch(store: &mut BoardStore, origin: &str, event: ClientEvent) -> Option<Broadcast> {
    match event {
        ClientEvent::Draw(segment) => {
            store.apply_draw(&segment);
            Some(Broadcast::others(ServerEvent::Draw(segment)))
        }
        ClientEvent::SetCanvas(image) => {
            store.set_canvas(image.clone());
            Some(Broadcast::others(ServerEvent::SetCanvas(image)))
        }
        ClientEvent::Clear => {
            store.clear();
            Some(Broadcast {
                event: ServerEvent::Clear,
                audience: Audience::Everyone,
            })
        }
        ClientEvent::AddNote(record) => match store.add_note(record.clone()) {
            AddOutcome::Added => Some(Broadcast::others(ServerEvent::AddNote(record))),
            AddOutcome::Duplicate => None,
        },
        ClientEvent::UpdateNote(patch) => store
            .update_note(&patch)
            .then(|| Broadcast::others(ServerEvent::UpdateNote(patch))),
        ClientEvent::MoveNote(mv) => store
            .move_note(&mv.id, mv.x, mv.y)
            .then(|| Broadcast::others(ServerEvent::MoveNote(mv))),
        ClientEvent::RemoveNote(id) => store
            .remove_note(&id)
            .then(|| Broadcast::others(ServerEvent::RemoveNote(id))),
        // The cursor belongs to the connection that sent it.
        ClientEvent::Cursor(update) => Some(Broadcast::others(ServerEvent::Cursor(
            RemoteCursor::from_update(origin.to_string(), update),
        ))),
    }
}

/// Work items for the relay task.
#[derive(Debug)]
pub enum RelayCommand {
    Connect { id: ConnectionId, tx: FrameSender },
    Inbound { id: ConnectionId, event: ClientEvent },
    Disconnect { id: ConnectionId },
}

/// The relay task is gone; the server is shutting down.
#[derive(Debug, Error)]
#[error("Relay task has stopped")]
pub struct RelayClosed;

/// Cloneable handle used by connection tasks to reach the relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    fn submit(&self, command: RelayCommand) -> Result<(), RelayClosed> {
        self.tx.send(command).map_err(|_| RelayClosed)
    }

    /// Register a connection. Its `init` frame is queued before anything else.
    pub fn connect(&self, id: ConnectionId, tx: FrameSender) -> Result<(), RelayClosed> {
        self.submit(RelayCommand::Connect { id, tx })
    }

    pub fn inbound(&self, id: ConnectionId, event: ClientEvent) -> Result<(), RelayClosed> {
        self.submit(RelayCommand::Inbound { id, event })
    }

    pub fn disconnect(&self, id: ConnectionId) -> Result<(), RelayClosed> {
        self.submit(RelayCommand::Disconnect { id })
    }
}

/// Relay state: the store plus every live connection.
pub struct Relay {
    store: BoardStore,
    connections: HashMap<ConnectionId, FrameSender>,
}

impl Relay {
    pub fn new(store: BoardStore) -> Self {
        Self {
            store,
            connections: HashMap::new(),
        }
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Process one command to completion.
    pub fn handle(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Connect { id, tx } => {
                let init = ServerEvent::Init(self.store.bootstrap());
                if let Some(frame) = encode(&init) {
                    if let Err(e) = tx.try_send(frame) {
                        debug!("Init for {} not queued: {}", id, e);
                    }
                }
                self.connections.insert(id.clone(), tx);
                info!("Peer {} joined ({} connected)", id, self.connections.len());
            }
            RelayCommand::Inbound { id, event } => {
                if !self.connections.contains_key(&id) {
                    debug!("Dropping {} from unregistered connection {}", event.name(), id);
                    return;
                }
                let name = event.name();
                match dispatch(&mut self.store, &id, event) {
                    Some(broadcast) => self.broadcast(&id, broadcast),
                    None => debug!("{} from {} changed nothing, not relayed", name, id),
                }
            }
            RelayCommand::Disconnect { id } => {
                if self.connections.remove(&id).is_none() {
                    return;
                }
                info!("Peer {} left ({} connected)", id, self.connections.len());
                let event = ServerEvent::RemoveCursor(id.clone());
                self.broadcast(&id, Broadcast::others(event));
            }
        }
    }

    fn broadcast(&self, origin: &str, broadcast: Broadcast) {
        let Some(frame) = encode(&broadcast.event) else {
            return;
        };
        for (id, tx) in &self.connections {
            if broadcast.audience == Audience::Others && id == origin {
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                // Delivery is at-most-once; a peer that stopped reading loses frames.
                Err(TrySendError::Full(_)) => {
                    warn!("Connection {} is not keeping up, frame dropped", id);
                }
                // The disconnect command is already on its way.
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} is closing, frame dropped", id);
                }
            }
        }
    }

    /// Handle commands until every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RelayCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        info!("Relay stopped");
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to encode {}: {}", event.name(), e);
            None
        }
    }
}

/// Start the relay task. Must be called inside a tokio runtime.
pub fn spawn(store: BoardStore) -> RelayHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Relay::new(store).run(rx));
    RelayHandle { tx }
}
