//! Wire protocol between clients and the relay.
//!
//! Every event is one JSON text frame, `{ "event": <name>, "data": <payload> }`:
//! ```json
//! { "event": "init", "data": { "canvasImage": null, "notes": [] } }
//! { "event": "draw", "data": { "x": 10, "y": 20, "color": "#000", "size": 3 } }
//! { "event": "setCanvas", "data": "data:image/png;base64,..." }
//! { "event": "clear" }
//! { "event": "addNote", "data": { "id": "n1", "type": "note", "content": "hi", "x": 10, "y": 20 } }
//! { "event": "removeNote", "data": "n1" }
//! { "event": "cursor", "data": { "name": "ada", "color": "#f00", "x": 1, "y": 2 } }
//! { "event": "removeCursor", "data": "<connection id>" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{BoardSnapshot, NoteId, NoteMove, NotePatch, StickyRecord};
use crate::surface::Raster;

/// Identifier the relay assigns to each connection.
pub type ConnectionId = String;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One incremental stroke point.
///
/// `px`/`py` carry the segment start when the sender knows it; without them
/// the receiver continues from the last remote point it drew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawSegment {
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub px: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub py: Option<f64>,
}

impl DrawSegment {
    /// Segment start, if both coordinates were sent.
    pub fn start(&self) -> Option<kurbo::Point> {
        Some(kurbo::Point::new(self.px?, self.py?))
    }
}

/// Cursor position sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
}

/// Cursor position relayed to peers, stamped with the owning connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub id: ConnectionId,
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
}

impl RemoteCursor {
    pub fn from_update(id: ConnectionId, update: CursorUpdate) -> Self {
        Self {
            id,
            name: update.name,
            color: update.color,
            x: update.x,
            y: update.y,
        }
    }
}

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Draw(DrawSegment),
    SetCanvas(Option<Raster>),
    Clear,
    AddNote(StickyRecord),
    UpdateNote(NotePatch),
    MoveNote(NoteMove),
    RemoveNote(NoteId),
    Cursor(CursorUpdate),
}

impl ClientEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draw(_) => "draw",
            Self::SetCanvas(_) => "setCanvas",
            Self::Clear => "clear",
            Self::AddNote(_) => "addNote",
            Self::UpdateNote(_) => "updateNote",
            Self::MoveNote(_) => "moveNote",
            Self::RemoveNote(_) => "removeNote",
            Self::Cursor(_) => "cursor",
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Events sent by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full board for a freshly connected client. Always the first event.
    Init(BoardSnapshot),
    Draw(DrawSegment),
    SetCanvas(Option<Raster>),
    Clear,
    AddNote(StickyRecord),
    UpdateNote(NotePatch),
    MoveNote(NoteMove),
    RemoveNote(NoteId),
    Cursor(RemoteCursor),
    /// A connection went away; drop its cursor.
    RemoveCursor(ConnectionId),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Draw(_) => "draw",
            Self::SetCanvas(_) => "setCanvas",
            Self::Clear => "clear",
            Self::AddNote(_) => "addNote",
            Self::UpdateNote(_) => "updateNote",
            Self::MoveNote(_) => "moveNote",
            Self::RemoveNote(_) => "removeNote",
            Self::Cursor(_) => "cursor",
            Self::RemoveCursor(_) => "removeCursor",
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
