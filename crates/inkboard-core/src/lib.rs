//! Inkboard Core Library
//!
//! Platform-agnostic board model, wire protocol and client synchronization for
//! the Inkboard collaborative whiteboard.

pub mod agent;
pub mod board;
pub mod history;
pub mod presence;
pub mod protocol;
pub mod storage;
pub mod surface;
pub mod tools;
pub mod transport;

pub use agent::{BoardUpdate, DOWNLOAD_FILE_NAME, SyncAgent};
pub use board::{AddOutcome, BoardSnapshot, NoteId, NoteKind, NoteMove, NotePatch, StickyRecord};
pub use history::{UndoHistory, MAX_UNDO_HISTORY};
pub use presence::PresenceTracker;
pub use protocol::{ClientEvent, ConnectionId, CursorUpdate, DrawSegment, RemoteCursor, ServerEvent};
pub use surface::{CanvasSurface, HeadlessSurface, Raster};
pub use tools::{ToolKind, ToolManager};
pub use transport::{ConnectionState, PlatformWebSocket, TransportEvent};
