//! Client synchronization agent.
//!
//! Bridges local UI actions, the canvas surface and the relay connection.
//! Outgoing events are queued as JSON and drained by the host (see
//! [`SyncAgent::take_outgoing`] or [`SyncAgent::pump`]); incoming frames are
//! applied with [`SyncAgent::handle_message`], which reports what the UI has
//! to re-render.

use kurbo::Point;

use crate::board::{
    AddOutcome, BoardSnapshot, NoteId, NoteKind, NoteMove, NotePatch, NoteView, StickyRecord, render_note,
};
use crate::history::UndoHistory;
use crate::presence::PresenceTracker;
use crate::protocol::{ClientEvent, ConnectionId, CursorUpdate, DrawSegment, ServerEvent};
use crate::storage::{AutoSaveManager, Storage};
use crate::surface::{CanvasSurface, FontSpec, Raster, StrokeStyle};
use crate::tools::{DragStep, TextStamp, ToolKind, ToolManager};
use crate::transport::{PlatformWebSocket, TransportEvent};

/// File name offered when the canvas is downloaded.
pub const DOWNLOAD_FILE_NAME: &str = "whiteboard.png";

/// What changed after applying an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardUpdate {
    /// The whole board was replaced by the relay's snapshot.
    Bootstrapped,
    /// The raster was replaced.
    CanvasReplaced,
    /// A remote segment was stroked onto the raster.
    Stroke,
    /// Canvas and notes were wiped.
    Cleared,
    NoteAdded(NoteId),
    NoteUpdated(NoteId),
    NoteMoved(NoteId),
    NoteRemoved(NoteId),
    CursorMoved(ConnectionId),
    CursorRemoved(ConnectionId),
}

/// Per-client synchronization state.
pub struct SyncAgent<S: CanvasSurface, K: Storage> {
    surface: S,
    tools: ToolManager,
    history: UndoHistory,
    /// Local mirror of the notes. The raster lives on the surface.
    board: BoardSnapshot,
    presence: PresenceTracker,
    autosave: AutoSaveManager<K>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    /// Raster captured when the current drag started.
    pre_drag: Option<Raster>,
    /// Last point drawn by a remote `draw` event.
    remote_pen: Option<Point>,
    /// Whether the surface holds nothing worth caching.
    blank: bool,
    /// A local mutation is waiting to be written to the cache.
    save_now: bool,
    user_name: String,
    user_color: String,
}

impl<S: CanvasSurface, K: Storage> SyncAgent<S, K> {
    /// Create an agent drawing on `surface` and caching through `autosave`.
    pub fn new(surface: S, autosave: AutoSaveManager<K>) -> Self {
        let mut history = UndoHistory::new();
        history.record(surface.export());
        Self {
            surface,
            tools: ToolManager::new(),
            history,
            board: BoardSnapshot::new(),
            presence: PresenceTracker::new(),
            autosave,
            outgoing: Vec::new(),
            pre_drag: None,
            remote_pen: None,
            blank: true,
            save_now: false,
            user_name: "Guest".to_string(),
            user_color: "#000000".to_string(),
        }
    }

    /// Set the name and color shown on this user's cursor.
    pub fn with_identity(mut self, name: impl Into<String>, color: impl Into<String>) -> Self {
        self.user_name = name.into();
        self.user_color = color.into();
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn autosave(&self) -> &AutoSaveManager<K> {
        &self.autosave
    }

    pub fn autosave_mut(&mut self) -> &mut AutoSaveManager<K> {
        &mut self.autosave
    }

    /// Notes in creation order.
    pub fn notes(&self) -> &[StickyRecord] {
        &self.board.notes
    }

    pub fn note(&self, id: &str) -> Option<&StickyRecord> {
        self.board.note(id)
    }

    /// Widget views for every note.
    pub fn note_views(&self) -> Vec<NoteView> {
        self.board.notes.iter().map(render_note).collect()
    }

    /// The local board as it would be cached.
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            canvas_image: (!self.blank).then(|| self.surface.export()),
            notes: self.board.notes.clone(),
        }
    }

    /// Export the canvas for download: suggested file name and the raster.
    /// Notes are widgets and are not part of the image.
    pub fn download(&self) -> (&'static str, Raster) {
        (DOWNLOAD_FILE_NAME, self.surface.export())
    }

    // --- Tool settings ---

    pub fn set_tool(&mut self, tool: ToolKind) {
        self.tools.set_tool(tool);
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.tools.color = color.into();
    }

    pub fn set_width(&mut self, width: f64) {
        self.tools.width = width;
    }

    pub fn set_font(&mut self, font: FontSpec) {
        self.tools.font = font;
    }

    pub fn toggle_bold(&mut self) -> bool {
        self.tools.font.bold = !self.tools.font.bold;
        self.tools.font.bold
    }

    pub fn toggle_italic(&mut self) -> bool {
        self.tools.font.italic = !self.tools.font.italic;
        self.tools.font.italic
    }

    // --- Drawing ---

    /// Pointer pressed on the canvas.
    pub fn pointer_down(&mut self, point: Point) {
        let tool = self.tools.current_tool;
        if tool == ToolKind::Text {
            return;
        }
        let raster = self.surface.export();
        if tool.is_freehand() {
            self.history.checkpoint(raster.clone());
        }
        self.pre_drag = Some(raster);
        self.tools.begin(point);
    }

    /// Pointer moved. Returns true if the surface changed.
    pub fn pointer_move(&mut self, point: Point) -> bool {
        match self.tools.update(point) {
            Some(DragStep::Segment { from, to, style }) => {
                self.surface.stroke_segment(from, to, &style);
                self.blank = false;
                self.send(ClientEvent::Draw(DrawSegment {
                    x: to.x,
                    y: to.y,
                    color: style.color,
                    size: style.width,
                    px: Some(from.x),
                    py: Some(from.y),
                }));
                true
            }
            Some(DragStep::Preview { shape, style }) => {
                if let Some(pre) = &self.pre_drag {
                    self.surface.import(pre);
                }
                shape.draw(&mut self.surface, &style);
                self.blank = false;
                true
            }
            None => false,
        }
    }

    /// Pointer released. Publishes the final raster of the drag.
    pub fn pointer_up(&mut self) {
        if !self.tools.end() {
            return;
        }
        self.pre_drag = None;
        let raster = self.surface.export();
        self.history.record(raster.clone());
        self.send(ClientEvent::SetCanvas(Some(raster)));
        self.local_change();
    }

    /// Canvas clicked. With the text tool this opens an overlay, committing
    /// one that was still open.
    pub fn click(&mut self, point: Point) {
        if self.tools.current_tool != ToolKind::Text {
            return;
        }
        if let Some(stamp) = self.tools.open_text(point) {
            self.apply_stamp(stamp);
        }
    }

    /// Text typed into the open overlay.
    pub fn type_text(&mut self, text: impl Into<String>) {
        self.tools.set_overlay_text(text);
    }

    /// Enter pressed or overlay lost focus. Returns true if text was rasterized.
    pub fn commit_text(&mut self) -> bool {
        match self.tools.commit_text() {
            Some(stamp) => {
                self.apply_stamp(stamp);
                true
            }
            None => false,
        }
    }

    fn apply_stamp(&mut self, stamp: TextStamp) {
        self.history.checkpoint(self.surface.export());
        stamp.draw(&mut self.surface);
        self.blank = false;
        let raster = self.surface.export();
        self.history.record(raster.clone());
        self.send(ClientEvent::SetCanvas(Some(raster)));
        self.local_change();
    }

    /// Step back in the local history. Returns true if the raster changed.
    pub fn undo(&mut self) -> bool {
        let Some(raster) = self.history.undo().cloned() else {
            return false;
        };
        self.restore(raster);
        true
    }

    /// Step forward in the local history. Returns true if the raster changed.
    pub fn redo(&mut self) -> bool {
        let Some(raster) = self.history.redo().cloned() else {
            return false;
        };
        self.restore(raster);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn restore(&mut self, raster: Raster) {
        self.surface.import(&raster);
        self.blank = false;
        self.send(ClientEvent::SetCanvas(Some(raster)));
        self.local_change();
    }

    /// Wipe canvas and notes for everyone.
    pub fn clear(&mut self) {
        self.wipe();
        self.send(ClientEvent::Clear);
        self.local_change();
    }

    fn wipe(&mut self) {
        self.tools.cancel();
        self.pre_drag = None;
        self.remote_pen = None;
        self.surface.clear();
        self.blank = true;
        self.board.clear();
    }

    // --- Notes ---

    /// Create a note and publish it. Returns its identifier.
    pub fn add_note(&mut self, kind: NoteKind, content: impl Into<String>, x: f64, y: f64) -> NoteId {
        let record = match kind {
            NoteKind::Note => StickyRecord::note(content, x, y),
            NoteKind::Image => StickyRecord::image(content, x, y),
        };
        let id = record.id.clone();
        self.board.add(record.clone());
        self.send(ClientEvent::AddNote(record));
        self.local_change();
        id
    }

    /// Embed an image file as an image note.
    pub fn add_image(&mut self, mime: &str, bytes: &[u8], x: f64, y: f64) -> NoteId {
        let data_url = Raster::from_bytes(mime, bytes).into_string();
        self.add_note(NoteKind::Image, data_url, x, y)
    }

    /// Merge a local edit. Peers receive the full resulting record.
    pub fn update_note(&mut self, patch: &NotePatch) -> bool {
        if !self.board.update(patch) {
            return false;
        }
        let Some(full) = self.board.note(&patch.id).map(StickyRecord::to_patch) else {
            return false;
        };
        self.send(ClientEvent::UpdateNote(full));
        self.local_change();
        true
    }

    /// Flip the minimized flag. Returns the new value.
    pub fn toggle_minimized(&mut self, id: &str) -> Option<bool> {
        let minimized = !self.board.note(id)?.minimized;
        self.update_note(&NotePatch::new(id).with_minimized(minimized));
        Some(minimized)
    }

    pub fn move_note(&mut self, id: &str, x: f64, y: f64) -> bool {
        if !self.board.move_note(id, x, y) {
            return false;
        }
        self.send(ClientEvent::MoveNote(NoteMove {
            id: id.to_string(),
            x,
            y,
        }));
        self.local_change();
        true
    }

    pub fn remove_note(&mut self, id: &str) -> bool {
        if self.board.remove(id).is_none() {
            return false;
        }
        self.send(ClientEvent::RemoveNote(id.to_string()));
        self.local_change();
        true
    }

    // --- Presence ---

    /// Publish the local pointer position.
    pub fn set_cursor(&mut self, x: f64, y: f64) {
        self.send(ClientEvent::Cursor(CursorUpdate {
            name: self.user_name.clone(),
            color: self.user_color.clone(),
            x,
            y,
        }));
    }

    // --- Outgoing queue ---

    fn send(&mut self, event: ClientEvent) {
        match event.encode() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::warn!("Failed to encode {} event: {}", event.name(), e),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Exchange traffic with the relay: apply every received frame, then
    /// flush the outgoing queue. Events produced while offline are dropped.
    pub fn pump(&mut self, socket: &mut PlatformWebSocket) -> Vec<BoardUpdate> {
        let mut updates = Vec::new();
        for event in socket.poll_events() {
            match event {
                TransportEvent::Message(text) => updates.extend(self.handle_message(&text)),
                TransportEvent::Connected => log::info!("Connected to relay"),
                TransportEvent::Disconnected => log::info!("Disconnected from relay"),
                TransportEvent::Error { message } => log::warn!("Relay connection error: {}", message),
            }
        }

        let pending = self.take_outgoing();
        if !socket.is_connected() {
            if !pending.is_empty() {
                log::debug!("Dropping {} events while offline", pending.len());
            }
            return updates;
        }
        for msg in pending {
            if let Err(e) = socket.send(&msg) {
                log::warn!("Failed to send event: {}", e);
            }
        }
        updates
    }

    // --- Incoming ---

    /// Apply a frame received from the relay. Malformed frames are dropped.
    pub fn handle_message(&mut self, json: &str) -> Option<BoardUpdate> {
        match ServerEvent::decode(json) {
            Ok(event) => self.apply_remote(event),
            Err(e) => {
                log::warn!("Dropping inbound frame: {}", e);
                None
            }
        }
    }

    /// Apply a decoded relay event. Returns None when nothing changed.
    pub fn apply_remote(&mut self, event: ServerEvent) -> Option<BoardUpdate> {
        let update = match event {
            ServerEvent::Init(snapshot) => {
                self.load_snapshot(snapshot);
                self.presence.clear();
                BoardUpdate::Bootstrapped
            }
            ServerEvent::Draw(segment) => {
                let to = Point::new(segment.x, segment.y);
                let from = segment.start().or(self.remote_pen);
                self.remote_pen = Some(to);
                if let Some(from) = from {
                    let style = StrokeStyle::new(segment.color, segment.size);
                    self.surface.stroke_segment(from, to, &style);
                    self.blank = false;
                }
                BoardUpdate::Stroke
            }
            ServerEvent::SetCanvas(raster) => {
                self.set_raster(raster.as_ref());
                BoardUpdate::CanvasReplaced
            }
            ServerEvent::Clear => {
                self.wipe();
                BoardUpdate::Cleared
            }
            ServerEvent::AddNote(record) => {
                let id = record.id.clone();
                if self.board.add(record) == AddOutcome::Duplicate {
                    log::debug!("Ignoring duplicate note {}", id);
                    return None;
                }
                BoardUpdate::NoteAdded(id)
            }
            ServerEvent::UpdateNote(patch) => {
                if !self.board.update(&patch) {
                    return None;
                }
                BoardUpdate::NoteUpdated(patch.id)
            }
            ServerEvent::MoveNote(mv) => {
                if !self.board.move_note(&mv.id, mv.x, mv.y) {
                    return None;
                }
                BoardUpdate::NoteMoved(mv.id)
            }
            ServerEvent::RemoveNote(id) => {
                self.board.remove(&id)?;
                BoardUpdate::NoteRemoved(id)
            }
            ServerEvent::Cursor(cursor) => {
                let id = cursor.id.clone();
                self.presence.upsert(cursor);
                return Some(BoardUpdate::CursorMoved(id));
            }
            ServerEvent::RemoveCursor(id) => {
                self.presence.remove(&id)?;
                return Some(BoardUpdate::CursorRemoved(id));
            }
        };
        self.autosave.mark_dirty();
        Some(update)
    }

    fn set_raster(&mut self, raster: Option<&Raster>) {
        match raster {
            Some(raster) => {
                self.surface.import(raster);
                self.blank = false;
            }
            None => {
                self.surface.clear();
                self.blank = true;
            }
        }
    }

    /// Replace the whole local view. History restarts from the new raster.
    fn load_snapshot(&mut self, snapshot: BoardSnapshot) {
        self.tools.cancel();
        self.pre_drag = None;
        self.remote_pen = None;
        self.set_raster(snapshot.canvas_image.as_ref());
        self.board.notes = snapshot.notes;
        self.history.reset();
        self.history.record(self.surface.export());
    }

    // --- Persistence ---

    fn local_change(&mut self) {
        self.autosave.mark_dirty();
        self.save_now = true;
    }

    /// Show the cached board. Called once at startup, before connecting.
    pub async fn restore_from_cache(&mut self) {
        let snapshot = self.autosave.load().await;
        log::info!("Restored {} notes from local cache", snapshot.notes.len());
        self.load_snapshot(snapshot);
    }

    /// Write the board to the cache: immediately after a local mutation,
    /// otherwise once the auto-save interval allows. Returns true if written.
    pub async fn persist(&mut self) -> bool {
        let snapshot = self.snapshot();
        let result = if std::mem::take(&mut self.save_now) {
            self.autosave.save(&snapshot).await.map(|()| true)
        } else {
            self.autosave.maybe_save(&snapshot).await
        };
        // A failed write is left to the next periodic tick.
        match result {
            Ok(saved) => saved,
            Err(e) => {
                log::warn!("Failed to save board to local cache: {}", e);
                false
            }
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::protocol::RemoteCursor;
    use crate::storage::{
        BoxFuture, MemoryStorage, STICKIES_KEY, StorageError, StorageResult, block_on,
    };
    use crate::surface::{DrawOp, HeadlessSurface};
    use crate::tools::ERASER_COLOR;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type TestAgent = SyncAgent<HeadlessSurface, MemoryStorage>;

    fn agent() -> TestAgent {
        agent_with(Arc::new(MemoryStorage::new()))
    }

    fn agent_with(storage: Arc<MemoryStorage>) -> TestAgent {
        SyncAgent::new(HeadlessSurface::new(), AutoSaveManager::new(storage))
    }

    fn sent(agent: &mut TestAgent) -> Vec<ClientEvent> {
        agent
            .take_outgoing()
            .iter()
            .map(|json| ClientEvent::decode(json).unwrap())
            .collect()
    }

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn remote_note(id: &str) -> StickyRecord {
        let mut note = StickyRecord::note("remote", 1.0, 2.0);
        note.id = id.to_string();
        note
    }

    fn inbound(agent: &mut TestAgent, event: ServerEvent) -> Option<BoardUpdate> {
        agent.handle_message(&event.encode().unwrap())
    }

    #[test]
    fn test_pencil_drag_streams_segments() {
        let mut agent = agent();
        agent.pointer_down(p(0.0, 0.0));
        assert!(agent.pointer_move(p(5.0, 5.0)));
        assert!(agent.pointer_move(p(10.0, 0.0)));
        agent.pointer_up();

        let events = sent(&mut agent);
        assert_eq!(events.len(), 3);
        match &events[1] {
            ClientEvent::Draw(segment) => {
                assert_eq!((segment.x, segment.y), (10.0, 0.0));
                assert_eq!(segment.start(), Some(p(5.0, 5.0)));
                assert_eq!(segment.size, 5.0);
            }
            other => panic!("Wrong event: {:?}", other),
        }
        assert_eq!(events[2], ClientEvent::SetCanvas(Some(agent.surface().export())));
        assert_eq!(agent.surface().ops().len(), 2);
    }

    #[test]
    fn test_download_exports_canvas() {
        let mut agent = agent();
        agent.add_note(NoteKind::Note, "not in the image", 0.0, 0.0);
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(3.0, 4.0));
        agent.pointer_up();
        sent(&mut agent);

        let (name, raster) = agent.download();
        assert_eq!(name, "whiteboard.png");
        assert_eq!(raster, agent.surface().export());
        let mut copy = HeadlessSurface::new();
        copy.import(&raster);
        assert_eq!(copy.ops(), agent.surface().ops());
        assert!(raster.decode().is_some());
        // Downloading is local only.
        assert!(!agent.has_outgoing());
    }

    #[test]
    fn test_eraser_paints_white() {
        let mut agent = agent();
        agent.set_tool(ToolKind::Eraser);
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(1.0, 1.0));

        match &sent(&mut agent)[0] {
            ClientEvent::Draw(segment) => assert_eq!(segment.color, ERASER_COLOR),
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_shape_preview_redraws_over_pre_drag_raster() {
        let mut agent = agent();
        agent.set_tool(ToolKind::Rect);
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(5.0, 5.0));
        agent.pointer_move(p(8.0, 9.0));
        agent.pointer_up();

        assert_eq!(agent.surface().ops().len(), 1);
        match &agent.surface().ops()[0] {
            DrawOp::Rect { from, to, .. } => assert_eq!((*from, *to), ((0.0, 0.0), (8.0, 9.0))),
            other => panic!("Wrong op: {:?}", other),
        }
        // Previews are not streamed, only the final raster.
        let events = sent(&mut agent);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ClientEvent::SetCanvas(Some(_))));
    }

    #[test]
    fn test_tool_switch_mid_drag() {
        let mut agent = agent();
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(2.0, 2.0));
        agent.set_tool(ToolKind::Circle);
        agent.pointer_move(p(3.0, 4.0));

        // The circle preview restores the pre-drag raster, dropping the pencil segment.
        assert_eq!(
            agent.surface().ops(),
            &[DrawOp::Circle {
                center: (0.0, 0.0),
                radius: 5.0,
                style: StrokeStyle::new("#000000", 5.0),
            }]
        );
    }

    #[test]
    fn test_undo_redo_publish_raster() {
        let mut agent = agent();
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(1.0, 1.0));
        agent.pointer_up();
        let drawn = agent.surface().export();
        agent.take_outgoing();

        assert!(agent.undo());
        assert!(agent.surface().is_blank());
        assert!(!agent.undo());
        assert!(agent.redo());
        assert_eq!(agent.surface().export(), drawn);

        let events = sent(&mut agent);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ClientEvent::SetCanvas(Some(drawn)));
    }

    #[test]
    fn test_text_commit_and_discard() {
        let mut agent = agent();
        agent.set_tool(ToolKind::Text);
        agent.pointer_down(p(1.0, 1.0));
        assert!(!agent.tools().is_active());

        agent.click(p(10.0, 20.0));
        agent.type_text("");
        assert!(!agent.commit_text());
        assert!(agent.surface().is_blank());

        agent.click(p(10.0, 20.0));
        agent.type_text("first");
        // Opening a second overlay commits the first.
        agent.click(p(30.0, 40.0));
        agent.type_text("second");
        assert!(agent.commit_text());

        let texts: Vec<_> = agent
            .surface()
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(sent(&mut agent).len(), 2);

        assert!(agent.undo());
        assert_eq!(agent.surface().ops().len(), 1);
    }

    #[test]
    fn test_note_lifecycle_events() {
        let mut agent = agent();
        let id = agent.add_note(NoteKind::Note, "hello", 10.0, 20.0);
        assert!(agent.update_note(&NotePatch::new(id.clone()).with_content("edited")));
        assert_eq!(agent.toggle_minimized(&id), Some(true));
        assert!(agent.move_note(&id, 50.0, 60.0));
        assert!(agent.remove_note(&id));
        assert!(!agent.remove_note(&id));

        let events = sent(&mut agent);
        let names: Vec<_> = events.iter().map(ClientEvent::name).collect();
        assert_eq!(
            names,
            vec!["addNote", "updateNote", "updateNote", "moveNote", "removeNote"]
        );
        // Updates carry the whole record.
        match &events[2] {
            ClientEvent::UpdateNote(patch) => {
                assert_eq!(patch.content.as_deref(), Some("edited"));
                assert_eq!(patch.minimized, Some(true));
                assert_eq!(patch.x, Some(10.0));
            }
            other => panic!("Wrong event: {:?}", other),
        }
        assert_eq!(events[4], ClientEvent::RemoveNote(id));
    }

    #[test]
    fn test_add_image_note() {
        let mut agent = agent();
        let id = agent.add_image("image/png", b"png", 0.0, 0.0);
        let note = agent.note(&id).unwrap();
        assert_eq!(note.kind, NoteKind::Image);
        assert!(note.content.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_init_replaces_board() {
        let mut agent = agent();
        agent.add_note(NoteKind::Note, "local", 0.0, 0.0);

        let mut snapshot = BoardSnapshot::new();
        snapshot.add(remote_note("r1"));
        assert_eq!(inbound(&mut agent, ServerEvent::Init(snapshot)), Some(BoardUpdate::Bootstrapped));
        assert_eq!(agent.notes().len(), 1);
        assert_eq!(agent.notes()[0].id, "r1");
        assert!(agent.surface().is_blank());
        assert!(!agent.can_undo());
    }

    #[test]
    fn test_remote_draw_with_and_without_start() {
        let mut agent = agent();
        let segment = |x: f64, y: f64, start: Option<(f64, f64)>| {
            ServerEvent::Draw(DrawSegment {
                x,
                y,
                color: "red".into(),
                size: 2.0,
                px: start.map(|s| s.0),
                py: start.map(|s| s.1),
            })
        };

        // A lone point only positions the pen.
        assert_eq!(inbound(&mut agent, segment(1.0, 1.0, None)), Some(BoardUpdate::Stroke));
        assert!(agent.surface().is_blank());

        inbound(&mut agent, segment(2.0, 2.0, None));
        inbound(&mut agent, segment(9.0, 9.0, Some((7.0, 7.0))));
        let froms: Vec<_> = agent
            .surface()
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Segment { from, .. } => Some(*from),
                _ => None,
            })
            .collect();
        assert_eq!(froms, vec![(1.0, 1.0), (7.0, 7.0)]);
    }

    #[test]
    fn test_remote_clear_aborts_drag() {
        let mut agent = agent();
        agent.add_note(NoteKind::Note, "n", 0.0, 0.0);
        agent.pointer_down(p(0.0, 0.0));
        agent.pointer_move(p(3.0, 3.0));
        agent.take_outgoing();

        assert_eq!(inbound(&mut agent, ServerEvent::Clear), Some(BoardUpdate::Cleared));
        assert!(!agent.tools().is_active());
        assert!(!agent.pointer_move(p(4.0, 4.0)));
        agent.pointer_up();
        assert!(!agent.has_outgoing());
        assert!(agent.notes().is_empty());
        assert!(agent.surface().is_blank());
    }

    #[test]
    fn test_remote_note_rules() {
        let mut agent = agent();
        assert_eq!(
            inbound(&mut agent, ServerEvent::AddNote(remote_note("r1"))),
            Some(BoardUpdate::NoteAdded("r1".into()))
        );
        assert_eq!(inbound(&mut agent, ServerEvent::AddNote(remote_note("r1"))), None);
        assert_eq!(
            inbound(&mut agent, ServerEvent::MoveNote(NoteMove { id: "ghost".into(), x: 1.0, y: 1.0 })),
            None
        );
        assert_eq!(
            inbound(&mut agent, ServerEvent::UpdateNote(NotePatch::new("r1").with_content("new"))),
            Some(BoardUpdate::NoteUpdated("r1".into()))
        );
        assert_eq!(agent.note("r1").unwrap().content, "new");
        assert_eq!(
            inbound(&mut agent, ServerEvent::RemoveNote("r1".into())),
            Some(BoardUpdate::NoteRemoved("r1".into()))
        );
        assert_eq!(inbound(&mut agent, ServerEvent::RemoveNote("r1".into())), None);
    }

    #[test]
    fn test_remote_cursors() {
        let mut agent = agent();
        let cursor = RemoteCursor {
            id: "c1".into(),
            name: "ada".into(),
            color: "#f00".into(),
            x: 1.0,
            y: 2.0,
        };
        assert_eq!(
            inbound(&mut agent, ServerEvent::Cursor(cursor)),
            Some(BoardUpdate::CursorMoved("c1".into()))
        );
        assert_eq!(agent.presence().len(), 1);
        assert_eq!(
            inbound(&mut agent, ServerEvent::RemoveCursor("c1".into())),
            Some(BoardUpdate::CursorRemoved("c1".into()))
        );
        assert_eq!(inbound(&mut agent, ServerEvent::RemoveCursor("c1".into())), None);
        // Cursor traffic never dirties the cache.
        assert!(!agent.autosave().is_dirty());
    }

    #[test]
    fn test_malformed_frame_dropped() {
        let mut agent = agent();
        assert_eq!(agent.handle_message("not json"), None);
        assert_eq!(agent.handle_message(r#"{"event":"bogus","data":1}"#), None);
    }

    #[test]
    fn test_set_cursor_uses_identity() {
        let mut agent = agent().with_identity("ada", "#0f0");
        agent.set_cursor(3.0, 4.0);
        assert_eq!(
            sent(&mut agent),
            vec![ClientEvent::Cursor(CursorUpdate {
                name: "ada".into(),
                color: "#0f0".into(),
                x: 3.0,
                y: 4.0,
            })]
        );
    }

    #[test]
    fn test_local_change_saves_immediately() {
        let storage = Arc::new(MemoryStorage::new());
        let mut agent = agent_with(storage.clone());
        block_on(agent.restore_from_cache());

        agent.add_note(NoteKind::Note, "keep me", 5.0, 5.0);
        assert!(block_on(agent.persist()));
        assert!(!block_on(agent.persist()));

        let json = block_on(storage.get(STICKIES_KEY)).unwrap().unwrap();
        assert!(json.contains("keep me"));
    }

    #[test]
    fn test_remote_change_waits_for_interval() {
        let mut agent = agent();
        block_on(agent.restore_from_cache());

        inbound(&mut agent, ServerEvent::AddNote(remote_note("r1")));
        assert!(agent.autosave().is_dirty());
        assert!(!block_on(agent.persist()));

        agent.autosave_mut().set_interval(Duration::ZERO);
        assert!(block_on(agent.persist()));
    }

    #[test]
    fn test_restore_then_init_overwrites() {
        let storage = Arc::new(MemoryStorage::new());
        let mut first = agent_with(storage.clone());
        first.add_note(NoteKind::Note, "cached", 5.0, 5.0);
        first.pointer_down(p(0.0, 0.0));
        first.pointer_move(p(1.0, 1.0));
        first.pointer_up();
        block_on(first.persist());

        let mut second = agent_with(storage);
        block_on(second.restore_from_cache());
        assert_eq!(second.notes()[0].content, "cached");
        assert_eq!(second.surface().ops(), first.surface().ops());

        inbound(&mut second, ServerEvent::Init(BoardSnapshot::new()));
        assert!(second.notes().is_empty());
        assert!(second.surface().is_blank());
    }

    /// Rejects every write and counts the attempts.
    #[derive(Default)]
    struct FullStorage {
        writes: AtomicUsize,
    }

    impl Storage for FullStorage {
        fn get(&self, _key: &str) -> BoxFuture<'_, StorageResult<Option<String>>> {
            Box::pin(async { Ok(None) })
        }

        fn set(&self, _key: &str, _value: &str) -> BoxFuture<'_, StorageResult<()>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(StorageError::QuotaExceeded("full".into())) })
        }

        fn remove(&self, _key: &str) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_failed_save_is_not_repeated() {
        let storage = Arc::new(FullStorage::default());
        let mut agent = SyncAgent::new(HeadlessSurface::new(), AutoSaveManager::new(storage.clone()));

        agent.add_note(NoteKind::Note, "too big", 0.0, 0.0);
        assert!(!block_on(agent.persist()));
        let attempts = storage.writes.load(Ordering::SeqCst);
        assert!(attempts > 0);

        // Nothing new happened, so nothing is written again before the tick.
        assert!(!block_on(agent.persist()));
        assert_eq!(storage.writes.load(Ordering::SeqCst), attempts);
        assert!(agent.autosave().is_dirty());
    }
}
