//! Authoritative board state held by the relay.

use inkboard_core::board::{AddOutcome, BoardSnapshot, NoteId, NotePatch, StickyRecord};
use inkboard_core::protocol::DrawSegment;
use inkboard_core::surface::Raster;
use tracing::{debug, trace, warn};

/// The one board snapshot of a running server. Lives only in memory.
#[derive(Debug, Default)]
pub struct BoardStore {
    board: BoardSnapshot,
}

impl BoardStore {
    /// Create a store holding an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_snapshot(board: BoardSnapshot) -> Self {
        Self { board }
    }

    /// Draw segments are not kept; the next `setCanvas` carries their effect.
    pub fn apply_draw(&self, segment: &DrawSegment) {
        trace!("Draw segment to ({}, {})", segment.x, segment.y);
    }

    /// Replace the raster wholesale. `None` clears it.
    pub fn set_canvas(&mut self, image: Option<Raster>) {
        debug!(
            "Canvas replaced ({} bytes)",
            image.as_ref().map_or(0, |r| r.as_str().len())
        );
        self.board.canvas_image = image;
    }

    pub fn clear(&mut self) {
        debug!("Board cleared");
        self.board.clear();
    }

    pub fn add_note(&mut self, record: StickyRecord) -> AddOutcome {
        let id = record.id.clone();
        let outcome = self.board.add(record);
        match outcome {
            AddOutcome::Added => debug!("Note {} added", id),
            AddOutcome::Duplicate => warn!("Rejected duplicate note {}", id),
        }
        outcome
    }

    /// Merge a partial record. Returns false when the identifier is unknown.
    pub fn update_note(&mut self, patch: &NotePatch) -> bool {
        let found = self.board.update(patch);
        if !found {
            debug!("Update for unknown note {}", patch.id);
        }
        found
    }

    pub fn move_note(&mut self, id: &str, x: f64, y: f64) -> bool {
        let found = self.board.move_note(id, x, y);
        if !found {
            debug!("Move for unknown note {}", id);
        }
        found
    }

    pub fn remove_note(&mut self, id: &NoteId) -> bool {
        let found = self.board.remove(id).is_some();
        if !found {
            debug!("Remove for unknown note {}", id);
        }
        found
    }

    /// Copy of the current board for a freshly connected client.
    pub fn bootstrap(&self) -> BoardSnapshot {
        self.board.clone()
    }

    pub fn snapshot(&self) -> &BoardSnapshot {
        &self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::board::NoteMove;

    fn note(id: &str) -> StickyRecord {
        let mut record = StickyRecord::note("text", 0.0, 0.0);
        record.id = id.to_string();
        record
    }

    #[test]
    fn test_bootstrap_holds_last_state() {
        let mut store = BoardStore::new();
        for id in ["a", "b", "c"] {
            store.add_note(note(id));
        }
        store.update_note(&NotePatch::new("b").with_content("edited"));
        let mv = NoteMove { id: "c".into(), x: 9.0, y: 8.0 };
        store.move_note(&mv.id, mv.x, mv.y);
        store.set_canvas(Some(Raster::from_png(b"png")));

        let snapshot = store.bootstrap();
        assert_eq!(snapshot.notes.len(), 3);
        assert_eq!(snapshot.note("b").unwrap().content, "edited");
        assert_eq!(snapshot.note("c").map(|n| (n.x, n.y)), Some((9.0, 8.0)));
        assert!(snapshot.canvas_image.is_some());
    }

    #[test]
    fn test_bootstrap_is_a_copy() {
        let mut store = BoardStore::new();
        store.add_note(note("a"));
        let snapshot = store.bootstrap();
        store.clear();
        assert_eq!(snapshot.notes.len(), 1);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_unknown_ids_and_duplicates() {
        let mut store = BoardStore::new();
        assert_eq!(store.add_note(note("a")), AddOutcome::Added);
        assert_eq!(store.add_note(note("a")), AddOutcome::Duplicate);
        assert!(!store.update_note(&NotePatch::new("x")));
        assert!(!store.move_note("x", 1.0, 1.0));
        assert!(!store.remove_note(&"x".to_string()));
        assert!(store.remove_note(&"a".to_string()));
        assert!(store.snapshot().notes.is_empty());
    }

    #[test]
    fn test_set_canvas_null_clears_raster() {
        let mut store = BoardStore::with_snapshot(BoardSnapshot {
            canvas_image: Some(Raster::from_png(b"png")),
            notes: vec![note("a")],
        });
        store.set_canvas(None);
        assert!(store.snapshot().canvas_image.is_none());
        assert_eq!(store.snapshot().notes.len(), 1);
    }
}
