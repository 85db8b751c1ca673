//! Board model: sticky records, the board snapshot and the merge-by-identifier rules.
//!
//! The same rules run on the relay (authoritative store) and on every client
//! (local mirror), so a note event applied on either side lands the same way:
//! - `add` appends, rejecting an identifier that is already present
//! - `update` merges present fields into the matching record
//! - `move_note` touches the position only
//! - `remove` drops the record
//!
//! Update, move and remove are no-ops for unknown identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::surface::Raster;

/// Identifier of a sticky record, assigned by the creating client.
pub type NoteId = String;

/// Generate a fresh note identifier.
pub fn new_note_id() -> NoteId {
    Uuid::new_v4().to_string()
}

/// What a sticky record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    /// Editable text note.
    #[default]
    Note,
    /// Embedded image (content is a data URL).
    Image,
}

/// A note or embedded image placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyRecord {
    pub id: NoteId,
    #[serde(rename = "type", default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default)]
    pub minimized: bool,
}

impl StickyRecord {
    /// Create a text note at the given position with a fresh identifier.
    pub fn note(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self::with_kind(NoteKind::Note, content, x, y)
    }

    /// Create an image note at the given position with a fresh identifier.
    pub fn image(data_url: impl Into<String>, x: f64, y: f64) -> Self {
        Self::with_kind(NoteKind::Image, data_url, x, y)
    }

    fn with_kind(kind: NoteKind, content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: new_note_id(),
            kind,
            content: content.into(),
            x,
            y,
            w: None,
            h: None,
            minimized: false,
        }
    }

    /// Merge the fields present in `patch`. The identifier never changes.
    pub fn merge(&mut self, patch: &NotePatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(ref content) = patch.content {
            self.content.clone_from(content);
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if patch.w.is_some() {
            self.w = patch.w;
        }
        if patch.h.is_some() {
            self.h = patch.h;
        }
        if let Some(minimized) = patch.minimized {
            self.minimized = minimized;
        }
    }

    /// A patch carrying every field of this record.
    pub fn to_patch(&self) -> NotePatch {
        NotePatch {
            id: self.id.clone(),
            kind: Some(self.kind),
            content: Some(self.content.clone()),
            x: Some(self.x),
            y: Some(self.y),
            w: self.w,
            h: self.h,
            minimized: Some(self.minimized),
        }
    }
}

/// Partial sticky record used by `updateNote`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotePatch {
    pub id: NoteId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NoteKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimized: Option<bool>,
}

impl NotePatch {
    /// Empty patch for the given identifier.
    pub fn new(id: impl Into<NoteId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_size(mut self, w: f64, h: f64) -> Self {
        self.w = Some(w);
        self.h = Some(h);
        self
    }

    pub fn with_minimized(mut self, minimized: bool) -> Self {
        self.minimized = Some(minimized);
        self
    }
}

/// Position change used by `moveNote`. Extra record fields on the wire are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMove {
    pub id: NoteId,
    pub x: f64,
    pub y: f64,
}

/// Result of adding a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A record with the same identifier already exists; nothing changed.
    Duplicate,
}

/// The whole board: last canvas raster plus the sticky records in creation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardSnapshot {
    #[serde(rename = "canvasImage", default)]
    pub canvas_image: Option<Raster>,
    #[serde(default)]
    pub notes: Vec<StickyRecord>,
}

impl BoardSnapshot {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the board has neither a raster nor notes.
    pub fn is_empty(&self) -> bool {
        self.canvas_image.is_none() && self.notes.is_empty()
    }

    /// Get a record by identifier.
    pub fn note(&self, id: &str) -> Option<&StickyRecord> {
        self.notes.iter().find(|n| n.id == id)
    }

    fn note_mut(&mut self, id: &str) -> Option<&mut StickyRecord> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    /// Append a record unless its identifier is already present.
    pub fn add(&mut self, record: StickyRecord) -> AddOutcome {
        if self.note(&record.id).is_some() {
            return AddOutcome::Duplicate;
        }
        self.notes.push(record);
        AddOutcome::Added
    }

    /// Merge a patch into the matching record. Returns false if the identifier is unknown.
    pub fn update(&mut self, patch: &NotePatch) -> bool {
        match self.note_mut(&patch.id) {
            Some(note) => {
                note.merge(patch);
                true
            }
            None => false,
        }
    }

    /// Move the matching record. Returns false if the identifier is unknown.
    pub fn move_note(&mut self, id: &str, x: f64, y: f64) -> bool {
        match self.note_mut(id) {
            Some(note) => {
                note.x = x;
                note.y = y;
                true
            }
            None => false,
        }
    }

    /// Remove the matching record.
    pub fn remove(&mut self, id: &str) -> Option<StickyRecord> {
        let pos = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(pos))
    }

    /// Reset to an empty board.
    pub fn clear(&mut self) {
        self.canvas_image = None;
        self.notes.clear();
    }
}

/// Body of a rendered note widget.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteBody {
    /// Editable text.
    Text(String),
    /// Image source (data URL).
    Image(String),
}

/// Everything a UI widget needs to display one sticky record.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteView {
    pub id: NoteId,
    /// CSS `left`, e.g. `"120px"`.
    pub left: String,
    /// CSS `top`.
    pub top: String,
    pub width: Option<String>,
    pub height: Option<String>,
    pub body: NoteBody,
    /// Body hidden, only the header is shown.
    pub collapsed: bool,
    /// Label of the minimize toggle.
    pub toggle_glyph: &'static str,
}

/// Glyph shown on the minimize toggle of an expanded note.
pub const EXPANDED_GLYPH: &str = "🔽";
/// Glyph shown on the minimize toggle of a collapsed note.
pub const COLLAPSED_GLYPH: &str = "🔼";

/// Format a pixel value as a CSS length.
pub fn css_px(value: f64) -> String {
    format!("{}px", value)
}

/// Parse a CSS pixel length (`"120px"`, `"120"`). Returns None for anything else.
pub fn parse_css_px(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Build the widget view of a record.
pub fn render_note(record: &StickyRecord) -> NoteView {
    let body = match record.kind {
        NoteKind::Note => NoteBody::Text(record.content.clone()),
        NoteKind::Image => NoteBody::Image(record.content.clone()),
    };
    NoteView {
        id: record.id.clone(),
        left: css_px(record.x),
        top: css_px(record.y),
        width: record.w.map(css_px),
        height: record.h.map(css_px),
        body,
        collapsed: record.minimized,
        toggle_glyph: if record.minimized {
            COLLAPSED_GLYPH
        } else {
            EXPANDED_GLYPH
        },
    }
}
