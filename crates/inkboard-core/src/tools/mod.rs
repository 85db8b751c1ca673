//! Tool system for the whiteboard.
//!
//! The manager turns pointer input into drawing steps; it never touches the
//! surface itself. Each pointer move reads the live tool, so switching tools
//! in the middle of a drag changes behavior from that point on.

mod text;

pub use text::{TextOverlay, TextStamp};

use crate::surface::{CanvasSurface, FontSpec, StrokeStyle};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Color painted by the eraser.
pub const ERASER_COLOR: &str = "white";

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Pencil,
    Eraser,
    Line,
    Rect,
    Circle,
    Text,
}

impl ToolKind {
    /// Tools that lay down permanent segments while dragging.
    pub fn is_freehand(self) -> bool {
        matches!(self, ToolKind::Pencil | ToolKind::Eraser)
    }

    /// Tools that redraw a live preview over the pre-drag raster.
    pub fn is_shape(self) -> bool {
        matches!(self, ToolKind::Line | ToolKind::Rect | ToolKind::Circle)
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Pencil => "pencil",
            ToolKind::Eraser => "eraser",
            ToolKind::Line => "line",
            ToolKind::Rect => "rect",
            ToolKind::Circle => "circle",
            ToolKind::Text => "text",
        }
    }
}

/// State of a tool interaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ToolState {
    /// Tool is idle, waiting for interaction.
    #[default]
    Idle,
    /// A pointer drag is in progress.
    Dragging {
        /// Where the drag started.
        start: Point,
        /// Last pointer position seen.
        last: Point,
    },
}

/// Live preview of a shape tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapePreview {
    Line { from: Point, to: Point },
    Rect { from: Point, to: Point },
    Circle { center: Point, radius: f64 },
}

impl ShapePreview {
    fn for_tool(tool: ToolKind, start: Point, current: Point) -> Option<Self> {
        match tool {
            ToolKind::Line => Some(ShapePreview::Line { from: start, to: current }),
            ToolKind::Rect => Some(ShapePreview::Rect { from: start, to: current }),
            ToolKind::Circle => Some(ShapePreview::Circle {
                center: start,
                radius: start.distance(current),
            }),
            _ => None,
        }
    }

    pub fn draw(&self, surface: &mut impl CanvasSurface, style: &StrokeStyle) {
        match *self {
            ShapePreview::Line { from, to } => surface.stroke_segment(from, to, style),
            ShapePreview::Rect { from, to } => surface.stroke_rect(from, to, style),
            ShapePreview::Circle { center, radius } => surface.stroke_circle(center, radius, style),
        }
    }
}

/// What a pointer move produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DragStep {
    /// A permanent freehand segment.
    Segment {
        from: Point,
        to: Point,
        style: StrokeStyle,
    },
    /// Restore the pre-drag raster, then draw this shape.
    Preview { shape: ShapePreview, style: StrokeStyle },
}

/// Manages the current tool and its state.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Currently selected tool.
    pub current_tool: ToolKind,
    /// Current state of the tool.
    pub state: ToolState,
    /// Stroke and text color (CSS).
    pub color: String,
    /// Stroke width.
    pub width: f64,
    /// Font for the text tool.
    pub font: FontSpec,
    overlay: Option<TextOverlay>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_tool: ToolKind::default(),
            state: ToolState::default(),
            color: "#000000".to_string(),
            width: 5.0,
            font: FontSpec::default(),
            overlay: None,
        }
    }
}

impl ToolManager {
    /// Create a new tool manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current tool. An active drag keeps going with the new tool.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
    }

    /// Style for a freehand or shape stroke with the given tool.
    pub fn stroke_style(&self, tool: ToolKind) -> StrokeStyle {
        let color = if tool == ToolKind::Eraser {
            ERASER_COLOR
        } else {
            self.color.as_str()
        };
        StrokeStyle::new(color, self.width)
    }

    /// Begin a drag.
    pub fn begin(&mut self, point: Point) {
        self.state = ToolState::Dragging {
            start: point,
            last: point,
        };
    }

    /// Update the current drag.
    pub fn update(&mut self, point: Point) -> Option<DragStep> {
        let ToolState::Dragging { start, last } = &mut self.state else {
            return None;
        };
        let (start, from) = (*start, *last);
        *last = point;

        let tool = self.current_tool;
        if tool.is_freehand() {
            Some(DragStep::Segment {
                from,
                to: point,
                style: self.stroke_style(tool),
            })
        } else {
            ShapePreview::for_tool(tool, start, point).map(|shape| DragStep::Preview {
                shape,
                style: self.stroke_style(tool),
            })
        }
    }

    /// End the current drag. Returns true if one was active.
    pub fn end(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = ToolState::Idle;
        was_active
    }

    /// Abandon the current drag.
    pub fn cancel(&mut self) {
        self.state = ToolState::Idle;
    }

    /// Check if a drag is active.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Dragging { .. })
    }

    // --- Text overlay ---

    /// Open a text overlay at `point` with the current font and color.
    ///
    /// An overlay that is still open is finalized first (it loses focus) and
    /// its stamp is returned.
    pub fn open_text(&mut self, point: Point) -> Option<TextStamp> {
        let previous = self.commit_text();
        self.overlay = Some(TextOverlay::new(point, self.font.clone(), self.color.clone()));
        previous
    }

    /// The open text overlay, if any.
    pub fn overlay(&self) -> Option<&TextOverlay> {
        self.overlay.as_ref()
    }

    /// Replace the text typed into the open overlay.
    pub fn set_overlay_text(&mut self, text: impl Into<String>) {
        if let Some(overlay) = &mut self.overlay {
            overlay.text = text.into();
        }
    }

    /// Finalize the overlay (Enter or focus loss). Empty input yields nothing.
    pub fn commit_text(&mut self) -> Option<TextStamp> {
        self.overlay.take().and_then(TextOverlay::finish)
    }

    /// Close the overlay without rasterizing.
    pub fn discard_text(&mut self) {
        self.overlay = None;
    }
}
