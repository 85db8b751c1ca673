//! Transient text-entry overlay used by the text tool.

use crate::surface::{CanvasSurface, FontSpec};
use kurbo::Point;

/// An open text-entry box positioned at the click point.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub at: Point,
    pub font: FontSpec,
    pub color: String,
    pub text: String,
}

impl TextOverlay {
    pub fn new(at: Point, font: FontSpec, color: String) -> Self {
        Self {
            at,
            font,
            color,
            text: String::new(),
        }
    }

    /// CSS for the overlay input so it matches what will be rasterized.
    pub fn input_style(&self) -> String {
        format!(
            "position: absolute; left: {}px; top: {}px; font: {}; color: {};",
            self.at.x,
            self.at.y,
            self.font.css(),
            self.color
        )
    }

    /// Turn the overlay into a stamp, or nothing for empty input.
    pub fn finish(self) -> Option<TextStamp> {
        if self.text.is_empty() {
            return None;
        }
        Some(TextStamp {
            text: self.text,
            at: self.at,
            font: self.font,
            color: self.color,
        })
    }
}

/// Finalized text ready to be rasterized.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStamp {
    pub text: String,
    pub at: Point,
    pub font: FontSpec,
    pub color: String,
}

impl TextStamp {
    pub fn draw(&self, surface: &mut impl CanvasSurface) {
        surface.fill_text(&self.text, self.at, &self.font, &self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_style() {
        let overlay = TextOverlay::new(Point::new(12.0, 34.0), FontSpec::default(), "#333".into());
        let css = overlay.input_style();
        assert!(css.contains("left: 12px"));
        assert!(css.contains("top: 34px"));
        assert!(css.contains("font: 20px Arial"));
        assert!(css.contains("color: #333"));
    }
}
