//! Canvas surface abstraction.
//!
//! The painting primitives live outside the core (a browser 2D context, a GPU
//! renderer, ...). The core only draws through [`CanvasSurface`] and moves
//! whole rasters around as opaque [`Raster`] values.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// An opaque, image-encoded snapshot of the whole canvas (a `data:` URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Raster(String);

impl Raster {
    /// Wrap an already encoded data URL.
    pub fn new(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    /// Encode raw image bytes as a base64 data URL.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
    }

    /// Encode PNG bytes.
    pub fn from_png(bytes: &[u8]) -> Self {
        Self::from_bytes("image/png", bytes)
    }

    /// The MIME type declared by the data URL, if well formed.
    pub fn mime(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let header = rest.split(',').next()?;
        Some(header.split(';').next().unwrap_or(header))
    }

    /// Decode the base64 payload. Returns None for non-base64 or malformed URLs.
    pub fn decode(&self) -> Option<Vec<u8>> {
        let rest = self.0.strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        if !header.ends_with(";base64") {
            return None;
        }
        STANDARD.decode(payload).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Color and width of a stroke. Colors are CSS color strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
}

impl StrokeStyle {
    pub fn new(color: impl Into<String>, width: f64) -> Self {
        Self {
            color: color.into(),
            width,
        }
    }
}

/// Font used by the text tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "Arial".to_string(),
            size: 20.0,
            bold: false,
            italic: false,
        }
    }
}

impl FontSpec {
    /// CSS `font` shorthand, e.g. `"italic bold 20px Arial"`.
    pub fn css(&self) -> String {
        let mut font = String::new();
        if self.italic {
            font.push_str("italic ");
        }
        if self.bold {
            font.push_str("bold ");
        }
        font.push_str(&format!("{}px {}", self.size, self.family));
        font
    }
}

/// Painting capability the core draws through.
pub trait CanvasSurface {
    /// Stroke one straight segment.
    fn stroke_segment(&mut self, from: Point, to: Point, style: &StrokeStyle);

    /// Stroke a rectangle outline spanning two corners.
    fn stroke_rect(&mut self, from: Point, to: Point, style: &StrokeStyle);

    /// Stroke a circle outline.
    fn stroke_circle(&mut self, center: Point, radius: f64, style: &StrokeStyle);

    /// Rasterize text with its baseline starting at `at`.
    fn fill_text(&mut self, text: &str, at: Point, font: &FontSpec, color: &str);

    /// Erase the whole canvas.
    fn clear(&mut self);

    /// Snapshot the current raster.
    fn export(&self) -> Raster;

    /// Replace the current raster.
    fn import(&mut self, raster: &Raster);
}

/// A drawing operation recorded by [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    Segment { from: (f64, f64), to: (f64, f64), style: StrokeStyle },
    Rect { from: (f64, f64), to: (f64, f64), style: StrokeStyle },
    Circle { center: (f64, f64), radius: f64, style: StrokeStyle },
    Text { text: String, at: (f64, f64), font: String, color: String },
    /// A raster imported from elsewhere that could not be decoded into ops.
    Image { raster: Raster },
}

const OPS_MIME: &str = "application/x-inkboard-ops+json";

/// In-memory surface that keeps the list of drawing operations as its raster.
///
/// Exports are deterministic: two surfaces that saw the same operations
/// export equal rasters. Useful for headless clients and tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    ops: Vec<DrawOp>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations currently on the canvas, oldest first.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn is_blank(&self) -> bool {
        self.ops.is_empty()
    }
}

fn xy(p: Point) -> (f64, f64) {
    (p.x, p.y)
}

impl CanvasSurface for HeadlessSurface {
    fn stroke_segment(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        self.ops.push(DrawOp::Segment {
            from: xy(from),
            to: xy(to),
            style: style.clone(),
        });
    }

    fn stroke_rect(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        self.ops.push(DrawOp::Rect {
            from: xy(from),
            to: xy(to),
            style: style.clone(),
        });
    }

    fn stroke_circle(&mut self, center: Point, radius: f64, style: &StrokeStyle) {
        self.ops.push(DrawOp::Circle {
            center: xy(center),
            radius,
            style: style.clone(),
        });
    }

    fn fill_text(&mut self, text: &str, at: Point, font: &FontSpec, color: &str) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            at: xy(at),
            font: font.css(),
            color: color.to_string(),
        });
    }

    fn clear(&mut self) {
        self.ops.clear();
    }

    fn export(&self) -> Raster {
        // Serializing plain data into a Vec cannot fail.
        let bytes = serde_json::to_vec(&self.ops).unwrap_or_default();
        Raster::from_bytes(OPS_MIME, &bytes)
    }

    fn import(&mut self, raster: &Raster) {
        let decoded = (raster.mime() == Some(OPS_MIME))
            .then(|| raster.decode())
            .flatten()
            .and_then(|bytes| serde_json::from_slice::<Vec<DrawOp>>(&bytes).ok());
        self.ops = match decoded {
            Some(ops) => ops,
            None => vec![DrawOp::Image {
                raster: raster.clone(),
            }],
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_png_roundtrip() {
        let raster = Raster::from_png(&[0x89, b'P', b'N', b'G']);
        assert!(raster.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(raster.mime(), Some("image/png"));
        assert_eq!(raster.decode().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_raster_rejects_malformed() {
        assert_eq!(Raster::new("not a data url").decode(), None);
        assert_eq!(Raster::new("data:text/plain,hello").decode(), None);
        assert_eq!(Raster::new("data:image/png;base64,@@@").decode(), None);
    }

    #[test]
    fn test_font_css() {
        let mut font = FontSpec::default();
        assert_eq!(font.css(), "20px Arial");
        font.bold = true;
        font.italic = true;
        font.family = "Georgia".to_string();
        assert_eq!(font.css(), "italic bold 20px Georgia");
    }

    #[test]
    fn test_headless_export_import() {
        let mut a = HeadlessSurface::new();
        a.stroke_segment(Point::new(0.0, 0.0), Point::new(5.0, 5.0), &StrokeStyle::new("red", 2.0));
        a.stroke_circle(Point::new(1.0, 1.0), 3.0, &StrokeStyle::new("blue", 1.0));

        let mut b = HeadlessSurface::new();
        b.import(&a.export());
        assert_eq!(a.ops(), b.ops());
        assert_eq!(a.export(), b.export());
    }

    #[test]
    fn test_headless_imports_foreign_raster() {
        let png = Raster::from_png(b"fake");
        let mut surface = HeadlessSurface::new();
        surface.import(&png);
        assert_eq!(surface.ops(), &[DrawOp::Image { raster: png }]);

        surface.clear();
        assert!(surface.is_blank());
    }
}
