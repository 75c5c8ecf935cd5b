//! Committed ink: points, colors, strokes and boards.

use crate::geometry::{bounding_box, polyline_intersects_rect};
use kurbo::{Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a committed stroke.
pub type StrokeId = Uuid;

/// Errors raised while building or decoding a stroke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrokeError {
    #[error("Stroke needs at least 2 points, got {0}")]
    Degenerate(usize),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Invalid stroke width: {0}")]
    InvalidWidth(f64),
}

/// A captured point in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    /// Stylus pressure in `[0, 1]`, when the device reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl StrokePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, pressure: None }
    }

    /// Create a point with a pressure sample (clamped to `[0, 1]`).
    pub fn with_pressure(x: f64, y: f64, pressure: f64) -> Self {
        Self {
            x,
            y,
            pressure: Some(pressure.clamp(0.0, 1.0)),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl From<Point> for StrokePoint {
    fn from(point: Point) -> Self {
        Self::new(point.x, point.y)
    }
}

/// Opaque RGB ink color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl InkColor {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for InkColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for InkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for InkColor {
    type Err = StrokeError;

    /// Parse `#rrggbb` or the short `#rgb` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StrokeError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() {
            return Err(invalid());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let short = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for InkColor {
    type Error = StrokeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InkColor> for String {
    fn from(color: InkColor) -> Self {
        color.to_hex()
    }
}

impl From<Color> for InkColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b)
    }
}

impl From<InkColor> for Color {
    fn from(color: InkColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, 255)
    }
}

/// Wire shape of a stroke, validated into [`Stroke`] on decode.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStroke {
    #[serde(default = "Uuid::new_v4")]
    id: StrokeId,
    points: Vec<StrokePoint>,
    color: InkColor,
    width: f64,
    #[serde(default)]
    is_eraser: bool,
}

impl TryFrom<RawStroke> for Stroke {
    type Error = StrokeError;

    fn try_from(raw: RawStroke) -> Result<Self, Self::Error> {
        let mut stroke = Stroke::new(raw.points, raw.color, raw.width, raw.is_eraser)?;
        stroke.id = raw.id;
        Ok(stroke)
    }
}

/// One committed, immutable freehand ink path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawStroke")]
pub struct Stroke {
    id: StrokeId,
    points: Vec<StrokePoint>,
    color: InkColor,
    width: f64,
    is_eraser: bool,
}

impl Stroke {
    /// Build a stroke from captured points, in capture order.
    pub fn new(
        points: Vec<StrokePoint>,
        color: InkColor,
        width: f64,
        is_eraser: bool,
    ) -> Result<Self, StrokeError> {
        if points.len() < 2 {
            return Err(StrokeError::Degenerate(points.len()));
        }
        if !width.is_finite() || width <= 0.0 {
            return Err(StrokeError::InvalidWidth(width));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            points,
            color,
            width,
            is_eraser,
        })
    }

    pub fn id(&self) -> StrokeId {
        self.id
    }

    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    pub fn color(&self) -> InkColor {
        self.color
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn is_eraser(&self) -> bool {
        self.is_eraser
    }

    /// Point positions without pressure.
    pub fn positions(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().map(StrokePoint::position)
    }

    /// Bounds of the centerline (stroke width not included).
    pub fn bounds(&self) -> Rect {
        bounding_box(self.positions())
    }

    /// Whether any ink of the stroke, width included, touches `region`.
    pub fn intersects(&self, region: Rect) -> bool {
        let half = self.width / 2.0;
        let positions: Vec<Point> = self.positions().collect();
        polyline_intersects_rect(&positions, region.inflate(half, half))
    }
}

/// A board: the ordered strokes stored under an externally supplied id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub strokes: Vec<Stroke>,
}

impl Board {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            strokes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Ids of strokes passing through `region`, in board order.
    pub fn strokes_in_region(&self, region: Rect) -> Vec<StrokeId> {
        self.strokes
            .iter()
            .filter(|stroke| stroke.intersects(region))
            .map(Stroke::id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> Vec<StrokePoint> {
        points.iter().map(|&(x, y)| StrokePoint::new(x, y)).collect()
    }

    #[test]
    fn test_degenerate_stroke_rejected() {
        let result = Stroke::new(line(&[(1.0, 1.0)]), InkColor::BLACK, 3.0, false);
        assert_eq!(result, Err(StrokeError::Degenerate(1)));
    }

    #[test]
    fn test_invalid_width_rejected() {
        let result = Stroke::new(line(&[(0.0, 0.0), (1.0, 1.0)]), InkColor::BLACK, 0.0, false);
        assert!(matches!(result, Err(StrokeError::InvalidWidth(_))));
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("#ff0000".parse::<InkColor>().unwrap(), InkColor::new(255, 0, 0));
        assert_eq!("#0c0".parse::<InkColor>().unwrap(), InkColor::new(0, 204, 0));
        assert!("ff0000".parse::<InkColor>().is_err());
        assert!("#12345".parse::<InkColor>().is_err());
        assert!("#gg0000".parse::<InkColor>().is_err());
    }

    #[test]
    fn test_color_hex_output() {
        assert_eq!(InkColor::new(0, 204, 0).to_hex(), "#00cc00");
    }

    #[test]
    fn test_stroke_json_shape() {
        let stroke = Stroke::new(line(&[(10.0, 10.0), (20.0, 10.0)]), InkColor::new(0, 0, 255), 3.0, true)
            .unwrap();
        let json = serde_json::to_value(&stroke).unwrap();
        assert_eq!(json["color"], "#0000ff");
        assert_eq!(json["isEraser"], true);
        assert_eq!(json["points"][1]["x"], 20.0);
        assert!(json["points"][0].get("pressure").is_none());
    }

    #[test]
    fn test_decode_without_id_assigns_one() {
        let json = r##"{"points":[{"x":0,"y":0},{"x":5,"y":5}],"color":"#000000","width":3}"##;
        let stroke: Stroke = serde_json::from_str(json).unwrap();
        assert!(!stroke.id().is_nil());
        assert!(!stroke.is_eraser());
    }

    #[test]
    fn test_decode_rejects_single_point() {
        let json = r##"{"points":[{"x":0,"y":0}],"color":"#000000","width":3}"##;
        assert!(serde_json::from_str::<Stroke>(json).is_err());
    }

    #[test]
    fn test_pressure_clamped() {
        let point = StrokePoint::with_pressure(1.0, 2.0, 1.7);
        assert_eq!(point.pressure, Some(1.0));
    }

    #[test]
    fn test_strokes_in_region() {
        let mut board = Board::new("b");
        let inside = Stroke::new(line(&[(5.0, 5.0), (8.0, 8.0)]), InkColor::BLACK, 3.0, false).unwrap();
        let crossing = Stroke::new(line(&[(-50.0, 5.0), (50.0, 5.0)]), InkColor::BLACK, 3.0, false).unwrap();
        let outside = Stroke::new(line(&[(100.0, 100.0), (120.0, 120.0)]), InkColor::BLACK, 3.0, false).unwrap();
        board.strokes = vec![inside.clone(), crossing.clone(), outside];

        let hit = board.strokes_in_region(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(hit, vec![inside.id(), crossing.id()]);
    }

    #[test]
    fn test_wide_stroke_reaches_into_region() {
        let region = Rect::new(0.0, 0.0, 10.0, 10.0);
        // Centerline 10 units right of the region.
        let wide = Stroke::new(line(&[(20.0, 0.0), (20.0, 10.0)]), InkColor::BLACK, 30.0, false).unwrap();
        let thin = Stroke::new(line(&[(20.0, 0.0), (20.0, 10.0)]), InkColor::BLACK, 3.0, false).unwrap();

        assert!(wide.intersects(region));
        assert!(!thin.intersects(region));
    }
}
