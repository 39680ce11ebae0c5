//! SVG path geometry: parsing, ink costing, bounds, intersection.
//!
//! The accepted path language is the subset `M m L l H h V v Z z` with
//! non-negative integer coordinates, space separated, starting with an
//! absolute `M`. Lowercase commands are relative to the current point;
//! `Z`/`z` closes the path by drawing back to the most recent move
//! origin.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CanvasSettings;

/// The fill/stroke literal that marks an outline-only shape.
pub const TRANSPARENT: &str = "transparent";

/// A canvas coordinate pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position, grows rightward
    pub x: f64,
    /// Vertical position, grows downward
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A directed line segment between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    /// Where the pen started
    pub start: Point,
    /// Where the pen ended
    pub end: Point,
}

impl LineSegment {
    /// Create a segment.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f64 {
        let dx = self.start.x - self.end.x;
        let dy = self.start.y - self.end.y;
        dx.hypot(dy)
    }
}

/// Why a shape was rejected before reaching the chain.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// Path literal exceeds the wire limit
    #[error("svg path string longer than {} bytes", crate::MAX_SVG_STRING_LEN)]
    StringTooLong,
    /// Unknown command or wrong argument arity
    #[error("malformed svg path string")]
    MalformedPath,
    /// Both colors transparent, or either empty
    #[error("invalid fill/stroke combination")]
    InvalidColors,
    /// An endpoint lies outside the canvas
    #[error("shape is outside the bounds of the canvas")]
    OutOfBounds,
}

/// A parsed, costed shape ready for validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedShape {
    /// Segments in drawing order
    pub segments: Vec<LineSegment>,
    /// Ink the shape consumes when accepted
    pub ink_cost: u32,
}

/// Parse, bounds-check, and cost a shape in one pass.
///
/// This is the single entry point used both by the art-app client when
/// it builds an Add operation and by the validator when it re-derives
/// the shape from the raw string.
///
/// # Errors
/// Returns the first [`ShapeError`] encountered, in the order: length,
/// colors, syntax, bounds.
pub fn parse_shape(
    svg: &str,
    fill: &str,
    stroke: &str,
    canvas: &CanvasSettings,
) -> Result<ParsedShape, ShapeError> {
    if svg.len() > crate::MAX_SVG_STRING_LEN {
        return Err(ShapeError::StringTooLong);
    }

    validate_colors(fill, stroke)?;

    let segments = parse_segments(svg)?;
    check_bounds(&segments, canvas)?;

    let ink_cost = ink_cost(&segments, fill);

    Ok(ParsedShape { segments, ink_cost })
}

/// Reject transparent-on-transparent and empty color literals.
///
/// # Errors
/// Returns [`ShapeError::InvalidColors`] on rejection.
pub fn validate_colors(fill: &str, stroke: &str) -> Result<(), ShapeError> {
    if fill == TRANSPARENT && stroke == TRANSPARENT {
        return Err(ShapeError::InvalidColors);
    }
    if fill.is_empty() || stroke.is_empty() {
        return Err(ShapeError::InvalidColors);
    }
    Ok(())
}

/// Parse the path language into drawing-order segments.
///
/// # Errors
/// Returns [`ShapeError::MalformedPath`] on an unknown command, a bad
/// arity, a non-integer coordinate token, or a path not opening with
/// an absolute `M`.
pub fn parse_segments(svg: &str) -> Result<Vec<LineSegment>, ShapeError> {
    let tokens: Vec<&str> = svg.split_whitespace().collect();

    match tokens.first() {
        Some(&"M") => {}
        _ => return Err(ShapeError::MalformedPath),
    }

    let mut segments = Vec::new();
    let mut current = Point::default();
    let mut origin = Point::default();

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "M" => {
                let (x, y) = take_pair(&tokens, i)?;
                current = Point::new(x, y);
                origin = current;
                i += 3;
            }
            "m" => {
                let (dx, dy) = take_pair(&tokens, i)?;
                current = Point::new(current.x + dx, current.y + dy);
                origin = current;
                i += 3;
            }
            "L" => {
                let (x, y) = take_pair(&tokens, i)?;
                current = push_to(&mut segments, current, Point::new(x, y));
                i += 3;
            }
            "l" => {
                let (dx, dy) = take_pair(&tokens, i)?;
                current = push_to(
                    &mut segments,
                    current,
                    Point::new(current.x + dx, current.y + dy),
                );
                i += 3;
            }
            "H" => {
                let x = take_one(&tokens, i)?;
                current = push_to(&mut segments, current, Point::new(x, current.y));
                i += 2;
            }
            "h" => {
                let dx = take_one(&tokens, i)?;
                current = push_to(&mut segments, current, Point::new(current.x + dx, current.y));
                i += 2;
            }
            "V" => {
                let y = take_one(&tokens, i)?;
                current = push_to(&mut segments, current, Point::new(current.x, y));
                i += 2;
            }
            "v" => {
                let dy = take_one(&tokens, i)?;
                current = push_to(&mut segments, current, Point::new(current.x, current.y + dy));
                i += 2;
            }
            "Z" | "z" => {
                current = push_to(&mut segments, current, origin);
                i += 1;
            }
            _ => return Err(ShapeError::MalformedPath),
        }
    }

    Ok(segments)
}

fn push_to(segments: &mut Vec<LineSegment>, from: Point, to: Point) -> Point {
    segments.push(LineSegment::new(from, to));
    to
}

fn take_pair(tokens: &[&str], i: usize) -> Result<(f64, f64), ShapeError> {
    if i + 2 >= tokens.len() {
        return Err(ShapeError::MalformedPath);
    }
    Ok((parse_coord(tokens[i + 1])?, parse_coord(tokens[i + 2])?))
}

fn take_one(tokens: &[&str], i: usize) -> Result<f64, ShapeError> {
    if i + 1 >= tokens.len() {
        return Err(ShapeError::MalformedPath);
    }
    parse_coord(tokens[i + 1])
}

// Coordinates are unsigned integers; anything else is a command in the
// wrong position or a malformed number.
fn parse_coord(token: &str) -> Result<f64, ShapeError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShapeError::MalformedPath);
    }
    token.parse().map_err(|_| ShapeError::MalformedPath)
}

/// Require every endpoint inside `0 ..= max` on both axes.
///
/// # Errors
/// Returns [`ShapeError::OutOfBounds`] when any endpoint escapes.
pub fn check_bounds(segments: &[LineSegment], canvas: &CanvasSettings) -> Result<(), ShapeError> {
    let (max_x, max_y) = (f64::from(canvas.x_max), f64::from(canvas.y_max));

    let inside = |p: Point| p.x >= 0.0 && p.x <= max_x && p.y >= 0.0 && p.y <= max_y;

    if segments
        .iter()
        .all(|s| inside(s.start) && inside(s.end))
    {
        Ok(())
    } else {
        Err(ShapeError::OutOfBounds)
    }
}

/// Ink cost: perimeter, plus enclosed area for filled shapes, rounded
/// half-away-from-zero.
#[must_use]
pub fn ink_cost(segments: &[LineSegment], fill: &str) -> u32 {
    let mut total: f64 = segments.iter().map(LineSegment::length).sum();

    if fill != TRANSPARENT {
        let points: Vec<Point> = segments.iter().map(|s| s.start).collect();
        total += polygon_area(&points).abs();
    }

    total.round() as u32
}

// Signed shoelace area over the cyclic point sequence.
fn polygon_area(points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    let mut area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        area += p.x * q.y - q.x * p.y;
    }
    area / 2.0
}

// Sign of the cross product (q - p) x (r - p).
fn orientation(p: Point, q: Point, r: Point) -> i8 {
    let cross = (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

/// The orientation-sign intersection predicate.
///
/// Segments intersect when each straddles the line through the other.
/// Fully colinear contact produces equal (zero) orientations on both
/// sides and does not count; an endpoint resting on a crossing segment
/// does.
#[must_use]
pub fn segments_intersect(a: &LineSegment, b: &LineSegment) -> bool {
    let o1 = orientation(a.start, a.end, b.start);
    let o2 = orientation(a.start, a.end, b.end);
    let o3 = orientation(b.start, b.end, a.start);
    let o4 = orientation(b.start, b.end, a.end);

    o1 != o2 && o3 != o4
}

/// Whether any segment of `a` intersects any segment of `b`.
#[must_use]
pub fn shapes_intersect(a: &[LineSegment], b: &[LineSegment]) -> bool {
    a.iter()
        .any(|sa| b.iter().any(|sb| segments_intersect(sa, sb)))
}
