//! Geometry primitives for PDF user space.
//!
//! Coordinates follow PDF convention: y grows upward. Every type here is a plain
//! value; none of them borrow from a page or document.

use serde::{Deserialize, Serialize};

/// A point in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn isclose(&self, other: &Point, atol: f64) -> bool {
        (self.x - other.x).abs() <= atol && (self.y - other.y).abs() <= atol
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

impl std::ops::Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

/// The three point kinds a `Path` can tag its control points with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Move,
    Line,
    Bezier,
}

/// Orientation of a line segment, decided by how close it is to axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
    Angled,
}

/// A straight segment with a stroke width, used for table borders and rules.
///
/// `width` defaults to `0.1` — the "virtual border" constant used when a border is
/// synthesized rather than read off a real stroked path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub p0: Point,
    pub p1: Point,
    pub width: f64,
}

const DEFAULT_LINE_WIDTH: f64 = 0.1;
const AXIS_EPSILON: f64 = 1e-6;

impl Line {
    pub fn new(p0: Point, p1: Point) -> Self {
        Line { p0, p1, width: DEFAULT_LINE_WIDTH }
    }

    pub fn with_width(p0: Point, p1: Point, width: f64) -> Self {
        Line { p0, p1, width }
    }

    pub fn direction(&self) -> Direction {
        if (self.p0.x - self.p1.x).abs() < AXIS_EPSILON {
            Direction::Vertical
        } else if (self.p0.y - self.p1.y).abs() < AXIS_EPSILON {
            Direction::Horizontal
        } else {
            Direction::Angled
        }
    }

    pub fn bbox(&self) -> Rectangle {
        Rectangle::new(self.p0.x, self.p0.y, self.p1.x, self.p1.y)
    }

    /// A point lies "on" a line if the sum of its distances to the two endpoints
    /// equals the segment length within `atol`.
    pub fn contains(&self, point: Point, atol: f64) -> bool {
        let total = self.p0.distance(&self.p1);
        let via = self.p0.distance(&point) + point.distance(&self.p1);
        (via - total).abs() <= atol
    }

    /// Narrow to `VLine`/`HLine` when axis-aligned, otherwise return the generic line.
    pub fn specialize(&self) -> Specialized {
        match self.direction() {
            Direction::Vertical => {
                let (y0, y1) = if self.p0.y <= self.p1.y { (self.p0.y, self.p1.y) } else { (self.p1.y, self.p0.y) };
                Specialized::V(VLine { x: self.p0.x, y0, y1, width: self.width })
            }
            Direction::Horizontal => {
                let (x0, x1) = if self.p0.x <= self.p1.x { (self.p0.x, self.p1.x) } else { (self.p1.x, self.p0.x) };
                Specialized::H(HLine { y: self.p0.y, x0, x1, width: self.width })
            }
            Direction::Angled => Specialized::Angled(*self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Specialized {
    V(VLine),
    H(HLine),
    Angled(Line),
}

/// A vertical line segment, normalized so `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VLine {
    pub x: f64,
    pub y0: f64,
    pub y1: f64,
    pub width: f64,
}

impl VLine {
    pub fn len(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn midpoint_on(&self, point: Point, atol: f64) -> bool {
        (point.x - self.x).abs() <= atol && point.y >= self.y0 - atol && point.y <= self.y1 + atol
    }
}

/// A horizontal line segment, normalized so `x0 <= x1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HLine {
    pub y: f64,
    pub x0: f64,
    pub x1: f64,
    pub width: f64,
}

impl HLine {
    pub fn len(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn midpoint_on(&self, point: Point, atol: f64) -> bool {
        (point.y - self.y).abs() <= atol && point.x >= self.x0 - atol && point.x <= self.x1 + atol
    }
}

/// An axis-aligned rectangle, always stored with `left <= right` and `bottom <= top`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Rectangle {
    /// Build from two arbitrary corners; point ordering is normalized per axis.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (bottom, top) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Rectangle { left, bottom, right, top }
    }

    pub fn from_points(p0: Point, p1: Point) -> Self {
        Rectangle::new(p0.x, p0.y, p1.x, p1.y)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn midpoint(&self) -> Point {
        Point::new((self.left + self.right) / 2.0, (self.bottom + self.top) / 2.0)
    }

    /// Four corners, counter-clockwise starting from the lower-left.
    pub fn points(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.bottom),
            Point::new(self.right, self.bottom),
            Point::new(self.right, self.top),
            Point::new(self.left, self.top),
        ]
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.bottom && p.y <= self.top
    }

    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        self.contains_point(Point::new(other.left, other.bottom)) && self.contains_point(Point::new(other.right, other.top))
    }

    /// Corner-containment overlap test, kept identical to the reference engine this
    /// was translated from: it checks whether `self` contains `other`'s lower-left or
    /// upper-right corner, not a full separating-axis overlap. Two rectangles that
    /// interleave without either one's corner landing inside the other (e.g. a
    /// plus-shape intersection) are reported as non-overlapping. Every caller in this
    /// crate only ever calls `overlaps` on rectangles drawn from the same page-area
    /// partition, where that distinction never arises in practice.
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        self.contains_point(Point::new(other.left, other.bottom)) || self.contains_point(Point::new(other.right, other.top))
    }

    pub fn isclose(&self, other: &Rectangle, atol: f64) -> bool {
        (self.left - other.left).abs() <= atol
            && (self.bottom - other.bottom).abs() <= atol
            && (self.right - other.right).abs() <= atol
            && (self.top - other.top).abs() <= atol
    }

    pub fn offset_x(&self, dx: f64) -> Rectangle {
        Rectangle::new(self.left + dx, self.bottom, self.right + dx, self.top)
    }

    pub fn offset_y(&self, dy: f64) -> Rectangle {
        Rectangle::new(self.left, self.bottom + dy, self.right, self.top + dy)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Rectangle {
        Rectangle::new(self.left + dx, self.bottom + dy, self.right + dx, self.top + dy)
    }

    pub fn translated(&self, p: Point) -> Rectangle {
        self.offset(p.x, p.y)
    }

    /// Rotate both corners about the origin by `deg` (a multiple of 90), without
    /// re-normalizing ordering afterward — callers that need a normalized rectangle
    /// should re-wrap the result through `Rectangle::from_points`.
    pub fn rotated(&self, deg: i32) -> Rectangle {
        let rot = |p: Point| -> Point {
            match deg.rem_euclid(360) {
                90 => Point::new(-p.y, p.x),
                180 => Point::new(-p.x, -p.y),
                270 => Point::new(p.y, -p.x),
                _ => p,
            }
        };
        let p0 = rot(Point::new(self.left, self.bottom));
        let p1 = rot(Point::new(self.right, self.top));
        Rectangle::new(p0.x, p0.y, p1.x, p1.y)
    }

    /// The smallest rectangle containing both operands.
    pub fn joined(&self, other: &Rectangle) -> Rectangle {
        Rectangle {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    pub fn round(&self, ndigits: i32) -> Rectangle {
        let scale = 10f64.powi(ndigits);
        let r = |v: f64| (v * scale).round() / scale;
        Rectangle::new(r(self.left), r(self.bottom), r(self.right), r(self.top))
    }
}

/// A 1-D interval used by the two-pass clustering algorithms of `graphic_clusters`
/// and `graphic_bboxes_in_area`. `objs` holds the leaf items that fell into this
/// interval; `subregions` holds the second-pass clustering along the other axis.
#[derive(Debug, Clone)]
pub struct Region<T> {
    pub v0: f64,
    pub v1: f64,
    pub objs: Vec<T>,
    pub subregions: Vec<Region<T>>,
}

impl<T> Region<T> {
    pub fn new(v0: f64, v1: f64) -> Self {
        Region { v0, v1, objs: Vec::new(), subregions: Vec::new() }
    }

    pub fn delta(&self) -> f64 {
        self.v1 - self.v0
    }

    pub fn contains(&self, v: f64, atol: f64) -> bool {
        v >= self.v0 - atol && v <= self.v1 + atol
    }

    /// Inclusive-tolerance 1-D interval overlap test.
    pub fn overlaps(o0: f64, o1: f64, v0: f64, v1: f64, atol: f64) -> bool {
        o0 <= v1 + atol && v0 <= o1 + atol
    }

    pub fn extend(&mut self, v0: f64, v1: f64) {
        self.v0 = self.v0.min(v0);
        self.v1 = self.v1.max(v1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_normalizes_ordering() {
        let r = Rectangle::new(5.0, 5.0, 1.0, 1.0);
        assert!(r.left <= r.right);
        assert!(r.bottom <= r.top);
    }

    #[test]
    fn joined_is_commutative_and_idempotent() {
        let a = Rectangle::new(0.0, 0.0, 2.0, 2.0);
        let b = Rectangle::new(1.0, 1.0, 3.0, 3.0);
        assert_eq!(a.joined(&b).round(6), b.joined(&a).round(6));
        assert_eq!(a.joined(&a), a);
    }

    #[test]
    fn joined_absorbs_contained_rect() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0);
        let b = Rectangle::new(2.0, 2.0, 4.0, 4.0);
        assert!(a.contains_rect(&b));
        assert_eq!(a.joined(&b), a);
    }

    #[test]
    fn overlaps_is_corner_containment_not_general_overlap() {
        // A plus-shaped intersection: neither rectangle's corners land inside the other.
        let horiz = Rectangle::new(0.0, 4.0, 10.0, 6.0);
        let vert = Rectangle::new(4.0, 0.0, 6.0, 10.0);
        assert!(!horiz.overlaps(&vert));
    }

    #[test]
    fn points_are_ccw_from_lower_left() {
        let r = Rectangle::new(0.0, 0.0, 2.0, 1.0);
        let pts = r.points();
        assert_eq!(pts[0], Point::new(0.0, 0.0));
        assert_eq!(pts[1], Point::new(2.0, 0.0));
        assert_eq!(pts[2], Point::new(2.0, 1.0));
        assert_eq!(pts[3], Point::new(0.0, 1.0));
    }

    #[test]
    fn region_overlap_is_inclusive() {
        assert!(Region::<()>::overlaps(0.0, 1.0, 1.0, 2.0, 0.0));
        assert!(!Region::<()>::overlaps(0.0, 1.0, 1.001, 2.0, 0.0));
        assert!(Region::<()>::overlaps(0.0, 1.0, 1.001, 2.0, 0.01));
    }
}
