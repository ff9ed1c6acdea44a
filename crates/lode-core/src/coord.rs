// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Quantized coordinates and integer-only intersection predicates.
//!
//! All replicated spatial fields are integers in units of `1/COORD_SCALE`
//! tile. Physics runs on floats elsewhere; everything that decides impact
//! ordering or is replicated crosses through this module first so the results
//! are bit-stable across platforms and architectures.
//!
//! Determinism contract:
//! - Conversion from world floats rounds half away from zero.
//! - Predicates use only integer dot/cross products and squared distances,
//!   with `i128` intermediates. No trigonometry, no float comparisons.
//! - Edges are inclusive: touching counts as intersecting.

/// Sub-units per tile for replicated coordinates.
pub const COORD_SCALE: i64 = 16;

/// World units per tile. The spatial grid and navmesh derive from this.
pub const TILE_SIZE: f64 = 40.0;

/// Quantizes a value measured in tiles to sub-unit precision.
///
/// Nearest integer after `value * COORD_SCALE`, ties away from zero.
#[must_use]
pub fn quantize(tiles: f64) -> i64 {
    let scaled = tiles * COORD_SCALE as f64;
    if scaled >= 0.0 {
        (scaled + 0.5).floor() as i64
    } else {
        (scaled - 0.5).ceil() as i64
    }
}

/// Quantizes a world-unit coordinate to sub-unit precision.
#[must_use]
pub fn quantize_world(world: f64) -> i64 {
    quantize(world / TILE_SIZE)
}

/// Converts a quantized coordinate back to world units.
///
/// Stable to one sub-unit for values within a bounded world; see the
/// round-trip property tests.
#[must_use]
pub fn dequantize_world(q: i64) -> f64 {
    q as f64 * TILE_SIZE / COORD_SCALE as f64
}

/// A point in quantized sub-unit coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct QPoint {
    /// Horizontal component, sub-units.
    pub x: i64,
    /// Vertical component, sub-units.
    pub y: i64,
}

impl QPoint {
    /// Constructs a point from sub-unit components.
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Quantizes a world-unit position.
    #[must_use]
    pub fn from_world(x: f64, y: f64) -> Self {
        Self {
            x: quantize_world(x),
            y: quantize_world(y),
        }
    }

    /// Squared distance to `other`, exact in `i128`.
    #[must_use]
    pub fn dist_sq(self, other: Self) -> i128 {
        let dx = i128::from(self.x - other.x);
        let dy = i128::from(self.y - other.y);
        dx * dx + dy * dy
    }
}

/// A velocity in sub-units per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct QVec {
    /// Horizontal component, sub-units per tick.
    pub x: i64,
    /// Vertical component, sub-units per tick.
    pub y: i64,
}

impl QVec {
    /// Constructs a velocity from sub-unit components.
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in sub-units. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QRect {
    /// Minimum corner.
    pub min: QPoint,
    /// Maximum corner.
    pub max: QPoint,
}

impl QRect {
    /// Constructs a rect from min/max corners, normalizing a swapped pair.
    #[must_use]
    pub fn new(min: QPoint, max: QPoint) -> Self {
        Self {
            min: QPoint::new(min.x.min(max.x), min.y.min(max.y)),
            max: QPoint::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    /// Constructs a rect from a center and half-extents.
    #[must_use]
    pub fn from_center(center: QPoint, half_w: i64, half_h: i64) -> Self {
        Self {
            min: QPoint::new(center.x - half_w, center.y - half_h),
            max: QPoint::new(center.x + half_w, center.y + half_h),
        }
    }

    /// True when `p` lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: QPoint) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Grows the rect by `amount` sub-units on every side.
    #[must_use]
    pub fn inflate(&self, amount: i64) -> Self {
        Self {
            min: QPoint::new(self.min.x - amount, self.min.y - amount),
            max: QPoint::new(self.max.x + amount, self.max.y + amount),
        }
    }

    /// The four corners in clockwise order from `min`.
    #[must_use]
    pub fn corners(&self) -> [QPoint; 4] {
        [
            self.min,
            QPoint::new(self.max.x, self.min.y),
            self.max,
            QPoint::new(self.min.x, self.max.y),
        ]
    }
}

/// Circle in sub-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QCircle {
    /// Center point.
    pub center: QPoint,
    /// Radius in sub-units.
    pub radius: i64,
}

/// Line segment in sub-units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QSegment {
    /// Start point.
    pub a: QPoint,
    /// End point.
    pub b: QPoint,
}

/// Capsule: a segment swept by a radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QCapsule {
    /// Spine segment.
    pub segment: QSegment,
    /// Sweep radius in sub-units.
    pub radius: i64,
}

/// Integer vector length: `round(sqrt(x² + y²))`. IEEE sqrt is correctly
/// rounded, so the result is platform-stable.
#[must_use]
pub fn int_hypot(x: i64, y: i64) -> i64 {
    let sq = (i128::from(x) * i128::from(x) + i128::from(y) * i128::from(y)) as f64;
    sq.sqrt().round() as i64
}

/// Integrates `pos` by `vel` over `ticks` ticks with wide intermediates.
#[must_use]
pub fn advance_position(pos: QPoint, vel: QVec, ticks: i64) -> QPoint {
    let x = i128::from(pos.x) + i128::from(vel.x) * i128::from(ticks);
    let y = i128::from(pos.y) + i128::from(vel.y) * i128::from(ticks);
    QPoint::new(x as i64, y as i64)
}

/// Inclusive rect/rect overlap.
#[must_use]
pub fn rect_rect(a: &QRect, b: &QRect) -> bool {
    a.min.x <= b.max.x && a.max.x >= b.min.x && a.min.y <= b.max.y && a.max.y >= b.min.y
}

/// Inclusive circle/rect overlap via clamped closest point.
#[must_use]
pub fn circle_rect(c: &QCircle, r: &QRect) -> bool {
    let cx = c.center.x.clamp(r.min.x, r.max.x);
    let cy = c.center.y.clamp(r.min.y, r.max.y);
    let closest = QPoint::new(cx, cy);
    closest.dist_sq(c.center) <= i128::from(c.radius) * i128::from(c.radius)
}

/// Squared distance from `p` to segment `s`, scaled by `|ab|²` to stay
/// integral. Returns `(scaled_dist_sq, ab_len_sq)` so callers compare
/// `scaled_dist_sq <= r² * ab_len_sq`.
fn point_segment_dist_sq_scaled(p: QPoint, s: &QSegment) -> (i128, i128) {
    let abx = i128::from(s.b.x - s.a.x);
    let aby = i128::from(s.b.y - s.a.y);
    let apx = i128::from(p.x - s.a.x);
    let apy = i128::from(p.y - s.a.y);
    let ab_len_sq = abx * abx + aby * aby;
    if ab_len_sq == 0 {
        return (p.dist_sq(s.a), 1);
    }
    let t_num = apx * abx + apy * aby;
    if t_num <= 0 {
        return (p.dist_sq(s.a) * ab_len_sq, ab_len_sq);
    }
    if t_num >= ab_len_sq {
        return (p.dist_sq(s.b) * ab_len_sq, ab_len_sq);
    }
    let ap_len_sq = apx * apx + apy * apy;
    (ap_len_sq * ab_len_sq - t_num * t_num, ab_len_sq)
}

/// Inclusive segment/circle overlap.
#[must_use]
pub fn segment_circle(s: &QSegment, c: &QCircle) -> bool {
    let (scaled, ab_len_sq) = point_segment_dist_sq_scaled(c.center, s);
    scaled <= i128::from(c.radius) * i128::from(c.radius) * ab_len_sq
}

fn cross(o: QPoint, a: QPoint, b: QPoint) -> i128 {
    let oax = i128::from(a.x - o.x);
    let oay = i128::from(a.y - o.y);
    let obx = i128::from(b.x - o.x);
    let oby = i128::from(b.y - o.y);
    oax * oby - oay * obx
}

fn on_segment(s: &QSegment, p: QPoint) -> bool {
    p.x >= s.a.x.min(s.b.x)
        && p.x <= s.a.x.max(s.b.x)
        && p.y >= s.a.y.min(s.b.y)
        && p.y <= s.a.y.max(s.b.y)
}

/// Inclusive segment/segment intersection via orientation tests.
#[must_use]
pub fn segment_segment(p: &QSegment, q: &QSegment) -> bool {
    let d1 = cross(q.a, q.b, p.a);
    let d2 = cross(q.a, q.b, p.b);
    let d3 = cross(p.a, p.b, q.a);
    let d4 = cross(p.a, p.b, q.b);

    if ((d1 > 0 && d2 < 0) || (d1 < 0 && d2 > 0)) && ((d3 > 0 && d4 < 0) || (d3 < 0 && d4 > 0)) {
        return true;
    }
    (d1 == 0 && on_segment(q, p.a))
        || (d2 == 0 && on_segment(q, p.b))
        || (d3 == 0 && on_segment(p, q.a))
        || (d4 == 0 && on_segment(p, q.b))
}

/// Inclusive capsule/rect overlap.
///
/// True when the spine is within `radius` of the rect: endpoint-in-rect,
/// spine crossing an edge, or a corner within the sweep radius.
#[must_use]
pub fn capsule_rect(cap: &QCapsule, r: &QRect) -> bool {
    let spine = &cap.segment;
    if r.contains(spine.a) || r.contains(spine.b) {
        return true;
    }
    let end_a = QCircle {
        center: spine.a,
        radius: cap.radius,
    };
    let end_b = QCircle {
        center: spine.b,
        radius: cap.radius,
    };
    if circle_rect(&end_a, r) || circle_rect(&end_b, r) {
        return true;
    }
    let corners = r.corners();
    for i in 0..4 {
        let edge = QSegment {
            a: corners[i],
            b: corners[(i + 1) % 4],
        };
        if segment_segment(spine, &edge) {
            return true;
        }
        let corner = QCircle {
            center: corners[i],
            radius: cap.radius,
        };
        if segment_circle(spine, &corner) {
            return true;
        }
    }
    false
}
