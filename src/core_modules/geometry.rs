// THEORY:
// The `geometry` module is the stateless toolbox the sensor and the area lean on.
// Every function here is pure: it takes a slice of `Point`s and returns a new
// value, never touching simulation state.
//
// Key principles:
// 1.  **Ring order, any winding**: area and centroid accept a ring in either
//     winding. The hull builders emit counter-clockwise rings.
// 2.  **Small inputs pass through**: fewer than 3 points is not an error. A hull
//     of 0, 1 or 2 points is the input itself, and its area is 0.
// 3.  **Bounded loops**: gift wrapping is capped at `n + 1` steps so a
//     floating-point tie can never spin forever.

use crate::core_modules::point::Point;

const TRIANGLE_TOLERANCE: f64 = 1e-6;
const DEGENERATE_AREA: f64 = 1e-12;

/// Axis-aligned extent of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().skip(1).fold(
            Bounds { min: first, max: first },
            |b, p| Bounds {
                min: Point::new(b.min.x.min(p.x), b.min.y.min(p.y)),
                max: Point::new(b.max.x.max(p.x), b.max.y.max(p.y)),
            },
        ))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

/// Twice the signed area of triangle `abc`. Positive when `c` lies to the
/// left of `a -> b`.
pub fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b - a).cross(c - a)
}

/// Gift-wrapping convex hull, counter-clockwise, starting from the point with
/// the smallest X (ties: smallest Y). Collinear boundary points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let start = points.iter().copied().fold(points[0], |best, p| {
        if p.x < best.x || (p.x == best.x && p.y < best.y) { p } else { best }
    });

    let mut hull = Vec::new();
    let mut current = start;
    loop {
        hull.push(current);

        let mut next = points[0];
        for &candidate in points {
            if candidate == current {
                continue;
            }
            if next == current {
                next = candidate;
                continue;
            }
            let turn = orientation(current, next, candidate);
            let farther = current.distance_squared(candidate) > current.distance_squared(next);
            if turn < 0.0 || (turn == 0.0 && farther) {
                next = candidate;
            }
        }

        current = next;
        if current == start || hull.len() > points.len() {
            break;
        }
    }
    hull
}

/// Refines the convex hull by digging into its longest edges.
///
/// Each iteration takes the current longest edge `pb -> pe` and looks for the
/// interior point that forms the largest triangle with it, subject to:
/// the point sits closer to the edge than the edge is long, no other interior
/// point falls inside the triangle, and neither new edge crosses the ring.
/// The loop runs at most `k * hull.len()` times (re-evaluated as the ring
/// grows) and stops as soon as an iteration finds nothing to accept.
pub fn concave_hull(points: &[Point], k: usize) -> Vec<Point> {
    let mut hull = convex_hull(points);
    if hull.len() < 3 {
        return hull;
    }

    let mut interior: Vec<Point> = Vec::new();
    for &p in points {
        if !hull.contains(&p) && !interior.contains(&p) {
            interior.push(p);
        }
    }

    let mut iteration = 0;
    while iteration < k * hull.len() {
        iteration += 1;

        let n = hull.len();
        let longest = (0..n)
            .map(|i| (i, hull[i].distance_squared(hull[(i + 1) % n])))
            .fold((0, f64::NEG_INFINITY), |best, e| if e.1 > best.1 { e } else { best });
        let (edge_index, edge_sq) = longest;
        let pb = hull[edge_index];
        let pe = hull[(edge_index + 1) % n];

        let mut best: Option<(usize, f64)> = None;
        for (gi, &pt) in interior.iter().enumerate() {
            let d_begin = pb.distance_squared(pt);
            let d_end = pe.distance_squared(pt);
            if edge_sq <= (d_begin - d_end).abs() {
                continue;
            }

            let area = triangle_area(pb, pe, pt);
            if matches!(best, Some((_, best_area)) if area < best_area) {
                continue;
            }

            let blocked = interior
                .iter()
                .enumerate()
                .any(|(oi, &other)| oi != gi && point_in_triangle(other, pb, pe, pt));
            if blocked {
                continue;
            }

            if edge_crosses_ring(&hull, pb, pt) || edge_crosses_ring(&hull, pt, pe) {
                continue;
            }

            best = Some((gi, area));
        }

        match best {
            Some((gi, _)) => {
                let accepted = interior.remove(gi);
                hull.insert(edge_index + 1, accepted);
            }
            None => break,
        }
    }
    hull
}

/// Shoelace area, absolute. Zero for fewer than 3 vertices.
pub fn polygon_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    (signed_double_area(ring) / 2.0).abs()
}

/// Area-weighted centroid of a ring. `None` when the ring has no area.
pub fn centroid(ring: &[Point]) -> Option<Point> {
    if ring.len() < 3 {
        return None;
    }
    let double_area = signed_double_area(ring);
    if double_area.abs() < DEGENERATE_AREA {
        return None;
    }

    let n = ring.len();
    let mut sum = Point::ZERO;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let cross = a.cross(b);
        sum += (a + b) * cross;
    }
    Some(sum / (3.0 * double_area))
}

/// Ray-crossing test. Points on a bottom edge count as outside, points on a
/// top edge as inside.
pub fn point_in_polygon(p: Point, ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    for i in 0..n {
        let p1 = ring[i];
        let p2 = ring[(i + 1) % n];
        if p.y > p1.y.min(p2.y) && p.y <= p1.y.max(p2.y) && p.x <= p1.x.max(p2.x) {
            let x_crossing = (p.y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
            if p1.x == p2.x || p.x <= x_crossing {
                inside = !inside;
            }
        }
    }
    inside
}

/// True when the open segments `a1-a2` and `b1-b2` properly cross.
/// Touching at an endpoint or overlapping collinearly does not count.
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Intersection point of the closed segments, if they meet at a single point.
pub fn segment_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.cross(s);
    if denom.abs() < DEGENERATE_AREA {
        return None;
    }

    let offset = b1 - a1;
    let t = offset.cross(s) / denom;
    let u = offset.cross(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a1 + r * t)
    } else {
        None
    }
}

pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn signed_double_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    (0..n).map(|i| ring[i].cross(ring[(i + 1) % n])).sum()
}

fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    0.5 * orientation(a, b, c).abs()
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let whole = triangle_area(a, b, c);
    let parts = triangle_area(p, a, b) + triangle_area(p, b, c) + triangle_area(p, c, a);
    (whole - parts).abs() < TRIANGLE_TOLERANCE
}

fn edge_crosses_ring(ring: &[Point], a: Point, b: Point) -> bool {
    let n = ring.len();
    (0..n).any(|i| {
        let c = ring[i];
        let d = ring[(i + 1) % n];
        segments_cross(a, b, c, d)
    })
}
