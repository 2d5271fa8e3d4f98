//! Planar geometry helpers shared by the detection stages.

/// A 2D position `[x, y]`.
pub type Point = [f64; 2];

/// Euclidean distance between two points.
#[inline]
pub fn distance(p1: Point, p2: Point) -> f64 {
    let dx = p1[0] - p2[0];
    let dy = p1[1] - p2[1];
    (dx * dx + dy * dy).sqrt()
}

/// Ray-casting (even-odd) point-in-polygon test.
///
/// The polygon is implicitly closed: the last vertex connects back to the
/// first. An edge is crossed when `min_y < y <= max_y` and `x <= max_x`, so a
/// vertex shared by two edges is only counted once. Polygons with fewer than
/// three vertices contain nothing.
pub fn point_in_polygon(point: Point, vertices: &[Point]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }

    let [x, y] = point;
    let mut inside = false;
    let mut p1 = vertices[n - 1];

    for &p2 in vertices {
        let (min_y, max_y) = if p1[1] < p2[1] { (p1[1], p2[1]) } else { (p2[1], p1[1]) };

        if y > min_y && y <= max_y && x <= p1[0].max(p2[0]) {
            // min_y < y <= max_y rules out horizontal edges here
            let crosses = if p1[0] == p2[0] {
                true
            } else {
                let x_intersection = (y - p1[1]) * (p2[0] - p1[0]) / (p2[1] - p1[1]) + p1[0];
                x <= x_intersection
            };
            if crosses {
                inside = !inside;
            }
        }
        p1 = p2;
    }

    inside
}

/// Circle enclosing a close measurement pair, used to search the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingCircle {
    pub center: Point,
    pub radius: f64,
}

impl BoundingCircle {
    /// Circle centered at the midpoint of `p1` and `p2` with radius
    /// `scale * distance(p1, p2) / 2`.
    pub fn enclosing(p1: Point, p2: Point, scale: f64) -> Self {
        let center = [(p1[0] + p2[0]) / 2.0, (p1[1] + p2[1]) / 2.0];
        let radius = distance(p1, p2) / 2.0 * scale;
        Self { center, radius }
    }

    /// Distance from the circle center to `point`.
    #[inline]
    pub fn distance_to_center(&self, point: Point) -> f64 {
        distance(self.center, point)
    }

    /// Strictly inside the circle.
    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        self.distance_to_center(point) < self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hexagon() -> Vec<Point> {
        (0..6)
            .map(|i| {
                let angle = std::f64::consts::PI / 3.0 * i as f64;
                [10.0 + 5.0 * angle.cos(), -20.0 + 5.0 * angle.sin()]
            })
            .collect()
    }

    #[test]
    fn test_distance_symmetric() {
        let p = [1.5, -2.0];
        let q = [4.5, 2.0];
        assert_eq!(distance(p, q), distance(q, p));
        assert!((distance(p, q) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = [123.25, -7.5];
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_centroid_inside_regular_polygon() {
        assert!(point_in_polygon([10.0, -20.0], &hexagon()));
    }

    #[test]
    fn test_far_point_outside() {
        assert!(!point_in_polygon([1000.0, 1000.0], &hexagon()));
        assert!(!point_in_polygon([-1000.0, -20.0], &hexagon()));
    }

    #[test]
    fn test_vertex_rotation_invariant() {
        let base = hexagon();
        let query_points = [[10.0, -20.0], [14.0, -20.0], [16.0, -20.0], [10.0, -24.0], [0.0, 0.0]];

        for shift in 1..base.len() {
            let mut rotated = base.clone();
            rotated.rotate_left(shift);
            for &query in &query_points {
                assert_eq!(
                    point_in_polygon(query, &base),
                    point_in_polygon(query, &rotated),
                    "query {:?} with rotation {}",
                    query,
                    shift
                );
            }
        }
    }

    #[test]
    fn test_square_edge_conventions() {
        let square = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];

        // y == max_y of the vertical edges counts, y == min_y does not
        assert!(point_in_polygon([5.0, 10.0], &square));
        assert!(!point_in_polygon([5.0, 0.0], &square));
        // x on the right edge is inside, past it is outside
        assert!(point_in_polygon([10.0, 5.0], &square));
        assert!(!point_in_polygon([10.0001, 5.0], &square));
    }

    #[test]
    fn test_degenerate_polygon() {
        assert!(!point_in_polygon([0.0, 0.0], &[]));
        assert!(!point_in_polygon([0.0, 0.0], &[[0.0, 0.0], [1.0, 1.0]]));
    }

    #[test]
    fn test_region_polygon_concave() {
        let region = crate::config::RegionConfig::default().vertices;
        assert!(point_in_polygon([0.0, -40.0], &region));
        assert!(!point_in_polygon([-60.0, -20.0], &region));
        assert!(!point_in_polygon([0.0, 10.0], &region));
    }

    #[test]
    fn test_bounding_circle() {
        let circle = BoundingCircle::enclosing([0.0, 0.0], [20.0, 0.0], 0.8);
        assert_eq!(circle.center, [10.0, 0.0]);
        assert!((circle.radius - 8.0).abs() < 1e-12);
        assert!(circle.contains([12.0, 2.0]));
        assert!(!circle.contains([18.0, 0.0]));
        // boundary is excluded
        assert!(!circle.contains([2.0, 0.0]));
    }
}
