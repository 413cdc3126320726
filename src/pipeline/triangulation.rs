//! Delaunay triangulation over scattered soundings (Bowyer-Watson).
//!
//! The triangulation is a spatial index over the valid source points of a
//! surface: it answers which triangle contains a position and gives a
//! linear interpolation of depth inside that triangle.

use crate::error::{MapperError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Circumcircle {
    x: f64,
    y: f64,
    radius_squared: f64,
}

impl Circumcircle {
    fn of(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < EPSILON {
            // Degenerate triangle: any later point invalidates it
            return Self {
                x: 0.0,
                y: 0.0,
                radius_squared: f64::INFINITY,
            };
        }
        let a2 = a.0 * a.0 + a.1 * a.1;
        let b2 = b.0 * b.0 + b.1 * b.1;
        let c2 = c.0 * c.0 + c.1 * c.1;
        let x = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let y = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
        Self {
            x,
            y,
            radius_squared: (a.0 - x).powi(2) + (a.1 - y).powi(2),
        }
    }

    fn contains(&self, p: (f64, f64)) -> bool {
        if self.radius_squared.is_infinite() {
            return true;
        }
        let dist = (p.0 - self.x).powi(2) + (p.1 - self.y).powi(2);
        dist <= self.radius_squared * (1.0 + 1e-10)
    }
}

fn is_degenerate(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> bool {
    ((b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)).abs() < EPSILON
}

/// Barycentric weights of `p` in triangle `abc`
fn barycentric(
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
    p: (f64, f64),
) -> Option<(f64, f64, f64)> {
    let det = (b.1 - c.1) * (a.0 - c.0) + (c.0 - b.0) * (a.1 - c.1);
    if det.abs() < EPSILON {
        return None;
    }
    let l1 = ((b.1 - c.1) * (p.0 - c.0) + (c.0 - b.0) * (p.1 - c.1)) / det;
    let l2 = ((c.1 - a.1) * (p.0 - c.0) + (a.0 - c.0) * (p.1 - c.1)) / det;
    Some((l1, l2, 1.0 - l1 - l2))
}

/// Triangulated index over `(lon, lat, z)` points
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulatedIndex {
    points: Vec<(f64, f64, f64)>,
    triangles: Vec<[usize; 3]>,
}

impl TriangulatedIndex {
    /// Triangulate up to `max_points` unique positions.
    ///
    /// Duplicate positions keep their first value. Inputs above the cap are
    /// thinned by taking every n-th point.
    pub fn build(points: &[(f64, f64, f64)], max_points: usize) -> Result<Self> {
        let mut seen = HashSet::new();
        let unique: Vec<(f64, f64, f64)> = points
            .iter()
            .copied()
            .filter(|(x, y, z)| x.is_finite() && y.is_finite() && z.is_finite())
            .filter(|(x, y, _)| seen.insert((x.to_bits(), y.to_bits())))
            .collect();

        let points = if max_points > 0 && unique.len() > max_points {
            let step = unique.len().div_ceil(max_points);
            debug!(
                "Thinning {} points to every {}th for triangulation",
                unique.len(),
                step
            );
            unique.into_iter().step_by(step).collect()
        } else {
            unique
        };

        if points.len() < 3 {
            return Err(MapperError::SurfaceBuild {
                message: format!(
                    "triangulation needs at least 3 unique points, got {}",
                    points.len()
                ),
            });
        }
        if Self::all_collinear(&points) {
            return Err(MapperError::SurfaceBuild {
                message: "all points are collinear".to_string(),
            });
        }

        let triangles = Self::bowyer_watson(&points);
        if triangles.is_empty() {
            return Err(MapperError::SurfaceBuild {
                message: "triangulation produced no triangles".to_string(),
            });
        }

        debug!(
            "Triangulated {} points into {} triangles",
            points.len(),
            triangles.len()
        );
        Ok(Self { points, triangles })
    }

    fn all_collinear(points: &[(f64, f64, f64)]) -> bool {
        let (ax, ay, _) = points[0];
        let Some(&(bx, by, _)) = points[1..]
            .iter()
            .find(|(x, y, _)| (x - ax).abs() > EPSILON || (y - ay).abs() > EPSILON)
        else {
            return true;
        };
        let scale = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
        points.iter().all(|&(x, y, _)| {
            let cross = (bx - ax) * (y - ay) - (by - ay) * (x - ax);
            cross.abs() <= EPSILON * scale.max(1.0) * scale.max(1.0) * 1e3
        })
    }

    fn bowyer_watson(points: &[(f64, f64, f64)]) -> Vec<[usize; 3]> {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y, _) in points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        // Work in a unit-scaled frame so circumcircle tests stay well conditioned
        let scale = (max_x - min_x).max(max_y - min_y).max(EPSILON);
        let mut vertices: Vec<(f64, f64)> = points
            .iter()
            .map(|&(x, y, _)| ((x - min_x) / scale, (y - min_y) / scale))
            .collect();

        let n = vertices.len();
        vertices.push((-20.0, -20.0));
        vertices.push((0.5, 40.0));
        vertices.push((21.0, -20.0));

        let circle = |t: &[usize; 3], v: &[(f64, f64)]| Circumcircle::of(v[t[0]], v[t[1]], v[t[2]]);

        let mut triangles: Vec<([usize; 3], Circumcircle)> = {
            let t = [n, n + 1, n + 2];
            vec![(t, circle(&t, &vertices))]
        };

        for i in 0..n {
            let p = vertices[i];

            let (bad, good): (Vec<_>, Vec<_>) =
                triangles.into_iter().partition(|(_, c)| c.contains(p));

            let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
            for (t, _) in &bad {
                for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                    *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
                }
            }

            triangles = good;
            for (t, _) in &bad {
                for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                    if edge_count.get(&(a.min(b), a.max(b))) == Some(&1) {
                        let new = [a, b, i];
                        triangles.push((new, circle(&new, &vertices)));
                    }
                }
            }
        }

        triangles
            .into_iter()
            .map(|(t, _)| t)
            .filter(|t| t.iter().all(|&v| v < n))
            .filter(|t| !is_degenerate(vertices[t[0]], vertices[t[1]], vertices[t[2]]))
            .collect()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn points(&self) -> &[(f64, f64, f64)] {
        &self.points
    }

    fn weights(&self, triangle: &[usize; 3], lon: f64, lat: f64) -> Option<(f64, f64, f64)> {
        let xy = |i: usize| (self.points[i].0, self.points[i].1);
        barycentric(xy(triangle[0]), xy(triangle[1]), xy(triangle[2]), (lon, lat))
    }

    /// Index of a triangle containing the position
    pub fn locate(&self, lon: f64, lat: f64) -> Option<usize> {
        const TOLERANCE: f64 = -1e-9;
        self.triangles.iter().position(|t| {
            self.weights(t, lon, lat)
                .is_some_and(|(a, b, c)| a >= TOLERANCE && b >= TOLERANCE && c >= TOLERANCE)
        })
    }

    /// Linear interpolation of `z` inside the containing triangle
    pub fn interpolate(&self, lon: f64, lat: f64) -> Option<f64> {
        let triangle = &self.triangles[self.locate(lon, lat)?];
        let (a, b, c) = self.weights(triangle, lon, lat)?;
        Some(
            a * self.points[triangle[0]].2
                + b * self.points[triangle[1]].2
                + c * self.points[triangle[2]].2,
        )
    }
}
