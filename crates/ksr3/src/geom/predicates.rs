//! Eps-aware predicates and constructions.

use nalgebra::{Matrix2, Vector2, Vector3};

use super::types::{Bbox3, KernelCfg, Line2, Segment2};

/// Proper intersection point of two closed 2D segments.
///
/// Inclusive at endpoints (within `eps_feas` of the parameter range).
/// Collinear or near-parallel pairs yield `None`: an ill-defined
/// intersection is treated as "no event".
pub fn segment_intersection(a: &Segment2, b: &Segment2, cfg: &KernelCfg) -> Option<Vector2<f64>> {
    let da = a.to_vector();
    let db = b.to_vector();
    let m = Matrix2::new(da.x, -db.x, da.y, -db.y);
    let det = m.determinant();
    if det.abs() <= cfg.eps_det {
        return None;
    }
    let rhs = b.source - a.source;
    let inv = m.try_inverse()?;
    let st = inv * rhs;
    let (s, t) = (st.x, st.y);
    let lo = -cfg.eps_feas;
    let hi = 1.0 + cfg.eps_feas;
    if s < lo || s > hi || t < lo || t > hi {
        return None;
    }
    Some(a.source + da * s)
}

/// Intersection point of two 2D lines, `None` when near-parallel.
pub fn line_line_intersection(a: &Line2, b: &Line2, cfg: &KernelCfg) -> Option<Vector2<f64>> {
    let m = Matrix2::new(a.dir.x, -b.dir.x, a.dir.y, -b.dir.y);
    let det = m.determinant();
    if det.abs() <= cfg.eps_det {
        return None;
    }
    let rhs = b.origin - a.origin;
    let st = m.try_inverse()? * rhs;
    Some(a.at(st.x))
}

/// Direction parallelism test with explicit tolerance.
///
/// Replaces the slope-ratio heuristic of the reference code: normalized
/// cross product below `eps_parallel` counts as parallel. Zero-length
/// segments are parallel to everything (they carry no direction).
pub fn are_parallel(a: &Segment2, b: &Segment2, cfg: &KernelCfg) -> bool {
    let da = a.to_vector();
    let db = b.to_vector();
    let na = da.norm();
    let nb = db.norm();
    if na <= cfg.eps_det || nb <= cfg.eps_det {
        return true;
    }
    let cross = da.x * db.y - da.y * db.x;
    (cross / (na * nb)).abs() < cfg.eps_parallel
}

/// Line of intersection of two planes `n·x = d`, as (origin, direction).
///
/// `None` for near-parallel planes.
pub fn plane_plane_line(
    n1: &Vector3<f64>,
    d1: f64,
    n2: &Vector3<f64>,
    d2: f64,
    cfg: &KernelCfg,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let dir = n1.cross(n2);
    let dd = dir.norm_squared();
    if dd <= cfg.eps_det {
        return None;
    }
    // Point on both planes closest to the origin of the pencil.
    let origin = (n2.cross(&dir) * d1 + dir.cross(n1) * d2) / dd;
    Some((origin, dir))
}

/// Clip a 3D line against an axis-aligned box (slab method).
///
/// Returns the two clipped endpoints, or `None` when the line misses the
/// box or grazes it below `eps_feas`.
pub fn clip_line_to_bbox(
    origin: &Vector3<f64>,
    dir: &Vector3<f64>,
    bbox: &Bbox3,
    cfg: &KernelCfg,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let mut tmin = f64::NEG_INFINITY;
    let mut tmax = f64::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        let lo = bbox.min[axis];
        let hi = bbox.max[axis];
        if d.abs() <= cfg.eps_det {
            if o < lo - cfg.eps_feas || o > hi + cfg.eps_feas {
                return None;
            }
            continue;
        }
        let (t0, t1) = {
            let a = (lo - o) / d;
            let b = (hi - o) / d;
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        };
        tmin = tmin.max(t0);
        tmax = tmax.min(t1);
    }
    if !tmin.is_finite() || !tmax.is_finite() || tmax - tmin <= cfg.eps_feas {
        return None;
    }
    Some((origin + dir * tmin, origin + dir * tmax))
}

/// Fit a plane through an ordered polygon (Newell's method).
///
/// Returns (unit normal, offset d with `n·x = d`, centroid).
/// `None` when the polygon is degenerate (fewer than 3 points or
/// near-zero area).
pub fn fit_plane(
    points: &[Vector3<f64>],
    cfg: &KernelCfg,
) -> Option<(Vector3<f64>, f64, Vector3<f64>)> {
    if points.len() < 3 {
        return None;
    }
    let mut normal: Vector3<f64> = Vector3::zeros();
    let mut centroid: Vector3<f64> = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
        centroid += p;
    }
    let norm = normal.norm();
    if !norm.is_finite() || norm <= cfg.eps_det {
        return None;
    }
    let n = normal / norm;
    centroid /= points.len() as f64;
    Some((n, n.dot(&centroid), centroid))
}
