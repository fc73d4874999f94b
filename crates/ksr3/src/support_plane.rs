//! Support plane: a rigid 3D plane carrying a local 2D mesh.
//!
//! Each plane owns an orthonormal in-plane frame `(origin, u, v)` with
//! unit normal `n`; local coordinates are `((p - origin)·u, (p - origin)·v)`.
//! Planes 0-5 are the enlarged bounding-box walls, planes >= 6 come from
//! input polygons. Planes are created once and never destroyed.

use std::collections::BTreeSet;

use nalgebra::{Vector2, Vector3};

use crate::geom::{Segment2, Segment3};
use crate::igraph::IEdgeId;
use crate::mesh::PlaneMesh;

#[derive(Clone, Debug)]
pub struct SupportPlane {
    pub origin: Vector3<f64>,
    pub u: Vector3<f64>,
    pub v: Vector3<f64>,
    /// Unit normal; the plane is `normal · x = d`.
    pub normal: Vector3<f64>,
    pub d: f64,
    pub mesh: PlaneMesh,
    /// Intersection edges lying in this plane (reverse of `IEdge::planes`).
    pub iedges: BTreeSet<IEdgeId>,
    /// Input polygon index this plane was created from, if any.
    pub input_index: Option<usize>,
}

impl SupportPlane {
    /// Build a plane from a unit normal and a point on it.
    pub fn new(normal: Vector3<f64>, origin: Vector3<f64>) -> Self {
        let helper = if normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = normal.cross(&helper).normalize();
        let v = normal.cross(&u);
        Self {
            origin,
            u,
            v,
            normal,
            d: normal.dot(&origin),
            mesh: PlaneMesh::default(),
            iedges: BTreeSet::new(),
            input_index: None,
        }
    }

    #[inline]
    pub fn to_2d(&self, p: &Vector3<f64>) -> Vector2<f64> {
        let rel = p - self.origin;
        Vector2::new(rel.dot(&self.u), rel.dot(&self.v))
    }

    #[inline]
    pub fn to_3d(&self, p: &Vector2<f64>) -> Vector3<f64> {
        self.origin + self.u * p.x + self.v * p.y
    }

    #[inline]
    pub fn segment_to_2d(&self, s: &Segment3) -> Segment2 {
        Segment2::new(self.to_2d(&s.source), self.to_2d(&s.target))
    }

    /// Distance from `p` to the plane along the normal.
    #[inline]
    pub fn signed_distance(&self, p: &Vector3<f64>) -> f64 {
        self.normal.dot(p) - self.d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_projection() {
        let sp = SupportPlane::new(
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.5, -0.25, 2.0),
        );
        let p = Vector3::new(3.0, 4.0, 2.0);
        let q = sp.to_3d(&sp.to_2d(&p));
        assert!((p - q).norm() < 1e-12);
        assert!(sp.signed_distance(&p).abs() < 1e-12);
    }

    #[test]
    fn frame_is_orthonormal() {
        let n = Vector3::new(1.0, 2.0, -0.5).normalize();
        let sp = SupportPlane::new(n, Vector3::zeros());
        assert!(sp.u.dot(&sp.v).abs() < 1e-12);
        assert!(sp.u.dot(&sp.normal).abs() < 1e-12);
        assert!((sp.u.norm() - 1.0).abs() < 1e-12);
        assert!((sp.v.norm() - 1.0).abs() < 1e-12);
    }
}
