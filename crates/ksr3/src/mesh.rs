//! Per-plane 2D combinatorial mesh.
//!
//! Purpose
//! - Host the moving polygons of one support plane: vertices with a
//!   position-as-function-of-time, faces as CCW cycles with a crossing
//!   budget `k`.
//! - Handles are arena indices with generations: structural edits free
//!   slots and bump the generation, so a stale handle reads as `None`
//!   instead of aliasing a new vertex.

use nalgebra::Vector2;

use crate::igraph::IEdgeId;

/// Local vertex handle (arena index + generation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LVertex {
    pub index: u32,
    pub gen: u32,
}

/// Local face identifier. Faces are never deleted, only split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub usize);

/// Kinetic state of one mesh vertex.
///
/// The trajectory is `point + t * direction` in plane-local coordinates;
/// `point` is the position at time zero. Frozen vertices have a zero
/// direction and never move again.
#[derive(Clone, Debug)]
pub struct VertexData {
    pub point: Vector2<f64>,
    pub direction: Vector2<f64>,
    pub frozen: bool,
    pub active: bool,
    /// Intersection edge this vertex currently slides along, if any.
    pub iedge: Option<IEdgeId>,
    pub face: FaceId,
}

impl VertexData {
    #[inline]
    pub fn point_at(&self, time: f64) -> Vector2<f64> {
        self.point + self.direction * time
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.direction.norm()
    }
}

/// One polygon face: CCW vertex cycle plus its remaining crossing budget.
#[derive(Clone, Debug)]
pub struct FaceData {
    pub vertices: Vec<LVertex>,
    pub k: u32,
}

#[derive(Clone, Debug)]
struct Slot {
    gen: u32,
    data: Option<VertexData>,
}

/// Arena-backed polygon mesh local to one support plane.
#[derive(Clone, Debug, Default)]
pub struct PlaneMesh {
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub faces: Vec<FaceData>,
}

impl PlaneMesh {
    pub fn add_vertex(&mut self, data: VertexData) -> LVertex {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            LVertex {
                index,
                gen: slot.gen,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                gen: 0,
                data: Some(data),
            });
            LVertex { index, gen: 0 }
        }
    }

    /// Free a vertex slot; its handle (and copies of it) go stale.
    pub fn remove_vertex(&mut self, lv: LVertex) -> Option<VertexData> {
        let slot = self.slots.get_mut(lv.index as usize)?;
        if slot.gen != lv.gen || slot.data.is_none() {
            return None;
        }
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(lv.index);
        slot.data.take()
    }

    #[inline]
    pub fn get(&self, lv: LVertex) -> Option<&VertexData> {
        let slot = self.slots.get(lv.index as usize)?;
        if slot.gen != lv.gen {
            return None;
        }
        slot.data.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, lv: LVertex) -> Option<&mut VertexData> {
        let slot = self.slots.get_mut(lv.index as usize)?;
        if slot.gen != lv.gen {
            return None;
        }
        slot.data.as_mut()
    }

    pub fn add_face(&mut self, vertices: Vec<LVertex>, k: u32) -> FaceId {
        let id = FaceId(self.faces.len());
        for &lv in &vertices {
            if let Some(v) = self.get_mut(lv) {
                v.face = id;
            }
        }
        self.faces.push(FaceData { vertices, k });
        id
    }

    #[inline]
    pub fn face(&self, id: FaceId) -> &FaceData {
        &self.faces[id.0]
    }

    #[inline]
    pub fn face_mut(&mut self, id: FaceId) -> &mut FaceData {
        &mut self.faces[id.0]
    }

    /// Index of `lv` inside its face cycle.
    pub fn position_in_face(&self, face: FaceId, lv: LVertex) -> Option<usize> {
        self.faces[face.0].vertices.iter().position(|&v| v == lv)
    }

    /// Cycle neighbors (previous, next) of `lv` inside its face.
    pub fn prev_and_next(&self, lv: LVertex) -> Option<(LVertex, LVertex)> {
        let face = self.get(lv)?.face;
        let cycle = &self.faces[face.0].vertices;
        let n = cycle.len();
        let i = cycle.iter().position(|&v| v == lv)?;
        Some((cycle[(i + n - 1) % n], cycle[(i + 1) % n]))
    }

    /// Live vertices, in arena order.
    pub fn vertices(&self) -> impl Iterator<Item = (LVertex, &VertexData)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.data.as_ref().map(|d| {
                (
                    LVertex {
                        index: i as u32,
                        gen: slot.gen,
                    },
                    d,
                )
            })
        })
    }

    /// Structural validity at a given time.
    ///
    /// Faces need >= 3 live vertices with agreeing back-references, finite
    /// coordinates, a budget >= 1, and non-negative signed area (zero is
    /// allowed: freshly propagated faces are momentarily degenerate).
    pub fn validate(&self, time: f64, eps: f64) -> Result<(), String> {
        for (fi, face) in self.faces.iter().enumerate() {
            if face.vertices.len() < 3 {
                return Err(format!("face {fi} has {} vertices", face.vertices.len()));
            }
            if face.k < 1 {
                return Err(format!("face {fi} has k = {} < 1", face.k));
            }
            let mut area2 = 0.0;
            let n = face.vertices.len();
            for i in 0..n {
                let Some(a) = self.get(face.vertices[i]) else {
                    return Err(format!("face {fi} holds a stale vertex handle"));
                };
                if a.face != FaceId(fi) {
                    return Err(format!(
                        "vertex {:?} in face {fi} back-references face {:?}",
                        face.vertices[i], a.face
                    ));
                }
                let pa = a.point_at(time);
                if !pa.x.is_finite() || !pa.y.is_finite() {
                    return Err(format!("face {fi} has a non-finite vertex position"));
                }
                let b = self
                    .get(face.vertices[(i + 1) % n])
                    .ok_or_else(|| format!("face {fi} holds a stale vertex handle"))?;
                let pb = b.point_at(time);
                area2 += pa.x * pb.y - pb.x * pa.y;
            }
            if area2 < -eps {
                return Err(format!("face {fi} has negative orientation ({area2})"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn vdata(x: f64, y: f64) -> VertexData {
        VertexData {
            point: Vector2::new(x, y),
            direction: Vector2::zeros(),
            frozen: true,
            active: true,
            iedge: None,
            face: FaceId(0),
        }
    }

    #[test]
    fn stale_handles_after_removal() {
        let mut mesh = PlaneMesh::default();
        let a = mesh.add_vertex(vdata(0.0, 0.0));
        assert!(mesh.get(a).is_some());
        mesh.remove_vertex(a).unwrap();
        assert!(mesh.get(a).is_none());
        // Slot reuse must not resurrect the old handle.
        let b = mesh.add_vertex(vdata(1.0, 0.0));
        assert_eq!(b.index, a.index);
        assert_ne!(b.gen, a.gen);
        assert!(mesh.get(a).is_none());
        assert!(mesh.get(b).is_some());
    }

    #[test]
    fn face_cycle_neighbors() {
        let mut mesh = PlaneMesh::default();
        let a = mesh.add_vertex(vdata(0.0, 0.0));
        let b = mesh.add_vertex(vdata(1.0, 0.0));
        let c = mesh.add_vertex(vdata(0.0, 1.0));
        let f = mesh.add_face(vec![a, b, c], 2);
        assert_eq!(mesh.get(a).unwrap().face, f);
        let (prev, next) = mesh.prev_and_next(b).unwrap();
        assert_eq!(prev, a);
        assert_eq!(next, c);
        assert!(mesh.validate(0.0, 1e-9).is_ok());
    }

    #[test]
    fn validate_rejects_clockwise_face() {
        let mut mesh = PlaneMesh::default();
        let a = mesh.add_vertex(vdata(0.0, 0.0));
        let b = mesh.add_vertex(vdata(0.0, 1.0));
        let c = mesh.add_vertex(vdata(1.0, 0.0));
        mesh.add_face(vec![a, b, c], 2);
        assert!(mesh.validate(0.0, 1e-9).is_err());
    }
}
