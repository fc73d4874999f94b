//! Intersection graph shared across support planes.
//!
//! 0D entities (ivertices) are points where >= 2 intersection lines meet;
//! 1D entities (iedges) are segments of plane-plane intersection lines.
//! Both record the set of support planes incident to them; the registry
//! keeps the reverse per-plane sets and the integrity checker verifies
//! the two directions agree.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Vector3;

/// Identifier types for clarity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IVertexId(pub usize);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IEdgeId(pub usize);

/// Intersection vertex: global 3D point plus incident plane set.
#[derive(Clone, Debug)]
pub struct IVertex {
    pub point: Vector3<f64>,
    pub planes: BTreeSet<usize>,
    pub active: bool,
}

/// Intersection edge between two ivertices.
#[derive(Clone, Debug)]
pub struct IEdge {
    pub source: IVertexId,
    pub target: IVertexId,
    pub planes: BTreeSet<usize>,
    pub active: bool,
}

/// Bit-exact point key; bbox corners and shared trace endpoints are
/// constructed from identical arithmetic, so exact comparison dedups them.
fn point_key(p: &Vector3<f64>) -> [u64; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

#[derive(Clone, Debug, Default)]
pub struct IntersectionGraph {
    vertices: Vec<IVertex>,
    edges: Vec<IEdge>,
    by_point: BTreeMap<[u64; 3], IVertexId>,
    by_pair: BTreeMap<(IVertexId, IVertexId), IEdgeId>,
}

impl IntersectionGraph {
    /// Insert (or find) the ivertex at `point`, unioning `planes` into its
    /// incidence set.
    pub fn add_ivertex<I: IntoIterator<Item = usize>>(
        &mut self,
        point: Vector3<f64>,
        planes: I,
    ) -> IVertexId {
        let id = match self.by_point.get(&point_key(&point)) {
            Some(&id) => id,
            None => {
                let id = IVertexId(self.vertices.len());
                self.vertices.push(IVertex {
                    point,
                    planes: BTreeSet::new(),
                    active: true,
                });
                self.by_point.insert(point_key(&point), id);
                id
            }
        };
        self.vertices[id.0].planes.extend(planes);
        id
    }

    /// Insert (or find) the iedge between `a` and `b`, unioning `planes`.
    pub fn add_iedge<I: IntoIterator<Item = usize>>(
        &mut self,
        a: IVertexId,
        b: IVertexId,
        planes: I,
    ) -> IEdgeId {
        let key = if a <= b { (a, b) } else { (b, a) };
        let id = match self.by_pair.get(&key) {
            Some(&id) => id,
            None => {
                let id = IEdgeId(self.edges.len());
                self.edges.push(IEdge {
                    source: key.0,
                    target: key.1,
                    planes: BTreeSet::new(),
                    active: true,
                });
                self.by_pair.insert(key, id);
                id
            }
        };
        self.edges[id.0].planes.extend(planes);
        id
    }

    #[inline]
    pub fn ivertex(&self, id: IVertexId) -> &IVertex {
        &self.vertices[id.0]
    }

    #[inline]
    pub fn iedge(&self, id: IEdgeId) -> &IEdge {
        &self.edges[id.0]
    }

    #[inline]
    pub fn num_ivertices(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn num_iedges(&self) -> usize {
        self.edges.len()
    }

    pub fn ivertices(&self) -> impl Iterator<Item = (IVertexId, &IVertex)> {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (IVertexId(i), v))
    }

    pub fn iedges(&self) -> impl Iterator<Item = (IEdgeId, &IEdge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (IEdgeId(i), e))
    }

    /// Endpoints of `id` as (source, target) ivertex ids.
    #[inline]
    pub fn endpoints(&self, id: IEdgeId) -> (IVertexId, IVertexId) {
        let e = &self.edges[id.0];
        (e.source, e.target)
    }

    /// Iedges incident to `iv` (scan; the graph stays small).
    pub fn iedges_around(&self, iv: IVertexId) -> Vec<IEdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.source == iv || e.target == iv)
            .map(|(i, _)| IEdgeId(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ivertex_dedup_unions_planes() {
        let mut g = IntersectionGraph::default();
        let p = Vector3::new(0.25, -1.5, 3.0);
        let a = g.add_ivertex(p, [0, 1]);
        let b = g.add_ivertex(p, [2]);
        assert_eq!(a, b);
        assert_eq!(g.num_ivertices(), 1);
        let planes: Vec<_> = g.ivertex(a).planes.iter().copied().collect();
        assert_eq!(planes, vec![0, 1, 2]);
    }

    #[test]
    fn iedge_dedup_ignores_orientation() {
        let mut g = IntersectionGraph::default();
        let a = g.add_ivertex(Vector3::zeros(), [0]);
        let b = g.add_ivertex(Vector3::x(), [0]);
        let e1 = g.add_iedge(a, b, [0, 1]);
        let e2 = g.add_iedge(b, a, [2]);
        assert_eq!(e1, e2);
        assert_eq!(g.num_iedges(), 1);
        assert_eq!(g.iedge(e1).planes.len(), 3);
    }
}
