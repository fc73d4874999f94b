//! Support-plane registry: the central data structure of the simulation.
//!
//! Owns every support plane (walls first, input planes after), the shared
//! intersection graph, and the simulation clock. Construction happens
//! once (`add_bbox_polygons`, `add_polygon`); afterwards only the kinetic
//! operations in `kinetic_ops` mutate the meshes.
//!
//! Handle types (`PVertex`, `PFace`) pair a plane index with an arena
//! handle, so stale references after structural edits read as errors
//! instead of aliasing fresh vertices.

mod kinetic_ops;

use std::collections::BTreeSet;

use nalgebra::{Vector2, Vector3};

use crate::error::{KsrError, KsrResult};
use crate::geom::{fit_plane, plane_plane_line, clip_line_to_bbox, Bbox3, KernelCfg, Segment2, Segment3};
use crate::igraph::{IEdgeId, IVertexId, IntersectionGraph};
use crate::mesh::{FaceId, LVertex, VertexData};
use crate::support_plane::SupportPlane;

/// Moving polygon vertex: (support plane index, local mesh handle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PVertex {
    pub plane: usize,
    pub vertex: LVertex,
}

/// Polygon face local to one support plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PFace {
    pub plane: usize,
    pub face: FaceId,
}

/// An intersection line seed: the clipped segment where two planes meet,
/// waiting to be chained into iedges.
#[derive(Clone, Debug)]
pub struct LineSeed {
    pub planes: (usize, usize),
    pub a: Vector3<f64>,
    pub b: Vector3<f64>,
}

/// Bbox facet corner layout, matching the fixed corner order of
/// `Bbox3::corners`.
const BBOX_FACETS: [[usize; 4]; 6] = [
    [0, 1, 3, 2],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [2, 3, 7, 6],
    [1, 5, 7, 3],
    [0, 4, 6, 2],
];

#[derive(Clone, Debug)]
pub struct Registry {
    planes: Vec<SupportPlane>,
    pub igraph: IntersectionGraph,
    bbox: Option<Bbox3>,
    current_time: f64,
    pub cfg: KernelCfg,
    trace_seeds: Vec<LineSeed>,
}

impl Registry {
    pub fn new(cfg: KernelCfg) -> Self {
        Self {
            planes: Vec::new(),
            igraph: IntersectionGraph::default(),
            bbox: None,
            current_time: 0.0,
            cfg,
            trace_seeds: Vec::new(),
        }
    }

    /// Preallocate for `capacity` input polygons (plus the 6 walls).
    pub fn init(&mut self, capacity: usize) {
        self.planes.reserve(capacity + 6);
    }

    #[inline]
    pub fn num_support_planes(&self) -> usize {
        self.planes.len()
    }

    #[inline]
    pub fn support_plane(&self, i: usize) -> &SupportPlane {
        &self.planes[i]
    }

    #[inline]
    pub fn support_plane_mut(&mut self, i: usize) -> &mut SupportPlane {
        &mut self.planes[i]
    }

    #[inline]
    pub fn bbox(&self) -> Option<&Bbox3> {
        self.bbox.as_ref()
    }

    #[inline]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Move the simulation clock; positions are evaluated lazily, so this
    /// only records the cursor used by current-position accessors.
    #[inline]
    pub fn update_positions(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn take_trace_seeds(&mut self) -> Vec<LineSeed> {
        std::mem::take(&mut self.trace_seeds)
    }

    // --- construction ---------------------------------------------------

    /// Create the six wall planes of the enlarged bounding box, each as a
    /// frozen polygon, and seed the intersection graph with the cube's
    /// corners and edges (exactly 8 ivertices and 12 iedges).
    pub fn add_bbox_polygons(&mut self, raw: &Bbox3, enlarge_ratio: f64) -> KsrResult<()> {
        let bbox = raw.enlarged(enlarge_ratio);
        if bbox.diagonal() <= 0.0 || !bbox.diagonal().is_finite() {
            return Err(KsrError::InvalidInput {
                details: "bounding box has no extent".into(),
            });
        }
        self.bbox = Some(bbox);
        let corners = bbox.corners();

        for facet in BBOX_FACETS {
            let points = [
                corners[facet[0]],
                corners[facet[1]],
                corners[facet[2]],
                corners[facet[3]],
            ];
            self.add_wall_polygon(&points)?;
        }

        if self.igraph.num_ivertices() != 8 || self.igraph.num_iedges() != 12 {
            return Err(KsrError::InvariantViolation {
                plane: 0,
                details: format!(
                    "bounding box produced {} ivertices and {} iedges (expected 8 and 12)",
                    self.igraph.num_ivertices(),
                    self.igraph.num_iedges()
                ),
            });
        }
        Ok(())
    }

    fn add_wall_polygon(&mut self, points: &[Vector3<f64>; 4]) -> KsrResult<()> {
        let (normal, _d, centroid) =
            fit_plane(points, &self.cfg).ok_or_else(|| KsrError::InvalidInput {
                details: "degenerate bounding-box facet".into(),
            })?;
        let mut sp = SupportPlane::new(normal, centroid);
        let idx = self.planes.len();

        let mut pts2: Vec<Vector2<f64>> = points.iter().map(|p| sp.to_2d(p)).collect();
        if signed_area_2(&pts2) < 0.0 {
            pts2.reverse();
        }
        let mut cycle = Vec::with_capacity(4);
        for p2 in &pts2 {
            cycle.push(sp.mesh.add_vertex(VertexData {
                point: *p2,
                direction: Vector2::zeros(),
                frozen: true,
                active: true,
                iedge: None,
                face: FaceId(0),
            }));
        }
        sp.mesh.add_face(cycle, 1);
        self.planes.push(sp);

        // Corners and cube edges; shared entities dedup by exact point.
        let ivs: Vec<IVertexId> = points
            .iter()
            .map(|p| self.igraph.add_ivertex(*p, [idx]))
            .collect();
        for j in 0..4 {
            let id = self.igraph.add_iedge(ivs[j], ivs[(j + 1) % 4], [idx]);
            self.planes[idx].iedges.insert(id);
        }
        Ok(())
    }

    /// Register one input polygon as a new support plane.
    ///
    /// Vertices start at the polygon corners and move outward from the
    /// centroid (`direction = corner - centroid`). The wall traces of the
    /// new plane are recorded as line seeds for later chaining.
    pub fn add_polygon(
        &mut self,
        points: &[Vector3<f64>],
        input_index: usize,
        k: u32,
    ) -> KsrResult<usize> {
        let (normal, _d, centroid) =
            fit_plane(points, &self.cfg).ok_or_else(|| KsrError::InvalidInput {
                details: format!("input polygon {input_index} is degenerate"),
            })?;
        let mut sp = SupportPlane::new(normal, centroid);
        sp.input_index = Some(input_index);
        let idx = self.planes.len();

        let mut pts2: Vec<Vector2<f64>> = points.iter().map(|p| sp.to_2d(p)).collect();
        if signed_area_2(&pts2) < 0.0 {
            pts2.reverse();
        }
        // Frame origin is the centroid, so local directions are just the
        // local positions.
        let mut cycle = Vec::with_capacity(pts2.len());
        for p2 in &pts2 {
            cycle.push(sp.mesh.add_vertex(VertexData {
                point: *p2,
                direction: *p2,
                frozen: false,
                active: true,
                iedge: None,
                face: FaceId(0),
            }));
        }
        sp.mesh.add_face(cycle, k.max(1));

        // Trace lines against the six walls, clipped to the enlarged box.
        let bbox = *self.bbox.as_ref().ok_or_else(|| KsrError::InvalidInput {
            details: "add_polygon called before add_bbox_polygons".into(),
        })?;
        for w in 0..6 {
            let wall = &self.planes[w];
            let Some((o, dir)) =
                plane_plane_line(&sp.normal, sp.d, &wall.normal, wall.d, &self.cfg)
            else {
                continue;
            };
            if let Some((a, b)) = clip_line_to_bbox(&o, &dir, &bbox, &self.cfg) {
                self.trace_seeds.push(LineSeed {
                    planes: (idx, w),
                    a,
                    b,
                });
            }
        }

        self.planes.push(sp);
        Ok(idx)
    }

    /// Chain a line seed into iedges: endpoints plus any crossing points,
    /// sorted along the line, become consecutive intersection edges.
    pub fn add_chained_iedges(
        &mut self,
        seed: &LineSeed,
        crossings: &[(Vector3<f64>, BTreeSet<usize>)],
    ) -> KsrResult<()> {
        let (i, j) = seed.planes;
        let dir = seed.b - seed.a;
        let len2 = dir.norm_squared();
        if len2 <= self.cfg.eps_det {
            return Ok(());
        }

        let mut endpoint_planes_a: BTreeSet<usize> = [i, j].into();
        endpoint_planes_a.extend(self.wall_planes_containing(&seed.a));
        let mut endpoint_planes_b: BTreeSet<usize> = [i, j].into();
        endpoint_planes_b.extend(self.wall_planes_containing(&seed.b));

        let mut pts: Vec<(f64, IVertexId)> = Vec::with_capacity(crossings.len() + 2);
        pts.push((0.0, self.igraph.add_ivertex(seed.a, endpoint_planes_a)));
        pts.push((1.0, self.igraph.add_ivertex(seed.b, endpoint_planes_b)));
        // Crossings at the line endpoints duplicate them in slightly
        // different bits; skip them instead of chaining slivers.
        let margin = 1e-7;
        for (p, planes) in crossings {
            let t = (p - seed.a).dot(&dir) / len2;
            if t < margin || t > 1.0 - margin {
                continue;
            }
            pts.push((t, self.igraph.add_ivertex(*p, planes.iter().copied())));
        }
        pts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        pts.dedup_by(|a, b| a.1 == b.1 || (a.0 - b.0).abs() < margin);

        for w in pts.windows(2) {
            let (u, v) = (w[0].1, w[1].1);
            if u == v {
                continue;
            }
            let id = self.igraph.add_iedge(u, v, [i, j]);
            self.planes[i].iedges.insert(id);
            self.planes[j].iedges.insert(id);
        }
        Ok(())
    }

    /// Wall planes (0..6) passing through `p`, within a diagonal-scaled
    /// tolerance.
    pub fn wall_planes_containing(&self, p: &Vector3<f64>) -> Vec<usize> {
        let scale = self.bbox.map(|b| b.diagonal()).unwrap_or(1.0);
        let eps = self.cfg.eps_feas * (1.0 + scale);
        (0..6.min(self.planes.len()))
            .filter(|&w| self.planes[w].signed_distance(p).abs() <= eps)
            .collect()
    }

    // --- vertex accessors -----------------------------------------------

    pub fn vertex(&self, pv: PVertex) -> KsrResult<&VertexData> {
        self.planes
            .get(pv.plane)
            .and_then(|sp| sp.mesh.get(pv.vertex))
            .ok_or_else(|| stale(pv))
    }

    pub fn vertex_mut(&mut self, pv: PVertex) -> KsrResult<&mut VertexData> {
        self.planes
            .get_mut(pv.plane)
            .and_then(|sp| sp.mesh.get_mut(pv.vertex))
            .ok_or_else(|| stale(pv))
    }

    /// All live vertices of one support plane.
    pub fn pvertices(&self, plane: usize) -> Vec<PVertex> {
        self.planes[plane]
            .mesh
            .vertices()
            .map(|(lv, _)| PVertex { plane, vertex: lv })
            .collect()
    }

    #[inline]
    pub fn point_2(&self, pv: PVertex, time: f64) -> KsrResult<Vector2<f64>> {
        Ok(self.vertex(pv)?.point_at(time))
    }

    pub fn point_3(&self, pv: PVertex, time: f64) -> KsrResult<Vector3<f64>> {
        let p2 = self.point_2(pv, time)?;
        Ok(self.planes[pv.plane].to_3d(&p2))
    }

    #[inline]
    pub fn speed(&self, pv: PVertex) -> KsrResult<f64> {
        Ok(self.vertex(pv)?.speed())
    }

    #[inline]
    pub fn is_frozen(&self, pv: PVertex) -> bool {
        self.vertex(pv).map(|v| v.frozen).unwrap_or(true)
    }

    #[inline]
    pub fn is_active(&self, pv: PVertex) -> bool {
        self.vertex(pv).map(|v| v.active).unwrap_or(false)
    }

    #[inline]
    pub fn has_iedge(&self, pv: PVertex) -> bool {
        self.vertex(pv).map(|v| v.iedge.is_some()).unwrap_or(false)
    }

    #[inline]
    pub fn iedge_of(&self, pv: PVertex) -> Option<IEdgeId> {
        self.vertex(pv).ok().and_then(|v| v.iedge)
    }

    pub fn activate(&mut self, pv: PVertex) {
        if let Ok(v) = self.vertex_mut(pv) {
            v.active = true;
        }
    }

    pub fn deactivate(&mut self, pv: PVertex) {
        if let Ok(v) = self.vertex_mut(pv) {
            v.active = false;
        }
    }

    pub fn prev_and_next(&self, pv: PVertex) -> KsrResult<(PVertex, PVertex)> {
        let (prev, next) = self.planes[pv.plane]
            .mesh
            .prev_and_next(pv.vertex)
            .ok_or_else(|| stale(pv))?;
        Ok((
            PVertex {
                plane: pv.plane,
                vertex: prev,
            },
            PVertex {
                plane: pv.plane,
                vertex: next,
            },
        ))
    }

    pub fn pface_of(&self, pv: PVertex) -> KsrResult<PFace> {
        Ok(PFace {
            plane: pv.plane,
            face: self.vertex(pv)?.face,
        })
    }

    #[inline]
    pub fn k(&self, pf: PFace) -> u32 {
        self.planes[pf.plane].mesh.face(pf.face).k
    }

    #[inline]
    pub fn set_k(&mut self, pf: PFace, k: u32) {
        self.planes[pf.plane].mesh.face_mut(pf.face).k = k;
    }

    // --- intersection entities ------------------------------------------

    /// 2D segment of an iedge as seen from one of its planes.
    pub fn segment_2(&self, plane: usize, iedge: IEdgeId) -> Segment2 {
        let (a, b) = self.igraph.endpoints(iedge);
        let sp = &self.planes[plane];
        Segment2::new(
            sp.to_2d(&self.igraph.ivertex(a).point),
            sp.to_2d(&self.igraph.ivertex(b).point),
        )
    }

    pub fn segment_3(&self, iedge: IEdgeId) -> Segment3 {
        let (a, b) = self.igraph.endpoints(iedge);
        Segment3::new(self.igraph.ivertex(a).point, self.igraph.ivertex(b).point)
    }

    pub fn ivertex_point_2(&self, plane: usize, iv: IVertexId) -> Vector2<f64> {
        self.planes[plane].to_2d(&self.igraph.ivertex(iv).point)
    }

    // --- integrity ------------------------------------------------------

    /// Full consistency check: per-plane mesh validity and bidirectional
    /// agreement between plane iedge sets and iedge plane sets.
    pub fn integrity(&self) -> KsrResult<()> {
        for (i, sp) in self.planes.iter().enumerate() {
            sp.mesh
                .validate(self.current_time, self.cfg.eps_feas)
                .map_err(|details| KsrError::InvariantViolation { plane: i, details })?;

            for &ie in &sp.iedges {
                if !self.igraph.iedge(ie).planes.contains(&i) {
                    return Err(KsrError::InvariantViolation {
                        plane: i,
                        details: format!(
                            "plane records iedge {ie:?} which does not record the plane back"
                        ),
                    });
                }
            }
        }
        for (id, edge) in self.igraph.iedges() {
            for &p in &edge.planes {
                if !self.planes[p].iedges.contains(&id) {
                    return Err(KsrError::InvariantViolation {
                        plane: p,
                        details: format!(
                            "iedge {id:?} claims plane {p} which does not record it back"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Diagnostic wrapper: `true` when all invariants hold; `verbose`
    /// logs the first violation.
    pub fn check_integrity(&self, verbose: bool) -> bool {
        match self.integrity() {
            Ok(()) => true,
            Err(err) => {
                if verbose {
                    tracing::error!(%err, "integrity check failed");
                }
                false
            }
        }
    }
}

fn stale(pv: PVertex) -> KsrError {
    KsrError::InvariantViolation {
        plane: pv.plane,
        details: format!("stale vertex handle {:?}", pv.vertex),
    }
}

/// Twice the signed area of a polygon (CCW positive).
pub(crate) fn signed_area_2(pts: &[Vector2<f64>]) -> f64 {
    let n = pts.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    acc
}

#[cfg(test)]
mod tests;
