//! Structural mesh edits triggered by events.
//!
//! All operations take the event time explicitly and keep trajectories
//! consistent: a vertex re-anchored at position `p` with direction `d`
//! at time `t` stores `point = p - t * d`, so `point_at(t) == p`.

use nalgebra::Vector2;

use crate::error::{KsrError, KsrResult};
use crate::geom::{line_line_intersection, Line2};
use crate::igraph::{IEdgeId, IVertexId};
use crate::mesh::{FaceId, VertexData};

use super::{PVertex, Registry};

impl Registry {
    /// Occupancy of an iedge as seen from `pv`'s plane.
    ///
    /// Returns `(collision, bbox_reached)`: `collision` when another
    /// input plane carries the edge, `bbox_reached` when a wall does.
    pub fn is_occupied(&self, pv: PVertex, iedge: IEdgeId) -> (bool, bool) {
        let planes = &self.igraph.iedge(iedge).planes;
        let bbox_reached = planes.iter().any(|&p| p < 6);
        let collision = planes.iter().any(|&p| p >= 6 && p != pv.plane);
        (collision, bbox_reached)
    }

    /// A free vertex caught up with the slider `pvertex`: constrain
    /// `pother` to the same iedge, with its velocity projected onto the
    /// edge direction. `false` when `pvertex` carries no iedge.
    pub fn transfer_vertex(&mut self, pvertex: PVertex, pother: PVertex, time: f64) -> KsrResult<bool> {
        let Some(iedge) = self.iedge_of(pvertex) else {
            return Ok(false);
        };
        let seg = self.segment_2(pvertex.plane, iedge);
        let edir = seg.to_vector();
        if edir.norm_squared() <= self.cfg.eps_det {
            return Ok(false);
        }
        let eline = Line2::through(seg.source, seg.target);
        let ehat = edir.normalize();

        let other = self.vertex(pother)?.clone();
        let p = project_point_on_line(&eline, &other.point_at(time));
        let d = ehat * other.direction.dot(&ehat);

        let eps = self.cfg.eps_feas;
        let v = self.vertex_mut(pother)?;
        v.iedge = Some(iedge);
        if d.norm() <= eps {
            v.point = p;
            v.direction = Vector2::zeros();
            v.frozen = true;
        } else {
            v.point = p - d * time;
            v.direction = d;
            v.frozen = false;
        }
        Ok(true)
    }

    /// Crop a polygon at an iedge: the arriving corner `pv` splits into
    /// two vertices sliding along the edge in opposite senses.
    ///
    /// `pv` is reused for the prev-side slider; the returned vertex is
    /// the next-side slider, inserted right after it in the face cycle.
    pub fn crop_polygon(&mut self, pv: PVertex, iedge: IEdgeId, time: f64) -> KsrResult<PVertex> {
        let plane = pv.plane;
        let seg = self.segment_2(plane, iedge);
        let eline = Line2::through(seg.source, seg.target);
        let (prev, next) = self.prev_and_next(pv)?;
        let orig = self.vertex(pv)?.clone();
        let p = project_point_on_line(&eline, &orig.point_at(time));

        let d1 = self.sliding_direction(&eline, p, orig.direction, prev, time)?;
        let d2 = self.sliding_direction(&eline, p, orig.direction, next, time)?;

        let face = orig.face;
        let eps = self.cfg.eps_feas;
        let v1data = constrained(p, d1, iedge, face, time, eps);
        let v2data = constrained(p, d2, iedge, face, time, eps);
        *self.vertex_mut(pv)? = v1data;
        let mesh = &mut self.planes[plane].mesh;
        let lv2 = mesh.add_vertex(v2data);
        let pos = mesh
            .position_in_face(face, pv.vertex)
            .ok_or_else(|| super::stale(pv))?;
        mesh.face_mut(face).vertices.insert(pos + 1, lv2);

        Ok(PVertex {
            plane,
            vertex: lv2,
        })
    }

    /// Crop when a polygon edge hits the iedge flat (parallel contact):
    /// both endpoints become sliders, no vertices are added.
    pub fn crop_polygon_pair(
        &mut self,
        pvertex: PVertex,
        pother: PVertex,
        iedge: IEdgeId,
        time: f64,
    ) -> KsrResult<()> {
        let plane = pvertex.plane;
        let seg = self.segment_2(plane, iedge);
        let eline = Line2::through(seg.source, seg.target);

        for (pv, other) in [(pvertex, pother), (pother, pvertex)] {
            let away = self.neighbor_away_from(pv, other)?;
            let orig = self.vertex(pv)?.clone();
            let p = project_point_on_line(&eline, &orig.point_at(time));
            let d = self.sliding_direction(&eline, p, orig.direction, away, time)?;
            let data = constrained(p, d, iedge, orig.face, time, self.cfg.eps_feas);
            *self.vertex_mut(pv)? = data;
        }
        Ok(())
    }

    /// Crop and spawn a new face beyond the iedge.
    ///
    /// The original face gets two sliders in place of `pv`; the new face
    /// is a triangle of their mirror twins plus `pv` itself, which keeps
    /// its velocity and continues past the edge. The new face receives
    /// budget `k`. Returns the three vertices whose events must be
    /// recomputed: the two sliders and the continuing corner.
    pub fn propagate_polygon(
        &mut self,
        k: u32,
        pv: PVertex,
        iedge: IEdgeId,
        time: f64,
    ) -> KsrResult<[PVertex; 3]> {
        let plane = pv.plane;
        let seg = self.segment_2(plane, iedge);
        let eline = Line2::through(seg.source, seg.target);
        let (prev, next) = self.prev_and_next(pv)?;
        let orig = self.vertex(pv)?.clone();
        let p = project_point_on_line(&eline, &orig.point_at(time));

        let d1 = self.sliding_direction(&eline, p, orig.direction, prev, time)?;
        let d2 = self.sliding_direction(&eline, p, orig.direction, next, time)?;
        let face = orig.face;
        let eps = self.cfg.eps_feas;

        let mesh = &mut self.planes[plane].mesh;
        let s1 = mesh.add_vertex(constrained(p, d1, iedge, face, time, eps));
        let s2 = mesh.add_vertex(constrained(p, d2, iedge, face, time, eps));
        let pos = mesh
            .position_in_face(face, pv.vertex)
            .ok_or_else(|| super::stale(pv))?;
        {
            let cycle = &mut mesh.face_mut(face).vertices;
            cycle[pos] = s1;
            cycle.insert(pos + 1, s2);
        }

        // Mirror twins share the edge in reversed order so the new face
        // stays CCW; the continuing corner keeps the old trajectory.
        let t2 = mesh.add_vertex(constrained(p, d2, iedge, face, time, eps));
        let t1 = mesh.add_vertex(constrained(p, d1, iedge, face, time, eps));
        mesh.add_face(vec![t2, t1, pv.vertex], k.max(1));

        Ok([
            PVertex { plane, vertex: s1 },
            PVertex { plane, vertex: s2 },
            pv,
        ])
    }

    /// Parallel-contact propagation: the flat edge crosses the iedge and
    /// a quad face continues beyond it. Returns the two continuing
    /// corners of the new face.
    pub fn propagate_polygon_pair(
        &mut self,
        k: u32,
        pvertex: PVertex,
        pother: PVertex,
        iedge: IEdgeId,
        time: f64,
    ) -> KsrResult<(PVertex, PVertex)> {
        let plane = pvertex.plane;
        let orig_v = self.vertex(pvertex)?.clone();
        let orig_o = self.vertex(pother)?.clone();
        let face = orig_v.face;

        self.crop_polygon_pair(pvertex, pother, iedge, time)?;

        // Orient the shared edge as it appears in the face cycle.
        let (_, next_of_v) = self.prev_and_next(pvertex)?;
        let (first, second, orig_first, orig_second) = if next_of_v == pother {
            (pvertex, pother, &orig_v, &orig_o)
        } else {
            (pother, pvertex, &orig_o, &orig_v)
        };

        let slider_first = self.vertex(first)?.clone();
        let slider_second = self.vertex(second)?.clone();

        let mesh = &mut self.planes[plane].mesh;
        let dup_second = mesh.add_vertex(VertexData {
            face,
            ..slider_second
        });
        let dup_first = mesh.add_vertex(VertexData {
            face,
            ..slider_first
        });
        let cont_first = mesh.add_vertex(moving(orig_first, face));
        let cont_second = mesh.add_vertex(moving(orig_second, face));
        mesh.add_face(
            vec![dup_second, dup_first, cont_first, cont_second],
            k.max(1),
        );

        let a = PVertex {
            plane,
            vertex: cont_first,
        };
        let b = PVertex {
            plane,
            vertex: cont_second,
        };
        if first == pvertex {
            Ok((a, b))
        } else {
            Ok((b, a))
        }
    }

    /// Contiguous run of face-cycle vertices sitting at `ivertex` at
    /// `time`, flanked by one untouched neighbor on each side.
    ///
    /// Returns `[outer_prev, run.., outer_next]`; the run always leaves
    /// at least two vertices of the cycle outside it.
    pub fn pvertices_around_ivertex(
        &self,
        pv: PVertex,
        ivertex: IVertexId,
        time: f64,
    ) -> KsrResult<Vec<PVertex>> {
        let plane = pv.plane;
        let target = self.ivertex_point_2(plane, ivertex);
        let face = self.vertex(pv)?.face;
        let cycle = self.planes[plane].mesh.face(face).vertices.clone();
        let n = cycle.len();
        let i = cycle
            .iter()
            .position(|&v| v == pv.vertex)
            .ok_or_else(|| super::stale(pv))?;

        let scale = self.bbox().map(|b| b.diagonal()).unwrap_or(1.0);
        let eps = self.cfg.eps_merge * (1.0 + scale);
        let close = |idx: usize| -> bool {
            self.planes[plane]
                .mesh
                .get(cycle[idx])
                .map(|v| (v.point_at(time) - target).norm() <= eps)
                .unwrap_or(false)
        };

        let (mut lo, mut hi, mut count) = (i, i, 1usize);
        while count < n - 2 && close((lo + n - 1) % n) {
            lo = (lo + n - 1) % n;
            count += 1;
        }
        while count < n - 2 && close((hi + 1) % n) {
            hi = (hi + 1) % n;
            count += 1;
        }

        let mut out = Vec::with_capacity(count + 2);
        out.push(mk(plane, cycle[(lo + n - 1) % n]));
        let mut j = lo;
        loop {
            out.push(mk(plane, cycle[j]));
            if j == hi {
                break;
            }
            j = (j + 1) % n;
        }
        out.push(mk(plane, cycle[(hi + 1) % n]));
        Ok(out)
    }

    /// Collapse the run produced by `pvertices_around_ivertex` into a
    /// single vertex at the ivertex.
    ///
    /// With budget left (`k > 1`), no wall plane pinning the ivertex,
    /// and a collinear iedge carrying the line onward, the merged vertex
    /// keeps sliding onto that iedge; the other incident iedges are
    /// returned as crossed so their queued events can be dropped.
    /// Otherwise the vertex freezes in place. The first run vertex
    /// survives as the merged one; the rest leave the face cycle and the
    /// arena. Returns the vertices needing fresh events (outer, merged,
    /// outer) and the crossed iedges.
    pub fn merge_pvertices_on_ivertex(
        &mut self,
        pvertices: &[PVertex],
        ivertex: IVertexId,
        k: u32,
        time: f64,
    ) -> KsrResult<(Vec<PVertex>, Vec<IEdgeId>)> {
        if pvertices.len() < 3 {
            return Err(KsrError::InvariantViolation {
                plane: pvertices.first().map(|p| p.plane).unwrap_or(0),
                details: "merge needs at least one middle vertex".into(),
            });
        }
        let plane = pvertices[0].plane;
        let keep = pvertices[1];
        let target = self.ivertex_point_2(plane, ivertex);

        let incident: Vec<IEdgeId> = self
            .igraph
            .iedges_around(ivertex)
            .into_iter()
            .filter(|&e| self.igraph.iedge(e).planes.contains(&plane))
            .collect();
        let pinned = self.igraph.ivertex(ivertex).planes.iter().any(|&p| p < 6);

        // Velocity the run arrived with, if any of it still moves.
        let arrival = pvertices[1..pvertices.len() - 1]
            .iter()
            .filter_map(|&p| self.vertex(p).ok())
            .map(|v| v.direction)
            .find(|d| d.norm() > self.cfg.eps_feas);

        let continuation = if pinned || k <= 1 {
            None
        } else {
            arrival.and_then(|d| {
                let dhat = d.normalize();
                incident
                    .iter()
                    .copied()
                    .find(|&e| {
                        let (a, b) = self.igraph.endpoints(e);
                        let far = if a == ivertex { b } else { a };
                        let out = self.ivertex_point_2(plane, far) - target;
                        let len = out.norm();
                        len > self.cfg.eps_det
                            && out.dot(&dhat) > 0.0
                            && (out.x * dhat.y - out.y * dhat.x).abs()
                                <= self.cfg.eps_parallel * len
                    })
                    .map(|e| (e, d))
            })
        };

        let face = self.vertex(keep)?.face;
        let crossed: Vec<IEdgeId> = match continuation {
            Some((e_out, d)) => {
                let v = self.vertex_mut(keep)?;
                v.point = target - d * time;
                v.direction = d;
                v.frozen = false;
                v.active = true;
                v.iedge = Some(e_out);
                incident.into_iter().filter(|&e| e != e_out).collect()
            }
            None => {
                let pinned_iedge = incident.first().copied();
                let v = self.vertex_mut(keep)?;
                v.point = target;
                v.direction = Vector2::zeros();
                v.frozen = true;
                v.active = true;
                v.iedge = pinned_iedge;
                Vec::new()
            }
        };

        let doomed: Vec<PVertex> = pvertices[2..pvertices.len() - 1].to_vec();
        let mesh = &mut self.planes[plane].mesh;
        mesh.face_mut(face)
            .vertices
            .retain(|lv| !doomed.iter().any(|d| d.vertex == *lv));
        for d in &doomed {
            mesh.remove_vertex(d.vertex);
        }

        Ok((
            vec![pvertices[0], keep, pvertices[pvertices.len() - 1]],
            crossed,
        ))
    }

    // --- helpers --------------------------------------------------------

    /// Direction of a slider created at `p` on `eline` at `time`.
    ///
    /// The cropped polygon edge keeps moving with its two carriers, so
    /// the slider must track where that edge crosses the line: intersect
    /// the edge one time unit later (neighbor advanced, corner advanced
    /// virtually past the line) with `eline`. Near-parallel
    /// configurations freeze the slider.
    fn sliding_direction(
        &self,
        eline: &Line2,
        p: Vector2<f64>,
        corner_dir: Vector2<f64>,
        neighbor: PVertex,
        time: f64,
    ) -> KsrResult<Vector2<f64>> {
        let n1 = self.point_2(neighbor, time + 1.0)?;
        let c1 = p + corner_dir;
        let future = Line2::through(n1, c1);
        Ok(match line_line_intersection(eline, &future, &self.cfg) {
            Some(q) => q - p,
            None => Vector2::zeros(),
        })
    }

    fn neighbor_away_from(&self, pv: PVertex, other: PVertex) -> KsrResult<PVertex> {
        let (prev, next) = self.prev_and_next(pv)?;
        Ok(if prev == other { next } else { prev })
    }
}

fn mk(plane: usize, vertex: crate::mesh::LVertex) -> PVertex {
    PVertex { plane, vertex }
}

/// Vertex data for a slider anchored at `p` with velocity `d` at `time`.
fn constrained(
    p: Vector2<f64>,
    d: Vector2<f64>,
    iedge: IEdgeId,
    face: FaceId,
    time: f64,
    eps: f64,
) -> VertexData {
    if d.norm() <= eps {
        VertexData {
            point: p,
            direction: Vector2::zeros(),
            frozen: true,
            active: true,
            iedge: Some(iedge),
            face,
        }
    } else {
        VertexData {
            point: p - d * time,
            direction: d,
            frozen: false,
            active: true,
            iedge: Some(iedge),
            face,
        }
    }
}

/// Copy of a free vertex's trajectory re-homed to another face.
fn moving(orig: &VertexData, face: FaceId) -> VertexData {
    VertexData {
        point: orig.point,
        direction: orig.direction,
        frozen: orig.frozen,
        active: true,
        iedge: None,
        face,
    }
}

fn project_point_on_line(line: &Line2, p: &Vector2<f64>) -> Vector2<f64> {
    let d2 = line.dir.norm_squared();
    if d2 <= 0.0 {
        return line.origin;
    }
    line.origin + line.dir * ((p - line.origin).dot(&line.dir) / d2)
}
