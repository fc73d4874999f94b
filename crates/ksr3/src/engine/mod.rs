//! Kinetic simulation driver.
//!
//! Staging: bounding box and walls, one support plane per input polygon,
//! intersection lines chained into the graph, faces pre-split along
//! them. The simulation then runs in fixed time windows: each window
//! recomputes candidate events for every moving vertex, and events are
//! popped and applied in time order until the window drains. The run
//! ends when a window starts with every vertex frozen.

use std::collections::BTreeSet;

use nalgebra::Vector3;
use tracing::{debug, info, trace};

use crate::error::{KsrError, KsrResult};
use crate::event::{Event, EventKind, EventQueue};
use crate::geom::{
    are_parallel, clip_line_to_bbox, plane_plane_line, segment_intersection, Bbox2, Bbox3,
    KernelCfg, Segment2,
};
use crate::igraph::IEdgeId;
use crate::registry::{LineSeed, PVertex, Registry};
use crate::splitter;

/// Partition parameters.
#[derive(Clone, Copy, Debug)]
pub struct PartitionCfg {
    /// Crossing budget given to every input polygon face.
    pub k: u32,
    /// Half-extent growth of the bounding box around the inputs.
    pub enlarge_bbox_ratio: f64,
    /// Window length as a fraction of the input bbox diagonal.
    pub time_step_fraction: f64,
    /// Hard cap on simulation windows before giving up.
    pub max_windows: usize,
    pub kernel: KernelCfg,
}

impl Default for PartitionCfg {
    fn default() -> Self {
        Self {
            k: 2,
            enlarge_bbox_ratio: 1.1,
            time_step_fraction: 0.02,
            max_windows: 1000,
            kernel: KernelCfg::default(),
        }
    }
}

pub struct KineticEngine {
    data: Registry,
    queue: EventQueue,
    min_time: f64,
    max_time: f64,
    cfg: PartitionCfg,
    events_applied: usize,
}

impl KineticEngine {
    pub fn new(cfg: PartitionCfg) -> Self {
        Self {
            data: Registry::new(cfg.kernel),
            queue: EventQueue::default(),
            min_time: 0.0,
            max_time: 0.0,
            cfg,
            events_applied: 0,
        }
    }

    #[inline]
    pub fn data(&self) -> &Registry {
        &self.data
    }

    #[inline]
    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    pub fn check_integrity(&self, verbose: bool) -> bool {
        self.data.check_integrity(verbose)
    }

    /// Run the full partition: staging plus the windowed simulation.
    ///
    /// `polygon_map` extracts the corner list of each input item.
    pub fn partition<P, F>(&mut self, polygons: &[P], polygon_map: F) -> KsrResult<()>
    where
        F: Fn(&P) -> &[Vector3<f64>],
    {
        if polygons.is_empty() {
            return Err(KsrError::InvalidInput {
                details: "no input polygons".into(),
            });
        }
        let mut all_points: Vec<Vector3<f64>> = Vec::new();
        for p in polygons {
            let pts = polygon_map(p);
            if pts.len() < 3 {
                return Err(KsrError::InvalidInput {
                    details: format!("input polygon with {} corners", pts.len()),
                });
            }
            for q in pts {
                if !q.x.is_finite() || !q.y.is_finite() || !q.z.is_finite() {
                    return Err(KsrError::InvalidInput {
                        details: "non-finite input coordinate".into(),
                    });
                }
            }
            all_points.extend_from_slice(pts);
        }
        let raw_bbox = padded_bbox(&all_points)?;
        let diag = raw_bbox.diagonal();

        self.data.init(polygons.len());
        self.data
            .add_bbox_polygons(&raw_bbox, self.cfg.enlarge_bbox_ratio)?;
        for (idx, p) in polygons.iter().enumerate() {
            self.data.add_polygon(polygon_map(p), idx, self.cfg.k)?;
        }
        info!(
            polygons = polygons.len(),
            planes = self.data.num_support_planes(),
            "staged support planes"
        );
        self.data.integrity()?;

        self.make_polygons_intersection_free()?;
        self.data.integrity()?;

        let time_step = diag * self.cfg.time_step_fraction;
        self.min_time = 0.0;
        self.max_time = time_step;
        self.data.update_positions(0.0);

        let mut windows = 0usize;
        while self.initialize_queue()? {
            let applied = self.run()?;
            debug!(
                window = windows,
                min = self.min_time,
                max = self.max_time,
                applied,
                "window drained"
            );
            self.min_time = self.max_time;
            self.max_time += time_step;
            self.data.update_positions(self.min_time);
            windows += 1;
            if windows >= self.cfg.max_windows {
                return Err(KsrError::IterationLimit { windows });
            }
        }
        self.data.integrity()?;
        info!(
            windows,
            events = self.events_applied,
            ivertices = self.data.igraph.num_ivertices(),
            iedges = self.data.igraph.num_iedges(),
            "partition finished"
        );
        Ok(())
    }

    /// Build the intersection graph: chain wall traces, and with at
    /// least two input planes also their pairwise intersection lines and
    /// all line-line crossings, then pre-split every face. Below eight
    /// planes there is nothing to cross or split, so only the traces
    /// materialize.
    fn make_polygons_intersection_free(&mut self) -> KsrResult<()> {
        let n = self.data.num_support_planes();
        let mut seeds = self.data.take_trace_seeds();

        if n >= 8 {
            let bbox = *self.data.bbox().ok_or_else(|| KsrError::InvalidInput {
                details: "bounding box not initialized".into(),
            })?;
            for i in 6..n {
                for j in (i + 1)..n {
                    let (spi, spj) = (self.data.support_plane(i), self.data.support_plane(j));
                    let Some((o, dir)) =
                        plane_plane_line(&spi.normal, spi.d, &spj.normal, spj.d, &self.data.cfg)
                    else {
                        continue;
                    };
                    let Some((a, b)) = clip_line_to_bbox(&o, &dir, &bbox, &self.data.cfg) else {
                        continue;
                    };
                    seeds.push(LineSeed {
                        planes: (i, j),
                        a,
                        b,
                    });
                }
            }

            let mut crossings: Vec<Vec<(Vector3<f64>, BTreeSet<usize>)>> =
                vec![Vec::new(); seeds.len()];
            for si in 0..seeds.len() {
                for sj in (si + 1)..seeds.len() {
                    let (i1, j1) = seeds[si].planes;
                    let (i2, j2) = seeds[sj].planes;
                    let shared: Vec<usize> = [i1, j1]
                        .into_iter()
                        .filter(|p| *p == i2 || *p == j2)
                        .collect();
                    if shared.len() != 1 {
                        continue;
                    }
                    let c = shared[0];
                    let sp = self.data.support_plane(c);
                    let s1 = Segment2::new(sp.to_2d(&seeds[si].a), sp.to_2d(&seeds[si].b));
                    let s2 = Segment2::new(sp.to_2d(&seeds[sj].a), sp.to_2d(&seeds[sj].b));
                    let Some(x2) = segment_intersection(&s1, &s2, &self.data.cfg) else {
                        continue;
                    };
                    let x3 = sp.to_3d(&x2);
                    let union: BTreeSet<usize> = [i1, j1, i2, j2].into();
                    crossings[si].push((x3, union.clone()));
                    crossings[sj].push((x3, union));
                }
            }
            let seeds_taken = std::mem::take(&mut seeds);
            for (seed, cr) in seeds_taken.iter().zip(&crossings) {
                self.data.add_chained_iedges(seed, cr)?;
            }
            for plane in 0..n {
                let cuts = splitter::split_support_plane(&mut self.data, plane)?;
                if cuts > 0 {
                    debug!(plane, cuts, "pre-split faces");
                }
            }
        } else {
            for seed in &seeds {
                self.data.add_chained_iedges(seed, &[])?;
            }
        }
        Ok(())
    }

    /// Per-plane lookup tables for event computation.
    fn init_search_structures(&self, plane: usize) -> (Vec<IEdgeId>, Vec<Segment2>, Vec<Bbox2>) {
        let iedges: Vec<IEdgeId> = self
            .data
            .support_plane(plane)
            .iedges
            .iter()
            .copied()
            .collect();
        let segments: Vec<Segment2> = iedges
            .iter()
            .map(|&e| self.data.segment_2(plane, e))
            .collect();
        let bboxes: Vec<Bbox2> = segments.iter().map(|s| s.bbox()).collect();
        (iedges, segments, bboxes)
    }

    /// Recompute events for every active vertex; `true` while any vertex
    /// still moves.
    fn initialize_queue(&mut self) -> KsrResult<bool> {
        self.queue.clear();
        let mut still_running = false;
        for plane in 0..self.data.num_support_planes() {
            let (iedges, segments, bboxes) = self.init_search_structures(plane);
            for pv in self.data.pvertices(plane) {
                if !self.data.is_active(pv) {
                    continue;
                }
                if self.compute_events_of_vertex(pv, &iedges, &segments, &bboxes)? {
                    still_running = true;
                }
            }
        }
        trace!(
            queued = self.queue.len(),
            min = self.min_time,
            max = self.max_time,
            "queue initialized"
        );
        Ok(still_running)
    }

    /// Candidate events of one vertex inside the current window.
    ///
    /// Constrained vertices look for collisions with their free cycle
    /// neighbors and for arrivals at the endpoints of their iedge; free
    /// vertices test every iedge of the plane (bbox-filtered), skipping
    /// the edges their neighbors already slide along. Returns `false`
    /// for frozen vertices.
    fn compute_events_of_vertex(
        &mut self,
        pv: PVertex,
        iedges: &[IEdgeId],
        segments: &[Segment2],
        bboxes: &[Bbox2],
    ) -> KsrResult<bool> {
        if self.data.is_frozen(pv) {
            return Ok(false);
        }
        let (min, max) = (self.min_time, self.max_time);
        let p0 = self.data.point_2(pv, min)?;
        let p1 = self.data.point_2(pv, max)?;
        let sv = Segment2::new(p0, p1);
        let speed = self.data.speed(pv)?;
        if sv.squared_length() <= 0.0 || speed <= 0.0 {
            return Ok(false);
        }
        let sv_bbox = sv.bbox();
        let eps = self.data.cfg.eps_feas;
        let tiny = self.data.cfg.eps_merge
            * (1.0 + self.data.bbox().map(|b| b.diagonal()).unwrap_or(1.0));

        if let Some(current) = self.data.iedge_of(pv) {
            let (prev, next) = self.data.prev_and_next(pv)?;
            for pother in [prev, next] {
                if self.data.has_iedge(pother)
                    || !self.data.is_active(pother)
                    || self.data.is_frozen(pother)
                {
                    continue;
                }
                let so = Segment2::new(
                    self.data.point_2(pother, min)?,
                    self.data.point_2(pother, max)?,
                );
                if !sv_bbox.overlaps(&so.bbox(), eps) {
                    continue;
                }
                let Some(x) = segment_intersection(&sv, &so, &self.data.cfg) else {
                    continue;
                };
                let time = min + (x - p0).norm() / speed;
                if time < max {
                    self.queue.push(Event {
                        pvertex: pv,
                        kind: EventKind::VertexVertex { pother },
                        time,
                    });
                }
            }

            let (a, b) = self.data.igraph.endpoints(current);
            for iv in [a, b] {
                if !self.data.igraph.ivertex(iv).active {
                    continue;
                }
                let pi = self.data.ivertex_point_2(pv.plane, iv);
                let to_iv = pi - p0;
                if sv.to_vector().dot(&to_iv) < 0.0 {
                    continue;
                }
                let time = min + to_iv.norm() / speed;
                if time < max {
                    self.queue.push(Event {
                        pvertex: pv,
                        kind: EventKind::VertexIvertex { ivertex: iv },
                        time,
                    });
                }
            }
            Ok(true)
        } else {
            let neighbors = self.data.prev_and_next(pv)?;
            for (i, &ie) in iedges.iter().enumerate() {
                if !self.data.igraph.iedge(ie).active {
                    continue;
                }
                if !sv_bbox.overlaps(&bboxes[i], eps) {
                    continue;
                }
                let Some(x) = segment_intersection(&sv, &segments[i], &self.data.cfg) else {
                    continue;
                };
                let dist = (x - p0).norm();
                // A vertex sitting on an edge it just crossed must not
                // re-trigger against it.
                if dist <= tiny {
                    continue;
                }
                let time = min + dist / speed;
                if time >= max {
                    continue;
                }
                // An edge a neighbor already slides on only counts when
                // the path crosses it away from that slider; right at
                // the slider it is the polygon boundary touching its own
                // constraint, and the slider's vertex-vertex event is
                // the one that resolves it.
                let mut at_slider = false;
                for &po in &[neighbors.0, neighbors.1] {
                    if self.data.iedge_of(po) == Some(ie)
                        && !self.data.is_frozen(po)
                        && (x - self.data.point_2(po, time)?).norm() <= tiny
                    {
                        at_slider = true;
                    }
                }
                if at_slider {
                    continue;
                }
                self.queue.push(Event {
                    pvertex: pv,
                    kind: EventKind::VertexEdge { iedge: ie },
                    time,
                });
            }
            Ok(true)
        }
    }

    /// Recompute events for a group of vertices on one plane, with the
    /// whole group deactivated during computation so no intra-group
    /// events appear.
    fn compute_events_of_vertices(&mut self, group: &[PVertex]) -> KsrResult<()> {
        let Some(first) = group.first() else {
            return Ok(());
        };
        self.min_time = self.data.current_time();
        for &pv in group {
            self.data.deactivate(pv);
        }
        let (iedges, segments, bboxes) = self.init_search_structures(first.plane);
        for &pv in group {
            self.compute_events_of_vertex(pv, &iedges, &segments, &bboxes)?;
        }
        for &pv in group {
            self.data.activate(pv);
        }
        Ok(())
    }

    /// Drain the queue for the current window.
    fn run(&mut self) -> KsrResult<usize> {
        let mut applied = 0usize;
        let mut last = self.min_time;
        while let Some(ev) = self.queue.pop_min() {
            debug_assert!(ev.time >= last - 1e-9, "event time went backwards");
            last = ev.time;
            self.data.update_positions(ev.time);
            trace!(time = ev.time, plane = ev.pvertex.plane, "apply event");
            self.apply(ev)?;
            applied += 1;
            self.events_applied += 1;
            debug_assert!(self.data.check_integrity(true));
        }
        Ok(applied)
    }

    fn apply(&mut self, ev: Event) -> KsrResult<()> {
        let pvertex = ev.pvertex;
        let t = ev.time;
        match ev.kind {
            EventKind::VertexVertex { pother } => {
                self.queue.remove_vertex_events(pvertex);
                self.queue.remove_vertex_events(pother);
                if !self.data.has_iedge(pvertex) {
                    return Err(KsrError::InvariantViolation {
                        plane: pvertex.plane,
                        details: "vertex-vertex event on an unconstrained subject".into(),
                    });
                }
                if self.data.has_iedge(pother) {
                    return Err(KsrError::NotImplemented {
                        details: "two constrained vertices meeting",
                    });
                }
                if self.data.transfer_vertex(pvertex, pother, t)? {
                    self.compute_events_of_vertices(&[pvertex, pother])?;
                    let (prev, next) = self.data.prev_and_next(pvertex)?;
                    let pthird = if prev == pother { next } else { prev };
                    self.queue.remove_vertex_events(pthird);
                    self.compute_events_of_vertices(&[pthird])?;
                } else {
                    self.compute_events_of_vertices(&[pvertex])?;
                }
            }
            EventKind::VertexEdge { iedge } => {
                let plane = pvertex.plane;
                let pface = self.data.pface_of(pvertex)?;
                let (prev, next) = self.data.prev_and_next(pvertex)?;
                let seg_edge = self.data.segment_2(plane, iedge);
                let mut handled = false;

                // Flat contact: a whole polygon edge lands on the iedge.
                for pother in [prev, next] {
                    if self.data.has_iedge(pother) {
                        continue;
                    }
                    let pe = Segment2::new(
                        self.data.point_2(pother, t)?,
                        self.data.point_2(pvertex, t)?,
                    );
                    if pe.squared_length() <= self.data.cfg.eps_det
                        || !are_parallel(&pe, &seg_edge, &self.data.cfg)
                    {
                        continue;
                    }
                    self.queue.remove_vertex_events(pvertex);
                    self.queue.remove_vertex_events(pother);
                    let (collision, bbox_reached) = self.data.is_occupied(pvertex, iedge);
                    let (k, stop) = budget(self.data.k(pface), collision, bbox_reached);
                    self.data.set_k(pface, k);
                    if stop {
                        self.data.crop_polygon_pair(pvertex, pother, iedge, t)?;
                        self.queue.remove_edge_events(iedge, plane);
                        self.compute_events_of_vertices(&[pvertex, pother])?;
                    } else {
                        let (pv0, pv1) =
                            self.data.propagate_polygon_pair(k, pvertex, pother, iedge, t)?;
                        self.queue.remove_edge_events(iedge, plane);
                        self.compute_events_of_vertices(&[pvertex, pother, pv0, pv1])?;
                    }
                    handled = true;
                    break;
                }

                if !handled {
                    self.queue.remove_vertex_events(pvertex);
                    let (collision, bbox_reached) = self.data.is_occupied(pvertex, iedge);
                    let (k, stop) = budget(self.data.k(pface), collision, bbox_reached);
                    self.data.set_k(pface, k);
                    if stop {
                        let pvnew = self.data.crop_polygon(pvertex, iedge, t)?;
                        self.queue.remove_edge_events(iedge, plane);
                        self.compute_events_of_vertices(&[pvertex, pvnew])?;
                    } else {
                        let pvnew = self.data.propagate_polygon(k, pvertex, iedge, t)?;
                        self.queue.remove_edge_events(iedge, plane);
                        self.compute_events_of_vertices(&pvnew)?;
                    }
                }
            }
            EventKind::VertexIvertex { ivertex } => {
                let around = self.data.pvertices_around_ivertex(pvertex, ivertex, t)?;
                let pface = self.data.pface_of(pvertex)?;
                let k = self.data.k(pface);
                for &pv in &around[1..around.len() - 1] {
                    self.queue.remove_vertex_events(pv);
                }
                let (fresh, crossed) =
                    self.data.merge_pvertices_on_ivertex(&around, ivertex, k, t)?;
                if !crossed.is_empty() {
                    // Passing through the ivertex spends one budget unit.
                    self.data.set_k(pface, (k - 1).max(1));
                }
                for e in crossed {
                    self.queue.remove_edge_events(e, pvertex.plane);
                }
                for &pv in &fresh {
                    self.queue.remove_vertex_events(pv);
                }
                self.compute_events_of_vertices(&fresh)?;
            }
        }
        Ok(())
    }
}

/// Apply one contact to a face budget.
///
/// Reaching a wall pins the budget to one and stops; a collision with
/// the budget already at one stops; otherwise a collision spends one
/// unit and the face keeps going. The budget never drops below one.
fn budget(k: u32, collision: bool, bbox_reached: bool) -> (u32, bool) {
    let mut k = k;
    let mut stop = false;
    if bbox_reached {
        k = 1;
        stop = true;
    }
    if collision && k == 1 {
        stop = true;
    }
    if collision && k > 1 {
        k -= 1;
    }
    (k.max(1), stop)
}

/// Bbox of the input cloud, with near-flat axes padded so the walls
/// never collapse onto an input plane.
fn padded_bbox(points: &[Vector3<f64>]) -> KsrResult<Bbox3> {
    let bb = Bbox3::from_points(points.iter()).ok_or_else(|| KsrError::InvalidInput {
        details: "no input points".into(),
    })?;
    let diag = bb.diagonal();
    if !diag.is_finite() || diag <= 0.0 {
        return Err(KsrError::InvalidInput {
            details: "input points have no extent".into(),
        });
    }
    let mut bb = bb;
    for axis in 0..3 {
        let extent = bb.max[axis] - bb.min[axis];
        if extent < 1e-2 * diag {
            let pad = 0.05 * diag;
            bb.min[axis] -= pad;
            bb.max[axis] += pad;
        }
    }
    Ok(bb)
}

#[cfg(test)]
mod tests;
