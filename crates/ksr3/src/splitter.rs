//! Polygon splitter: subdivide polygon faces along intersection edges.
//!
//! Runs once after the intersection graph is built, before the
//! simulation starts. A face straddling an iedge is cut along the full
//! supporting line of that iedge (chained collinear iedges count as one
//! line, so a crossing ivertex inside the face does not block the cut);
//! the chord endpoints become sliders constrained to the collinear iedge
//! they land on, with velocities interpolated from the boundary edge
//! they cut and projected onto the line direction. Sub-faces inherit
//! the parent's budget. The pass is idempotent: a second run finds
//! nothing to cut.

use nalgebra::Vector2;

use crate::error::KsrResult;
use crate::igraph::IEdgeId;
use crate::mesh::{FaceId, LVertex, VertexData};
use crate::registry::Registry;

/// Split every face of `plane` against every iedge of that plane until
/// no face straddles an edge. Returns the number of cuts made.
pub fn split_support_plane(data: &mut Registry, plane: usize) -> KsrResult<usize> {
    let time = data.current_time();
    let mut cuts = 0;
    let mut worklist: Vec<FaceId> = (0..data.support_plane(plane).mesh.faces.len())
        .map(FaceId)
        .collect();

    while let Some(face) = worklist.pop() {
        let iedges: Vec<IEdgeId> = data.support_plane(plane).iedges.iter().copied().collect();
        for ie in iedges {
            if let Some(new_face) = try_split(data, plane, face, ie, time)? {
                cuts += 1;
                worklist.push(face);
                worklist.push(new_face);
                break;
            }
        }
    }
    Ok(cuts)
}

/// One straddle test and cut. `None` when the face does not properly
/// cross the supporting line (fewer or more than two transversal
/// crossings), or when a chord endpoint misses every collinear iedge
/// (the line is only carried beyond the face, e.g. a wall trace).
fn try_split(
    data: &mut Registry,
    plane: usize,
    face: FaceId,
    ie: IEdgeId,
    time: f64,
) -> KsrResult<Option<FaceId>> {
    let seg = data.segment_2(plane, ie);
    let edir = seg.to_vector();
    let elen2 = edir.norm_squared();
    if elen2 <= data.cfg.eps_det {
        return Ok(None);
    }
    let ehat = edir / elen2.sqrt();
    let eps_side = data.cfg.eps_feas * (1.0 + elen2.sqrt());

    let cycle = data.support_plane(plane).mesh.face(face).vertices.clone();
    let n = cycle.len();
    let mut points = Vec::with_capacity(n);
    let mut dirs = Vec::with_capacity(n);
    let mut offsets = Vec::with_capacity(n);
    let mut sides = Vec::with_capacity(n);
    for &lv in &cycle {
        let Some(v) = data.support_plane(plane).mesh.get(lv) else {
            return Ok(None);
        };
        let p = v.point_at(time);
        let rel = p - seg.source;
        let cross = edir.x * rel.y - edir.y * rel.x;
        points.push(p);
        dirs.push(v.direction);
        offsets.push(cross);
        sides.push(if cross > eps_side {
            1i8
        } else if cross < -eps_side {
            -1i8
        } else {
            0i8
        });
    }
    if !sides.iter().any(|&s| s > 0) || !sides.iter().any(|&s| s < 0) {
        return Ok(None);
    }

    // Transversal crossings of the supporting line, keyed by the
    // boundary edge they cut. The signed offsets give the crossing
    // parameter directly.
    let mut crossings: Vec<(usize, Vector2<f64>, Vector2<f64>, IEdgeId)> = Vec::new();
    for i in 0..n {
        let j = (i + 1) % n;
        if sides[i] as i32 * sides[j] as i32 >= 0 {
            continue;
        }
        let s = (offsets[i] / (offsets[i] - offsets[j])).clamp(0.0, 1.0);
        let x = points[i] + (points[j] - points[i]) * s;
        let Some(on) = collinear_iedge_at(data, plane, &ehat, &x) else {
            return Ok(None);
        };
        let d = dirs[i] * (1.0 - s) + dirs[j] * s;
        let dproj = ehat * d.dot(&ehat);
        crossings.push((i, x, dproj, on));
    }
    if crossings.len() != 2 {
        return Ok(None);
    }

    let parent_k = data.support_plane(plane).mesh.face(face).k;
    let eps = data.cfg.eps_feas;
    let slider = |x: Vector2<f64>, d: Vector2<f64>, on: IEdgeId, f: FaceId| -> VertexData {
        if d.norm() <= eps {
            VertexData {
                point: x,
                direction: Vector2::zeros(),
                frozen: true,
                active: true,
                iedge: Some(on),
                face: f,
            }
        } else {
            VertexData {
                point: x - d * time,
                direction: d,
                frozen: false,
                active: true,
                iedge: Some(on),
                face: f,
            }
        }
    };

    // Walk the cycle once, routing vertices by side (on-line vertices go
    // with the positive chain) and injecting the chord endpoints into
    // both chains where their boundary edges are cut.
    let mut chain_a: Vec<LVertex> = Vec::new();
    let mut chain_b: Vec<LVertex> = Vec::new();
    {
        let mesh = &mut data.support_plane_mut(plane).mesh;
        for i in 0..n {
            if sides[i] >= 0 {
                chain_a.push(cycle[i]);
            } else {
                chain_b.push(cycle[i]);
            }
            for &(at, x, d, on) in &crossings {
                if at == i {
                    chain_a.push(mesh.add_vertex(slider(x, d, on, face)));
                    chain_b.push(mesh.add_vertex(slider(x, d, on, face)));
                }
            }
        }
    }
    debug_assert!(chain_a.len() >= 3 && chain_b.len() >= 3);

    let mesh = &mut data.support_plane_mut(plane).mesh;
    mesh.face_mut(face).vertices = chain_a.clone();
    for &lv in &chain_a {
        if let Some(v) = mesh.get_mut(lv) {
            v.face = face;
        }
    }
    let new_face = mesh.add_face(chain_b, parent_k);
    Ok(Some(new_face))
}

/// The plane's iedge collinear with direction `ehat` whose bounded
/// segment contains `x`. Chained seeds cover their whole clipped line,
/// so a chord point inside the arrangement always finds its carrier.
fn collinear_iedge_at(
    data: &Registry,
    plane: usize,
    ehat: &Vector2<f64>,
    x: &Vector2<f64>,
) -> Option<IEdgeId> {
    let scale = data.bbox().map(|b| b.diagonal()).unwrap_or(1.0);
    let eps = data.cfg.eps_feas * (1.0 + scale);
    for &e in &data.support_plane(plane).iedges {
        let seg = data.segment_2(plane, e);
        let d = seg.to_vector();
        let len = d.norm();
        if len <= data.cfg.eps_det {
            continue;
        }
        if (d.x * ehat.y - d.y * ehat.x).abs() > data.cfg.eps_parallel * len {
            continue;
        }
        let t = ((x - seg.source).dot(&d) / (len * len)).clamp(0.0, 1.0);
        if (seg.source + d * t - x).norm() <= eps {
            return Some(e);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Bbox3, KernelCfg};
    use nalgebra::Vector3;

    fn setup_square_with_chord() -> (Registry, IEdgeId) {
        let mut data = Registry::new(KernelCfg::default());
        let bbox = Bbox3 {
            min: Vector3::new(-1.0, -1.0, -1.0),
            max: Vector3::new(1.0, 1.0, 1.0),
        };
        data.add_bbox_polygons(&bbox, 1.0).unwrap();
        let square = vec![
            Vector3::new(-0.5, -0.5, 0.0),
            Vector3::new(0.5, -0.5, 0.0),
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(-0.5, 0.5, 0.0),
        ];
        let plane = data.add_polygon(&square, 0, 2).unwrap();
        assert_eq!(plane, 6);
        // A synthetic intersection edge slicing through the square.
        let a = data
            .igraph
            .add_ivertex(Vector3::new(-0.9, 0.1, 0.0), [plane]);
        let b = data.igraph.add_ivertex(Vector3::new(0.9, 0.1, 0.0), [plane]);
        let ie = data.igraph.add_iedge(a, b, [plane]);
        data.support_plane_mut(plane).iedges.insert(ie);
        (data, ie)
    }

    #[test]
    fn chord_cuts_face_in_two() {
        let (mut data, ie) = setup_square_with_chord();
        let cuts = split_support_plane(&mut data, 6).unwrap();
        assert_eq!(cuts, 1);
        let mesh = &data.support_plane(6).mesh;
        assert_eq!(mesh.faces.len(), 2);
        for face in &mesh.faces {
            assert_eq!(face.vertices.len(), 4);
            assert_eq!(face.k, 2);
        }
        // Chord endpoints are sliders on the cutting edge.
        let constrained: Vec<_> = mesh
            .vertices()
            .filter(|(_, v)| v.iedge == Some(ie))
            .collect();
        assert_eq!(constrained.len(), 4);
        assert!(data.integrity().is_ok());
    }

    #[test]
    fn splitting_is_idempotent() {
        let (mut data, _) = setup_square_with_chord();
        assert_eq!(split_support_plane(&mut data, 6).unwrap(), 1);
        assert_eq!(split_support_plane(&mut data, 6).unwrap(), 0);
    }

    #[test]
    fn crossing_lines_inside_a_face_are_cut_through() {
        let mut data = Registry::new(KernelCfg::default());
        let bbox = Bbox3 {
            min: Vector3::new(-1.0, -1.0, -1.0),
            max: Vector3::new(1.0, 1.0, 1.0),
        };
        data.add_bbox_polygons(&bbox, 1.0).unwrap();
        let square = vec![
            Vector3::new(-0.5, -0.5, 0.0),
            Vector3::new(0.5, -0.5, 0.0),
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(-0.5, 0.5, 0.0),
        ];
        let plane = data.add_polygon(&square, 0, 2).unwrap();
        // Two full lines through the square, chained as four sub-iedges
        // meeting at a central ivertex (the shape the pre-split pass
        // builds when seeds cross inside a face).
        let c = data.igraph.add_ivertex(Vector3::zeros(), [plane]);
        for tip in [
            Vector3::new(0.9, 0.0, 0.0),
            Vector3::new(-0.9, 0.0, 0.0),
            Vector3::new(0.0, 0.9, 0.0),
            Vector3::new(0.0, -0.9, 0.0),
        ] {
            let iv = data.igraph.add_ivertex(tip, [plane]);
            let ie = data.igraph.add_iedge(c, iv, [plane]);
            data.support_plane_mut(plane).iedges.insert(ie);
        }

        let cuts = split_support_plane(&mut data, plane).unwrap();
        assert_eq!(cuts, 3);
        assert_eq!(data.support_plane(plane).mesh.faces.len(), 4);
        // Every chord slider is carried by an iedge that contains it.
        for (_, v) in data.support_plane(plane).mesh.vertices() {
            if let Some(e) = v.iedge {
                let seg = data.segment_2(plane, e);
                let d = seg.to_vector();
                let t = ((v.point - seg.source).dot(&d) / d.norm_squared()).clamp(0.0, 1.0);
                assert!((seg.source + d * t - v.point).norm() < 1e-9);
            }
        }
        assert!(data.integrity().is_ok());
        assert_eq!(split_support_plane(&mut data, plane).unwrap(), 0);
    }

    #[test]
    fn edge_outside_face_does_not_cut() {
        let (mut data, _) = setup_square_with_chord();
        // Wall traces surround the polygon without crossing it.
        for seed in data.take_trace_seeds() {
            data.add_chained_iedges(&seed, &[]).unwrap();
        }
        // Only the synthetic chord cuts; the four traces do not.
        assert_eq!(split_support_plane(&mut data, 6).unwrap(), 1);
    }
}
