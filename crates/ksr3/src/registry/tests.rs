use nalgebra::{Vector2, Vector3};

use super::*;

fn unit_square_z0(radius: f64) -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(-radius, -radius, 0.0),
        Vector3::new(radius, -radius, 0.0),
        Vector3::new(radius, radius, 0.0),
        Vector3::new(-radius, radius, 0.0),
    ]
}

fn bbox_unit() -> Bbox3 {
    Bbox3 {
        min: Vector3::new(-1.0, -1.0, -1.0),
        max: Vector3::new(1.0, 1.0, 1.0),
    }
}

/// Registry with walls plus one square input polygon, traces chained.
fn setup_one_square() -> Registry {
    let mut data = Registry::new(KernelCfg::default());
    data.add_bbox_polygons(&bbox_unit(), 1.0).unwrap();
    data.add_polygon(&unit_square_z0(0.5), 0, 2).unwrap();
    for seed in data.take_trace_seeds() {
        data.add_chained_iedges(&seed, &[]).unwrap();
    }
    data
}

#[test]
fn bbox_cube_cardinalities() {
    let mut data = Registry::new(KernelCfg::default());
    data.add_bbox_polygons(&bbox_unit(), 1.1).unwrap();
    assert_eq!(data.num_support_planes(), 6);
    assert_eq!(data.igraph.num_ivertices(), 8);
    assert_eq!(data.igraph.num_iedges(), 12);
    assert!(data.integrity().is_ok());
    // Every wall vertex is frozen from the start.
    for plane in 0..6 {
        for pv in data.pvertices(plane) {
            assert!(data.is_frozen(pv));
        }
    }
    // Cube edges are shared by exactly two walls.
    for (_, edge) in data.igraph.iedges() {
        assert_eq!(edge.planes.len(), 2);
    }
}

#[test]
fn polygon_vertices_move_outward_from_centroid() {
    let mut data = Registry::new(KernelCfg::default());
    data.add_bbox_polygons(&bbox_unit(), 1.0).unwrap();
    let plane = data.add_polygon(&unit_square_z0(0.5), 0, 3).unwrap();
    assert_eq!(plane, 6);
    for pv in data.pvertices(plane) {
        let p0 = data.point_2(pv, 0.0).unwrap();
        let v = data.vertex(pv).unwrap();
        assert!(!v.frozen);
        // Frame origin is the centroid, so direction equals local position.
        assert!((v.direction - p0).norm() < 1e-12);
        assert!(data.speed(pv).unwrap() > 0.0);
        let pf = data.pface_of(pv).unwrap();
        assert_eq!(data.k(pf), 3);
    }
}

#[test]
fn wall_traces_chain_into_iedges() {
    let data = setup_one_square();
    // The z = 0 plane crosses the four side walls, not top or bottom.
    let traced: Vec<_> = data
        .igraph
        .iedges()
        .filter(|(_, e)| e.planes.contains(&6))
        .collect();
    assert_eq!(traced.len(), 4);
    for (id, edge) in &traced {
        assert!(data.support_plane(6).iedges.contains(id));
        let wall = edge.planes.iter().find(|&&p| p < 6).unwrap();
        assert!(data.support_plane(*wall).iedges.contains(id));
    }
    assert!(data.integrity().is_ok());
}

#[test]
fn trace_iedges_read_as_bbox_occupancy() {
    let data = setup_one_square();
    let pv = data.pvertices(6)[0];
    let trace = data
        .igraph
        .iedges()
        .find(|(_, e)| e.planes.contains(&6))
        .map(|(id, _)| id)
        .unwrap();
    let (collision, bbox_reached) = data.is_occupied(pv, trace);
    assert!(!collision);
    assert!(bbox_reached);
}

#[test]
fn crop_splits_corner_into_two_sliders() {
    let mut data = setup_one_square();
    let trace = data
        .igraph
        .iedges()
        .find(|(_, e)| e.planes.contains(&6))
        .map(|(id, _)| id)
        .unwrap();
    let pv = data.pvertices(6)[0];
    let face = data.pface_of(pv).unwrap();

    let pvnew = data.crop_polygon(pv, trace, 0.5).unwrap();
    assert_eq!(data.iedge_of(pv), Some(trace));
    assert_eq!(data.iedge_of(pvnew), Some(trace));
    assert_eq!(
        data.support_plane(6).mesh.face(face.face).vertices.len(),
        5
    );
    // Both sliders sit on the trace line at the crop time.
    let seg = data.segment_2(6, trace);
    let line_dir = seg.to_vector().normalize();
    for p in [pv, pvnew] {
        let rel = data.point_2(p, 0.5).unwrap() - seg.source;
        let off = rel - line_dir * rel.dot(&line_dir);
        assert!(off.norm() < 1e-9);
    }
    data.update_positions(0.5);
    assert!(data.integrity().is_ok());
}

#[test]
fn propagate_spawns_face_with_budget() {
    let mut data = setup_one_square();
    let trace = data
        .igraph
        .iedges()
        .find(|(_, e)| e.planes.contains(&6))
        .map(|(id, _)| id)
        .unwrap();
    let pv = data.pvertices(6)[0];
    let faces_before = data.support_plane(6).mesh.faces.len();

    let pvnew = data.propagate_polygon(1, pv, trace, 0.5).unwrap();
    assert_eq!(data.support_plane(6).mesh.faces.len(), faces_before + 1);
    // Sliders are constrained, the continuing corner is not.
    assert!(data.has_iedge(pvnew[0]));
    assert!(data.has_iedge(pvnew[1]));
    assert!(!data.has_iedge(pvnew[2]));
    let new_face = data.pface_of(pvnew[2]).unwrap();
    assert_eq!(data.k(new_face), 1);
    assert_eq!(
        data.support_plane(6)
            .mesh
            .face(new_face.face)
            .vertices
            .len(),
        3
    );
    data.update_positions(0.5);
    assert!(data.integrity().is_ok());
}

#[test]
fn transfer_constrains_the_free_vertex() {
    let mut data = setup_one_square();
    let trace = data
        .igraph
        .iedges()
        .find(|(_, e)| e.planes.contains(&6))
        .map(|(id, _)| id)
        .unwrap();
    let pv = data.pvertices(6)[0];
    data.crop_polygon(pv, trace, 0.5).unwrap();

    let (_, next) = data.prev_and_next(pv).unwrap();
    // pv's next is its slider twin; walk one further to reach a free vertex.
    let (_, free) = data.prev_and_next(next).unwrap();
    assert!(!data.has_iedge(free));
    assert!(data.transfer_vertex(pv, free, 0.6).unwrap());
    assert_eq!(data.iedge_of(free), Some(trace));
    // Transferred velocity is parallel to the edge.
    let seg = data.segment_2(6, trace);
    let d = data.vertex(free).unwrap().direction;
    let cross = d.x * seg.to_vector().y - d.y * seg.to_vector().x;
    assert!(cross.abs() < 1e-9 * seg.to_vector().norm().max(1.0));
}

#[test]
fn merge_with_budget_slides_through_the_ivertex() {
    let mut data = setup_one_square();
    // A line through the plane chained as two collinear iedges meeting
    // at an interior ivertex.
    let a = data.igraph.add_ivertex(Vector3::new(-0.8, 0.2, 0.0), [6]);
    let c = data.igraph.add_ivertex(Vector3::new(0.0, 0.2, 0.0), [6]);
    let b = data.igraph.add_ivertex(Vector3::new(0.8, 0.2, 0.0), [6]);
    let e_in = data.igraph.add_iedge(a, c, [6]);
    let e_out = data.igraph.add_iedge(c, b, [6]);
    data.support_plane_mut(6).iedges.insert(e_in);
    data.support_plane_mut(6).iedges.insert(e_out);

    // Aim one vertex so it slides along e_in and reaches c at t = 1.
    let target = data.ivertex_point_2(6, c);
    let from = data.ivertex_point_2(6, a);
    let d = (target - from).normalize();
    let pv = data.pvertices(6)[0];
    {
        let v = data.vertex_mut(pv).unwrap();
        v.point = target - d;
        v.direction = d;
        v.frozen = false;
        v.iedge = Some(e_in);
    }

    let around = data.pvertices_around_ivertex(pv, c, 1.0).unwrap();
    let (fresh, crossed) = data.merge_pvertices_on_ivertex(&around, c, 2, 1.0).unwrap();
    let kept = fresh[1];
    assert!(!data.is_frozen(kept));
    assert_eq!(data.iedge_of(kept), Some(e_out));
    assert!(crossed.contains(&e_in));
    // The continued trajectory still passes through the ivertex.
    assert!((data.point_2(kept, 1.0).unwrap() - target).norm() < 1e-9);
}

#[test]
fn merge_without_budget_freezes_at_the_ivertex() {
    let mut data = setup_one_square();
    let a = data.igraph.add_ivertex(Vector3::new(-0.8, 0.2, 0.0), [6]);
    let c = data.igraph.add_ivertex(Vector3::new(0.0, 0.2, 0.0), [6]);
    let b = data.igraph.add_ivertex(Vector3::new(0.8, 0.2, 0.0), [6]);
    let e_in = data.igraph.add_iedge(a, c, [6]);
    let e_out = data.igraph.add_iedge(c, b, [6]);
    data.support_plane_mut(6).iedges.insert(e_in);
    data.support_plane_mut(6).iedges.insert(e_out);

    let target = data.ivertex_point_2(6, c);
    let from = data.ivertex_point_2(6, a);
    let d = (target - from).normalize();
    let pv = data.pvertices(6)[0];
    {
        let v = data.vertex_mut(pv).unwrap();
        v.point = target - d;
        v.direction = d;
        v.frozen = false;
        v.iedge = Some(e_in);
    }

    let around = data.pvertices_around_ivertex(pv, c, 1.0).unwrap();
    let (fresh, crossed) = data.merge_pvertices_on_ivertex(&around, c, 1, 1.0).unwrap();
    assert!(crossed.is_empty());
    assert!(data.is_frozen(fresh[1]));
    assert!((data.point_2(fresh[1], 5.0).unwrap() - target).norm() < 1e-12);
}

#[test]
fn merge_collapses_run_to_frozen_vertex() {
    let mut data = setup_one_square();
    // Freeze the whole square onto one trace corner to fake an arrival.
    let iv = data
        .igraph
        .ivertices()
        .find(|(_, v)| v.planes.contains(&6))
        .map(|(id, _)| id)
        .unwrap();
    let target = data.ivertex_point_2(6, iv);
    let pvs = data.pvertices(6);
    // Move two adjacent vertices onto the ivertex.
    let pv = pvs[0];
    let (_, next) = data.prev_and_next(pv).unwrap();
    for p in [pv, next] {
        let v = data.vertex_mut(p).unwrap();
        v.point = target;
        v.direction = Vector2::zeros();
        v.frozen = true;
    }

    let around = data.pvertices_around_ivertex(pv, iv, 1.0).unwrap();
    assert!(around.len() >= 3);
    let (fresh, crossed) = data.merge_pvertices_on_ivertex(&around, iv, 1, 1.0).unwrap();
    assert!(crossed.is_empty());
    assert_eq!(fresh.len(), 3);
    let merged = fresh[1];
    assert!(data.is_frozen(merged));
    assert!((data.point_2(merged, 2.0).unwrap() - target).norm() < 1e-12);
    // The two outer vertices survive untouched.
    assert!(data.vertex(fresh[0]).is_ok());
    assert!(data.vertex(fresh[2]).is_ok());
}
