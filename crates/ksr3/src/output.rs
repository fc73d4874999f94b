//! Extraction of the finished partition as simple geometry soups.

use nalgebra::Vector3;

use crate::error::{KsrError, KsrResult};
use crate::geom::Segment3;
use crate::registry::Registry;

/// All intersection edges as 3D segments.
pub fn partition_edges_to_segment_soup(data: &Registry) -> Vec<Segment3> {
    data.igraph
        .iedges()
        .map(|(id, _)| data.segment_3(id))
        .collect()
}

/// Every polygon face as a 3D corner loop, at the current simulation
/// time. `with_bbox` includes the six wall polygons.
pub fn partition_faces_to_polygon_soup(data: &Registry, with_bbox: bool) -> Vec<Vec<Vector3<f64>>> {
    let start = if with_bbox { 0 } else { 6 };
    let time = data.current_time();
    let mut soup = Vec::new();
    for plane in start..data.num_support_planes() {
        let sp = data.support_plane(plane);
        for face in &sp.mesh.faces {
            let mut loop3 = Vec::with_capacity(face.vertices.len());
            for &lv in &face.vertices {
                if let Some(v) = sp.mesh.get(lv) {
                    loop3.push(sp.to_3d(&v.point_at(time)));
                }
            }
            if loop3.len() >= 3 {
                soup.push(loop3);
            }
        }
    }
    soup
}

/// Volumetric cell extraction is not provided.
pub fn partition_polyhedrons(_data: &Registry) -> KsrResult<()> {
    Err(KsrError::NotImplemented {
        details: "polyhedron extraction from the partition",
    })
}
