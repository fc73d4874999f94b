//! Kinetic space partitioning.
//!
//! Input polygons are extended on their support planes inside an
//! enlarged bounding box until they collide with each other and the box
//! walls, cutting the box into convex cells. The process is an
//! event-driven simulation: polygon vertices move with constant
//! velocities, and a time-ordered queue of predicted collisions drives
//! all structural changes.
//!
//! Entry point: [`engine::KineticEngine::partition`]. Results are read
//! back through [`output`].

pub mod engine;
pub mod error;
pub mod event;
pub mod geom;
pub mod igraph;
pub mod mesh;
pub mod output;
pub mod registry;
pub mod splitter;
pub mod support_plane;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use engine::{KineticEngine, PartitionCfg};
pub use error::{KsrError, KsrResult};

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::engine::{KineticEngine, PartitionCfg};
    pub use crate::error::{KsrError, KsrResult};
    pub use crate::geom::rand::{draw_polygon_3, PolyCfg, ReplayToken};
    pub use crate::geom::{Bbox3, KernelCfg, Segment3};
    pub use crate::output::{
        partition_edges_to_segment_soup, partition_faces_to_polygon_soup, partition_polyhedrons,
    };
    pub use crate::registry::{PFace, PVertex, Registry};
    pub use nalgebra::{Vector2 as Vec2, Vector3 as Vec3};
}
