//! Numeric kernel for the kinetic partition.
//!
//! Purpose
//! - Provide the small set of 2D/3D types and eps-aware predicates the
//!   engine consumes: segments, bounding boxes, segment intersection,
//!   parallelism tests, plane-plane lines, bbox clipping.
//! - Centralize tolerances in `KernelCfg` so exact-leaning and loose
//!   configurations can be substituted and compared.
//!
//! Policy
//! - Ill-defined constructions (parallel lines, degenerate segments)
//!   return `None` rather than an error: a missed prediction only delays
//!   an event to the next time window, which is self-correcting.

pub mod rand;
mod predicates;
mod types;

pub use predicates::{
    are_parallel, clip_line_to_bbox, fit_plane, line_line_intersection, plane_plane_line,
    segment_intersection,
};
pub use types::{Bbox2, Bbox3, KernelCfg, Line2, Segment2, Segment3};
