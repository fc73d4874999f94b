//! Basic 2D/3D types and tolerances.
//!
//! - `KernelCfg`: centralizes epsilons for determinants, feasibility,
//!   parallelism, and point-merge radius.
//! - `Segment2`/`Segment3`: closed segments with convenience measures.
//! - `Bbox2`/`Bbox3`: axis-aligned boxes with overlap/enlarge helpers.

use nalgebra::{Vector2, Vector3};

/// Kernel configuration (tolerances).
#[derive(Clone, Copy, Debug)]
pub struct KernelCfg {
    /// Below this a 2x2 determinant counts as singular.
    pub eps_det: f64,
    /// Slack for inclusive interval/containment tests.
    pub eps_feas: f64,
    /// Cross-product tolerance for the direction parallelism test.
    pub eps_parallel: f64,
    /// Radius within which two points are considered the same vertex.
    pub eps_merge: f64,
}

impl Default for KernelCfg {
    fn default() -> Self {
        Self {
            eps_det: 1e-12,
            eps_feas: 1e-9,
            eps_parallel: 1e-5,
            eps_merge: 1e-7,
        }
    }
}

/// Closed 2D segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment2 {
    pub source: Vector2<f64>,
    pub target: Vector2<f64>,
}

impl Segment2 {
    #[inline]
    pub fn new(source: Vector2<f64>, target: Vector2<f64>) -> Self {
        Self { source, target }
    }
    #[inline]
    pub fn to_vector(&self) -> Vector2<f64> {
        self.target - self.source
    }
    #[inline]
    pub fn squared_length(&self) -> f64 {
        self.to_vector().norm_squared()
    }
    #[inline]
    pub fn bbox(&self) -> Bbox2 {
        Bbox2 {
            min: Vector2::new(
                self.source.x.min(self.target.x),
                self.source.y.min(self.target.y),
            ),
            max: Vector2::new(
                self.source.x.max(self.target.x),
                self.source.y.max(self.target.y),
            ),
        }
    }
}

/// Closed 3D segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment3 {
    pub source: Vector3<f64>,
    pub target: Vector3<f64>,
}

impl Segment3 {
    #[inline]
    pub fn new(source: Vector3<f64>, target: Vector3<f64>) -> Self {
        Self { source, target }
    }
}

/// 2D line `origin + t * dir` (dir need not be unit).
#[derive(Clone, Copy, Debug)]
pub struct Line2 {
    pub origin: Vector2<f64>,
    pub dir: Vector2<f64>,
}

impl Line2 {
    #[inline]
    pub fn through(a: Vector2<f64>, b: Vector2<f64>) -> Self {
        Self {
            origin: a,
            dir: b - a,
        }
    }
    #[inline]
    pub fn at(&self, t: f64) -> Vector2<f64> {
        self.origin + self.dir * t
    }
}

/// Axis-aligned 2D box.
#[derive(Clone, Copy, Debug)]
pub struct Bbox2 {
    pub min: Vector2<f64>,
    pub max: Vector2<f64>,
}

impl Bbox2 {
    #[inline]
    pub fn overlaps(&self, other: &Bbox2, eps: f64) -> bool {
        self.min.x <= other.max.x + eps
            && other.min.x <= self.max.x + eps
            && self.min.y <= other.max.y + eps
            && other.min.y <= self.max.y + eps
    }
}

/// Axis-aligned 3D box.
#[derive(Clone, Copy, Debug)]
pub struct Bbox3 {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Bbox3 {
    /// Tight box around a point cloud. `None` on an empty input.
    pub fn from_points<'a, I: IntoIterator<Item = &'a Vector3<f64>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bb = Bbox3 {
            min: first,
            max: first,
        };
        for p in iter {
            bb.min = bb.min.inf(p);
            bb.max = bb.max.sup(p);
        }
        Some(bb)
    }

    /// Grow each half-extent by `ratio` around the box center.
    pub fn enlarged(&self, ratio: f64) -> Bbox3 {
        let center = (self.min + self.max) * 0.5;
        let half = (self.max - self.min) * 0.5 * ratio;
        Bbox3 {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }

    /// The eight corners, x fastest-varying last.
    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    #[inline]
    pub fn contains(&self, p: &Vector3<f64>, eps: f64) -> bool {
        p.x >= self.min.x - eps
            && p.x <= self.max.x + eps
            && p.y >= self.min.y - eps
            && p.y <= self.max.y + eps
            && p.z >= self.min.z - eps
            && p.z <= self.max.z + eps
    }
}
