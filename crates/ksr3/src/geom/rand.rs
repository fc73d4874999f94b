//! Random convex polygons on random 3D planes (replay tokens).
//!
//! Deterministic sampler used by property tests and benchmarks: draw a
//! radial-jitter convex polygon in 2D, embed it on a randomly oriented
//! plane through a random center. Determinism uses a replay token
//! `(seed, index)` mixed into a single RNG.

use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sampler configuration.
#[derive(Clone, Copy, Debug)]
pub struct PolyCfg {
    /// Number of polygon vertices (clamped to >= 3).
    pub vertices: usize,
    /// Base circumradius before jitter.
    pub radius: f64,
    /// Radial jitter amplitude relative to `radius`.
    pub radial_jitter: f64,
    /// Polygon centers are drawn uniformly in `[-center_spread, center_spread]^3`.
    pub center_spread: f64,
}

impl Default for PolyCfg {
    fn default() -> Self {
        Self {
            vertices: 6,
            radius: 1.0,
            radial_jitter: 0.25,
            center_spread: 0.5,
        }
    }
}

/// Replay token to make draws reproducible and indexable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayToken {
    pub seed: u64,
    pub index: u64,
}

impl ReplayToken {
    #[inline]
    fn to_std_rng(self) -> StdRng {
        // SplitMix64-style mixing, cheap and stable.
        fn mix(mut x: u64) -> u64 {
            x ^= x >> 30;
            x = x.wrapping_mul(0xbf58476d1ce4e5b9);
            x ^= x >> 27;
            x = x.wrapping_mul(0x94d049bb133111eb);
            x ^ (x >> 31)
        }
        let k = mix(self.seed ^ mix(self.index.wrapping_add(0x9e3779b97f4a7c15)));
        StdRng::seed_from_u64(k)
    }
}

/// Draw a convex polygon embedded in 3D (CCW seen from its normal).
pub fn draw_polygon_3(cfg: PolyCfg, tok: ReplayToken) -> Vec<Vector3<f64>> {
    let mut rng = tok.to_std_rng();
    let n = cfg.vertices.max(3);
    let rj = cfg.radial_jitter.max(0.0);
    let r0 = cfg.radius.max(1e-9);

    // Random orthonormal frame.
    let normal = random_unit(&mut rng);
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = normal.cross(&helper).normalize();
    let v = normal.cross(&u);
    let s = cfg.center_spread;
    let center = Vector3::new(
        rng.gen_range(-s..=s),
        rng.gen_range(-s..=s),
        rng.gen_range(-s..=s),
    );

    // Sorted angles keep the polygon convex (star-shaped radial model).
    let delta = std::f64::consts::TAU / (n as f64);
    (0..n)
        .map(|k| {
            let theta = (k as f64) * delta;
            let r = r0 * (1.0 + (rng.gen::<f64>() * 2.0 - 1.0) * rj);
            let p2 = Vector2::new(theta.cos(), theta.sin()) * r;
            center + u * p2.x + v * p2.y
        })
        .collect()
}

fn random_unit<R: Rng>(rng: &mut R) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen::<f64>() * 2.0 - 1.0,
            rng.gen::<f64>() * 2.0 - 1.0,
            rng.gen::<f64>() * 2.0 - 1.0,
        );
        let n = v.norm();
        if n > 1e-3 && n <= 1.0 {
            return v / n;
        }
    }
}
