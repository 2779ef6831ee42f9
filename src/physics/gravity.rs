//! Pairwise gravity for the massive pool and the one-way massless pass.
//!
//! The force law is picked once at setup and applied through a single
//! pairwise factor, so every integrator path uses the same strategy.

use bevy::math::DVec3;
use wide::f64x4;

/// Squared separation floor used inside the SIMD lanes.
///
/// Padding lanes carry zero mass at the origin; the floor keeps their
/// factor finite so `0 * factor` stays zero instead of NaN.
const LANE_FLOOR_SQ: f64 = 1e-100;

/// Closed set of pairwise force laws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceLaw {
    /// Acceleration ∝ 1/r²
    #[default]
    Newtonian,
    /// Acceleration ∝ 1/r
    InverseR,
    /// Acceleration ∝ 1/r³
    InverseR3,
}

impl ForceLaw {
    /// Factor `k` so that the acceleration toward a source with parameter
    /// `gm` along separation `delta` is `delta * gm * k`.
    #[inline]
    pub fn factor(self, r_sq: f64) -> f64 {
        match self {
            ForceLaw::Newtonian => 1.0 / (r_sq * r_sq.sqrt()),
            ForceLaw::InverseR => 1.0 / r_sq,
            ForceLaw::InverseR3 => 1.0 / (r_sq * r_sq),
        }
    }

    #[inline]
    fn factor_wide(self, r_sq: f64x4) -> f64x4 {
        let one = f64x4::splat(1.0);
        match self {
            ForceLaw::Newtonian => one / (r_sq * r_sq.sqrt()),
            ForceLaw::InverseR => one / r_sq,
            ForceLaw::InverseR3 => one / (r_sq * r_sq),
        }
    }

    /// Pair potential per unit `G·m₁·m₂` at separation `r`.
    ///
    /// Consistent with [`factor`](Self::factor): the attraction is −dU/dr.
    pub fn potential(self, r: f64) -> f64 {
        match self {
            ForceLaw::Newtonian => -1.0 / r,
            ForceLaw::InverseR => r.ln(),
            ForceLaw::InverseR3 => -0.5 / (r * r),
        }
    }
}

/// Compute accelerations of all massive bodies from each other.
///
/// O(n²) over unordered pairs, applying Newton's third law to each pair.
///
/// # Arguments
/// * `positions` - Positions of the massive pool
/// * `gms` - G·m for each body, same order as `positions`
/// * `law` - Force law
/// * `min_sep_sq` - Squared separation floor
/// * `out` - Output accelerations (overwritten)
pub fn massive_accelerations(
    positions: &[DVec3],
    gms: &[f64],
    law: ForceLaw,
    min_sep_sq: f64,
    out: &mut [DVec3],
) {
    debug_assert_eq!(positions.len(), gms.len());
    debug_assert_eq!(positions.len(), out.len());

    out.fill(DVec3::ZERO);
    let floor = min_sep_sq.max(LANE_FLOOR_SQ);

    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let delta = positions[j] - positions[i];
            let r_sq = delta.length_squared().max(floor);
            let k = law.factor(r_sq);
            // delta points from i to j: i is pulled along +delta, j along -delta
            out[i] += delta * (gms[j] * k);
            out[j] -= delta * (gms[i] * k);
        }
    }
}

/// Structure-of-arrays view of the massive pool for the massless pass.
///
/// Sources are packed four per lane group and padded with zero mass.
#[derive(Clone, Debug, Default)]
pub struct SourceLanes {
    x: Vec<f64x4>,
    y: Vec<f64x4>,
    z: Vec<f64x4>,
    gm: Vec<f64x4>,
    count: usize,
}

impl SourceLanes {
    /// Repack the lanes from `(position, gm)` pairs, reusing allocations.
    pub fn load(&mut self, sources: &[(DVec3, f64)]) {
        let groups = sources.len().div_ceil(4);
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.gm.clear();
        self.count = sources.len();

        for group in 0..groups {
            let mut x = [0.0; 4];
            let mut y = [0.0; 4];
            let mut z = [0.0; 4];
            let mut gm = [0.0; 4];
            for lane in 0..4 {
                if let Some(&(pos, source_gm)) = sources.get(group * 4 + lane) {
                    x[lane] = pos.x;
                    y[lane] = pos.y;
                    z[lane] = pos.z;
                    gm[lane] = source_gm;
                }
            }
            self.x.push(f64x4::new(x));
            self.y.push(f64x4::new(y));
            self.z.push(f64x4::new(z));
            self.gm.push(f64x4::new(gm));
        }
    }

    /// Number of real (unpadded) sources.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Acceleration at `pos` from all loaded sources.
    #[inline]
    pub fn acceleration(&self, pos: DVec3, law: ForceLaw, min_sep_sq: f64) -> DVec3 {
        let px = f64x4::splat(pos.x);
        let py = f64x4::splat(pos.y);
        let pz = f64x4::splat(pos.z);
        let floor = f64x4::splat(min_sep_sq.max(LANE_FLOOR_SQ));

        let mut ax = f64x4::ZERO;
        let mut ay = f64x4::ZERO;
        let mut az = f64x4::ZERO;

        for i in 0..self.x.len() {
            let dx = self.x[i] - px;
            let dy = self.y[i] - py;
            let dz = self.z[i] - pz;
            let r_sq = (dx * dx + dy * dy + dz * dz).max(floor);
            let scale = self.gm[i] * law.factor_wide(r_sq);
            ax += dx * scale;
            ay += dy * scale;
            az += dz * scale;
        }

        let ax = ax.to_array();
        let ay = ay.to_array();
        let az = az.to_array();
        DVec3::new(
            (ax[0] + ax[1]) + (ax[2] + ax[3]),
            (ay[0] + ay[1]) + (ay[2] + ay[3]),
            (az[0] + az[1]) + (az[2] + az[3]),
        )
    }
}

/// Scalar reference for the massless acceleration, used to check the lanes.
pub fn acceleration_from_sources(
    pos: DVec3,
    sources: &[(DVec3, f64)],
    law: ForceLaw,
    min_sep_sq: f64,
) -> DVec3 {
    let floor = min_sep_sq.max(LANE_FLOOR_SQ);
    let mut acc = DVec3::ZERO;
    for &(body_pos, gm) in sources {
        let delta = body_pos - pos;
        let r_sq = delta.length_squared().max(floor);
        acc += delta * (gm * law.factor(r_sq));
    }
    acc
}
