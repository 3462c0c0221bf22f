use glam::DVec3;

/// Long-range periodic correction collaborator: given a source mass and
/// the nearest-image displacement from sink to source, returns the
/// acceleration and potential contribution of all other periodic images.
pub trait EwaldCorrection: Sync {
    fn correction(&self, m: f64, dr: DVec3) -> (DVec3, f64);
}

/// Truncated real-space replica sum: the images of the source in the
/// shells |n| <= nrep around the primary box, excluding the primary
/// nearest image itself (which the direct sum already carries).
pub struct ReplicaEwald {
    boxsize: DVec3,
    ndim: usize,
    nrep: i32,
}

impl ReplicaEwald {
    pub fn new(boxsize: DVec3, ndim: usize, nrep: i32) -> Self {
        Self {
            boxsize,
            ndim,
            nrep,
        }
    }
}

impl EwaldCorrection for ReplicaEwald {
    fn correction(&self, m: f64, dr: DVec3) -> (DVec3, f64) {
        let mut accel = DVec3::ZERO;
        let mut pot = 0.0;
        let reps = |d: usize| {
            if d < self.ndim {
                -self.nrep..=self.nrep
            } else {
                0..=0
            }
        };
        for nx in reps(0) {
            for ny in reps(1) {
                for nz in reps(2) {
                    if nx == 0 && ny == 0 && nz == 0 {
                        continue;
                    }
                    let image = dr
                        + DVec3::new(
                            nx as f64 * self.boxsize.x,
                            ny as f64 * self.boxsize.y,
                            nz as f64 * self.boxsize.z,
                        );
                    let dist = image.length();
                    if dist > 0.0 {
                        accel += m * image / (dist * dist * dist);
                        pot += m / dist;
                    }
                }
            }
        }
        (accel, pot)
    }
}
