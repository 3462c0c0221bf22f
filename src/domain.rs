use glam::DVec3;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Open,
    Periodic,
    Mirror,
}

impl BoundaryKind {
    pub fn is_closed(&self) -> bool {
        !matches!(self, BoundaryKind::Open)
    }
}

/// The simulation box together with its per-face boundary policy.
/// Positions of particles that cross a closed face are wrapped
/// (periodic) or reflected (mirror) back into the box.
#[derive(Debug, Clone)]
pub struct DomainBox {
    pub ndim: usize,
    pub boxmin: DVec3,
    pub boxmax: DVec3,
    /// `[dimension][side]`, side 0 = lhs face, side 1 = rhs face.
    pub boundaries: [[BoundaryKind; 2]; 3],
    pub periodic_gravity: bool,
}

fn periodic_wrap_component(v: f64, min: f64, max: f64) -> f64 {
    (v - min).rem_euclid(max - min) + min
}

fn minimize_component(v: f64, length: f64) -> f64 {
    if v < 0.0 {
        if v.abs() < (v + length).abs() {
            v
        } else {
            v + length
        }
    } else if v.abs() < (v - length).abs() {
        v
    } else {
        v - length
    }
}

impl DomainBox {
    pub fn new(
        ndim: usize,
        boxmin: DVec3,
        boxmax: DVec3,
        boundaries: [[BoundaryKind; 2]; 3],
    ) -> Self {
        let periodic_gravity =
            (0..ndim).all(|d| boundaries[d][0] == BoundaryKind::Periodic);
        Self {
            ndim,
            boxmin,
            boxmax,
            boundaries,
            periodic_gravity,
        }
    }

    pub fn open(ndim: usize, boxmin: DVec3, boxmax: DVec3) -> Self {
        Self::new(ndim, boxmin, boxmax, [[BoundaryKind::Open; 2]; 3])
    }

    pub fn boxsize(&self) -> DVec3 {
        self.boxmax - self.boxmin
    }

    pub fn any_closed_face(&self, d: usize) -> bool {
        self.boundaries[d][0].is_closed() || self.boundaries[d][1].is_closed()
    }

    pub fn all_periodic(&self) -> bool {
        (0..self.ndim).all(|d| self.boundaries[d][0] == BoundaryKind::Periodic)
    }

    /// Applies the per-face boundary policy to a position/velocity pair in a
    /// single sweep over dimensions and sides. Mirror faces reflect the
    /// position and flip the velocity component.
    pub fn wrap_or_reflect(&self, r: &mut DVec3, v: &mut DVec3) {
        for d in 0..self.ndim {
            let min = self.boxmin[d];
            let max = self.boxmax[d];
            if r[d] < min {
                match self.boundaries[d][0] {
                    BoundaryKind::Open => {}
                    BoundaryKind::Periodic => {
                        r[d] = periodic_wrap_component(r[d], min, max);
                    }
                    BoundaryKind::Mirror => {
                        r[d] = 2.0 * min - r[d];
                        v[d] = -v[d];
                    }
                }
            } else if r[d] > max {
                match self.boundaries[d][1] {
                    BoundaryKind::Open => {}
                    BoundaryKind::Periodic => {
                        r[d] = periodic_wrap_component(r[d], min, max);
                    }
                    BoundaryKind::Mirror => {
                        r[d] = 2.0 * max - r[d];
                        v[d] = -v[d];
                    }
                }
            }
        }
    }

    /// Displacement `p1 - p2` minimized over periodic images on periodic
    /// axes.
    pub fn nearest_image_vec(&self, p1: DVec3, p2: DVec3) -> DVec3 {
        let mut dist = p1 - p2;
        let side_lengths = self.boxsize();
        for d in 0..self.ndim {
            if self.boundaries[d][0] == BoundaryKind::Periodic {
                dist[d] = minimize_component(dist[d], side_lengths[d]);
            }
        }
        dist
    }

    pub fn nearest_image_distance(&self, p1: DVec3, p2: DVec3) -> f64 {
        self.nearest_image_vec(p1, p2).length()
    }

    /// True if `r` lies inside the box on every dimension whose either face
    /// is closed.
    pub fn contains_on_closed_axes(&self, r: DVec3) -> bool {
        (0..self.ndim).all(|d| {
            !self.any_closed_face(d) || (self.boxmin[d] <= r[d] && r[d] <= self.boxmax[d])
        })
    }
}
