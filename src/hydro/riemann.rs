use glam::DVec3;

/// Primitive state handed to the Riemann solver, in the frame of the
/// interface.
#[derive(Debug, Clone, Copy)]
pub struct FaceState {
    pub rho: f64,
    pub vel: DVec3,
    pub press: f64,
}

/// Flux of the conserved vector [mass, momentum, total energy] per unit
/// interface area.
#[derive(Debug, Clone, Copy)]
pub struct Flux {
    pub mass: f64,
    pub momentum: DVec3,
    pub energy: f64,
}

/// Interface flux between two reconstructed states along the unit
/// normal. The default solver is HLLC (Toro), which restores the contact
/// wave that plain HLL smears out.
pub trait RiemannSolver: Sync {
    fn flux(&self, left: &FaceState, right: &FaceState, normal: DVec3) -> Flux;
}

pub struct Hllc {
    pub gamma: f64,
}

impl Hllc {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }

    fn physical_flux(&self, state: &FaceState, normal: DVec3) -> Flux {
        let vn = state.vel.dot(normal);
        let energy = self.total_energy(state);
        Flux {
            mass: state.rho * vn,
            momentum: state.rho * state.vel * vn + state.press * normal,
            energy: (energy + state.press) * vn,
        }
    }

    fn total_energy(&self, state: &FaceState) -> f64 {
        state.press / (self.gamma - 1.0) + 0.5 * state.rho * state.vel.length_squared()
    }

    fn star_flux(
        &self,
        state: &FaceState,
        normal: DVec3,
        s_wave: f64,
        s_star: f64,
    ) -> Flux {
        let vn = state.vel.dot(normal);
        let flux = self.physical_flux(state, normal);
        let factor = state.rho * (s_wave - vn) / (s_wave - s_star);
        let energy = self.total_energy(state);
        let energy_star = factor
            * (energy / state.rho
                + (s_star - vn) * (s_star + state.press / (state.rho * (s_wave - vn))));
        let momentum_star = factor * (state.vel + (s_star - vn) * normal);
        Flux {
            mass: flux.mass + s_wave * (factor - state.rho),
            momentum: flux.momentum + s_wave * (momentum_star - state.rho * state.vel),
            energy: flux.energy + s_wave * (energy_star - energy),
        }
    }
}

impl RiemannSolver for Hllc {
    fn flux(&self, left: &FaceState, right: &FaceState, normal: DVec3) -> Flux {
        let vnl = left.vel.dot(normal);
        let vnr = right.vel.dot(normal);
        let al = (self.gamma * left.press / left.rho).sqrt();
        let ar = (self.gamma * right.press / right.rho).sqrt();
        let s_left = (vnl - al).min(vnr - ar);
        let s_right = (vnl + al).max(vnr + ar);
        let denominator = left.rho * (s_left - vnl) - right.rho * (s_right - vnr);
        let s_star = if denominator.abs() < f64::MIN_POSITIVE {
            0.0
        } else {
            (right.press - left.press + left.rho * vnl * (s_left - vnl)
                - right.rho * vnr * (s_right - vnr))
                / denominator
        };
        if s_left >= 0.0 {
            self.physical_flux(left, normal)
        } else if s_star >= 0.0 {
            self.star_flux(left, normal, s_left, s_star)
        } else if s_right >= 0.0 {
            self.star_flux(right, normal, s_right, s_star)
        } else {
            self.physical_flux(right, normal)
        }
    }
}
