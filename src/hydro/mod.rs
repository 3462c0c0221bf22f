pub mod gradh_sph;
pub mod mfv;
pub mod riemann;

use glam::DVec3;

use crate::particles::NVAR;

/// Per-particle result of a hydro force phase, gathered per cell and
/// applied to the store after the barrier.
#[derive(Debug, Clone)]
pub struct ForceUpdate {
    pub idx: usize,
    pub a: DVec3,
    pub dudt: f64,
    pub vsig: f64,
}

/// Scatter contribution of a pair-once flux phase: a rate-of-change for
/// an arbitrary particle, active or not. `owner_level` is the timestep
/// level of the side that processed the pair; both entries of a pair
/// carry the same value so the exchange integrates identically on both
/// sides.
#[derive(Debug, Clone)]
pub struct FluxUpdate {
    pub idx: usize,
    pub dqdt: [f64; NVAR],
    pub owner_level: usize,
    pub vsig: f64,
}

/// Artificial dissipation configuration for the SPH dialect.
#[derive(Debug, Clone)]
pub struct Dissipation {
    pub avisc: crate::parameters::AviscKind,
    pub acond: crate::parameters::AcondKind,
    pub beta: f64,
}
