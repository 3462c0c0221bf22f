use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use glam::DVec3;

use crate::domain::DomainBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleType {
    Gas,
    Dust,
    Cdm,
    Dead,
}

/// Per-axis piece of a ghost transform. A ghost created from a particle
/// near the lhs face carries the lhs op on that axis; corner and edge
/// ghosts carry ops on several axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOp {
    #[default]
    None,
    PeriodicLhs,
    PeriodicRhs,
    MirrorLhs,
    MirrorRhs,
}

/// The ghost type: which face/transform created the ghost. The position
/// and velocity transform is determined solely by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GhostType {
    pub ops: [AxisOp; 3],
}

impl GhostType {
    pub fn real() -> Self {
        Self::default()
    }

    pub fn is_real(&self) -> bool {
        self.ops.iter().all(|op| *op == AxisOp::None)
    }

    pub fn with_op(mut self, d: usize, op: AxisOp) -> Self {
        self.ops[d] = op;
        self
    }

    /// Applies the transform to a parent state in place.
    pub fn apply(&self, box_: &DomainBox, r: &mut DVec3, v: &mut DVec3) {
        for d in 0..3 {
            match self.ops[d] {
                AxisOp::None => {}
                AxisOp::PeriodicLhs => r[d] += box_.boxsize()[d],
                AxisOp::PeriodicRhs => r[d] -= box_.boxsize()[d],
                AxisOp::MirrorLhs => {
                    r[d] = 2.0 * box_.boxmin[d] - r[d];
                    v[d] = -v[d];
                }
                AxisOp::MirrorRhs => {
                    r[d] = 2.0 * box_.boxmax[d] - r[d];
                    v[d] = -v[d];
                }
            }
        }
    }
}

/// Extra state carried by the meshless finite-volume dialect. Primitive
/// and conservative vectors are laid out as [rho, vx, vy, vz, p-or-E].
pub const NVAR: usize = 5;
pub const IRHO: usize = 0;
pub const IVX: usize = 1;
pub const IPRESS: usize = 4;

#[derive(Debug, Clone)]
pub struct MfvState {
    pub volume: f64,
    pub wprim: [f64; NVAR],
    pub qcons: [f64; NVAR],
    pub dqdt: [f64; NVAR],
    pub grad: [DVec3; NVAR],
    pub wmin: [f64; NVAR],
    pub wmax: [f64; NVAR],
    pub wmidmin: [f64; NVAR],
    pub wmidmax: [f64; NVAR],
    pub bmatrix: [[f64; 3]; 3],
}

impl Default for MfvState {
    fn default() -> Self {
        Self {
            volume: 0.0,
            wprim: [0.0; NVAR],
            qcons: [0.0; NVAR],
            dqdt: [0.0; NVAR],
            grad: [DVec3::ZERO; NVAR],
            wmin: [0.0; NVAR],
            wmax: [0.0; NVAR],
            wmidmin: [0.0; NVAR],
            wmidmax: [0.0; NVAR],
            bmatrix: [[0.0; 3]; 3],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Particle {
    pub id: usize,
    /// For ghosts, the index of the real particle this is an image of.
    pub iorig: usize,
    pub ptype: ParticleType,
    pub ghost: GhostType,
    pub active: bool,
    pub r: DVec3,
    pub v: DVec3,
    pub a: DVec3,
    pub m: f64,
    pub u: f64,
    pub dudt: f64,
    pub h: f64,
    pub rho: f64,
    /// Kernel number density, sum of W over neighbours.
    pub ndens: f64,
    /// Inverse grad-h correction factor.
    pub invomega: f64,
    /// Grad-h gravity correction.
    pub zeta: f64,
    /// Gravitational potential, positive convention.
    pub gpot: f64,
    /// Artificial viscosity coefficient.
    pub alpha: f64,
    pub sound: f64,
    pub press: f64,
    /// Maximum signal velocity over neighbours, set by the force loops.
    pub vsig: f64,
    /// Block timestep level.
    pub level: usize,
    pub sink_id: i64,
    /// No neighbour within kernel reach has a deeper potential.
    pub potmin: bool,
    pub mfv: MfvState,
}

impl Particle {
    pub fn new(id: usize, r: DVec3, v: DVec3, m: f64, u: f64) -> Self {
        Self {
            id,
            iorig: id,
            ptype: ParticleType::Gas,
            ghost: GhostType::real(),
            active: true,
            r,
            v,
            a: DVec3::ZERO,
            m,
            u,
            dudt: 0.0,
            h: 0.0,
            rho: 0.0,
            ndens: 0.0,
            invomega: 1.0,
            zeta: 0.0,
            gpot: 0.0,
            alpha: 0.0,
            sound: 0.0,
            press: 0.0,
            vsig: 0.0,
            level: 0,
            sink_id: -1,
            potmin: false,
            mfv: MfvState::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.ptype != ParticleType::Dead
    }

    /// Keeps the primitive velocity in sync with the particle velocity
    /// after a ghost transform flipped components.
    pub fn sync_primitive_velocity(&mut self) {
        self.mfv.wprim[IVX] = self.v.x;
        self.mfv.wprim[IVX + 1] = self.v.y;
        self.mfv.wprim[IVX + 2] = self.v.z;
    }

    /// Reflects the stored gradients through the mirror planes of a
    /// ghost transform: every gradient flips its mirrored spatial
    /// component, and the gradient of a mirrored velocity component
    /// flips as a whole because its value changes sign.
    pub fn reflect_gradients(&mut self, ghost: &GhostType) {
        for d in 0..3 {
            if matches!(ghost.ops[d], AxisOp::MirrorLhs | AxisOp::MirrorRhs) {
                for alpha in 0..NVAR {
                    self.mfv.grad[alpha][d] = -self.mfv.grad[alpha][d];
                }
                self.mfv.grad[IVX + d] = -self.mfv.grad[IVX + d];
            }
        }
    }

    pub fn is_ghost(&self) -> bool {
        !self.ghost.is_real()
    }
}

/// Owns the particle array. Real particles occupy [0, nhydro); ghosts are
/// appended into the tail [nhydro, nhydro + nghost) and regenerated every
/// step. The `levelneib` array is shared across force workers and reduced
/// with atomic max.
pub struct ParticleStore {
    parts: Vec<Particle>,
    nhydro: usize,
    nghost: usize,
    nhydromax: usize,
    levelneib: Vec<AtomicUsize>,
}

impl ParticleStore {
    pub fn new(particles: Vec<Particle>, nhydromax: usize) -> Self {
        let nhydro = particles.len();
        let nhydromax = nhydromax.max(nhydro);
        let levelneib = (0..nhydro).map(|_| AtomicUsize::new(0)).collect();
        Self {
            parts: particles,
            nhydro,
            nghost: 0,
            nhydromax,
            levelneib,
        }
    }

    pub fn nhydro(&self) -> usize {
        self.nhydro
    }

    pub fn nghost(&self) -> usize {
        self.nghost
    }

    pub fn ntot(&self) -> usize {
        self.nhydro + self.nghost
    }

    pub fn ghost_capacity(&self) -> usize {
        self.nhydromax - self.nhydro
    }

    pub fn parts(&self) -> &[Particle] {
        &self.parts[..self.ntot()]
    }

    pub fn parts_mut(&mut self) -> &mut [Particle] {
        let ntot = self.ntot();
        &mut self.parts[..ntot]
    }

    pub fn real(&self) -> &[Particle] {
        &self.parts[..self.nhydro]
    }

    pub fn real_mut(&mut self) -> &mut [Particle] {
        &mut self.parts[..self.nhydro]
    }

    pub fn ghosts(&self) -> &[Particle] {
        &self.parts[self.nhydro..self.ntot()]
    }

    pub fn clear_ghosts(&mut self) {
        self.parts.truncate(self.nhydro);
        self.nghost = 0;
    }

    /// Appends a ghost; returns false when the tail is full.
    pub fn push_ghost(&mut self, ghost: Particle) -> bool {
        if self.ntot() >= self.nhydromax {
            return false;
        }
        self.parts.push(ghost);
        self.nghost += 1;
        true
    }

    pub fn active_real_indices(&self) -> Vec<usize> {
        (0..self.nhydro)
            .filter(|i| self.parts[*i].active && self.parts[*i].is_alive())
            .collect()
    }

    pub fn reset_levelneib(&mut self) {
        for entry in &self.levelneib {
            entry.store(0, Ordering::Relaxed);
        }
    }

    /// Records that real particle `i` interacts with a neighbour on
    /// `level`. Safe to call concurrently from force workers.
    pub fn record_levelneib(&self, i: usize, level: usize) {
        self.levelneib[i].fetch_max(level, Ordering::Relaxed);
    }

    pub fn levelneib(&self, i: usize) -> usize {
        self.levelneib[i].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::AxisOp;
    use super::GhostType;
    use super::Particle;
    use super::ParticleStore;
    use crate::domain::BoundaryKind;
    use crate::domain::DomainBox;
    use crate::test_utils::assert_float_is_close;

    fn unit_box() -> DomainBox {
        DomainBox::new(
            3,
            DVec3::ZERO,
            DVec3::ONE,
            [[BoundaryKind::Periodic; 2]; 3],
        )
    }

    #[test]
    fn ghost_transform_composes_across_axes() {
        let box_ = unit_box();
        let ghost = GhostType::real()
            .with_op(0, AxisOp::PeriodicLhs)
            .with_op(1, AxisOp::MirrorRhs);
        let mut r = DVec3::new(0.1, 0.9, 0.5);
        let mut v = DVec3::new(1.0, 2.0, 3.0);
        ghost.apply(&box_, &mut r, &mut v);
        assert_float_is_close(r.x, 1.1);
        assert_float_is_close(r.y, 1.1);
        assert_float_is_close(r.z, 0.5);
        assert_float_is_close(v.x, 1.0);
        assert_float_is_close(v.y, -2.0);
    }

    #[test]
    fn ghost_tail_respects_capacity() {
        let particles = vec![Particle::new(0, DVec3::ZERO, DVec3::ZERO, 1.0, 1.0)];
        let mut store = ParticleStore::new(particles, 2);
        let mut ghost = store.parts()[0].clone();
        ghost.ghost = GhostType::real().with_op(0, AxisOp::PeriodicLhs);
        assert!(store.push_ghost(ghost.clone()));
        assert!(!store.push_ghost(ghost));
        assert_eq!(store.nghost(), 1);
        store.clear_ghosts();
        assert_eq!(store.ntot(), 1);
    }

    #[test]
    fn levelneib_reduces_with_max() {
        let particles = vec![Particle::new(0, DVec3::ZERO, DVec3::ZERO, 1.0, 1.0)];
        let mut store = ParticleStore::new(particles, 4);
        store.record_levelneib(0, 2);
        store.record_levelneib(0, 5);
        store.record_levelneib(0, 3);
        assert_eq!(store.levelneib(0), 5);
        store.reset_levelneib();
        assert_eq!(store.levelneib(0), 0);
    }
}
