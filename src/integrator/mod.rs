pub mod levels;

pub use levels::LevelLadder;

use crate::domain::DomainBox;
use crate::parameters::IntegrationKind;
use crate::parameters::SimulationParameters;
use crate::particles::Particle;
use crate::particles::ParticleStore;

/// Symplectic block-timestep integration: per-particle candidate
/// timesteps from the Courant, acceleration and energy conditions,
/// rounded down onto the power-of-two ladder, with hysteresis on
/// lengthening and the neighbour-level discipline on shortening.
pub struct Integrator {
    pub kind: IntegrationKind,
    pub ladder: LevelLadder,
    courant_mult: f64,
    accel_mult: f64,
    energy_mult: f64,
    single_timestep: bool,
}

impl Integrator {
    pub fn new(parameters: &SimulationParameters) -> Self {
        Self {
            kind: parameters.sph_integration,
            ladder: LevelLadder::new(parameters.nlevels),
            courant_mult: parameters.courant_mult,
            accel_mult: parameters.accel_mult,
            energy_mult: parameters.energy_mult,
            single_timestep: parameters.sph_single_timestep(),
        }
    }

    /// Candidate timestep of one particle: the minimum of the Courant,
    /// acceleration and energy conditions.
    pub fn candidate_dt(&self, part: &Particle, evolves_energy: bool) -> f64 {
        let vsig = part.vsig.max(part.sound).max(f64::MIN_POSITIVE);
        let mut dt = self.courant_mult * part.h / vsig;
        let amag = part.a.length();
        if amag > 0.0 {
            dt = dt.min(self.accel_mult * (part.h / amag).sqrt());
        }
        if evolves_energy && part.dudt.abs() > 0.0 && part.u > 0.0 {
            dt = dt.min(self.energy_mult * part.u.abs() / part.dudt.abs());
        }
        dt
    }

    /// Starts a new block: sizes the ladder from the global minimum
    /// candidate and reassigns every particle's level.
    pub fn start_block(&mut self, store: &mut ParticleStore, evolves_energy: bool) {
        let dt_min = store
            .real()
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| self.candidate_dt(p, evolves_energy))
            .fold(f64::INFINITY, f64::min);
        let dt_min = if dt_min.is_finite() { dt_min } else { 1.0 };
        let previous: Vec<usize> = store.real().iter().map(|p| p.level).collect();
        self.ladder.start_block(dt_min);
        let candidates: Vec<usize> = store
            .real()
            .iter()
            .map(|p| self.ladder.level_from_dt(self.candidate_dt(p, evolves_energy)))
            .collect();
        let nhydro = store.nhydro();
        for i in 0..nhydro {
            let levelneib = store.levelneib(i);
            let level = constrained_level(candidates[i], previous[i], levelneib);
            store.real_mut()[i].level = level;
        }
        if self.single_timestep {
            let max_level = store
                .real()
                .iter()
                .filter(|p| p.is_alive())
                .map(|p| p.level)
                .max()
                .unwrap_or(0);
            for part in store.real_mut() {
                part.level = max_level;
            }
        }
        let level_max = store
            .real()
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.level)
            .max()
            .unwrap_or(0);
        self.ladder.set_level_max(level_max);
    }

    /// Mid-block level update for a particle that just finished its
    /// step. Shortening is immediate; lengthening happens one level at a
    /// time and only at a boundary of the coarser level.
    pub fn update_level(&self, part: &Particle, levelneib: usize, evolves_energy: bool) -> usize {
        let candidate = self
            .ladder
            .level_from_dt(self.candidate_dt(part, evolves_energy));
        let level = part.level;
        let next = if candidate > level {
            candidate
        } else if candidate < level
            && level > 0
            && self.ladder.is_boundary(level - 1, self.ladder.nstep + 1)
        {
            level - 1
        } else {
            level
        };
        constrained_level(next, level, levelneib).min(self.ladder.nlevels - 1)
    }

    /// Marks particles whose step ends at the upcoming sub-step.
    pub fn mark_active(&self, store: &mut ParticleStore) {
        let ladder = &self.ladder;
        for part in store.real_mut() {
            part.active = part.is_alive() && ladder.ends_step(part.level);
        }
    }

    /// Drifts every live particle and applies the boundary policy.
    pub fn drift_all(&self, store: &mut ParticleStore, box_: &DomainBox, dt: f64) {
        for part in store.real_mut() {
            if !part.is_alive() {
                continue;
            }
            part.r += part.v * dt;
            let (mut r, mut v) = (part.r, part.v);
            box_.wrap_or_reflect(&mut r, &mut v);
            part.r = r;
            part.v = v;
        }
    }

    /// Half-kick of the active particles with their own level timestep.
    pub fn kick_active_half(&self, store: &mut ParticleStore, evolves_energy: bool) {
        let ladder = self.ladder.clone();
        for part in store.real_mut() {
            if !part.active {
                continue;
            }
            let dt = 0.5 * ladder.dt_level(part.level);
            part.v += part.a * dt;
            if evolves_energy {
                part.u = (part.u + part.dudt * dt).max(f64::MIN_POSITIVE);
            }
        }
    }
}

/// Shortening (larger level) is unconstrained; lengthening is limited to
/// one rung; the neighbour discipline keeps a particle within one rung
/// of its fastest interaction partner.
fn constrained_level(candidate: usize, previous: usize, levelneib: usize) -> usize {
    let floor = levelneib.saturating_sub(1);
    let limited = if candidate < previous {
        previous - 1
    } else {
        candidate
    };
    limited.max(floor)
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::Integrator;
    use crate::domain::DomainBox;
    use crate::parameters::SimulationParameters;
    use crate::particles::Particle;
    use crate::particles::ParticleStore;
    use crate::test_utils::assert_float_is_close;

    fn particle_with(h: f64, vsig: f64, a: f64) -> Particle {
        let mut part = Particle::new(0, DVec3::ZERO, DVec3::ZERO, 1.0, 1.0);
        part.h = h;
        part.vsig = vsig;
        part.sound = vsig;
        part.a = DVec3::new(a, 0.0, 0.0);
        part
    }

    #[test]
    fn candidate_dt_takes_the_minimum_condition() {
        let mut parameters = SimulationParameters::default();
        parameters.courant_mult = 0.2;
        parameters.accel_mult = 0.3;
        parameters.energy_mult = 0.3;
        let integrator = Integrator::new(&parameters);
        // Courant-limited.
        let part = particle_with(0.1, 10.0, 0.0);
        assert_float_is_close(integrator.candidate_dt(&part, true), 0.2 * 0.1 / 10.0);
        // Acceleration-limited.
        let part = particle_with(0.1, 1e-3, 1e6);
        assert_float_is_close(
            integrator.candidate_dt(&part, true),
            0.3 * (0.1f64 / 1e6).sqrt(),
        );
        // Energy-limited.
        let mut part = particle_with(1.0, 1e-3, 0.0);
        part.u = 1.0;
        part.dudt = 1e5;
        assert_float_is_close(integrator.candidate_dt(&part, true), 0.3 / 1e5);
    }

    #[test]
    fn block_start_puts_slowest_particle_on_level_zero() {
        let mut parameters = SimulationParameters::default();
        parameters.nlevels = 4;
        let mut integrator = Integrator::new(&parameters);
        let parts = vec![
            particle_with(0.1, 1.0, 0.0),
            particle_with(0.1, 8.0, 0.0),
        ];
        let mut store = ParticleStore::new(parts, 10);
        integrator.start_block(&mut store, false);
        // dt candidates are 0.02 and 0.0025 (ratio 8 = 3 levels apart).
        assert_eq!(store.real()[1].level, 3);
        assert_eq!(store.real()[0].level, 0);
        assert_eq!(integrator.ladder.level_max, 3);
    }

    #[test]
    fn single_timestep_collapses_levels() {
        let mut parameters = SimulationParameters::default();
        parameters.nlevels = 4;
        parameters.sph_single_timestep = 1;
        let mut integrator = Integrator::new(&parameters);
        let parts = vec![
            particle_with(0.1, 1.0, 0.0),
            particle_with(0.1, 8.0, 0.0),
        ];
        let mut store = ParticleStore::new(parts, 10);
        integrator.start_block(&mut store, false);
        assert_eq!(store.real()[0].level, store.real()[1].level);
    }

    #[test]
    fn levelneib_discipline_bounds_the_fall() {
        let mut parameters = SimulationParameters::default();
        parameters.nlevels = 6;
        let integrator = Integrator::new(&parameters);
        // A particle that wants level 0 but interacts with level 4
        // neighbours stays within one rung of them.
        assert_eq!(super::constrained_level(0, 3, 4), 3);
        assert_eq!(super::constrained_level(0, 4, 4), 3);
        assert_eq!(super::constrained_level(5, 2, 0), 5);
        let _ = integrator;
    }

    #[test]
    fn drift_applies_boundary_policy() {
        let parameters = SimulationParameters::default();
        let integrator = Integrator::new(&parameters);
        let box_ = DomainBox::new(
            3,
            DVec3::ZERO,
            DVec3::ONE,
            [[crate::domain::BoundaryKind::Periodic; 2]; 3],
        );
        let mut part = Particle::new(0, DVec3::new(0.95, 0.5, 0.5), DVec3::ZERO, 1.0, 1.0);
        part.v = DVec3::new(1.0, 0.0, 0.0);
        let mut store = ParticleStore::new(vec![part], 10);
        integrator.drift_all(&mut store, &box_, 0.1);
        assert_float_is_close(store.real()[0].r.x, 0.05);
    }
}
