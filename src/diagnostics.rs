use glam::DVec3;

use crate::nbody::StarParticle;
use crate::particles::ParticleStore;

/// Global invariants tracked every step: total mass, momentum, the
/// energy budget and the relative energy error against the value at the
/// first evaluation.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticState {
    pub mtot: f64,
    pub momentum: DVec3,
    pub ekin: f64,
    pub etherm: f64,
    pub egrav: f64,
    pub etot: f64,
}

#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    baseline: Option<DiagnosticState>,
    pub current: DiagnosticState,
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, store: &ParticleStore, stars: &[StarParticle]) -> &DiagnosticState {
        let mut state = DiagnosticState::default();
        for part in store.real().iter().filter(|p| p.is_alive()) {
            state.mtot += part.m;
            state.momentum += part.m * part.v;
            state.ekin += 0.5 * part.m * part.v.length_squared();
            state.etherm += part.m * part.u;
            // Positive-potential convention; the half removes the double
            // count over pairs.
            state.egrav -= 0.5 * part.m * part.gpot;
        }
        for star in stars {
            state.mtot += star.m;
            state.momentum += star.m * star.v;
            state.ekin += 0.5 * star.m * star.v.length_squared();
            state.egrav -= 0.5 * star.m * star.gpot;
        }
        state.etot = state.ekin + state.etherm + state.egrav;
        if self.baseline.is_none() {
            self.baseline = Some(state.clone());
        }
        self.current = state;
        &self.current
    }

    /// |E - E_0| / |E_0| against the first recorded state.
    pub fn energy_error(&self) -> f64 {
        match &self.baseline {
            Some(baseline) if baseline.etot.abs() > 0.0 => {
                (self.current.etot - baseline.etot).abs() / baseline.etot.abs()
            }
            _ => 0.0,
        }
    }

    pub fn momentum_drift(&self) -> f64 {
        match &self.baseline {
            Some(baseline) => (self.current.momentum - baseline.momentum).length(),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::DiagnosticsCollector;
    use crate::particles::Particle;
    use crate::particles::ParticleStore;
    use crate::test_utils::assert_float_is_close;

    #[test]
    fn sums_mass_momentum_and_energy() {
        let mut parts = vec![
            Particle::new(0, DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0), 2.0, 0.5),
            Particle::new(1, DVec3::ONE, DVec3::new(-1.0, 0.0, 0.0), 2.0, 0.5),
        ];
        parts[0].gpot = 0.25;
        parts[1].gpot = 0.25;
        let store = ParticleStore::new(parts, 10);
        let mut diagnostics = DiagnosticsCollector::new();
        let state = diagnostics.update(&store, &[]);
        assert_float_is_close(state.mtot, 4.0);
        assert_float_is_close(state.momentum.x, 0.0);
        assert_float_is_close(state.ekin, 2.0);
        assert_float_is_close(state.etherm, 2.0);
        assert_float_is_close(state.egrav, -0.5 * 4.0 * 0.25 * 0.5 * 2.0);
        assert_float_is_close(diagnostics.energy_error(), 0.0);
    }

    #[test]
    fn energy_error_tracks_the_baseline() {
        let parts = vec![Particle::new(0, DVec3::ZERO, DVec3::X, 1.0, 1.0)];
        let store = ParticleStore::new(parts, 4);
        let mut diagnostics = DiagnosticsCollector::new();
        diagnostics.update(&store, &[]);
        let mut faster = store;
        faster.real_mut()[0].v = DVec3::new(2.0, 0.0, 0.0);
        diagnostics.update(&faster, &[]);
        // E0 = 0.5 + 1.0, E1 = 2.0 + 1.0.
        assert_float_is_close(diagnostics.energy_error(), 1.5 / 1.5);
    }
}
