use crate::parameters::EosKind;
use crate::parameters::SimulationParameters;

/// Equation of state: pressure and sound speed from (rho, u). Works in
/// code units with the thermal constant absorbed into temp0/mu_bar.
#[derive(Debug, Clone)]
pub struct Eos {
    kind: EosKind,
    pub gamma: f64,
    temp0: f64,
    mu_bar: f64,
    rho_bary: f64,
}

impl Eos {
    pub fn new(parameters: &SimulationParameters) -> Self {
        Self {
            kind: parameters.gas_eos,
            gamma: parameters.gamma_eos,
            temp0: parameters.temp0,
            mu_bar: parameters.mu_bar,
            rho_bary: parameters.rho_bary,
        }
    }

    pub fn ideal(gamma: f64) -> Self {
        Self {
            kind: EosKind::EnergyEqn,
            gamma,
            temp0: 1.0,
            mu_bar: 1.0,
            rho_bary: 1.0e-14,
        }
    }

    fn temperature(&self, rho: f64) -> f64 {
        match self.kind {
            EosKind::Isothermal => self.temp0,
            EosKind::Barotropic => {
                self.temp0 * (1.0 + (rho / self.rho_bary).powf(self.gamma - 1.0))
            }
            EosKind::EnergyEqn => unreachable!("energy equation has no fixed temperature"),
        }
    }

    pub fn pressure(&self, rho: f64, u: f64) -> f64 {
        match self.kind {
            EosKind::EnergyEqn => (self.gamma - 1.0) * rho * u,
            EosKind::Isothermal | EosKind::Barotropic => rho * self.temperature(rho) / self.mu_bar,
        }
    }

    pub fn sound_speed(&self, rho: f64, u: f64) -> f64 {
        match self.kind {
            EosKind::EnergyEqn => (self.gamma * (self.gamma - 1.0) * u).sqrt(),
            EosKind::Isothermal | EosKind::Barotropic => {
                (self.temperature(rho) / self.mu_bar).sqrt()
            }
        }
    }

    /// Specific internal energy consistent with the EOS; passes `u`
    /// through for the energy equation.
    pub fn internal_energy(&self, rho: f64, u: f64) -> f64 {
        match self.kind {
            EosKind::EnergyEqn => u,
            EosKind::Isothermal | EosKind::Barotropic => {
                self.temperature(rho) / ((self.gamma - 1.0) * self.mu_bar)
            }
        }
    }

    /// Whether du/dt should be integrated.
    pub fn evolves_energy(&self) -> bool {
        self.kind == EosKind::EnergyEqn
    }
}

#[cfg(test)]
mod tests {
    use super::Eos;
    use crate::parameters::EosKind;
    use crate::parameters::SimulationParameters;
    use crate::test_utils::assert_float_is_close;

    #[test]
    fn ideal_gas_pressure_and_sound_speed() {
        let eos = Eos::ideal(1.4);
        let (rho, u) = (1.0, 2.5);
        assert_float_is_close(eos.pressure(rho, u), 0.4 * 2.5);
        assert_float_is_close(eos.sound_speed(rho, u), (1.4 * 0.4 * 2.5_f64).sqrt());
    }

    #[test]
    fn isothermal_sound_speed_is_density_independent() {
        let mut parameters = SimulationParameters::default();
        parameters.gas_eos = EosKind::Isothermal;
        parameters.temp0 = 4.0;
        parameters.mu_bar = 1.0;
        let eos = Eos::new(&parameters);
        assert_float_is_close(eos.sound_speed(1.0, 0.0), 2.0);
        assert_float_is_close(eos.sound_speed(100.0, 0.0), 2.0);
        assert!(!eos.evolves_energy());
    }

    #[test]
    fn barotropic_stiffens_at_high_density() {
        let mut parameters = SimulationParameters::default();
        parameters.gas_eos = EosKind::Barotropic;
        parameters.rho_bary = 1.0;
        let eos = Eos::new(&parameters);
        let low = eos.pressure(0.01, 0.0) / 0.01;
        let high = eos.pressure(100.0, 0.0) / 100.0;
        assert!(high > low);
    }
}
