use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::domain::BoundaryKind;
use crate::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimKind {
    Sph,
    MfvMuscl,
    MfvRk,
    Nbody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HydroDialect {
    #[serde(rename = "gradh")]
    GradhSph,
    #[serde(rename = "sm2012")]
    Sm2012,
    #[serde(rename = "mfv_mm")]
    MfvMm,
    #[serde(rename = "mfv_rk")]
    MfvRk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EosKind {
    EnergyEqn,
    Isothermal,
    Barotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    M4,
    Quintic,
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AviscKind {
    None,
    Mon97,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcondKind {
    None,
    Wadsley,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Lfkdk,
    Lfdkd,
    Rk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeibSearchKind {
    Kdtree,
    Octtree,
    Brute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GravityMac {
    Geometric,
    Eigenmac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipoleKind {
    Monopole,
    Quadrupole,
    FastMonopole,
    FastQuadrupole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcKind {
    Lattice,
    RandomCube,
    Sod,
    Khi,
    Plummer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Column,
    Sbin,
}

/// The flat key -> value configuration surface. Field names are the
/// recognized keys; anything else is a configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationParameters {
    pub sim: SimKind,
    pub ic: IcKind,
    pub run_id: String,
    pub out_file_form: SnapshotFormat,
    pub ndim: usize,
    #[serde(rename = "Nhydro")]
    pub nhydro: usize,
    #[serde(rename = "Nhydromax")]
    pub nhydromax: usize,
    #[serde(rename = "Nstar")]
    pub nstar: usize,
    pub tend: f64,
    pub tsnapfirst: f64,
    pub dt_snap: f64,
    pub noutputstep: usize,
    #[serde(rename = "Nstepsmax")]
    pub nstepsmax: usize,
    pub hydro_forces: u8,
    pub self_gravity: u8,
    pub gas_eos: EosKind,
    pub gamma_eos: f64,
    pub temp0: f64,
    pub mu_bar: f64,
    pub rho_bary: f64,
    pub sph: HydroDialect,
    pub h_fac: f64,
    pub h_converge: f64,
    pub kernel: KernelKind,
    pub tabulated_kernel: u8,
    pub avisc: AviscKind,
    pub acond: AcondKind,
    pub alpha_visc: f64,
    pub beta_visc: f64,
    pub sph_integration: IntegrationKind,
    pub courant_mult: f64,
    pub accel_mult: f64,
    pub energy_mult: f64,
    pub sph_single_timestep: u8,
    #[serde(rename = "Nlevels")]
    pub nlevels: usize,
    pub neib_search: NeibSearchKind,
    #[serde(rename = "Nleafmax")]
    pub nleafmax: usize,
    pub thetamaxsqd: f64,
    pub gravity_mac: GravityMac,
    pub multipole: MultipoleKind,
    pub ghost_range: f64,
    pub rho_floor: f64,
    pub press_floor: f64,
    pub seed: u64,
    pub boxmin: Vec<f64>,
    pub boxmax: Vec<f64>,
    pub x_boundary_lhs: BoundaryKind,
    pub x_boundary_rhs: BoundaryKind,
    pub y_boundary_lhs: BoundaryKind,
    pub y_boundary_rhs: BoundaryKind,
    pub z_boundary_lhs: BoundaryKind,
    pub z_boundary_rhs: BoundaryKind,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            sim: SimKind::Sph,
            ic: IcKind::Lattice,
            run_id: "seren".into(),
            out_file_form: SnapshotFormat::Column,
            ndim: 3,
            nhydro: 1000,
            nhydromax: 0,
            nstar: 0,
            tend: 1.0,
            tsnapfirst: 0.0,
            dt_snap: 0.1,
            noutputstep: 32,
            nstepsmax: usize::MAX,
            hydro_forces: 1,
            self_gravity: 0,
            gas_eos: EosKind::EnergyEqn,
            gamma_eos: 5.0 / 3.0,
            temp0: 1.0,
            mu_bar: 1.0,
            rho_bary: 1.0e-14,
            sph: HydroDialect::GradhSph,
            h_fac: 1.2,
            h_converge: 0.01,
            kernel: KernelKind::M4,
            tabulated_kernel: 0,
            avisc: AviscKind::Mon97,
            acond: AcondKind::None,
            alpha_visc: 1.0,
            beta_visc: 2.0,
            sph_integration: IntegrationKind::Lfkdk,
            courant_mult: 0.2,
            accel_mult: 0.3,
            energy_mult: 0.3,
            sph_single_timestep: 0,
            nlevels: 1,
            neib_search: NeibSearchKind::Kdtree,
            nleafmax: 8,
            thetamaxsqd: 0.15,
            gravity_mac: GravityMac::Geometric,
            multipole: MultipoleKind::Monopole,
            ghost_range: 1.6,
            rho_floor: 0.0,
            press_floor: 0.0,
            seed: 42,
            boxmin: vec![0.0, 0.0, 0.0],
            boxmax: vec![1.0, 1.0, 1.0],
            x_boundary_lhs: BoundaryKind::Open,
            x_boundary_rhs: BoundaryKind::Open,
            y_boundary_lhs: BoundaryKind::Open,
            y_boundary_rhs: BoundaryKind::Open,
            z_boundary_lhs: BoundaryKind::Open,
            z_boundary_rhs: BoundaryKind::Open,
        }
    }
}

impl SimulationParameters {
    pub fn from_file(path: &Path, overrides: &[(String, String)]) -> Result<Self, SimError> {
        let contents = fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml_str(&contents, overrides)
    }

    pub fn from_yaml_str(contents: &str, overrides: &[(String, String)]) -> Result<Self, SimError> {
        let mut mapping: serde_yaml::Mapping = if contents.trim().is_empty() {
            serde_yaml::Mapping::new()
        } else {
            serde_yaml::from_str(contents)
                .map_err(|e| SimError::Config(format!("malformed parameter file: {e}")))?
        };
        for (key, value) in overrides {
            let value: serde_yaml::Value = serde_yaml::from_str(value)
                .map_err(|e| SimError::Config(format!("malformed override value `{value}`: {e}")))?;
            mapping.insert(serde_yaml::Value::String(key.clone()), value);
        }
        let parameters: Self = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| SimError::Config(e.to_string()))?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Interface for external front-ends that already hold a parsed flat
    /// key -> value map.
    pub fn from_flat_map(map: &HashMap<String, String>) -> Result<Self, SimError> {
        let overrides: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Self::from_yaml_str("", &overrides)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let config_err = |msg: String| Err(SimError::Config(msg));
        if !(1..=3).contains(&self.ndim) {
            return config_err(format!("ndim must be 1, 2 or 3, got {}", self.ndim));
        }
        if self.sph == HydroDialect::Sm2012 {
            return config_err(
                "sph = sm2012 is not supported; available dialects: gradh, mfv_mm, mfv_rk".into(),
            );
        }
        let expected_dialect = match self.sim {
            SimKind::Sph => Some(HydroDialect::GradhSph),
            SimKind::MfvMuscl => Some(HydroDialect::MfvMm),
            SimKind::MfvRk => Some(HydroDialect::MfvRk),
            SimKind::Nbody => None,
        };
        if let Some(expected) = expected_dialect {
            if self.sph != expected {
                return config_err(format!(
                    "sim = {:?} requires sph = {:?}, got {:?}",
                    self.sim, expected, self.sph
                ));
            }
        }
        if self.gamma_eos <= 1.0 {
            return config_err(format!("gamma_eos must exceed 1, got {}", self.gamma_eos));
        }
        let is_mfv = matches!(self.sph, HydroDialect::MfvMm | HydroDialect::MfvRk);
        if is_mfv && self.gas_eos != EosKind::EnergyEqn {
            return config_err("the meshless dialects require gas_eos = energy_eqn".into());
        }
        for (name, value) in [
            ("h_fac", self.h_fac),
            ("h_converge", self.h_converge),
            ("courant_mult", self.courant_mult),
            ("accel_mult", self.accel_mult),
            ("energy_mult", self.energy_mult),
            ("ghost_range", self.ghost_range),
        ] {
            if value <= 0.0 {
                return config_err(format!("{name} must be positive, got {value}"));
            }
        }
        for (name, value) in [
            ("hydro_forces", self.hydro_forces),
            ("self_gravity", self.self_gravity),
            ("tabulated_kernel", self.tabulated_kernel),
            ("sph_single_timestep", self.sph_single_timestep),
        ] {
            if value > 1 {
                return config_err(format!("{name} must be 0 or 1, got {value}"));
            }
        }
        if self.nlevels == 0 || self.nlevels > 20 {
            return config_err(format!("Nlevels must be in [1, 20], got {}", self.nlevels));
        }
        if self.nleafmax == 0 {
            return config_err("Nleafmax must be at least 1".into());
        }
        if self.neib_search == NeibSearchKind::Octtree {
            return config_err(
                "neib_search = octtree is not supported; available: kdtree, brute".into(),
            );
        }
        if self.thetamaxsqd < 0.0 {
            return config_err(format!(
                "thetamaxsqd must be non-negative, got {}",
                self.thetamaxsqd
            ));
        }
        if self.boxmin.len() < self.ndim || self.boxmax.len() < self.ndim {
            return config_err(format!(
                "boxmin/boxmax must provide at least ndim = {} entries",
                self.ndim
            ));
        }
        for d in 0..self.ndim {
            if self.boxmin[d] >= self.boxmax[d] {
                return config_err(format!(
                    "boxmin[{d}] = {} must be below boxmax[{d}] = {}",
                    self.boxmin[d], self.boxmax[d]
                ));
            }
        }
        for (axis, lhs, rhs) in self.boundary_pairs() {
            let lhs_periodic = lhs == BoundaryKind::Periodic;
            let rhs_periodic = rhs == BoundaryKind::Periodic;
            if lhs_periodic != rhs_periodic {
                return config_err(format!(
                    "{axis} boundary must be periodic on both faces or neither"
                ));
            }
        }
        if self.ic == IcKind::Khi && self.ndim != 2 {
            return config_err("ic = khi requires ndim = 2".into());
        }
        if self.ic == IcKind::Sod && self.ndim != 1 {
            return config_err("ic = sod requires ndim = 1".into());
        }
        if self.ic == IcKind::Plummer && self.ndim != 3 {
            return config_err("ic = plummer requires ndim = 3".into());
        }
        Ok(())
    }

    /// Boundary settings for the spatial dimensions; settings beyond ndim
    /// are ignored.
    fn boundary_pairs(&self) -> Vec<(&'static str, BoundaryKind, BoundaryKind)> {
        let all = [
            ("x", self.x_boundary_lhs, self.x_boundary_rhs),
            ("y", self.y_boundary_lhs, self.y_boundary_rhs),
            ("z", self.z_boundary_lhs, self.z_boundary_rhs),
        ];
        all[..self.ndim].to_vec()
    }

    pub fn boundaries(&self) -> [[BoundaryKind; 2]; 3] {
        let mut kinds = [[BoundaryKind::Open; 2]; 3];
        for (d, (_, lhs, rhs)) in self.boundary_pairs().into_iter().enumerate() {
            kinds[d] = [lhs, rhs];
        }
        kinds
    }

    pub fn hydro_forces(&self) -> bool {
        self.hydro_forces == 1
    }

    pub fn self_gravity(&self) -> bool {
        self.self_gravity == 1
    }

    pub fn tabulated_kernel(&self) -> bool {
        self.tabulated_kernel == 1
    }

    pub fn sph_single_timestep(&self) -> bool {
        self.sph_single_timestep == 1
    }

    /// Particle array capacity, including the ghost tail.
    pub fn nhydromax(&self) -> usize {
        if self.nhydromax > 0 {
            self.nhydromax.max(self.nhydro)
        } else {
            8 * self.nhydro
        }
    }
}
