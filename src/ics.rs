use std::f64::consts::PI;

use glam::DVec3;
use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::domain::DomainBox;
use crate::nbody::StarParticle;
use crate::parameters::IcKind;
use crate::parameters::SimulationParameters;
use crate::particles::Particle;

/// Builds the initial particle set for the configured problem and hands
/// it to the core. Smoothing lengths are seeded with a lattice estimate;
/// the solver refines them on the first step.
pub fn generate(
    parameters: &SimulationParameters,
    box_: &DomainBox,
) -> (Vec<Particle>, Vec<StarParticle>) {
    let mut rng = StdRng::seed_from_u64(parameters.seed);
    match parameters.ic {
        IcKind::Lattice => (lattice(parameters, box_), Vec::new()),
        IcKind::RandomCube => (random_cube(parameters, box_, &mut rng), Vec::new()),
        IcKind::Sod => (sod(parameters), Vec::new()),
        IcKind::Khi => (khi(parameters), Vec::new()),
        IcKind::Plummer => plummer(parameters, &mut rng),
    }
}

fn seed_h(spacing: f64, h_fac: f64) -> f64 {
    h_fac * spacing
}

fn lattice(parameters: &SimulationParameters, box_: &DomainBox) -> Vec<Particle> {
    let ndim = parameters.ndim;
    let n_side = (parameters.nhydro as f64).powf(1.0 / ndim as f64).round() as usize;
    let n_side = n_side.max(1);
    let total = n_side.pow(ndim as u32);
    if total != parameters.nhydro {
        info!("lattice ic: rounding Nhydro from {} to {}", parameters.nhydro, total);
    }
    let size = box_.boxsize();
    let volume: f64 = (0..ndim).map(|d| size[d]).product();
    let mass = volume / total as f64;
    let mut parts = Vec::with_capacity(total);
    let mut counters = [0usize; 3];
    for id in 0..total {
        let mut r = DVec3::ZERO;
        let mut remainder = id;
        for d in 0..ndim {
            counters[d] = remainder % n_side;
            remainder /= n_side;
            r[d] = box_.boxmin[d] + (counters[d] as f64 + 0.5) * size[d] / n_side as f64;
        }
        let mut part = Particle::new(id, r, DVec3::ZERO, mass, 1.0);
        part.h = seed_h(size[0] / n_side as f64, parameters.h_fac);
        parts.push(part);
    }
    parts
}

fn random_cube(
    parameters: &SimulationParameters,
    box_: &DomainBox,
    rng: &mut StdRng,
) -> Vec<Particle> {
    let ndim = parameters.ndim;
    let size = box_.boxsize();
    let volume: f64 = (0..ndim).map(|d| size[d]).product();
    let n = parameters.nhydro;
    let mass = volume / n as f64;
    let spacing = (volume / n as f64).powf(1.0 / ndim as f64);
    (0..n)
        .map(|id| {
            let mut r = DVec3::ZERO;
            for d in 0..ndim {
                r[d] = box_.boxmin[d] + rng.gen::<f64>() * size[d];
            }
            let mut part = Particle::new(id, r, DVec3::ZERO, mass, 1.0);
            part.h = seed_h(spacing, parameters.h_fac);
            part
        })
        .collect()
}

/// The standard shock tube: (rho, v, P) = (1, 0, 1) on the left half and
/// (0.125, 0, 0.1) on the right, equal-mass particles with 8:1 spacing.
fn sod(parameters: &SimulationParameters) -> Vec<Particle> {
    let n = parameters.nhydro;
    let gamma = parameters.gamma_eos;
    let (rho_l, press_l) = (1.0, 1.0);
    let (rho_r, press_r) = (0.125, 0.1);
    let mass = 0.5 * (rho_l + rho_r) / n as f64;
    let n_left = (0.5 * rho_l / mass).round() as usize;
    let n_right = n - n_left;
    let mut parts = Vec::with_capacity(n);
    let spacing_l = 0.5 / n_left as f64;
    for i in 0..n_left {
        let x = (i as f64 + 0.5) * spacing_l;
        let u = press_l / ((gamma - 1.0) * rho_l);
        let mut part = Particle::new(i, DVec3::new(x, 0.0, 0.0), DVec3::ZERO, mass, u);
        part.h = seed_h(spacing_l, parameters.h_fac);
        parts.push(part);
    }
    let spacing_r = 0.5 / n_right as f64;
    for i in 0..n_right {
        let x = 0.5 + (i as f64 + 0.5) * spacing_r;
        let u = press_r / ((gamma - 1.0) * rho_r);
        let mut part = Particle::new(n_left + i, DVec3::new(x, 0.0, 0.0), DVec3::ZERO, mass, u);
        part.h = seed_h(spacing_r, parameters.h_fac);
        parts.push(part);
    }
    parts
}

/// Kelvin-Helmholtz two-stream setup in a periodic unit square: a dense
/// central band shearing against the outer medium, with a single seeded
/// velocity mode at the interfaces.
fn khi(parameters: &SimulationParameters) -> Vec<Particle> {
    let gamma = parameters.gamma_eos;
    let press = 2.5;
    let lambda = 0.5;
    let amplitude = 0.025;
    // Equal-mass particles: the rho = 2 band packs sqrt(2) tighter per
    // axis than the rho = 1 background.
    let n_target = parameters.nhydro;
    // Outer region covers half the area with rho 1, band covers half
    // with rho 2; the area-weighted total fixes the outer lattice count.
    let n_outer_side = ((n_target as f64 / 3.0) * 2.0).sqrt().round() as usize;
    let spacing_outer = 1.0 / n_outer_side as f64;
    let spacing_inner = spacing_outer / (2.0f64).sqrt();
    let n_inner_side = (1.0 / spacing_inner).round() as usize;
    let mass = 1.5 / (n_outer_side * n_outer_side / 2
        + n_inner_side * n_inner_side / 2) as f64;
    let mut parts = Vec::new();
    let mut id = 0;
    let mut push = |r: DVec3, rho: f64, vx: f64, spacing: f64, id: &mut usize,
                    parts: &mut Vec<Particle>| {
        let vy = amplitude
            * (2.0 * PI * r.x / lambda).sin()
            * ((-(r.y - 0.25).powi(2) / 0.0025).exp() + (-(r.y - 0.75).powi(2) / 0.0025).exp());
        let u = press / ((gamma - 1.0) * rho);
        let mut part = Particle::new(*id, r, DVec3::new(vx, vy, 0.0), mass, u);
        part.h = seed_h(spacing, parameters.h_fac);
        parts.push(part);
        *id += 1;
    };
    for ix in 0..n_outer_side {
        for iy in 0..n_outer_side {
            let r = DVec3::new(
                (ix as f64 + 0.5) * spacing_outer,
                (iy as f64 + 0.5) * spacing_outer,
                0.0,
            );
            if !(0.25..0.75).contains(&r.y) {
                push(r, 1.0, -0.5, spacing_outer, &mut id, &mut parts);
            }
        }
    }
    for ix in 0..n_inner_side {
        for iy in 0..n_inner_side {
            let r = DVec3::new(
                (ix as f64 + 0.5) * spacing_inner,
                (iy as f64 + 0.5) * spacing_inner,
                0.0,
            );
            if (0.25..0.75).contains(&r.y) {
                push(r, 2.0, 0.5, spacing_inner, &mut id, &mut parts);
            }
        }
    }
    info!("khi ic: generated {} particles", parts.len());
    parts
}

/// Plummer sphere (a = M = 1) shared between gas and stars. Stars draw
/// velocities from the isotropic distribution function; the gas is held
/// up by thermal pressure matched to the local velocity dispersion.
fn plummer(
    parameters: &SimulationParameters,
    rng: &mut StdRng,
) -> (Vec<Particle>, Vec<StarParticle>) {
    let n_gas = parameters.nhydro;
    let n_star = parameters.nstar;
    let n_total = n_gas + n_star;
    let gamma = parameters.gamma_eos;
    let mass = 1.0 / n_total as f64;
    let sample_radius = |rng: &mut StdRng| -> f64 {
        loop {
            let x: f64 = rng.gen_range(1e-8..1.0);
            let r = 1.0 / (x.powf(-2.0 / 3.0) - 1.0).sqrt();
            if r < 20.0 {
                return r;
            }
        }
    };
    let random_direction = |rng: &mut StdRng| -> DVec3 {
        loop {
            let v = DVec3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            );
            let len = v.length();
            if len > 1e-3 && len <= 1.0 {
                return v / len;
            }
        }
    };
    // Aarseth, Henon & Wielen rejection sampling of the speed fraction.
    let sample_speed_fraction = |rng: &mut StdRng| -> f64 {
        loop {
            let q: f64 = rng.gen();
            let bound: f64 = 0.1 * rng.gen::<f64>();
            if bound < q * q * (1.0 - q * q).powf(3.5) {
                return q;
            }
        }
    };
    let mean_spacing = 0.5 / (n_total as f64).powf(1.0 / 3.0);
    let gas: Vec<Particle> = (0..n_gas)
        .map(|id| {
            let r = sample_radius(rng);
            let position = r * random_direction(rng);
            let sigma_sqd = 1.0 / (6.0 * (1.0 + r * r).sqrt());
            let u = sigma_sqd / (gamma - 1.0);
            let mut part = Particle::new(id, position, DVec3::ZERO, mass, u);
            part.h = seed_h(mean_spacing, parameters.h_fac);
            part
        })
        .collect();
    let stars: Vec<StarParticle> = (0..n_star)
        .map(|_| {
            let r = sample_radius(rng);
            let position = r * random_direction(rng);
            let v_escape = (2.0f64).sqrt() * (1.0 + r * r).powf(-0.25);
            let speed = sample_speed_fraction(rng) * v_escape;
            let velocity = speed * random_direction(rng);
            StarParticle::new(position, velocity, mass, mean_spacing)
        })
        .collect();
    (gas, stars)
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::generate;
    use crate::domain::DomainBox;
    use crate::parameters::IcKind;
    use crate::parameters::SimulationParameters;
    use crate::test_utils::assert_rel_close;

    fn box_for(parameters: &SimulationParameters) -> DomainBox {
        DomainBox::open(
            parameters.ndim,
            DVec3::new(parameters.boxmin[0], 0.0, 0.0),
            DVec3::new(parameters.boxmax[0], 1.0, 1.0),
        )
    }

    #[test]
    fn lattice_fills_the_box_uniformly() {
        let mut parameters = SimulationParameters::default();
        parameters.ndim = 3;
        parameters.nhydro = 512;
        let box_ = DomainBox::open(3, DVec3::ZERO, DVec3::ONE);
        let (parts, stars) = generate(&parameters, &box_);
        assert_eq!(parts.len(), 512);
        assert!(stars.is_empty());
        let mass: f64 = parts.iter().map(|p| p.m).sum();
        assert_rel_close(mass, 1.0, 1e-12);
        for part in &parts {
            assert!(box_.contains_on_closed_axes(part.r));
            assert!(part.r.cmpge(DVec3::ZERO).all() && part.r.cmple(DVec3::ONE).all());
        }
    }

    #[test]
    fn sod_left_state_is_eight_times_denser() {
        let mut parameters = SimulationParameters::default();
        parameters.ndim = 1;
        parameters.ic = IcKind::Sod;
        parameters.nhydro = 400;
        parameters.gamma_eos = 1.4;
        let box_ = box_for(&parameters);
        let (parts, _) = generate(&parameters, &box_);
        assert_eq!(parts.len(), 400);
        let n_left = parts.iter().filter(|p| p.r.x < 0.5).count();
        let n_right = parts.len() - n_left;
        // Equal masses, 8:1 density ratio.
        assert_rel_close(n_left as f64 / n_right as f64, 8.0, 0.05);
        // Pressure ratio through u: P_l / P_r = 10.
        let u_left = parts[0].u;
        let u_right = parts.last().unwrap().u;
        assert_rel_close(u_left / u_right, (1.0 / 1.0) / (0.1 / 0.125), 1e-12);
    }

    #[test]
    fn khi_band_has_double_density_packing() {
        let mut parameters = SimulationParameters::default();
        parameters.ndim = 2;
        parameters.ic = IcKind::Khi;
        parameters.nhydro = 4096;
        let box_ = DomainBox::open(2, DVec3::ZERO, DVec3::ONE);
        let (parts, _) = generate(&parameters, &box_);
        let inner = parts
            .iter()
            .filter(|p| p.r.y >= 0.25 && p.r.y < 0.75)
            .count();
        let outer = parts.len() - inner;
        assert_rel_close(inner as f64 / outer as f64, 2.0, 0.1);
        // Shear flow in opposite directions.
        assert!(parts.iter().any(|p| p.v.x > 0.4));
        assert!(parts.iter().any(|p| p.v.x < -0.4));
    }

    #[test]
    fn plummer_half_mass_radius_matches_theory() {
        let mut parameters = SimulationParameters::default();
        parameters.ndim = 3;
        parameters.ic = IcKind::Plummer;
        parameters.nhydro = 2000;
        parameters.nstar = 200;
        let box_ = DomainBox::open(3, DVec3::splat(-50.0), DVec3::splat(50.0));
        let (parts, stars) = generate(&parameters, &box_);
        assert_eq!(stars.len(), 200);
        let mut radii: Vec<f64> = parts
            .iter()
            .map(|p| p.r.length())
            .chain(stars.iter().map(|s| s.r.length()))
            .collect();
        radii.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let half_mass = radii[radii.len() / 2];
        // Analytic Plummer half-mass radius: a / sqrt(2^(2/3) - 1).
        let expected = 1.0 / (2.0f64.powf(2.0 / 3.0) - 1.0).sqrt();
        assert_rel_close(half_mass, expected, 0.15);
        // Bound star speeds.
        for star in &stars {
            let r = star.r.length();
            let v_escape = (2.0f64).sqrt() * (1.0 + r * r).powf(-0.25);
            assert!(star.v.length() <= v_escape + 1e-12);
        }
    }
}
