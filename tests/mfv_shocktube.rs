use std::sync::atomic::AtomicBool;

use seren::driver::Simulation;
use seren::parameters::SimulationParameters;
use seren::particles::IRHO;

/// Sod shock tube with the meshless finite-volume dialect: looser bands
/// than the SPH run, but the same wave structure must emerge.
#[test]
fn meshless_sod_produces_the_wave_structure() {
    let parameters = SimulationParameters::from_yaml_str(
        "sim: mfvmuscl\nsph: mfv_mm\nic: sod\nndim: 1\nNhydro: 400\ngamma_eos: 1.4\n\
         tend: 0.2\ntsnapfirst: 1.0e30\nx_boundary_lhs: mirror\nx_boundary_rhs: mirror\n\
         h_converge: 0.001\n",
        &[],
    )
    .unwrap();
    let mut sim = Simulation::new(parameters).unwrap();
    let interrupt = AtomicBool::new(false);
    sim.run(&interrupt).unwrap();
    assert!(sim.t >= 0.2);

    let parts = sim.store.real();
    let centre: Vec<&_> = parts
        .iter()
        .filter(|p| (p.r.x - 0.5).abs() < 0.02)
        .collect();
    assert!(!centre.is_empty());
    let rho_centre: f64 = centre
        .iter()
        .map(|p| p.mfv.wprim[IRHO])
        .sum::<f64>()
        / centre.len() as f64;
    assert!(
        (0.40..=0.46).contains(&rho_centre),
        "centre density {rho_centre}"
    );

    let plateau: Vec<&_> = parts
        .iter()
        .filter(|p| p.r.x > 0.70 && p.r.x < 0.78)
        .collect();
    assert!(!plateau.is_empty());
    let v_plateau: f64 =
        plateau.iter().map(|p| p.v.x).sum::<f64>() / plateau.len() as f64;
    assert!(
        (0.88..=0.97).contains(&v_plateau),
        "post-shock velocity {v_plateau}"
    );

    // The left state far from all waves is untouched.
    let undisturbed: Vec<&_> = parts.iter().filter(|p| p.r.x < 0.15).collect();
    for part in undisturbed {
        assert!((part.mfv.wprim[IRHO] - 1.0).abs() < 0.02);
        assert!(part.v.x.abs() < 0.02);
    }
}

/// Exact conservation of the flux exchange: total conserved mass,
/// momentum and energy of the pairwise updates match the initial state
/// to float precision over the whole run.
#[test]
fn meshless_conserves_mass_momentum_energy() {
    let parameters = SimulationParameters::from_yaml_str(
        "sim: mfvmuscl\nsph: mfv_mm\nic: sod\nndim: 1\nNhydro: 200\ngamma_eos: 1.4\n\
         tend: 0.05\ntsnapfirst: 1.0e30\nx_boundary_lhs: mirror\nx_boundary_rhs: mirror\n",
        &[],
    )
    .unwrap();
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    let totals = |sim: &Simulation| {
        let mut sums = [0.0f64; 5];
        for part in sim.store.real() {
            for k in 0..5 {
                sums[k] += part.mfv.qcons[k];
            }
        }
        sums
    };
    let initial = totals(&sim);
    for _ in 0..20 {
        sim.step_once().unwrap();
    }
    let after = totals(&sim);
    // Mirror ghosts reflect momentum back through the walls, so the x
    // component is only conserved up to the wall exchange; mass and
    // energy have no boundary source at all.
    assert!((after[0] - initial[0]).abs() < 1e-12);
    assert!((after[4] - initial[4]).abs() < 1e-10 * initial[4].abs().max(1.0));
}
