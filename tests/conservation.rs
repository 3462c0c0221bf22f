use std::sync::atomic::AtomicBool;

use seren::driver::Simulation;
use seren::parameters::SimulationParameters;

fn periodic_parameters(extra: &str) -> SimulationParameters {
    let base = "ic: random_cube\nndim: 3\nNhydro: 216\ntsnapfirst: 1.0e30\n\
                x_boundary_lhs: periodic\nx_boundary_rhs: periodic\n\
                y_boundary_lhs: periodic\ny_boundary_rhs: periodic\n\
                z_boundary_lhs: periodic\nz_boundary_rhs: periodic\n";
    let contents = format!("{base}{extra}");
    SimulationParameters::from_yaml_str(&contents, &[]).unwrap()
}

/// Periodic self-gravitating run with the tree fully opened: pair
/// forces are exactly antisymmetric, so the total momentum stays at the
/// roundoff floor step after step.
#[test]
fn momentum_is_conserved_in_periodic_self_gravity() {
    let parameters =
        periodic_parameters("self_gravity: 1\nthetamaxsqd: 0.0\ntend: 1.0\nNstepsmax: 5\n");
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    for _ in 0..5 {
        sim.step_once().unwrap();
        assert!(
            sim.diagnostics.momentum_drift() < 1e-11,
            "momentum drift {}",
            sim.diagnostics.momentum_drift()
        );
    }
}

/// Boundary containment: every live particle stays inside the box on
/// every closed dimension after each sub-step.
#[test]
fn particles_stay_inside_the_periodic_box() {
    let parameters = periodic_parameters("tend: 1.0\nNstepsmax: 8\navisc: none\n");
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    for _ in 0..8 {
        sim.step_once().unwrap();
        for part in sim.store.real() {
            assert!(sim.box_.contains_on_closed_axes(part.r));
        }
    }
}

/// Closed adiabatic run without artificial viscosity: the relative
/// energy error stays small over many steps.
#[test]
fn energy_error_stays_bounded_without_viscosity() {
    let parameters = periodic_parameters("avisc: none\ntend: 1.0\nNstepsmax: 50\n");
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    for _ in 0..50 {
        sim.step_once().unwrap();
    }
    assert!(
        sim.diagnostics.energy_error() < 5e-3,
        "energy error {}",
        sim.diagnostics.energy_error()
    );
}

/// The smoothing-length relation holds for effectively every particle
/// of a homogeneous random cloud after the first property pass.
#[test]
fn smoothing_lengths_satisfy_the_density_relation() {
    let parameters = periodic_parameters("tend: 1.0\nNstepsmax: 1\nh_converge: 0.001\n");
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    let parts = sim.store.real();
    let satisfied = parts
        .iter()
        .filter(|p| {
            let target = 1.2 * (p.m / p.rho).powf(1.0 / 3.0);
            (p.h - target).abs() < 0.01 * p.h
        })
        .count();
    assert!(
        satisfied as f64 >= 0.99 * parts.len() as f64,
        "{satisfied} of {} converged",
        parts.len()
    );
}

/// Ghost refresh twice with no drift in between is bit-identical (the
/// driver-level version of the round-trip property).
#[test]
fn ghost_refresh_round_trip() {
    let parameters = periodic_parameters("tend: 1.0\nNstepsmax: 1\n");
    let mut sim = Simulation::new(parameters).unwrap();
    sim.initialize().unwrap();
    let first: Vec<_> = sim
        .store
        .ghosts()
        .iter()
        .map(|g| (g.iorig, g.r.to_array()))
        .collect();
    // A second refresh without advancing time.
    sim.refresh_ghosts_and_trees(false).unwrap();
    let second: Vec<_> = sim
        .store
        .ghosts()
        .iter()
        .map(|g| (g.iorig, g.r.to_array()))
        .collect();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.0, b.0);
        for d in 0..3 {
            assert_eq!(a.1[d].to_bits(), b.1[d].to_bits());
        }
    }
}

/// A user interrupt surfaces as the clean interrupted condition.
#[test]
fn interrupt_stops_the_run_cleanly() {
    let parameters = periodic_parameters("tend: 100.0\n");
    let mut sim = Simulation::new(parameters).unwrap();
    let interrupt = AtomicBool::new(true);
    let result = sim.run(&interrupt);
    assert!(matches!(
        result,
        Err(seren::error::SimError::Interrupted)
    ));
}
