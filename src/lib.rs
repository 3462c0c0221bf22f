//! # Seren
//! Seren is a particle-based astrophysical fluid and gravity simulator.
//!
//! Fluid particles (and optional point-mass stars) inside a box with
//! configurable boundary conditions are advanced in time by repeatedly
//! building a spatial tree over the particles, iterating per-particle
//! smoothing lengths against the density, evaluating hydrodynamic and
//! gravitational interactions through tree-accelerated neighbour
//! searches, and applying symplectic block-timestep integration.
//!
//! Two hydrodynamic dialects are available: grad-h SPH with artificial
//! viscosity, and a meshless finite-volume scheme with Riemann-solved
//! Godunov fluxes. Self-gravity runs through the same tree with
//! monopole or quadrupole cell expansions and an optional periodic
//! correction.
//!
//! ## A basic run
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use seren::driver::Simulation;
//! use seren::parameters::SimulationParameters;
//!
//! let parameters = SimulationParameters::from_yaml_str(
//!     "ic: sod\nndim: 1\nNhydro: 400\ngamma_eos: 1.4\ntend: 0.2",
//!     &[],
//! )
//! .unwrap();
//! let mut sim = Simulation::new(parameters).unwrap();
//! let interrupt = AtomicBool::new(false);
//! sim.run(&interrupt).unwrap();
//! ```

pub mod args;
pub mod diagnostics;
pub mod domain;
pub mod driver;
pub mod eos;
pub mod error;
pub mod ghosts;
pub mod gravity;
pub mod hydro;
pub mod ics;
pub mod integrator;
pub mod kernel;
pub mod nbody;
pub mod neighbors;
pub mod parameters;
pub mod particles;
pub mod smoothing;
pub mod snapshots;
pub mod tree;

#[cfg(test)]
mod test_utils;
