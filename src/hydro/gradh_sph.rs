use glam::DVec3;

use super::Dissipation;
use super::ForceUpdate;
use crate::error::SimError;
use crate::kernel::Kernel;
use crate::neighbors::with_thread_buffers;
use crate::parameters::AcondKind;
use crate::parameters::AviscKind;
use crate::particles::Particle;
use crate::particles::ParticleStore;
use crate::tree::KdCell;
use crate::tree::KdTree;

/// Softening of the viscous mu factor, in units of the mean smoothing
/// length squared.
const MU_SOFTENING: f64 = 0.01;

/// Grad-h SPH momentum and energy equations with artificial viscosity
/// and optional conductivity. Every active particle computes its own
/// full neighbour sum; the symmetric do-pair-once discipline is only
/// used by the flux-based dialect.
pub struct GradhSphForces<'a> {
    kernel: &'a Kernel,
    dissipation: Dissipation,
    ndim: i32,
}

impl<'a> GradhSphForces<'a> {
    pub fn new(kernel: &'a Kernel, dissipation: Dissipation) -> Self {
        Self {
            kernel,
            ndim: kernel.ndim() as i32,
            dissipation,
        }
    }

    pub fn compute_cell_forces(
        &self,
        cell: &KdCell,
        parts: &[Particle],
        store: &ParticleStore,
        tree: &KdTree,
        ghost_tree: Option<&KdTree>,
        step: usize,
    ) -> Result<Vec<ForceUpdate>, SimError> {
        let active = KdTree::active_particles(cell, parts);
        if active.is_empty() {
            return Ok(Vec::new());
        }
        let kernrange = self.kernel.kernrange();
        let hmax_cell = active.iter().map(|i| parts[*i].h).fold(cell.hmax, f64::max);
        with_thread_buffers(step, |buffers| {
            tree.neighbor_and_ghost_list(parts, &cell.extent, hmax_cell, kernrange, buffers)?;
            if let Some(ghost_tree) = ghost_tree {
                ghost_tree.neighbor_and_ghost_list(
                    parts,
                    &cell.extent,
                    hmax_cell,
                    kernrange,
                    buffers,
                )?;
            }
            buffers.snapshot_neighbors(parts);
            let mut updates = Vec::with_capacity(active.len());
            for i in &active {
                updates.push(self.particle_forces(&parts[*i], &buffers.neibpart, store));
            }
            Ok(updates)
        })
    }

    fn particle_forces(
        &self,
        part: &Particle,
        neighbors: &[Particle],
        store: &ParticleStore,
    ) -> ForceUpdate {
        let kernrange = self.kernel.kernrange();
        let mut a = DVec3::ZERO;
        let mut dudt = 0.0;
        let mut vsig_max = part.sound;
        // P / (Omega rho^2), the symmetrized pressure factor.
        let pfac_i = part.press * part.invomega / (part.rho * part.rho);
        for neib in neighbors {
            let dr = part.r - neib.r;
            let drsqd = dr.length_squared();
            // Trim the raw tree-walk output by the actual pair range.
            let reach = kernrange * part.h.max(neib.h);
            if drsqd > reach * reach || drsqd == 0.0 {
                continue;
            }
            let drmag = drsqd.sqrt();
            let runit = dr / drmag;
            let dv = part.v - neib.v;
            let dvdr = dv.dot(dr);
            let grad_i = runit * self.kernel.w1(drmag / part.h) / part.h.powi(self.ndim + 1);
            let grad_j = runit * self.kernel.w1(drmag / neib.h) / neib.h.powi(self.ndim + 1);
            let grad_mean = 0.5 * (grad_i + grad_j);
            let pfac_j = neib.press * neib.invomega / (neib.rho * neib.rho);
            a -= neib.m * (pfac_i * grad_i + pfac_j * grad_j);
            dudt += pfac_i * neib.m * dv.dot(grad_i);
            let cbar = 0.5 * (part.sound + neib.sound);
            let vsig_pair = part.sound + neib.sound
                - self.dissipation.beta * (dv.dot(runit)).min(0.0);
            vsig_max = vsig_max.max(vsig_pair);
            if self.dissipation.avisc == AviscKind::Mon97 && dvdr < 0.0 {
                let hbar = 0.5 * (part.h + neib.h);
                let rhobar = 0.5 * (part.rho + neib.rho);
                let alpha = 0.5 * (part.alpha + neib.alpha);
                let mu = hbar * dvdr / (drsqd + MU_SOFTENING * hbar * hbar);
                let pi_visc =
                    (-alpha * cbar * mu + self.dissipation.beta * mu * mu) / rhobar;
                a -= neib.m * pi_visc * grad_mean;
                dudt += 0.5 * neib.m * pi_visc * dv.dot(grad_mean);
            }
            if self.dissipation.acond == AcondKind::Wadsley {
                let rhobar = 0.5 * (part.rho + neib.rho);
                let vcond = (dv.dot(runit)).abs();
                // Heat flows down the thermal gradient; grad_mean . runit
                // is negative, so the sign comes out right.
                dudt -= neib.m * vcond * (part.u - neib.u) * grad_mean.dot(runit) / rhobar;
            }
            // Timestep-level coupling: both sides of the interaction see
            // each other's level.
            let j = if neib.is_ghost() { neib.iorig } else { neib.id };
            store.record_levelneib(j, part.level);
            store.record_levelneib(part.id, neib.level);
        }
        ForceUpdate {
            idx: part.id,
            a,
            dudt,
            vsig: vsig_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::Dissipation;
    use super::GradhSphForces;
    use crate::eos::Eos;
    use crate::kernel::Kernel;
    use crate::parameters::AcondKind;
    use crate::parameters::AviscKind;
    use crate::parameters::KernelKind;
    use crate::particles::Particle;
    use crate::particles::ParticleStore;
    use crate::smoothing::SmoothingSolver;
    use crate::tree::KdTree;
    use crate::test_utils::assert_close_tol;

    fn dissipation_off() -> Dissipation {
        Dissipation {
            avisc: AviscKind::None,
            acond: AcondKind::None,
            beta: 0.0,
        }
    }

    /// 1-D uniform gas with a linear pressure gradient: the acceleration
    /// must approach -grad(P)/rho.
    #[test]
    fn pressure_gradient_recovers_euler_acceleration() {
        let n = 200;
        let spacing = 1.0 / n as f64;
        let gamma = 5.0 / 3.0;
        let eos = Eos::ideal(gamma);
        let kernel = Kernel::new(KernelKind::M4, 1, false);
        let mut parts: Vec<Particle> = (0..n)
            .map(|i| {
                let x = (i as f64 + 0.5) * spacing;
                // u(x) chosen so P = (gamma-1) rho u = 1 + 0.5 x.
                let u = (1.0 + 0.5 * x) / (gamma - 1.0);
                let mut part =
                    Particle::new(i, DVec3::new(x, 0.0, 0.0), DVec3::ZERO, spacing, u);
                part.h = 1.2 * spacing;
                part.alpha = 0.0;
                part
            })
            .collect();
        let tree = KdTree::build(&parts, (0..n).collect(), 8, false);
        let solver = SmoothingSolver::new(&kernel, &eos, 1.2, 1e-5);
        let cells = tree.active_cells(&parts);
        let mut updates = Vec::new();
        for cell in &cells {
            updates.extend(solver.update_cell(cell, &parts, &tree, None, 0).unwrap());
        }
        for update in updates {
            let part = &mut parts[update.idx];
            part.h = update.h;
            part.rho = update.rho;
            part.ndens = update.ndens;
            part.invomega = update.invomega;
            part.sound = update.sound;
            part.press = update.press;
        }
        let store = ParticleStore::new(parts, 400);
        let parts = store.parts();
        let forces = GradhSphForces::new(&kernel, dissipation_off());
        let mut checked = 0;
        for cell in tree.active_cells(parts) {
            for update in forces
                .compute_cell_forces(cell, parts, &store, &tree, None, 0)
                .unwrap()
            {
                let x = parts[update.idx].r.x;
                if x > 0.25 && x < 0.75 {
                    // d P/d x = 0.5, rho = 1 -> a = -0.5.
                    assert_close_tol(update.a.x, -0.5, 0.05);
                    checked += 1;
                }
            }
        }
        assert!(checked > 50);
    }

    /// Uniform pressure, uniform density, zero velocity: no forces, no
    /// heating.
    #[test]
    fn equilibrium_state_produces_no_forces() {
        let n = 100;
        let spacing = 1.0 / n as f64;
        let eos = Eos::ideal(1.4);
        let kernel = Kernel::new(KernelKind::M4, 1, false);
        let mut parts: Vec<Particle> = (0..n)
            .map(|i| {
                let x = (i as f64 + 0.5) * spacing;
                let mut part =
                    Particle::new(i, DVec3::new(x, 0.0, 0.0), DVec3::ZERO, spacing, 2.5);
                part.h = 1.2 * spacing;
                part
            })
            .collect();
        let tree = KdTree::build(&parts, (0..n).collect(), 8, false);
        let solver = SmoothingSolver::new(&kernel, &eos, 1.2, 1e-5);
        let mut updates = Vec::new();
        for cell in tree.active_cells(&parts) {
            updates.extend(solver.update_cell(cell, &parts, &tree, None, 0).unwrap());
        }
        for update in updates {
            let part = &mut parts[update.idx];
            part.h = update.h;
            part.rho = update.rho;
            part.invomega = update.invomega;
            part.sound = update.sound;
            part.press = update.press;
        }
        let store = ParticleStore::new(parts, 200);
        let parts = store.parts();
        let forces = GradhSphForces::new(
            &kernel,
            Dissipation {
                avisc: AviscKind::Mon97,
                acond: AcondKind::None,
                beta: 2.0,
            },
        );
        for cell in tree.active_cells(parts) {
            for update in forces
                .compute_cell_forces(cell, parts, &store, &tree, None, 0)
                .unwrap()
            {
                let x = parts[update.idx].r.x;
                if x > 0.25 && x < 0.75 {
                    assert_close_tol(update.a.x, 0.0, 1e-8);
                    assert_close_tol(update.dudt, 0.0, 1e-8);
                }
            }
        }
    }

    /// Viscosity only acts on approaching pairs and always heats.
    #[test]
    fn viscous_heating_is_non_negative_in_compression() {
        let n = 100;
        let spacing = 1.0 / n as f64;
        let eos = Eos::ideal(1.4);
        let kernel = Kernel::new(KernelKind::M4, 1, false);
        let mut parts: Vec<Particle> = (0..n)
            .map(|i| {
                let x = (i as f64 + 0.5) * spacing;
                // Converging flow.
                let v = DVec3::new(-0.5 * (x - 0.5), 0.0, 0.0);
                let mut part = Particle::new(i, DVec3::new(x, 0.0, 0.0), v, spacing, 2.5);
                part.h = 1.2 * spacing;
                part.alpha = 1.0;
                part
            })
            .collect();
        let tree = KdTree::build(&parts, (0..n).collect(), 8, false);
        let solver = SmoothingSolver::new(&kernel, &eos, 1.2, 1e-5);
        let mut updates = Vec::new();
        for cell in tree.active_cells(&parts) {
            updates.extend(solver.update_cell(cell, &parts, &tree, None, 0).unwrap());
        }
        for update in updates {
            let part = &mut parts[update.idx];
            part.h = update.h;
            part.rho = update.rho;
            part.invomega = update.invomega;
            part.sound = update.sound;
            part.press = update.press;
        }
        let store = ParticleStore::new(parts, 200);
        let parts = store.parts();
        let forces = GradhSphForces::new(
            &kernel,
            Dissipation {
                avisc: AviscKind::Mon97,
                acond: AcondKind::None,
                beta: 2.0,
            },
        );
        for cell in tree.active_cells(parts) {
            for update in forces
                .compute_cell_forces(cell, parts, &store, &tree, None, 0)
                .unwrap()
            {
                let x = parts[update.idx].r.x;
                if x > 0.25 && x < 0.75 {
                    assert!(update.dudt >= -1e-12);
                }
            }
        }
    }
}
