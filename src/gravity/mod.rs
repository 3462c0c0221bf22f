pub mod ewald;

use glam::DVec3;

pub use ewald::EwaldCorrection;
pub use ewald::ReplicaEwald;

use crate::domain::DomainBox;
use crate::error::SimError;
use crate::kernel::Kernel;
use crate::nbody::StarParticle;
use crate::neighbors::with_thread_buffers;
use crate::neighbors::CellContribution;
use crate::parameters::GravityMac;
use crate::parameters::MultipoleKind;
use crate::particles::Particle;
use crate::tree::KdCell;
use crate::tree::KdTree;

/// Per-particle gravitational result of a force phase.
#[derive(Debug, Clone)]
pub struct GravityUpdate {
    pub idx: usize,
    pub a: DVec3,
    pub gpot: f64,
}

/// Tree gravity: kernel-softened pair forces inside kernel reach, direct
/// Newtonian summation for close non-overlapping leaves, multipole
/// expansion of accepted cells, star-particle gravity, and an optional
/// periodic correction applied to every contribution.
pub struct GravitySolver<'a> {
    kernel: &'a Kernel,
    box_: &'a DomainBox,
    thetamaxsqd: f64,
    mac: GravityMac,
    multipole: MultipoleKind,
    ewald: Option<&'a dyn EwaldCorrection>,
}

impl<'a> GravitySolver<'a> {
    pub fn new(
        kernel: &'a Kernel,
        box_: &'a DomainBox,
        thetamaxsqd: f64,
        mac: GravityMac,
        multipole: MultipoleKind,
        ewald: Option<&'a dyn EwaldCorrection>,
    ) -> Self {
        Self {
            kernel,
            box_,
            thetamaxsqd,
            mac,
            multipole,
            ewald,
        }
    }

    pub fn compute_cell_gravity(
        &self,
        cell: &KdCell,
        parts: &[Particle],
        tree: &KdTree,
        stars: &[StarParticle],
        step: usize,
    ) -> Result<Vec<GravityUpdate>, SimError> {
        let active = KdTree::active_particles(cell, parts);
        if active.is_empty() {
            return Ok(Vec::new());
        }
        let macfactor = match self.mac {
            GravityMac::Geometric => 1.0,
            GravityMac::Eigenmac => active
                .iter()
                .map(|i| parts[*i].gpot.abs())
                .filter(|gpot| *gpot > 0.0)
                .map(|gpot| (1.0 / gpot).powf(2.0 / 3.0))
                .fold(1.0, f64::max),
        };
        with_thread_buffers(step, |buffers| {
            tree.gravity_interaction_list(
                self.box_,
                cell,
                self.kernel.kernrange(),
                self.thetamaxsqd,
                macfactor,
                buffers,
            )?;
            buffers.snapshot_neighbors(parts);
            // The fast variants expand the summed cell field once about
            // the target's centre of mass and apply it to every member.
            let fast = matches!(
                self.multipole,
                MultipoleKind::FastMonopole | MultipoleKind::FastQuadrupole
            );
            let expansion = fast.then(|| self.cell_field_expansion(cell, &buffers.cells));
            let mut updates = Vec::with_capacity(active.len());
            for i in &active {
                let part = &parts[*i];
                let mut a = DVec3::ZERO;
                let mut gpot = 0.0;
                self.add_near_contributions(part, &buffers.neibpart, &mut a, &mut gpot);
                self.add_direct_contributions(
                    part,
                    parts,
                    &buffers.directlist,
                    &mut a,
                    &mut gpot,
                );
                match &expansion {
                    Some(expansion) => {
                        let offset = part.r - cell.moments.com;
                        a += expansion.a0 + expansion.tidal_dot(offset);
                        gpot += expansion.pot0 + expansion.a0.dot(offset);
                    }
                    None => {
                        self.add_cell_contributions(part, &buffers.cells, &mut a, &mut gpot);
                    }
                }
                self.add_star_contributions(part, stars, &mut a, &mut gpot);
                updates.push(GravityUpdate {
                    idx: part.id,
                    a,
                    gpot,
                });
            }
            Ok(updates)
        })
    }

    /// Kernel-softened pair gravity over the near list. The smoothed
    /// force law reduces to Newtonian outside both kernels, so one
    /// formula covers the whole list.
    fn add_near_contributions(
        &self,
        part: &Particle,
        neighbors: &[Particle],
        a: &mut DVec3,
        gpot: &mut f64,
    ) {
        for neib in neighbors {
            let dr = self.box_.nearest_image_vec(neib.r, part.r);
            let drsqd = dr.length_squared();
            if drsqd == 0.0 {
                continue;
            }
            let drmag = drsqd.sqrt();
            let runit = dr / drmag;
            let si = drmag / part.h;
            let sj = drmag / neib.h;
            let forcefac = 0.5
                * (self.kernel.wgrav(si) / (part.h * part.h)
                    + self.kernel.wgrav(sj) / (neib.h * neib.h));
            *a += neib.m * forcefac * runit;
            *gpot +=
                neib.m * 0.5 * (self.kernel.wpot(si) / part.h + self.kernel.wpot(sj) / neib.h);
            // Grad-h correction to the smoothed pair force; vanishes
            // outside both kernels with the hydro kernel gradient.
            let ndim = self.kernel.ndim() as i32;
            let gradw_i = self.kernel.w1(si) / part.h.powi(ndim + 1);
            let gradw_j = self.kernel.w1(sj) / neib.h.powi(ndim + 1);
            *a -= 0.5
                * neib.m
                * (part.zeta * part.invomega * gradw_i + neib.zeta * neib.invomega * gradw_j)
                * runit;
            if let Some(ewald) = self.ewald {
                let (da, dpot) = ewald.correction(neib.m, dr);
                *a += da;
                *gpot += dpot;
            }
        }
    }

    /// Newtonian point-point sum, softened by the mean smoothing length.
    fn add_direct_contributions(
        &self,
        part: &Particle,
        parts: &[Particle],
        directlist: &[usize],
        a: &mut DVec3,
        gpot: &mut f64,
    ) {
        for j in directlist {
            let neib = &parts[*j];
            let dr = self.box_.nearest_image_vec(neib.r, part.r);
            let drsqd = dr.length_squared();
            if drsqd == 0.0 {
                continue;
            }
            let drmag = drsqd.sqrt();
            let hmean = 0.5 * (part.h + neib.h);
            let s = drmag / hmean;
            *a += neib.m * self.kernel.wgrav(s) / (hmean * hmean) * (dr / drmag);
            *gpot += neib.m * self.kernel.wpot(s) / hmean;
            if let Some(ewald) = self.ewald {
                let (da, dpot) = ewald.correction(neib.m, dr);
                *a += da;
                *gpot += dpot;
            }
        }
    }

    fn add_cell_contributions(
        &self,
        part: &Particle,
        cells: &[CellContribution],
        a: &mut DVec3,
        gpot: &mut f64,
    ) {
        let quadrupole = matches!(
            self.multipole,
            MultipoleKind::Quadrupole | MultipoleKind::FastQuadrupole
        );
        for cell in cells {
            let dr = self.box_.nearest_image_vec(cell.com, part.r);
            let (da, dpot) = cell_term(cell, dr, quadrupole);
            *a += da;
            *gpot += dpot;
            if let Some(ewald) = self.ewald {
                let (da, dpot) = ewald.correction(cell.m, dr);
                *a += da;
                *gpot += dpot;
            }
        }
    }

    /// Taylor expansion of the summed cell field about the target cell's
    /// centre of mass: field value plus first derivative (tidal tensor).
    fn cell_field_expansion(&self, target: &KdCell, cells: &[CellContribution]) -> FieldExpansion {
        let quadrupole = self.multipole == MultipoleKind::FastQuadrupole;
        let mut expansion = FieldExpansion::default();
        for cell in cells {
            let dr = self.box_.nearest_image_vec(cell.com, target.moments.com);
            let (da, dpot) = cell_term(cell, dr, quadrupole);
            expansion.a0 += da;
            expansion.pot0 += dpot;
            let drsqd = dr.length_squared().max(f64::MIN_POSITIVE);
            let drmag = drsqd.sqrt();
            let invdr3 = 1.0 / (drsqd * drmag);
            let invdr5 = invdr3 / drsqd;
            for k in 0..3 {
                for l in 0..3 {
                    let delta = if k == l { 1.0 } else { 0.0 };
                    expansion.tidal[k][l] +=
                        cell.m * (3.0 * dr[k] * dr[l] * invdr5 - delta * invdr3);
                }
            }
            if let Some(ewald) = self.ewald {
                let (da, dpot) = ewald.correction(cell.m, dr);
                expansion.a0 += da;
                expansion.pot0 += dpot;
            }
        }
        expansion
    }

    /// Softened star-particle gravity with the symmetrized smoothing
    /// length 2 h_i h_s / (h_i + h_s).
    fn add_star_contributions(
        &self,
        part: &Particle,
        stars: &[StarParticle],
        a: &mut DVec3,
        gpot: &mut f64,
    ) {
        for star in stars {
            let dr = self.box_.nearest_image_vec(star.r, part.r);
            let drsqd = dr.length_squared();
            if drsqd == 0.0 {
                continue;
            }
            let drmag = drsqd.sqrt();
            let hmean = 2.0 * part.h * star.h / (part.h + star.h);
            let s = drmag / hmean;
            *a += star.m * self.kernel.wgrav(s) / (hmean * hmean) * (dr / drmag);
            *gpot += star.m * self.kernel.wpot(s) / hmean;
            if let Some(ewald) = self.ewald {
                let (da, dpot) = ewald.correction(star.m, dr);
                *a += da;
                *gpot += dpot;
            }
        }
    }
}

#[derive(Debug, Default)]
struct FieldExpansion {
    a0: DVec3,
    pot0: f64,
    tidal: [[f64; 3]; 3],
}

impl FieldExpansion {
    fn tidal_dot(&self, offset: DVec3) -> DVec3 {
        DVec3::new(
            self.tidal[0][0] * offset.x + self.tidal[0][1] * offset.y + self.tidal[0][2] * offset.z,
            self.tidal[1][0] * offset.x + self.tidal[1][1] * offset.y + self.tidal[1][2] * offset.z,
            self.tidal[2][0] * offset.x + self.tidal[2][1] * offset.y + self.tidal[2][2] * offset.z,
        )
    }
}

/// Monopole (plus optional quadrupole) field of a cell at displacement
/// `dr` from sink to cell centre of mass.
fn cell_term(cell: &CellContribution, dr: DVec3, quadrupole: bool) -> (DVec3, f64) {
    let drsqd = dr.length_squared().max(f64::MIN_POSITIVE);
    let drmag = drsqd.sqrt();
    let invdr3 = 1.0 / (drsqd * drmag);
    let mut a = cell.m * dr * invdr3;
    let mut pot = cell.m / drmag;
    if quadrupole {
        let q = &cell.quad;
        let qdr = DVec3::new(
            q[0] * dr.x + q[3] * dr.y + q[4] * dr.z,
            q[3] * dr.x + q[1] * dr.y + q[5] * dr.z,
            q[4] * dr.x + q[5] * dr.y + q[2] * dr.z,
        );
        let drqdr = qdr.dot(dr);
        let invdr5 = invdr3 / drsqd;
        let invdr7 = invdr5 / drsqd;
        a += qdr * invdr5 - 2.5 * drqdr * dr * invdr7;
        pot += 0.5 * drqdr * invdr5;
    }
    (a, pot)
}
