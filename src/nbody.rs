use glam::DVec3;

use crate::domain::DomainBox;
use crate::gravity::EwaldCorrection;
use crate::kernel::Kernel;
use crate::particles::Particle;

/// Point-mass star particle advanced by the N-body collaborator.
#[derive(Debug, Clone)]
pub struct StarParticle {
    pub r: DVec3,
    pub v: DVec3,
    pub a: DVec3,
    pub m: f64,
    pub h: f64,
    pub gpot: f64,
}

impl StarParticle {
    pub fn new(r: DVec3, v: DVec3, m: f64, h: f64) -> Self {
        Self {
            r,
            v,
            a: DVec3::ZERO,
            m,
            h,
            gpot: 0.0,
        }
    }
}

/// Collaborator interface: advance the star set by one sub-step given
/// the gas it couples to. Star state is exposed back through the slice.
pub trait StarIntegrator {
    fn advance(
        &self,
        stars: &mut [StarParticle],
        gas: &[Particle],
        box_: &DomainBox,
        kernel: &Kernel,
        ewald: Option<&dyn EwaldCorrection>,
        dt: f64,
    );
}

/// Leapfrog kick-drift-kick over the star array with direct-sum
/// softened gravity from stars and gas.
pub struct LeapfrogNbody;

impl LeapfrogNbody {
    fn accelerations(
        stars: &mut [StarParticle],
        gas: &[Particle],
        box_: &DomainBox,
        kernel: &Kernel,
        ewald: Option<&dyn EwaldCorrection>,
    ) {
        let positions: Vec<(DVec3, f64, f64)> =
            stars.iter().map(|s| (s.r, s.m, s.h)).collect();
        for star in stars.iter_mut() {
            star.a = DVec3::ZERO;
            star.gpot = 0.0;
            for (r_other, m_other, h_other) in &positions {
                let dr = box_.nearest_image_vec(*r_other, star.r);
                let drsqd = dr.length_squared();
                if drsqd == 0.0 {
                    continue;
                }
                let drmag = drsqd.sqrt();
                let hmean = 2.0 * star.h * h_other / (star.h + h_other);
                let s = drmag / hmean;
                star.a += m_other * kernel.wgrav(s) / (hmean * hmean) * (dr / drmag);
                star.gpot += m_other * kernel.wpot(s) / hmean;
                if let Some(ewald) = ewald {
                    let (da, dpot) = ewald.correction(*m_other, dr);
                    star.a += da;
                    star.gpot += dpot;
                }
            }
            for part in gas {
                if part.is_ghost() || !part.is_alive() {
                    continue;
                }
                let dr = box_.nearest_image_vec(part.r, star.r);
                let drsqd = dr.length_squared();
                if drsqd == 0.0 {
                    continue;
                }
                let drmag = drsqd.sqrt();
                let hmean = 2.0 * star.h * part.h / (star.h + part.h);
                let s = drmag / hmean;
                star.a += part.m * kernel.wgrav(s) / (hmean * hmean) * (dr / drmag);
                star.gpot += part.m * kernel.wpot(s) / hmean;
                if let Some(ewald) = ewald {
                    let (da, dpot) = ewald.correction(part.m, dr);
                    star.a += da;
                    star.gpot += dpot;
                }
            }
        }
    }
}

impl StarIntegrator for LeapfrogNbody {
    fn advance(
        &self,
        stars: &mut [StarParticle],
        gas: &[Particle],
        box_: &DomainBox,
        kernel: &Kernel,
        ewald: Option<&dyn EwaldCorrection>,
        dt: f64,
    ) {
        for star in stars.iter_mut() {
            star.v += 0.5 * dt * star.a;
            star.r += dt * star.v;
        }
        Self::accelerations(stars, gas, box_, kernel, ewald);
        for star in stars.iter_mut() {
            star.v += 0.5 * dt * star.a;
            let mut v = star.v;
            box_.wrap_or_reflect(&mut star.r, &mut v);
            star.v = v;
        }
    }
}
