use rayon::prelude::*;

use crate::domain::BoundaryKind;
use crate::domain::DomainBox;
use crate::error::SimError;
use crate::particles::AxisOp;
use crate::particles::GhostType;
use crate::particles::ParticleStore;

/// Creates and refreshes the ghost-particle images that represent
/// periodic and mirror neighbours near closed faces. Creation is
/// serialized (it appends to the shared tail); state refresh is
/// parallel over disjoint tail slots.
pub struct GhostEngine {
    /// Particles within `reach * h` of a closed face are replicated.
    reach: f64,
}

impl GhostEngine {
    pub fn new(ghost_range: f64, kernrange: f64) -> Self {
        Self {
            reach: ghost_range * kernrange,
        }
    }

    /// Rebuilds the ghost tail from scratch. Dimensions are swept in
    /// order and the scan range is extended after each dimension so that
    /// ghosts themselves are cloned across orthogonal closed faces,
    /// producing edge and corner images.
    pub fn refresh_ghosts(
        &self,
        store: &mut ParticleStore,
        box_: &DomainBox,
        step: usize,
    ) -> Result<(), SimError> {
        store.clear_ghosts();
        for d in 0..box_.ndim {
            if !box_.any_closed_face(d) {
                continue;
            }
            let ntot = store.ntot();
            for i in 0..ntot {
                let part = &store.parts()[i];
                if !part.is_alive() {
                    continue;
                }
                let reach = self.reach * part.h;
                let near_lhs = part.r[d] < box_.boxmin[d] + reach;
                let near_rhs = part.r[d] > box_.boxmax[d] - reach;
                if near_lhs {
                    if let Some(op) = face_op(box_.boundaries[d][0], true) {
                        self.create_ghost(store, box_, i, d, op, step)?;
                    }
                }
                if near_rhs {
                    if let Some(op) = face_op(box_.boundaries[d][1], false) {
                        self.create_ghost(store, box_, i, d, op, step)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Clones particle `i` through the face transform `op` on dimension
    /// `d`. `iorig` chases through to the true original so that ghost
    /// state can always be reloaded from a real particle.
    fn create_ghost(
        &self,
        store: &mut ParticleStore,
        box_: &DomainBox,
        i: usize,
        d: usize,
        op: AxisOp,
        step: usize,
    ) -> Result<(), SimError> {
        let parent = &store.parts()[i];
        let mut ghost = parent.clone();
        ghost.iorig = if parent.is_ghost() { parent.iorig } else { i };
        ghost.ghost = parent.ghost.with_op(d, op);
        ghost.active = false;
        ghost.id = store.ntot();
        // The parent state is already transformed; only the new axis op
        // is applied here.
        let single = GhostType::real().with_op(d, op);
        single.apply(box_, &mut ghost.r, &mut ghost.v);
        ghost.sync_primitive_velocity();
        ghost.reflect_gradients(&single);
        if !store.push_ghost(ghost) {
            return Err(SimError::GhostOverflow {
                step,
                required: store.nghost() + 1,
                available: store.ghost_capacity(),
            });
        }
        Ok(())
    }

    /// Reloads every ghost from its original and reapplies the transform.
    /// Writes are disjoint per tail slot, so the sweep runs in parallel.
    pub fn copy_state_to_ghosts(&self, store: &mut ParticleStore, box_: &DomainBox) {
        let nhydro = store.nhydro();
        let parts = store.parts_mut();
        let (real, ghosts) = parts.split_at_mut(nhydro);
        ghosts.par_iter_mut().for_each(|ghost| {
            let id = ghost.id;
            let ghost_type = ghost.ghost;
            let iorig = ghost.iorig;
            *ghost = real[iorig].clone();
            ghost.id = id;
            ghost.iorig = iorig;
            ghost.ghost = ghost_type;
            ghost.active = false;
            ghost_type.apply(box_, &mut ghost.r, &mut ghost.v);
            ghost.sync_primitive_velocity();
            ghost.reflect_gradients(&ghost_type);
        });
    }
}

fn face_op(kind: BoundaryKind, lhs: bool) -> Option<AxisOp> {
    match (kind, lhs) {
        (BoundaryKind::Open, _) => None,
        (BoundaryKind::Periodic, true) => Some(AxisOp::PeriodicLhs),
        (BoundaryKind::Periodic, false) => Some(AxisOp::PeriodicRhs),
        (BoundaryKind::Mirror, true) => Some(AxisOp::MirrorLhs),
        (BoundaryKind::Mirror, false) => Some(AxisOp::MirrorRhs),
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use rand::Rng;
    use rand::SeedableRng;

    use super::GhostEngine;
    use crate::domain::BoundaryKind;
    use crate::domain::DomainBox;
    use crate::error::SimError;
    use crate::particles::Particle;
    use crate::particles::ParticleStore;
    use crate::test_utils::assert_float_is_close;

    fn periodic_box(ndim: usize) -> DomainBox {
        DomainBox::new(
            ndim,
            DVec3::ZERO,
            DVec3::ONE,
            [[BoundaryKind::Periodic; 2]; 3],
        )
    }

    fn particle_at(id: usize, r: DVec3, h: f64) -> Particle {
        let mut part = Particle::new(id, r, DVec3::ZERO, 1.0, 1.0);
        part.h = h;
        part
    }

    #[test]
    fn corner_particle_produces_edge_and_corner_images() {
        // A particle near both the x and y lhs faces of a 2-D periodic box
        // yields three images: x-shifted, y-shifted and the corner copy.
        let box_ = periodic_box(2);
        let store_parts = vec![particle_at(0, DVec3::new(0.05, 0.05, 0.0), 0.02)];
        let mut store = ParticleStore::new(store_parts, 100);
        let engine = GhostEngine::new(1.6, 2.0);
        engine.refresh_ghosts(&mut store, &box_, 0).unwrap();
        assert_eq!(store.nghost(), 3);
        let mut positions: Vec<_> = store
            .ghosts()
            .iter()
            .map(|g| (g.r.x, g.r.y))
            .collect();
        positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_float_is_close(positions[0].0, 0.05);
        assert_float_is_close(positions[0].1, 1.05);
        assert_float_is_close(positions[1].0, 1.05);
        assert_float_is_close(positions[1].1, 0.05);
        assert_float_is_close(positions[2].0, 1.05);
        assert_float_is_close(positions[2].1, 1.05);
    }

    #[test]
    fn mirror_ghost_flips_velocity_component() {
        let box_ = DomainBox::new(
            1,
            DVec3::ZERO,
            DVec3::ONE,
            [
                [BoundaryKind::Mirror, BoundaryKind::Open],
                [BoundaryKind::Open, BoundaryKind::Open],
                [BoundaryKind::Open, BoundaryKind::Open],
            ],
        );
        let mut part = particle_at(0, DVec3::new(0.03, 0.0, 0.0), 0.02);
        part.v = DVec3::new(0.7, 0.2, 0.0);
        let mut store = ParticleStore::new(vec![part], 10);
        let engine = GhostEngine::new(1.6, 2.0);
        engine.refresh_ghosts(&mut store, &box_, 0).unwrap();
        assert_eq!(store.nghost(), 1);
        let ghost = &store.ghosts()[0];
        assert_float_is_close(ghost.r.x, -0.03);
        assert_float_is_close(ghost.v.x, -0.7);
        assert_float_is_close(ghost.v.y, 0.2);
        assert!(!ghost.active);
    }

    #[test]
    fn refresh_is_idempotent() {
        // Two refreshes without advancing time must produce bit-identical
        // ghost counts and positions.
        let box_ = periodic_box(3);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let particles: Vec<_> = (0..200)
            .map(|i| {
                particle_at(
                    i,
                    DVec3::new(rng.gen(), rng.gen(), rng.gen()),
                    0.05,
                )
            })
            .collect();
        let mut store = ParticleStore::new(particles, 4000);
        let engine = GhostEngine::new(1.6, 2.0);
        engine.refresh_ghosts(&mut store, &box_, 0).unwrap();
        let first: Vec<_> = store.ghosts().iter().map(|g| (g.iorig, g.r)).collect();
        engine.refresh_ghosts(&mut store, &box_, 0).unwrap();
        let second: Vec<_> = store.ghosts().iter().map(|g| (g.iorig, g.r)).collect();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
        }
    }

    #[test]
    fn ghost_state_reloads_from_parent() {
        let box_ = periodic_box(1);
        let mut store = ParticleStore::new(
            vec![particle_at(0, DVec3::new(0.02, 0.0, 0.0), 0.02)],
            10,
        );
        let engine = GhostEngine::new(1.6, 2.0);
        engine.refresh_ghosts(&mut store, &box_, 0).unwrap();
        store.real_mut()[0].rho = 3.5;
        store.real_mut()[0].u = 2.25;
        engine.copy_state_to_ghosts(&mut store, &box_);
        let ghost = &store.ghosts()[0];
        assert_float_is_close(ghost.rho, 3.5);
        assert_float_is_close(ghost.u, 2.25);
        assert_float_is_close(ghost.r.x, 1.02);
    }

    #[test]
    fn overflow_reports_sizing() {
        let box_ = periodic_box(1);
        let mut store = ParticleStore::new(
            vec![particle_at(0, DVec3::new(0.02, 0.0, 0.0), 0.02)],
            1,
        );
        let engine = GhostEngine::new(1.6, 2.0);
        let result = engine.refresh_ghosts(&mut store, &box_, 3);
        assert!(matches!(
            result,
            Err(SimError::GhostOverflow { step: 3, .. })
        ));
    }
}
