use super::CellExtent;
use super::KdCell;
use super::KdTree;
use super::Node;
use crate::domain::DomainBox;
use crate::neighbors::CellContribution;
use crate::neighbors::NeighborBuffers;
use crate::neighbors::Overflow;
use crate::particles::Particle;

fn bounding_radius(extent: &CellExtent) -> f64 {
    0.5 * (extent.max - extent.min).length()
}

impl KdTree {
    /// All particles within `radius` of the target box. Used by the
    /// smoothing-length solver, which retries with an expanded radius
    /// until every member particle's kernel fits inside.
    pub fn gather_neighbors(
        &self,
        parts: &[Particle],
        target: &CellExtent,
        radius: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        if let Some(root) = &self.root {
            Self::gather_walk(root, parts, target, radius, buffers)?;
        }
        Ok(())
    }

    fn gather_walk(
        cell: &KdCell,
        parts: &[Particle],
        target: &CellExtent,
        radius: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        if target.min_distance_sqd(&cell.extent) > radius * radius {
            return Ok(());
        }
        match &cell.node {
            Node::Leaf(members) => {
                for i in members {
                    if target.min_distance_sqd_point(parts[*i].r) <= radius * radius {
                        buffers.push_neib(*i)?;
                    }
                }
            }
            Node::Branch(children) => {
                for child in children.iter() {
                    Self::gather_walk(child, parts, target, radius, buffers)?;
                }
            }
        }
        Ok(())
    }

    /// Symmetric neighbour search for a target cell: every particle whose
    /// kernel could overlap a member kernel, in either direction. Ghost
    /// neighbours come from running the same walk over the ghost tree.
    /// The final per-pair trim by max(kernrange h_i, kernrange h_j) is
    /// applied by the force loops on the snapshots.
    pub fn neighbor_and_ghost_list(
        &self,
        parts: &[Particle],
        target: &CellExtent,
        hmax_cell: f64,
        kernrange: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        if let Some(root) = &self.root {
            Self::neighbor_walk(root, parts, target, kernrange * hmax_cell, kernrange, buffers)?;
        }
        Ok(())
    }

    fn neighbor_walk(
        cell: &KdCell,
        parts: &[Particle],
        target: &CellExtent,
        gather_reach: f64,
        kernrange: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        let reach = gather_reach.max(kernrange * cell.hmax);
        if target.min_distance_sqd(&cell.extent) > reach * reach {
            return Ok(());
        }
        match &cell.node {
            Node::Leaf(members) => {
                for i in members {
                    let part = &parts[*i];
                    let reach = gather_reach.max(kernrange * part.h);
                    if target.min_distance_sqd_point(part.r) <= reach * reach {
                        buffers.push_neib(*i)?;
                    }
                }
            }
            Node::Branch(children) => {
                for child in children.iter() {
                    Self::neighbor_walk(child, parts, target, gather_reach, kernrange, buffers)?;
                }
            }
        }
        Ok(())
    }

    /// Gravity walk for a target cell. Splits the tree into hydro-range
    /// neighbours (smoothed pair gravity), direct-sum particles, and
    /// accepted cells under the opening-angle criterion
    /// (size/dist)^2 * macfactor < thetamaxsqd. Distances are
    /// nearest-image so the walk is valid for periodic gravity; the
    /// long-range correction is applied separately per contribution.
    #[allow(clippy::too_many_arguments)]
    pub fn gravity_interaction_list(
        &self,
        box_: &DomainBox,
        target: &KdCell,
        kernrange: f64,
        thetamaxsqd: f64,
        macfactor: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        if let Some(root) = &self.root {
            Self::gravity_walk(root, box_, target, kernrange, thetamaxsqd, macfactor, buffers)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn gravity_walk(
        cell: &KdCell,
        box_: &DomainBox,
        target: &KdCell,
        kernrange: f64,
        thetamaxsqd: f64,
        macfactor: f64,
        buffers: &mut NeighborBuffers,
    ) -> Result<(), Overflow> {
        let target_radius = bounding_radius(&target.extent);
        let cell_radius = bounding_radius(&cell.extent);
        let dr_centers = box_.nearest_image_vec(cell.extent.center(), target.extent.center());
        let gap = dr_centers.length() - target_radius - cell_radius;
        let near_reach = kernrange * target.hmax.max(cell.hmax);
        if gap <= near_reach {
            // Within kernel reach of the target (or overlapping): these are
            // hydro-range contacts resolved particle by particle.
            match &cell.node {
                Node::Leaf(members) => {
                    for i in members {
                        buffers.push_neib(*i)?;
                    }
                }
                Node::Branch(children) => {
                    for child in children.iter() {
                        Self::gravity_walk(
                            child, box_, target, kernrange, thetamaxsqd, macfactor, buffers,
                        )?;
                    }
                }
            }
            return Ok(());
        }
        let dr_com = box_.nearest_image_vec(cell.moments.com, target.moments.com);
        let dist_eff = (dr_com.length() - target_radius).max(f64::MIN_POSITIVE);
        let size = cell.extent.max_side_length();
        if cell.moments.m > 0.0 && size * size * macfactor < thetamaxsqd * dist_eff * dist_eff {
            buffers.push_cell(CellContribution {
                com: cell.moments.com,
                m: cell.moments.m,
                quad: cell.moments.quad,
            })?;
            return Ok(());
        }
        match &cell.node {
            Node::Leaf(members) => {
                for i in members {
                    buffers.push_direct(*i)?;
                }
            }
            Node::Branch(children) => {
                for child in children.iter() {
                    Self::gravity_walk(
                        child, box_, target, kernrange, thetamaxsqd, macfactor, buffers,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Brute-force reference query used by `neib_search = brute` and by
    /// the equivalence tests.
    pub fn all_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        fn visit(cell: &KdCell, out: &mut Vec<usize>) {
            match &cell.node {
                Node::Leaf(members) => out.extend_from_slice(members),
                Node::Branch(children) => children.iter().for_each(|c| visit(c, out)),
            }
        }
        if let Some(root) = &self.root {
            visit(root, &mut out);
        }
        out
    }
}
