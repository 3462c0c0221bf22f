mod walk;

use glam::DVec3;
use ordered_float::OrderedFloat;

use crate::particles::Particle;

pub const MAX_DEPTH: usize = 32;

/// Tight axis-aligned bounding box of a cell's members.
#[derive(Debug, Clone, Default)]
pub struct CellExtent {
    pub min: DVec3,
    pub max: DVec3,
}

impl CellExtent {
    pub fn from_positions<'a>(positions: impl Iterator<Item = &'a DVec3>) -> Self {
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for pos in positions {
            min = min.min(*pos);
            max = max.max(*pos);
        }
        Self { min, max }
    }

    pub fn center(&self) -> DVec3 {
        0.5 * (self.min + self.max)
    }

    pub fn max_side_length(&self) -> f64 {
        let side = self.max - self.min;
        side.x.max(side.y).max(side.z)
    }

    pub fn widest_axis(&self) -> usize {
        let side = self.max - self.min;
        if side.x >= side.y && side.x >= side.z {
            0
        } else if side.y >= side.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from a point to this box, zero inside.
    pub fn min_distance_sqd_point(&self, point: DVec3) -> f64 {
        let clamped = point.clamp(self.min, self.max);
        (point - clamped).length_squared()
    }

    /// Squared distance between the closest faces of two boxes, zero when
    /// they overlap.
    pub fn min_distance_sqd(&self, other: &CellExtent) -> f64 {
        let mut total = 0.0;
        for d in 0..3 {
            let gap = (self.min[d] - other.max[d]).max(other.min[d] - self.max[d]);
            if gap > 0.0 {
                total += gap * gap;
            }
        }
        total
    }

    pub fn overlaps(&self, other: &CellExtent) -> bool {
        (0..3).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }

    pub fn contains(&self, other: &CellExtent) -> bool {
        (0..3).all(|d| self.min[d] <= other.min[d] && other.max[d] <= self.max[d])
    }
}

/// Mass moments of a cell: total mass, centre of mass and the traceless
/// quadrupole tensor about it, stored as [xx, yy, zz, xy, xz, yz].
#[derive(Debug, Clone, Default)]
pub struct CellMoments {
    pub m: f64,
    pub com: DVec3,
    pub quad: [f64; 6],
}

impl CellMoments {
    fn quad_of_point(m: f64, x: DVec3) -> [f64; 6] {
        let r2 = x.length_squared();
        [
            m * (3.0 * x.x * x.x - r2),
            m * (3.0 * x.y * x.y - r2),
            m * (3.0 * x.z * x.z - r2),
            m * 3.0 * x.x * x.y,
            m * 3.0 * x.x * x.z,
            m * 3.0 * x.y * x.z,
        ]
    }

    fn from_particles(parts: &[Particle], members: &[usize], quadrupole: bool) -> Self {
        let mut moments = Self::default();
        let mut weighted = DVec3::ZERO;
        for i in members {
            let part = &parts[*i];
            moments.m += part.m;
            weighted += part.m * part.r;
        }
        if moments.m > 0.0 {
            moments.com = weighted / moments.m;
        }
        if quadrupole {
            for i in members {
                let part = &parts[*i];
                let contribution = Self::quad_of_point(part.m, part.r - moments.com);
                for k in 0..6 {
                    moments.quad[k] += contribution[k];
                }
            }
        }
        moments
    }

    /// Combines child moments into a parent via the parallel-axis shift.
    fn merge(children: [&CellMoments; 2], quadrupole: bool) -> Self {
        let mut moments = Self::default();
        let mut weighted = DVec3::ZERO;
        for child in children {
            moments.m += child.m;
            weighted += child.m * child.com;
        }
        if moments.m > 0.0 {
            moments.com = weighted / moments.m;
        }
        if quadrupole {
            for child in children {
                let shift = Self::quad_of_point(child.m, child.com - moments.com);
                for k in 0..6 {
                    moments.quad[k] += child.quad[k] + shift[k];
                }
            }
        }
        moments
    }

    /// Q . dr and dr . Q . dr for the force expansion.
    pub fn quad_dot(&self, dr: DVec3) -> (DVec3, f64) {
        let q = &self.quad;
        let qdr = DVec3::new(
            q[0] * dr.x + q[3] * dr.y + q[4] * dr.z,
            q[3] * dr.x + q[1] * dr.y + q[5] * dr.z,
            q[4] * dr.x + q[5] * dr.y + q[2] * dr.z,
        );
        (qdr, qdr.dot(dr))
    }
}

#[derive(Debug)]
pub enum Node {
    Branch(Box<[KdCell; 2]>),
    Leaf(Vec<usize>),
}

#[derive(Debug)]
pub struct KdCell {
    pub extent: CellExtent,
    pub moments: CellMoments,
    pub hmax: f64,
    pub node: Node,
}

impl KdCell {
    pub fn leaf_members(&self) -> Option<&[usize]> {
        match &self.node {
            Node::Leaf(members) => Some(members),
            Node::Branch(_) => None,
        }
    }
}

/// Balanced binary spatial tree. Particles are partitioned along the
/// widest axis of each cell with a median split, so sibling leaf sizes
/// stay within a factor of two. Cells hold non-owning indices into the
/// particle store.
pub struct KdTree {
    pub root: Option<KdCell>,
    nleafmax: usize,
    quadrupole: bool,
}

impl KdTree {
    pub fn build(
        parts: &[Particle],
        indices: Vec<usize>,
        nleafmax: usize,
        quadrupole: bool,
    ) -> Self {
        let root = if indices.is_empty() {
            None
        } else {
            let mut indices = indices;
            Some(Self::build_cell(
                parts,
                &mut indices,
                nleafmax.max(1),
                0,
            ))
        };
        let mut tree = Self {
            root,
            nleafmax: nleafmax.max(1),
            quadrupole,
        };
        tree.stock(parts);
        tree
    }

    fn build_cell(
        parts: &[Particle],
        indices: &mut [usize],
        nleafmax: usize,
        depth: usize,
    ) -> KdCell {
        let extent = CellExtent::from_positions(indices.iter().map(|i| &parts[*i].r));
        if indices.len() <= nleafmax || depth >= MAX_DEPTH {
            return KdCell {
                extent,
                moments: CellMoments::default(),
                hmax: 0.0,
                node: Node::Leaf(indices.to_vec()),
            };
        }
        let axis = extent.widest_axis();
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by_key(mid, |i| OrderedFloat(parts[*i].r[axis]));
        let (lhs, rhs) = indices.split_at_mut(mid);
        let left = Self::build_cell(parts, lhs, nleafmax, depth + 1);
        let right = Self::build_cell(parts, rhs, nleafmax, depth + 1);
        KdCell {
            extent,
            moments: CellMoments::default(),
            hmax: 0.0,
            node: Node::Branch(Box::new([left, right])),
        }
    }

    /// Full rebuild over a fresh index set; used when membership has
    /// degraded or the particle count changed.
    pub fn rebuild(&mut self, parts: &[Particle], indices: Vec<usize>) {
        *self = Self::build(parts, indices, self.nleafmax, self.quadrupole);
    }

    /// Bottom-up recomputation of bounding boxes, mass moments and hmax.
    /// Used after every drift; membership is only refreshed by a rebuild.
    pub fn stock(&mut self, parts: &[Particle]) {
        let quadrupole = self.quadrupole;
        if let Some(root) = &mut self.root {
            Self::stock_cell(root, parts, quadrupole);
        }
    }

    fn stock_cell(cell: &mut KdCell, parts: &[Particle], quadrupole: bool) {
        match &mut cell.node {
            Node::Leaf(members) => {
                cell.extent = CellExtent::from_positions(members.iter().map(|i| &parts[*i].r));
                cell.moments = CellMoments::from_particles(parts, members, quadrupole);
                cell.hmax = members
                    .iter()
                    .map(|i| OrderedFloat(parts[*i].h))
                    .max()
                    .map(|h| h.0)
                    .unwrap_or(0.0);
            }
            Node::Branch(children) => {
                for child in children.iter_mut() {
                    Self::stock_cell(child, parts, quadrupole);
                }
                let [left, right] = &**children;
                cell.extent = CellExtent {
                    min: left.extent.min.min(right.extent.min),
                    max: left.extent.max.max(right.extent.max),
                };
                cell.moments =
                    CellMoments::merge([&left.moments, &right.moments], quadrupole);
                cell.hmax = left.hmax.max(right.hmax);
            }
        }
    }

    /// Leaf cells holding at least one active particle.
    pub fn active_cells<'a>(&'a self, parts: &[Particle]) -> Vec<&'a KdCell> {
        let mut cells = Vec::new();
        if let Some(root) = &self.root {
            Self::collect_active(root, parts, &mut cells);
        }
        cells
    }

    fn collect_active<'a>(cell: &'a KdCell, parts: &[Particle], out: &mut Vec<&'a KdCell>) {
        match &cell.node {
            Node::Leaf(members) => {
                if members.iter().any(|i| parts[*i].active && parts[*i].is_alive()) {
                    out.push(cell);
                }
            }
            Node::Branch(children) => {
                for child in children.iter() {
                    Self::collect_active(child, parts, out);
                }
            }
        }
    }

    pub fn active_particles(cell: &KdCell, parts: &[Particle]) -> Vec<usize> {
        cell.leaf_members()
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|i| parts[*i].active && parts[*i].is_alive())
                    .collect()
            })
            .unwrap_or_default()
    }
}
