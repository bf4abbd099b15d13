//! Static block decomposition of a global 3-D domain over a process group.
//!
//! The process count `P` is split into a `nb_x × nb_y × nb_z` grid by peeling
//! greatest common divisors, z first:
//!
//! ```text
//! nb_z = gcd(P, dim_x * dim_y)
//! nb_y = gcd(P / nb_z, dim_z)
//! nb_x = (P / nb_z) / nb_y
//! ```
//!
//! The order is significant: a different balanced triple changes the neighbor
//! topology and therefore the exchanged halos. Ranks are laid out with x
//! varying fastest and z slowest, so neighbors sit at `±1` (x), `±nb_x` (y)
//! and `±nb_x*nb_y` (z) in flat rank space.

use std::fmt;

use crate::HALO_WIDTH;
use crate::debug_invariants::DebugInvariants;
use crate::stencil_error::StencilError;

/// One of the three axes of the domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// Face of a subdomain. `Left`, `Top` and `Front` are the low sides of the
/// x, y and z axes respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
    Front,
    Back,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Left,
        Direction::Right,
        Direction::Top,
        Direction::Bottom,
        Direction::Front,
        Direction::Back,
    ];

    pub const fn axis(self) -> Axis {
        match self {
            Direction::Left | Direction::Right => Axis::X,
            Direction::Top | Direction::Bottom => Axis::Y,
            Direction::Front | Direction::Back => Axis::Z,
        }
    }

    /// True for the high-coordinate side of the axis.
    pub const fn is_upper(self) -> bool {
        matches!(self, Direction::Right | Direction::Bottom | Direction::Back)
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Top => Direction::Bottom,
            Direction::Bottom => Direction::Top,
            Direction::Front => Direction::Back,
            Direction::Back => Direction::Front,
        }
    }

    pub const fn lower(axis: Axis) -> Direction {
        match axis {
            Axis::X => Direction::Left,
            Axis::Y => Direction::Top,
            Axis::Z => Direction::Front,
        }
    }

    pub const fn upper(axis: Axis) -> Direction {
        Direction::lower(axis).opposite()
    }
}

/// Neighbor ranks on the six faces. `None` marks the global boundary: no
/// message is sent to or expected from that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub top: Option<usize>,
    pub bottom: Option<usize>,
    pub front: Option<usize>,
    pub back: Option<usize>,
}

impl Neighbors {
    pub fn get(&self, dir: Direction) -> Option<usize> {
        match dir {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Top => self.top,
            Direction::Bottom => self.bottom,
            Direction::Front => self.front,
            Direction::Back => self.back,
        }
    }

    /// Present neighbors, in `Direction::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|r| (d, r)))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let c = a % b;
        a = b;
        b = c;
    }
    a
}

/// Geometry and topology of one rank's subdomain.
///
/// Built once per run by [`Decomposition::new`]; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    rank: usize,
    process_count: usize,
    global: [usize; 3],
    factors: [usize; 3],
    coords: [usize; 3],
    local_dims: [usize; 3],
    offset: [usize; 3],
    neighbors: Neighbors,
}

impl Decomposition {
    /// Decompose `global` (`[dim_x, dim_y, dim_z]`) over `process_count` ranks
    /// and return the view of `rank`.
    ///
    /// # Errors
    /// - [`StencilError::InvalidRank`] if `process_count == 0` or
    ///   `rank >= process_count`.
    /// - [`StencilError::EmptyDomain`] if any global dimension is zero.
    /// - [`StencilError::Unfactorizable`] if the splitting does not multiply
    ///   back to `process_count`.
    /// - [`StencilError::AxisOverflow`] if it puts more ranks on an axis than
    ///   the axis has cells.
    pub fn new(
        rank: usize,
        process_count: usize,
        global: [usize; 3],
    ) -> Result<Self, StencilError> {
        if process_count == 0 || rank >= process_count {
            return Err(StencilError::InvalidRank {
                rank,
                process_count,
            });
        }
        if global.contains(&0) {
            return Err(StencilError::EmptyDomain(global));
        }
        let factors = Self::split(process_count, global);
        let [nb_x, nb_y, nb_z] = factors;
        if nb_x * nb_y * nb_z != process_count {
            return Err(StencilError::Unfactorizable {
                process_count,
                factors,
                dims: global,
            });
        }
        if let Some(axis) = Axis::ALL
            .into_iter()
            .find(|a| factors[a.index()] > global[a.index()])
        {
            return Err(StencilError::AxisOverflow {
                axis: axis.name(),
                ranks: factors[axis.index()],
                cells: global[axis.index()],
            });
        }

        let plane = process_count / nb_z;
        let rank_z = rank / plane;
        let rank_y = (rank % plane) / nb_x;
        let rank_x = (rank % plane) % nb_x;
        let coords = [rank_x, rank_y, rank_z];

        let mut local_dims = [0; 3];
        let mut offset = [0; 3];
        for axis in 0..3 {
            let quotient = global[axis] / factors[axis];
            local_dims[axis] = if coords[axis] == factors[axis] - 1 {
                quotient + global[axis] % factors[axis]
            } else {
                quotient
            };
            offset[axis] = coords[axis] * quotient;
        }

        let neighbors = Neighbors {
            left: (rank_x > 0).then(|| rank - 1),
            right: (rank_x + 1 < nb_x).then(|| rank + 1),
            top: (rank_y > 0).then(|| rank - nb_x),
            bottom: (rank_y + 1 < nb_y).then(|| rank + nb_x),
            front: (rank_z > 0).then(|| rank - plane),
            back: (rank_z + 1 < nb_z).then(|| rank + plane),
        };

        let decomposition = Self {
            rank,
            process_count,
            global,
            factors,
            coords,
            local_dims,
            offset,
            neighbors,
        };
        crate::debug_invariants!(decomposition.validate_invariants(), "Decomposition::new");

        for axis in Axis::ALL {
            let a = axis.index();
            if factors[a] > 1 && local_dims[a] < HALO_WIDTH {
                log::warn!(
                    "rank {rank}: local {}-extent {} is thinner than the halo ({HALO_WIDTH}); \
                     exchanged slabs will include halo cells",
                    axis.name(),
                    local_dims[a]
                );
            }
        }
        Ok(decomposition)
    }

    /// The `[nb_x, nb_y, nb_z]` process grid for `process_count` ranks.
    ///
    /// Only meaningful for non-zero inputs; [`Decomposition::new`] checks the
    /// result.
    pub fn split(process_count: usize, global: [usize; 3]) -> [usize; 3] {
        let p = process_count as u128;
        let nb_z = gcd(p, global[0] as u128 * global[1] as u128);
        let nb_y = gcd(p / nb_z, global[2] as u128);
        let nb_x = (p / nb_z) / nb_y;
        [nb_x as usize, nb_y as usize, nb_z as usize]
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn process_count(&self) -> usize {
        self.process_count
    }

    /// `[dim_x, dim_y, dim_z]` of the whole domain.
    #[inline]
    pub fn global_dims(&self) -> [usize; 3] {
        self.global
    }

    /// `[nb_x, nb_y, nb_z]`.
    #[inline]
    pub fn factors(&self) -> [usize; 3] {
        self.factors
    }

    /// `[rank_x, rank_y, rank_z]` in the process grid.
    #[inline]
    pub fn coords(&self) -> [usize; 3] {
        self.coords
    }

    /// Owned cells per axis, without halo.
    #[inline]
    pub fn local_dims(&self) -> [usize; 3] {
        self.local_dims
    }

    /// Global index of the first owned cell on each axis.
    #[inline]
    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    #[inline]
    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    /// Halo-padded dimensions of the meshes living on this rank.
    pub fn mesh_dims(&self) -> [usize; 3] {
        self.local_dims.map(|d| d + 2 * HALO_WIDTH)
    }

    /// Flat rank of the process at `coords`, or `None` outside the grid.
    pub fn rank_of(&self, coords: [usize; 3]) -> Option<usize> {
        let [nb_x, nb_y, nb_z] = self.factors;
        let [x, y, z] = coords;
        (x < nb_x && y < nb_y && z < nb_z).then(|| (z * nb_y + y) * nb_x + x)
    }

    /// Whether the global cell `point` is owned (not merely mirrored) here.
    pub fn owns_global(&self, point: [usize; 3]) -> bool {
        (0..3).all(|a| {
            self.offset[a] <= point[a] && point[a] < self.offset[a] + self.local_dims[a]
        })
    }

    /// Halo-padded local index of an owned global cell.
    pub fn to_local(&self, point: [usize; 3]) -> Option<[usize; 3]> {
        self.owns_global(point)
            .then(|| [0, 1, 2].map(|a| point[a] - self.offset[a] + HALO_WIDTH))
    }
}

impl DebugInvariants for Decomposition {
    fn validate_invariants(&self) -> Result<(), StencilError> {
        let [nb_x, nb_y, nb_z] = self.factors;
        if nb_x * nb_y * nb_z != self.process_count {
            return Err(StencilError::Invariant(format!(
                "factors {:?} do not multiply to {}",
                self.factors, self.process_count
            )));
        }
        if self.rank_of(self.coords) != Some(self.rank) {
            return Err(StencilError::Invariant(format!(
                "coords {:?} do not map back to rank {}",
                self.coords, self.rank
            )));
        }
        for axis in Axis::ALL {
            let a = axis.index();
            let at_low = self.coords[a] == 0;
            let at_high = self.coords[a] + 1 == self.factors[a];
            let lower = self.neighbors.get(Direction::lower(axis));
            let upper = self.neighbors.get(Direction::upper(axis));
            if lower.is_some() == at_low || upper.is_some() == at_high {
                return Err(StencilError::Invariant(format!(
                    "rank {} has inconsistent {}-neighbors {:?}/{:?} at coordinate {}",
                    self.rank,
                    axis.name(),
                    lower,
                    upper,
                    self.coords[a]
                )));
            }
            if self.offset[a] + self.local_dims[a] > self.global[a] {
                return Err(StencilError::Invariant(format!(
                    "rank {} overruns the global {}-extent",
                    self.rank,
                    axis.name()
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Decomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |r: Option<usize>| r.map_or_else(|| " -".to_string(), |r| format!("{r:>2}"));
        let n = &self.neighbors;
        writeln!(f, "RANK {}:", self.rank)?;
        writeln!(
            f,
            "  COORDS:     {},{},{}",
            self.coords[0], self.coords[1], self.coords[2]
        )?;
        writeln!(
            f,
            "  LOCAL DIMS: {},{},{}",
            self.local_dims[0], self.local_dims[1], self.local_dims[2]
        )?;
        writeln!(f, "     {}  {}", show(n.top), show(n.back))?;
        writeln!(f, "  {}  *  {}", show(n.left), show(n.right))?;
        write!(f, "  {} {}", show(n.front), show(n.bottom))
    }
}
