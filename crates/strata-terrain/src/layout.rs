//! Clipmap ring layout: block, gap and trim placement in grid quads
//!
//! Every level is a `grid_size` square of quads measured from the level's `offset`.
//! Along each axis the ring is built from four blocks and a two-quad gap:
//!
//! ```text
//!   0        T        2T  2T+2      3T+2       4T+2
//!   | block  | block  |gap| block   | block    |
//! ```
//!
//! The central `[T, 3T+2]` square is the hole that the next finer level (or, at the
//! finest level, the interior L and four inner blocks) fills, leaving a one-quad L
//! trim on two of its sides.

use glam::IVec2;
use strata_core::{Result, StrataError};

/// Smallest supported clipmap texture size (one-quad blocks)
pub const MIN_CLIPMAP_SIZE: u32 = 8;

/// Width of the gap strips between ring blocks, in quads
pub const GAP_WIDTH: i32 = 2;

/// Derived ring dimensions for a given clipmap texture size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipmapLayout {
    size: u32,
}

impl ClipmapLayout {
    /// Fails unless `size` is a power of two of at least [`MIN_CLIPMAP_SIZE`].
    pub fn new(size: u32) -> Result<Self> {
        if !size.is_power_of_two() {
            return Err(StrataError::ClipmapSizeNotPowerOfTwo(size));
        }
        if size < MIN_CLIPMAP_SIZE {
            return Err(StrataError::ClipmapSizeTooSmall {
                size,
                min: MIN_CLIPMAP_SIZE,
            });
        }
        Ok(Self { size })
    }

    /// Texels per cache side
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Mask for toroidal wrapping of texel coordinates
    pub fn mask(&self) -> i32 {
        self.size as i32 - 1
    }

    /// Quads per block side
    pub fn block_size(&self) -> i32 {
        self.size as i32 / 4 - 1
    }

    /// Quads per level side
    pub fn grid_size(&self) -> i32 {
        self.size as i32 - 2
    }

    /// Quads from a level's offset to its snapped centre position
    pub fn half_grid_size(&self) -> i32 {
        2 * self.block_size()
    }

    /// Side of the central hole, which is also the bounding square of a trim
    pub fn hole_size(&self) -> i32 {
        2 * self.block_size() + GAP_WIDTH
    }

    pub fn hole_origin(&self) -> IVec2 {
        IVec2::splat(self.block_size())
    }

    /// Side of the finest interior region: the finer footprint expressed in this level's quads
    pub fn interior_size(&self) -> i32 {
        2 * self.block_size() + 1
    }

    /// Block origins along one axis
    fn block_starts(&self) -> [i32; 4] {
        let t = self.block_size();
        [0, t, 2 * t + GAP_WIDTH, 3 * t + GAP_WIDTH]
    }

    /// The twelve blocks of the ring (the 4x4 grid minus its central 2x2)
    pub fn ring_block_origins(&self) -> [IVec2; 12] {
        let starts = self.block_starts();
        let mut origins = [IVec2::ZERO; 12];
        let mut n = 0;
        for (zi, &z) in starts.iter().enumerate() {
            for (xi, &x) in starts.iter().enumerate() {
                let inner = (1..=2).contains(&xi) && (1..=2).contains(&zi);
                if !inner {
                    origins[n] = IVec2::new(x, z);
                    n += 1;
                }
            }
        }
        origins
    }

    /// Origin of the finest interior L, shifted inside the hole by the trim offset
    pub fn finest_interior_origin(&self, trim_offset: IVec2) -> IVec2 {
        self.hole_origin() + trim_offset
    }

    /// The four blocks filling the finest level's interior, inside its L
    pub fn inner_block_origins(&self, trim_offset: IVec2) -> [IVec2; 4] {
        let t = self.block_size();
        let base = self.finest_interior_origin(trim_offset) + IVec2::ONE;
        [
            base,
            base + IVec2::new(t, 0),
            base + IVec2::new(0, t),
            base + IVec2::new(t, t),
        ]
    }

    /// Gap strips crossing the ring's top and bottom block rows (2 x T quads)
    pub fn vertical_gap_origins(&self) -> [IVec2; 2] {
        let t = self.block_size();
        [IVec2::new(2 * t, 0), IVec2::new(2 * t, 3 * t + GAP_WIDTH)]
    }

    /// Gap strips crossing the ring's left and right block columns (T x 2 quads)
    pub fn horizontal_gap_origins(&self) -> [IVec2; 2] {
        let t = self.block_size();
        [IVec2::new(0, 2 * t), IVec2::new(3 * t + GAP_WIDTH, 2 * t)]
    }

    pub fn vertical_gap_extent(&self) -> IVec2 {
        IVec2::new(GAP_WIDTH, self.block_size())
    }

    pub fn horizontal_gap_extent(&self) -> IVec2 {
        IVec2::new(self.block_size(), GAP_WIDTH)
    }
}
