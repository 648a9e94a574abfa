//! Active LOD range selection

use std::ops::RangeInclusive;

use glam::{Vec2, Vec3};

use crate::config::TerrainViewConfig;
use crate::layout::ClipmapLayout;
use crate::level::LodLevel;

/// The finest LOD is dropped while its footprint is narrower than this multiple of
/// the viewer's height above the ground.
pub const PROMOTION_HEIGHT_FACTOR: f32 = 2.5;

/// Contiguous range of LODs drawn this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveLods {
    pub min: u32,
    pub max: u32,
}

impl ActiveLods {
    pub fn new(min: u32, max: u32) -> Self {
        debug_assert!(min <= max, "inverted LOD range {min}..={max}");
        Self { min, max }
    }

    pub fn iter(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    pub fn contains(&self, lod: u32) -> bool {
        self.iter().contains(&lod)
    }

    pub fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    /// Level whose heights `lod` blends towards. The coarsest level blends with itself.
    pub fn coarser_of(&self, lod: u32) -> u32 {
        if lod < self.max {
            lod + 1
        } else {
            lod
        }
    }
}

/// Snap every configured level around the viewer and pick the active range.
///
/// `config` must already be clamped. `ground_height` is the terrain height below the viewer.
pub fn make_view(
    levels: &mut [LodLevel],
    layout: &ClipmapLayout,
    config: &TerrainViewConfig,
    viewer: Vec3,
    ground_height: f32,
) -> ActiveLods {
    let viewer_xz = Vec2::new(viewer.x, viewer.z);
    let view_height = (viewer.y - ground_height).max(0.0);
    let grid_size = layout.grid_size() as f32;

    let mut min_lod = config.min_lod;
    let mut max_lod = config.max_lod;

    // Every configured level is snapped, even past the clamped maximum
    for lod in config.min_lod..=config.max_lod {
        let level = &mut levels[lod as usize];
        level.snap_to(viewer_xz, layout);

        let grid_extent = level.grid_scale() as f32 * grid_size;
        let too_fine = grid_extent < view_height * PROMOTION_HEIGHT_FACTOR;
        if lod == min_lod && min_lod < max_lod && too_fine {
            min_lod += 1;
        }
        max_lod = config.span_clamp.clamp_max_lod(min_lod, max_lod);
    }

    ActiveLods::new(min_lod, max_lod)
}
