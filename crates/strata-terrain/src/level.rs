//! Per-LOD clipmap state: snapping and the toroidal height/normal caches

use glam::{IVec2, Vec2};

use crate::layout::ClipmapLayout;

/// Sentinel bounds before a level has been scanned
pub const UNSCANNED_MIN_HEIGHT: f32 = f32::MAX;
pub const UNSCANNED_MAX_HEIGHT: f32 = f32::MIN;

/// Viewer XZ coordinates are clamped to `[-MAX_WORLD_COORDINATE, MAX_WORLD_COORDINATE]`
/// before snapping. Past 2^24 an `f32` no longer resolves whole world units.
pub const MAX_WORLD_COORDINATE: f32 = 16_777_216.0;

/// Which corner of the hole the one-quad L trim wraps around.
///
/// `Left`/`Right` refer to the low/high X side, `Top`/`Bottom` to the low/high Z side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteriorTrim {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl InteriorTrim {
    /// Emission order of trim batches
    pub const ALL: [InteriorTrim; 4] = [
        InteriorTrim::TopLeft,
        InteriorTrim::TopRight,
        InteriorTrim::BottomLeft,
        InteriorTrim::BottomRight,
    ];

    /// An odd snap cell leaves the low side of the hole uncovered.
    pub fn from_cell_parity(odd_x: bool, odd_z: bool) -> Self {
        match (odd_x, odd_z) {
            (true, true) => InteriorTrim::TopLeft,
            (false, true) => InteriorTrim::TopRight,
            (true, false) => InteriorTrim::BottomLeft,
            (false, false) => InteriorTrim::BottomRight,
        }
    }

    pub fn is_left(self) -> bool {
        matches!(self, InteriorTrim::TopLeft | InteriorTrim::BottomLeft)
    }

    pub fn is_top(self) -> bool {
        matches!(self, InteriorTrim::TopLeft | InteriorTrim::TopRight)
    }

    /// Shift of the finer footprint from the hole origin, in this level's quads
    pub fn trim_offset(self) -> IVec2 {
        IVec2::new(self.is_left() as i32, self.is_top() as i32)
    }
}

/// One square level of the clipmap.
///
/// The caches are addressed toroidally: texel `t` lives at `t & (size - 1)` on both
/// axes, so moving the window only rewrites the strips that entered it.
pub struct LodLevel {
    lod_index: u32,
    size: u32,
    pub(crate) offset: IVec2,
    pub(crate) texture_offset: IVec2,
    pub(crate) prev_texture_offset: IVec2,
    pub(crate) snap_offset: Vec2,
    pub(crate) interior_trim: InteriorTrim,
    /// `[own height, coarser height resampled]`
    pub(crate) heights: Vec<[f32; 2]>,
    /// `[own normal x, own normal z, coarser normal x, coarser normal z]`
    pub(crate) normals: Vec<[u8; 4]>,
    pub(crate) min_height: f32,
    pub(crate) max_height: f32,
    pub(crate) force_full_refresh: bool,
    /// Level the blend channels were last resampled from
    pub(crate) blend_source: Option<u32>,
}

impl LodLevel {
    pub fn new(lod_index: u32, size: u32) -> Self {
        let texels = (size as usize) * (size as usize);
        Self {
            lod_index,
            size,
            offset: IVec2::ZERO,
            texture_offset: IVec2::ZERO,
            prev_texture_offset: IVec2::ZERO,
            snap_offset: Vec2::ZERO,
            interior_trim: InteriorTrim::BottomRight,
            heights: vec![[0.0; 2]; texels],
            normals: vec![[128, 128, 128, 128]; texels],
            min_height: UNSCANNED_MIN_HEIGHT,
            max_height: UNSCANNED_MAX_HEIGHT,
            force_full_refresh: true,
            blend_source: None,
        }
    }

    pub fn lod_index(&self) -> u32 {
        self.lod_index
    }

    /// World units per quad: `2^lod_index`
    pub fn grid_scale(&self) -> i32 {
        1 << self.lod_index
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// World-space XZ origin of the level's footprint
    pub fn offset(&self) -> IVec2 {
        self.offset
    }

    pub fn texture_offset(&self) -> IVec2 {
        self.texture_offset
    }

    /// Viewer position relative to the centre of its snap cell
    pub fn snap_offset(&self) -> Vec2 {
        self.snap_offset
    }

    pub fn interior_trim(&self) -> InteriorTrim {
        self.interior_trim
    }

    /// `(min, max)` height of the cache, widened by a small margin.
    /// Holds the sentinels until the first refresh.
    pub fn height_range(&self) -> (f32, f32) {
        (self.min_height, self.max_height)
    }

    /// `texture_offset * grid_scale - offset`, constant for a given layout
    pub fn texcoord_offset(&self) -> IVec2 {
        self.texture_offset * self.grid_scale() - self.offset
    }

    pub fn heights(&self) -> &[[f32; 2]] {
        &self.heights
    }

    pub fn normals(&self) -> &[[u8; 4]] {
        &self.normals
    }

    /// Snap the level around the viewer's XZ position.
    ///
    /// Nearest rounding, `floor(v / snap + 0.5) * snap` with `snap_offset = v - snap_pos`,
    /// is not used here. The footprint origin is the floor cell with its low bit cleared,
    /// and the parity of that floor cell picks the trim side. Adjacent levels then nest
    /// at one of two offsets, which a single trim strip always closes.
    pub(crate) fn snap_to(&mut self, viewer: Vec2, layout: &ClipmapLayout) {
        let viewer = viewer.clamp(
            Vec2::splat(-MAX_WORLD_COORDINATE),
            Vec2::splat(MAX_WORLD_COORDINATE),
        );
        let scale = self.grid_scale();
        let cell = (viewer / scale as f32).floor().as_ivec2();
        let snap_cell = IVec2::new(cell.x & !1, cell.y & !1);
        let snap_pos = snap_cell * scale;

        self.offset = snap_pos - IVec2::splat(layout.half_grid_size() * scale);
        self.texture_offset = snap_cell;
        self.snap_offset = viewer - (snap_pos + IVec2::splat(scale)).as_vec2();
        self.interior_trim = InteriorTrim::from_cell_parity(cell.x & 1 == 1, cell.y & 1 == 1);
    }

    /// Cache slot of a texel coordinate
    pub fn wrap_index(&self, texel: IVec2) -> usize {
        let mask = self.size as i32 - 1;
        ((texel.y & mask) as usize) * self.size as usize + (texel.x & mask) as usize
    }

    pub fn texel_to_world(&self, texel: IVec2) -> IVec2 {
        (texel - self.texture_offset) * self.grid_scale() + self.offset
    }

    /// Exact for world positions on this level's grid
    pub fn world_to_texel(&self, world: IVec2) -> IVec2 {
        (world - self.offset).div_euclid(IVec2::splat(self.grid_scale())) + self.texture_offset
    }

    pub fn height_at(&self, texel: IVec2) -> [f32; 2] {
        self.heights[self.wrap_index(texel)]
    }

    pub fn normal_at(&self, texel: IVec2) -> [u8; 4] {
        self.normals[self.wrap_index(texel)]
    }

    /// Bytes held by both caches
    pub fn memory_bytes(&self) -> usize {
        self.heights.len() * std::mem::size_of::<[f32; 2]>()
            + self.normals.len() * std::mem::size_of::<[u8; 4]>()
    }

    pub fn request_full_refresh(&mut self) {
        self.force_full_refresh = true;
    }
}
