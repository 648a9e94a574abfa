//! Per-frame instance list and indirect draw commands
//!
//! Patches are emitted grouped by [`PatchKind`] in a fixed order, so every group
//! becomes one indirect draw over a contiguous slice of the instance buffer.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec3};
use strata_core::{Aabb, Frustum};

use crate::layout::ClipmapLayout;
use crate::level::{InteriorTrim, LodLevel};
use crate::lod_select::ActiveLods;
use crate::mesh::{PatchKind, PatchMeshes};

/// GPU instance data for one patch. 28 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// x = grid scale, y = LOD index
    pub vertex_scale_and_lod: [i32; 2],
    /// World XZ of the patch's local origin
    pub vertex_translate: [i32; 2],
    /// Added to world XZ before dividing by the grid scale to address the cache
    pub texcoord_offset: [i32; 2],
    pub debug_color: [u8; 4],
}

/// Indexed indirect draw arguments, in the layout wgpu and Vulkan consume
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// A contiguous run of instances sharing one patch kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawBatch {
    pub kind: PatchKind,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Where one patch would go, before culling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchPlacement {
    pub kind: PatchKind,
    pub lod: u32,
    /// Patch origin in the level's quads, relative to the level offset
    pub grid_pos: IVec2,
    /// Footprint in the level's quads
    pub extent: IVec2,
    pub cullable: bool,
}

/// Every patch the active range needs, in emission order.
pub fn patch_placements(
    levels: &[LodLevel],
    active: ActiveLods,
    layout: &ClipmapLayout,
) -> Vec<PatchPlacement> {
    let finest = &levels[active.min as usize];
    let finest_offset = finest.interior_trim().trim_offset();
    let block = IVec2::splat(layout.block_size());
    let mut placements = Vec::with_capacity(5 + 19 * active.len());

    let mut place = |kind, lod, grid_pos, extent, cullable| {
        placements.push(PatchPlacement {
            kind,
            lod,
            grid_pos,
            extent,
            cullable,
        })
    };

    place(
        PatchKind::FinestInterior,
        active.min,
        layout.finest_interior_origin(finest_offset),
        IVec2::splat(layout.interior_size()),
        false,
    );

    for grid_pos in layout.inner_block_origins(finest_offset) {
        place(PatchKind::Block, active.min, grid_pos, block, true);
    }
    for lod in active.iter() {
        for grid_pos in layout.ring_block_origins() {
            place(PatchKind::Block, lod, grid_pos, block, true);
        }
    }

    for trim in InteriorTrim::ALL {
        for lod in active.iter() {
            if levels[lod as usize].interior_trim() == trim {
                place(
                    PatchKind::Trim(trim),
                    lod,
                    layout.hole_origin(),
                    IVec2::splat(layout.hole_size()),
                    true,
                );
            }
        }
    }

    for lod in active.iter() {
        for grid_pos in layout.vertical_gap_origins() {
            place(PatchKind::VerticalGap, lod, grid_pos, layout.vertical_gap_extent(), true);
        }
    }
    for lod in active.iter() {
        for grid_pos in layout.horizontal_gap_origins() {
            place(PatchKind::HorizontalGap, lod, grid_pos, layout.horizontal_gap_extent(), true);
        }
    }

    for lod in active.min..active.max {
        place(
            PatchKind::Crack,
            lod,
            IVec2::ZERO,
            IVec2::splat(layout.grid_size()),
            false,
        );
    }

    placements
}

/// World-space box of a patch using the level's cached height range
pub fn patch_bounds(level: &LodLevel, grid_pos: IVec2, extent: IVec2) -> Aabb {
    let scale = level.grid_scale();
    let min = level.offset() + grid_pos * scale;
    let max = min + extent * scale;
    let (min_height, max_height) = level.height_range();
    Aabb::new(
        Vec3::new(min.x as f32, min_height, min.y as f32),
        Vec3::new(max.x as f32, max_height, max.y as f32),
    )
}

fn lod_tint(color: [u8; 4], lod: u32) -> [u8; 4] {
    let shade = 255 - (lod.min(7) * 24);
    [
        (color[0] as u32 * shade / 255) as u8,
        (color[1] as u32 * shade / 255) as u8,
        (color[2] as u32 * shade / 255) as u8,
        color[3],
    ]
}

/// Instances and batches for one frame, rebuilt by [`InstanceList::build`].
#[derive(Default)]
pub struct InstanceList {
    instances: Vec<InstanceRecord>,
    batches: Vec<DrawBatch>,
    culled: u32,
}

impl InstanceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.batches.clear();
        self.culled = 0;
    }

    /// Emit the visible patches of the active range.
    ///
    /// A cullable patch is dropped when its box misses `terrain_bounds` or the frustum
    /// rejects it. Finest interior and crack strips are always kept.
    pub fn build(
        &mut self,
        levels: &[LodLevel],
        active: ActiveLods,
        layout: &ClipmapLayout,
        terrain_bounds: &Aabb,
        frustum: &dyn Frustum,
    ) {
        self.clear();

        for placement in patch_placements(levels, active, layout) {
            let level = &levels[placement.lod as usize];
            if placement.cullable {
                let bounds = patch_bounds(level, placement.grid_pos, placement.extent);
                if !bounds.overlaps(terrain_bounds) || !frustum.is_box_visible(&bounds) {
                    self.culled += 1;
                    continue;
                }
            }

            let scale = level.grid_scale();
            let translate = level.offset() + placement.grid_pos * scale;
            let record = InstanceRecord {
                vertex_scale_and_lod: [scale, placement.lod as i32],
                vertex_translate: translate.to_array(),
                texcoord_offset: level.texcoord_offset().to_array(),
                debug_color: lod_tint(placement.kind.debug_color(), placement.lod),
            };
            self.push(placement.kind, record);
        }
    }

    fn push(&mut self, kind: PatchKind, record: InstanceRecord) {
        match self.batches.last_mut() {
            Some(batch) if batch.kind == kind => batch.instance_count += 1,
            _ => self.batches.push(DrawBatch {
                kind,
                first_instance: self.instances.len() as u32,
                instance_count: 1,
            }),
        }
        self.instances.push(record);
    }

    pub fn instances(&self) -> &[InstanceRecord] {
        &self.instances
    }

    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    /// Patches rejected by culling in the last build
    pub fn culled(&self) -> u32 {
        self.culled
    }

    /// Number of instances of one kind
    pub fn count(&self, kind: PatchKind) -> u32 {
        self.batches
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.instance_count)
            .sum()
    }

    /// One indirect command per batch
    pub fn draw_commands(&self, meshes: &dyn PatchMeshes) -> Vec<DrawIndexedIndirect> {
        self.batches
            .iter()
            .map(|batch| {
                let range = meshes.range(batch.kind);
                DrawIndexedIndirect {
                    index_count: range.index_count,
                    instance_count: batch.instance_count,
                    first_index: range.first_index,
                    base_vertex: range.base_vertex,
                    first_instance: batch.first_instance,
                }
            })
            .collect()
    }
}
