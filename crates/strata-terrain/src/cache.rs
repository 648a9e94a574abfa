//! Toroidal cache refresh
//!
//! Each frame the active levels are refreshed from the coarsest to the finest, so
//! a level's blend channels can resample the coarser level that was just brought
//! up to date. Only the strips that entered a level's window are recomputed unless
//! the level asked for a full refresh.

use glam::{IVec2, Vec2, Vec3};

use crate::height::{HeightSource, MAX_CACHED_HEIGHT};
use crate::level::{LodLevel, UNSCANNED_MAX_HEIGHT, UNSCANNED_MIN_HEIGHT};
use crate::lod_select::ActiveLods;

/// Widening applied to the scanned height range of a level
pub const HEIGHT_BOUNDS_MARGIN: f32 = 2.0;

/// Half-open rectangle of texel coordinates (before wrapping)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexelRect {
    pub min: IVec2,
    pub max: IVec2,
}

impl TexelRect {
    pub fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    pub fn area(&self) -> usize {
        let extent = (self.max - self.min).max(IVec2::ZERO);
        extent.x as usize * extent.y as usize
    }
}

/// Result of one cache pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheUpdate {
    /// Levels whose caches changed and must be uploaded, coarsest first
    pub refreshed_lods: Vec<u32>,
    /// Texel writes, counting strip corners twice
    pub texels_written: usize,
}

/// Rectangles of `level` that must be recomputed after it was snapped.
///
/// Consumes the pending full-refresh request and records the new texture offset.
pub(crate) fn take_refresh_rects(level: &mut LodLevel) -> Vec<TexelRect> {
    let size = level.size() as i32;
    let to = level.texture_offset;
    let delta = to - level.prev_texture_offset;
    level.prev_texture_offset = to;

    if level.force_full_refresh || delta.x.abs() >= size || delta.y.abs() >= size {
        level.force_full_refresh = false;
        return vec![TexelRect::new(to, to + IVec2::splat(size))];
    }

    let mut rects = Vec::with_capacity(2);
    if delta.x < 0 {
        rects.push(TexelRect::new(to, IVec2::new(to.x - delta.x, to.y + size)));
    } else if delta.x > 0 {
        rects.push(TexelRect::new(
            IVec2::new(to.x + size - delta.x, to.y),
            to + IVec2::splat(size),
        ));
    }
    if delta.y < 0 {
        rects.push(TexelRect::new(to, IVec2::new(to.x + size, to.y - delta.y)));
    } else if delta.y > 0 {
        rects.push(TexelRect::new(
            IVec2::new(to.x, to.y + size - delta.y),
            to + IVec2::splat(size),
        ));
    }
    rects
}

/// Refresh the active levels from coarsest to finest.
pub fn update_textures(
    levels: &mut [LodLevel],
    active: ActiveLods,
    source: &dyn HeightSource,
) -> CacheUpdate {
    let mut update = CacheUpdate::default();

    for lod in active.iter().rev() {
        let coarser = active.coarser_of(lod);
        let index = lod as usize;

        let level = &mut levels[index];
        if level.blend_source != Some(coarser) {
            level.blend_source = Some(coarser);
            level.force_full_refresh = true;
        }

        let rects = take_refresh_rects(level);
        if rects.is_empty() {
            continue;
        }

        let (finer, rest) = levels.split_at_mut(index + 1);
        let level = &mut finer[index];
        let coarse = if coarser == lod { None } else { rest.first() };

        for rect in &rects {
            log::trace!(
                "[terrain] LOD {} refresh {:?}..{:?} ({} texels)",
                lod,
                rect.min,
                rect.max,
                rect.area()
            );
            refresh_rect(level, coarse, *rect, source);
            update.texels_written += rect.area();
        }
        rescan_height_range(level);
        update.refreshed_lods.push(lod);
    }

    // Inactive levels lose their blend partner so they refresh fully when they return
    for level in levels.iter_mut() {
        if !active.contains(level.lod_index()) {
            level.blend_source = None;
        }
    }

    update
}

fn fetch_height(source: &dyn HeightSource, x: f32, z: f32, lod: u32) -> f32 {
    source.fetch(x, z, lod).min(MAX_CACHED_HEIGHT)
}

/// XZ of the unit normal from central differences, packed to bytes
fn estimate_normal(source: &dyn HeightSource, x: f32, z: f32, scale: f32, lod: u32) -> [u8; 2] {
    let h_left = fetch_height(source, x - scale, z, lod);
    let h_right = fetch_height(source, x + scale, z, lod);
    let h_down = fetch_height(source, x, z - scale, lod);
    let h_up = fetch_height(source, x, z + scale, lod);

    let n = Vec3::new(h_left - h_right, 2.0 * scale, h_down - h_up).normalize();
    [pack_normal(n.x), pack_normal(n.z)]
}

fn pack_normal(v: f32) -> u8 {
    (v * 127.5 + 127.5).clamp(0.0, 255.0) as u8
}

fn refresh_rect(
    level: &mut LodLevel,
    coarse: Option<&LodLevel>,
    rect: TexelRect,
    source: &dyn HeightSource,
) {
    let lod = level.lod_index();
    let scale = level.grid_scale() as f32;

    for ty in rect.min.y..rect.max.y {
        for tx in rect.min.x..rect.max.x {
            let texel = IVec2::new(tx, ty);
            let world = level.texel_to_world(texel);
            let (x, z) = (world.x as f32, world.y as f32);

            let height = fetch_height(source, x, z, lod);
            let [nx, nz] = estimate_normal(source, x, z, scale, lod);

            let (blend_height, blend_normal) = match coarse {
                Some(coarse) => sample_coarser(coarse, world),
                None => (height, [nx, nz]),
            };

            let index = level.wrap_index(texel);
            level.heights[index] = [height, blend_height];
            level.normals[index] = [nx, nz, blend_normal[0], blend_normal[1]];
        }
    }
}

/// Bilinear sample of a coarser level's own height and normal at a world position
fn sample_coarser(coarse: &LodLevel, world: IVec2) -> (f32, [u8; 2]) {
    let local = (world - coarse.offset()).as_vec2() / coarse.grid_scale() as f32;
    let base = local.floor();
    let t = local - base;
    let t0 = base.as_ivec2() + coarse.texture_offset();

    let corners = [
        t0,
        t0 + IVec2::new(1, 0),
        t0 + IVec2::new(0, 1),
        t0 + IVec2::new(1, 1),
    ];
    let heights = corners.map(|c| coarse.height_at(c)[0]);
    let normals = corners.map(|c| {
        let n = coarse.normal_at(c);
        Vec2::new(n[0] as f32, n[1] as f32)
    });

    let height = bilerp(heights[0], heights[1], heights[2], heights[3], t);
    let normal = normals[0] * (1.0 - t.x) * (1.0 - t.y)
        + normals[1] * t.x * (1.0 - t.y)
        + normals[2] * (1.0 - t.x) * t.y
        + normals[3] * t.x * t.y;
    let normal = normal.clamp(Vec2::ZERO, Vec2::splat(255.0));

    (height, [normal.x as u8, normal.y as u8])
}

fn bilerp(h00: f32, h10: f32, h01: f32, h11: f32, t: Vec2) -> f32 {
    let h0 = h00 * (1.0 - t.x) + h10 * t.x;
    let h1 = h01 * (1.0 - t.x) + h11 * t.x;
    h0 * (1.0 - t.y) + h1 * t.y
}

/// Exhaustive min/max over both height channels, widened by the margin
fn rescan_height_range(level: &mut LodLevel) {
    let (lo, hi) = level
        .heights
        .iter()
        .fold((UNSCANNED_MIN_HEIGHT, UNSCANNED_MAX_HEIGHT), |(lo, hi), h| {
            (lo.min(h[0]).min(h[1]), hi.max(h[0]).max(h[1]))
        });
    level.min_height = lo - HEIGHT_BOUNDS_MARGIN;
    level.max_height = hi + HEIGHT_BOUNDS_MARGIN;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TerrainViewConfig, MAX_TERRAIN_LODS};
    use crate::height::FlatHeightSource;
    use crate::layout::ClipmapLayout;
    use crate::lod_select::make_view;
    use crate::test_support::{LinearSlope, RollingHills, XorShift32};
    use approx::assert_relative_eq;
    use glam::Vec3;

    const SIZE: u32 = 16;

    fn levels() -> Vec<LodLevel> {
        (0..MAX_TERRAIN_LODS as u32)
            .map(|lod| LodLevel::new(lod, SIZE))
            .collect()
    }

    fn step(
        levels: &mut [LodLevel],
        config: &TerrainViewConfig,
        viewer: Vec3,
        source: &dyn HeightSource,
    ) -> (ActiveLods, CacheUpdate) {
        let layout = ClipmapLayout::new(SIZE).unwrap();
        let ground = source.sample(viewer.x, viewer.z);
        let active = make_view(levels, &layout, config, viewer, ground);
        let update = update_textures(levels, active, source);
        (active, update)
    }

    fn config(max_lod: u32) -> TerrainViewConfig {
        TerrainViewConfig {
            clipmap_size: SIZE,
            max_lod,
            ..Default::default()
        }
    }

    #[test]
    fn first_update_refreshes_everything() {
        let mut lv = levels();
        let (active, update) = step(&mut lv, &config(3), Vec3::ZERO, &FlatHeightSource::new(4.0));
        assert_eq!(active, ActiveLods::new(0, 3));
        assert_eq!(update.refreshed_lods, vec![3, 2, 1, 0]);
        assert_eq!(update.texels_written, 4 * 16 * 16);
        for lod in 0..=3 {
            let level = &lv[lod];
            assert!(level.heights().iter().all(|h| *h == [4.0, 4.0]));
            assert_eq!(level.height_range(), (2.0, 6.0));
        }
        // Outside the active range nothing was touched
        assert_eq!(lv[4].height_range(), (f32::MAX, f32::MIN));
    }

    #[test]
    fn stationary_viewer_refreshes_nothing() {
        let mut lv = levels();
        let source = FlatHeightSource::new(0.0);
        step(&mut lv, &config(2), Vec3::new(3.0, 0.0, 3.0), &source);
        let (_, update) = step(&mut lv, &config(2), Vec3::new(3.5, 0.0, 3.9), &source);
        assert!(update.refreshed_lods.is_empty());
        assert_eq!(update.texels_written, 0);
    }

    #[test]
    fn strips_follow_movement_direction() {
        let mut level = LodLevel::new(0, 16);
        level.force_full_refresh = false;
        level.prev_texture_offset = IVec2::new(10, 10);

        level.texture_offset = IVec2::new(12, 10);
        let rects = take_refresh_rects(&mut level);
        assert_eq!(rects, vec![TexelRect::new(IVec2::new(26, 10), IVec2::new(28, 26))]);

        level.texture_offset = IVec2::new(8, 6);
        let rects = take_refresh_rects(&mut level);
        assert_eq!(
            rects,
            vec![
                TexelRect::new(IVec2::new(8, 6), IVec2::new(12, 22)),
                TexelRect::new(IVec2::new(8, 6), IVec2::new(24, 10)),
            ]
        );

        // A jump of a full window or more refreshes everything
        level.texture_offset = IVec2::new(8, 30);
        let rects = take_refresh_rects(&mut level);
        assert_eq!(rects, vec![TexelRect::new(IVec2::new(8, 30), IVec2::new(24, 46))]);
        assert_eq!(level.prev_texture_offset, IVec2::new(8, 30));
    }

    #[test]
    fn incremental_refresh_matches_full_refresh() {
        let source = RollingHills;
        let cfg = config(5);
        let mut incremental = levels();
        let mut reference = levels();
        let mut rng = XorShift32::new(2024);
        let mut viewer = Vec3::new(0.0, 3.0, 0.0);

        for frame in 0..120 {
            // Mostly small steps, with the occasional teleport
            let jump = if frame % 17 == 0 { 200.0 } else { 6.0 };
            viewer.x += rng.range_f32(-jump, jump);
            viewer.z += rng.range_f32(-jump, jump);
            viewer.y = rng.range_f32(0.0, 40.0);

            let (active, _) = step(&mut incremental, &cfg, viewer, &source);
            for level in reference.iter_mut() {
                level.request_full_refresh();
            }
            let (reference_active, _) = step(&mut reference, &cfg, viewer, &source);
            assert_eq!(active, reference_active);

            for lod in active.iter() {
                let a = &incremental[lod as usize];
                let b = &reference[lod as usize];
                assert!(a.heights() == b.heights(), "frame {frame} LOD {lod} heights differ");
                assert!(a.normals() == b.normals(), "frame {frame} LOD {lod} normals differ");
                assert_eq!(a.height_range(), b.height_range());
            }
        }
    }

    #[test]
    fn overlapping_corner_refreshed_twice_is_unchanged() {
        let source = RollingHills;
        let mut level = LodLevel::new(1, 16);
        let layout = ClipmapLayout::new(16).unwrap();
        level.snap_to(Vec2::new(5.0, 5.0), &layout);
        let full = take_refresh_rects(&mut level);
        refresh_rect(&mut level, None, full[0], &source);
        let before = level.heights().to_vec();

        let corner = TexelRect::new(level.texture_offset, level.texture_offset + IVec2::splat(3));
        refresh_rect(&mut level, None, corner, &source);
        refresh_rect(&mut level, None, corner, &source);
        assert!(level.heights() == before.as_slice());
    }

    #[test]
    fn heights_are_clamped() {
        let mut lv = levels();
        step(&mut lv, &config(0), Vec3::ZERO, &FlatHeightSource::new(1.0e6));
        assert!(lv[0].heights().iter().all(|h| h[0] == MAX_CACHED_HEIGHT));
    }

    #[test]
    fn flat_normals_point_up() {
        let mut lv = levels();
        step(&mut lv, &config(1), Vec3::ZERO, &FlatHeightSource::new(0.0));
        // 0 * 127.5 + 127.5 truncates to 127
        assert!(lv[0].normals().iter().all(|n| *n == [127, 127, 127, 127]));
    }

    #[test]
    fn coarse_blend_matches_bilinear_of_coarser_level() {
        let source = LinearSlope {
            a: 0.25,
            b: -0.5,
            c: 3.0,
        };
        let mut lv = levels();
        let viewer = Vec3::new(13.7, 0.0, -22.1);
        let (active, _) = step(&mut lv, &config(3), viewer, &source);

        for lod in active.min..active.max {
            let fine = &lv[lod as usize];
            let coarse = &lv[lod as usize + 1];
            for ty in 0..SIZE as i32 {
                for tx in 0..SIZE as i32 {
                    let texel = fine.texture_offset() + IVec2::new(tx, ty);
                    let world = fine.texel_to_world(texel);
                    let blend = fine.height_at(texel)[1];
                    let (expected, _) = sample_coarser(coarse, world);
                    assert_relative_eq!(blend, expected, epsilon = 1e-4);
                    // A linear source is reproduced exactly by bilinear filtering
                    let exact = source.sample(world.x as f32, world.y as f32);
                    assert_relative_eq!(blend, exact, epsilon = 1e-3);
                }
            }
        }

        // The coarsest level blends with itself
        let top = &lv[active.max as usize];
        assert!(top.heights().iter().all(|h| h[0] == h[1]));
        assert!(top.normals().iter().all(|n| n[0] == n[2] && n[1] == n[3]));
    }

    #[test]
    fn range_change_forces_full_refresh() {
        let source = FlatHeightSource::new(0.0);
        let mut lv = levels();
        step(&mut lv, &config(2), Vec3::ZERO, &source);
        // LOD 2 was the coarsest; with max 3 it now blends from LOD 3
        let (_, update) = step(&mut lv, &config(3), Vec3::ZERO, &source);
        assert_eq!(update.refreshed_lods, vec![3, 2]);
    }
}
