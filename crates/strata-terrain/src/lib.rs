//! Strata Terrain - Geometry clipmap terrain streaming
//!
//! A `TerrainView` keeps a stack of square, toroidally addressed height/normal
//! caches centred on the viewer, one per LOD, over an infinite tiled heightfield.
//! Each frame it picks the active LOD range, refreshes only the cache strips the
//! viewer moved into, and builds an instanced draw list of shared mesh patches
//! (blocks, gaps, trims, crack strips) with per-patch culling.
//!
//! Does not depend on a renderer: GPU work goes through the `GpuBackend` trait.
//! `HostBackend` keeps everything in memory; the `wgpu` feature adds `WgpuBackend`.

pub mod cache;
pub mod config;
pub mod gpu;
pub mod height;
pub mod heightmap;
pub mod layout;
pub mod level;
pub mod lod_select;
pub mod mesh;
pub mod patches;
pub mod view;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

#[cfg(test)]
mod test_support;

pub use config::{LodSpanClamp, TerrainViewConfig, MAX_TERRAIN_LODS};
pub use gpu::{
    CacheTextureDesc, CacheTextureFormat, GpuBackend, HostBackend, StreamHandle, TextureHandle,
};
pub use height::{FlatHeightSource, HeightSource, TerrainHandle};
pub use heightmap::Heightmap;
pub use layout::ClipmapLayout;
pub use level::{InteriorTrim, LodLevel, MAX_WORLD_COORDINATE};
pub use lod_select::ActiveLods;
pub use mesh::{ClipmapMeshes, PatchKind, PatchMeshes, PatchRange, PatchVertex};
pub use patches::{DrawBatch, DrawIndexedIndirect, InstanceRecord};
pub use view::{FrameStats, TerrainFrame, TerrainView};
#[cfg(feature = "wgpu")]
pub use wgpu_backend::WgpuBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::sync::Arc;
    use strata_core::NoCulling;

    fn ramp_heightmap() -> Heightmap {
        // 8x8 tile rising along X, 4 world units per texel, 50 units tall
        let heights: Vec<f32> = (0..64).map(|i| (i % 8) as f32 / 7.0).collect();
        Heightmap::from_raw(heights, 8, 8)
            .unwrap()
            .with_texel_size(4.0)
            .with_height_scale(50.0)
    }

    #[test]
    fn heightmap_terrain_streams_while_walking() {
        let config = TerrainViewConfig::from_toml_str(
            r#"
clipmap_size = 32
max_lod = 4
log_memory_usage = true
"#,
        )
        .unwrap();
        let meshes = Arc::new(ClipmapMeshes::new(config.clipmap_size).unwrap());
        let terrain = TerrainHandle::new(ramp_heightmap());
        let mut view = TerrainView::new(config, terrain, meshes, HostBackend::default()).unwrap();

        let mut viewer = Vec3::new(0.0, 60.0, 0.0);
        let mut previous = None;
        for _ in 0..50 {
            viewer.x += 3.0;
            viewer.z -= 1.5;
            view.update(viewer, &NoCulling);

            let active = view.active_lods().unwrap();
            assert!(active.max - active.min <= 5);
            if previous == Some(active) {
                // Small steps never rewrite whole levels
                assert!(view.frame().stats.texels_written < active.len() * 32 * 32);
            }
            previous = Some(active);
            for lod in active.iter() {
                let (lo, hi) = view.level(lod).unwrap().height_range();
                assert!(lo >= -2.0 - 1e-3 && hi <= 52.0 + 1e-3, "LOD {lod}: {lo}..{hi}");
            }
        }
    }

    #[test]
    fn heightmap_bounds_cull_nothing_on_the_surface() {
        let config = TerrainViewConfig {
            clipmap_size: 16,
            max_lod: 3,
            ..Default::default()
        };
        let meshes = Arc::new(ClipmapMeshes::new(16).unwrap());
        let mut view = TerrainView::new(
            config,
            TerrainHandle::new(ramp_heightmap()),
            meshes,
            HostBackend::default(),
        )
        .unwrap();
        view.update(Vec3::new(5.0, 10.0, 5.0), &NoCulling);
        assert_eq!(view.frame().stats.culled, 0);
        assert_eq!(view.frame().draw_count as usize, view.batches().len());
    }
}
