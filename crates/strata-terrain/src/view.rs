//! `TerrainView`: per-viewer clipmap state and the per-frame update

use std::sync::Arc;

use glam::Vec3;
use strata_core::{Frustum, Result, StrataError};

use crate::cache::update_textures;
use crate::config::{TerrainViewConfig, MAX_TERRAIN_LODS};
use crate::gpu::{
    CacheTextureDesc, CacheTextureFormat, GpuBackend, StreamHandle, TextureHandle,
    INDIRECT_BUFFER_ALIGNMENT,
};
use crate::height::TerrainHandle;
use crate::layout::ClipmapLayout;
use crate::level::LodLevel;
use crate::lod_select::{make_view, ActiveLods};
use crate::mesh::PatchMeshes;
use crate::patches::{DrawBatch, DrawIndexedIndirect, InstanceList, InstanceRecord};

/// Counters for the last `update`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub refreshed_levels: u32,
    pub texels_written: usize,
    pub instances: u32,
    pub culled: u32,
}

/// What the renderer needs to draw the last `update`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainFrame {
    pub instance_buffer: Option<StreamHandle>,
    pub indirect_buffer: Option<StreamHandle>,
    /// Indirect commands to execute; zero when nothing was uploaded
    pub draw_count: u32,
    pub stats: FrameStats,
}

/// Clipmap terrain as seen from one viewer.
///
/// Owns the per-LOD caches and their GPU textures. The height source and the
/// patch meshes are shared with other views.
pub struct TerrainView<B: GpuBackend> {
    config: TerrainViewConfig,
    layout: ClipmapLayout,
    terrain: TerrainHandle,
    meshes: Arc<dyn PatchMeshes>,
    backend: B,
    levels: [LodLevel; MAX_TERRAIN_LODS],
    height_texture: TextureHandle,
    normal_texture: TextureHandle,
    active: Option<ActiveLods>,
    instances: InstanceList,
    draw_commands: Vec<DrawIndexedIndirect>,
    frame: TerrainFrame,
    missing_terrain_reported: bool,
}

impl<B: GpuBackend> TerrainView<B> {
    /// Allocate the caches and cache textures.
    ///
    /// The LOD range in `config` is clamped; an invalid clipmap size, or meshes built
    /// for another size, is an error.
    pub fn new(
        config: TerrainViewConfig,
        terrain: TerrainHandle,
        meshes: Arc<dyn PatchMeshes>,
        mut backend: B,
    ) -> Result<Self> {
        let config = config.clamped();
        let layout = config.layout()?;
        let size = layout.size();

        if meshes.clipmap_size() != size {
            return Err(StrataError::ConfigError(format!(
                "Patch meshes were built for clipmap size {}, view uses {}",
                meshes.clipmap_size(),
                size
            )));
        }

        let height_desc = CacheTextureDesc {
            label: "terrain_height_cache".into(),
            format: CacheTextureFormat::HeightRg32Float,
            size,
            layers: MAX_TERRAIN_LODS as u32,
        };
        let normal_desc = CacheTextureDesc {
            label: "terrain_normal_cache".into(),
            format: CacheTextureFormat::NormalRgba8,
            ..height_desc.clone()
        };

        let height_texture = backend.create_cache_texture(&height_desc)?;
        let normal_texture = match backend.create_cache_texture(&normal_desc) {
            Ok(texture) => texture,
            Err(e) => {
                backend.release_texture(height_texture);
                return Err(e);
            }
        };

        let levels: [LodLevel; MAX_TERRAIN_LODS] =
            std::array::from_fn(|lod| LodLevel::new(lod as u32, size));

        if config.log_memory_usage {
            let cpu_bytes: usize = levels.iter().map(LodLevel::memory_bytes).sum();
            let gpu_bytes = (height_desc.layer_bytes() + normal_desc.layer_bytes())
                * MAX_TERRAIN_LODS;
            log::info!(
                "[terrain] clipmap {}x{} x {} LODs: {:.2} MiB CPU cache, {:.2} MiB GPU textures",
                size,
                size,
                MAX_TERRAIN_LODS,
                cpu_bytes as f64 / (1024.0 * 1024.0),
                gpu_bytes as f64 / (1024.0 * 1024.0)
            );
        }

        Ok(Self {
            config,
            layout,
            terrain,
            meshes,
            backend,
            levels,
            height_texture,
            normal_texture,
            active: None,
            instances: InstanceList::new(),
            draw_commands: Vec::new(),
            frame: TerrainFrame::default(),
            missing_terrain_reported: false,
        })
    }

    /// Switch to another terrain. Every level is rebuilt on the next update.
    pub fn set_terrain(&mut self, terrain: TerrainHandle) {
        if terrain.is_loaded() {
            log::info!("[terrain] height source attached to view");
        }
        self.terrain = terrain;
        self.missing_terrain_reported = false;
        self.invalidate();
    }

    /// Force a full refresh of every level, e.g. after the terrain was edited.
    pub fn invalidate(&mut self) {
        for level in self.levels.iter_mut() {
            level.request_full_refresh();
        }
    }

    /// Run one frame: select LODs, refresh caches, build and upload the draw list.
    ///
    /// Does nothing but clear the previous frame while no height source is attached.
    pub fn update(&mut self, viewer: Vec3, frustum: &dyn Frustum) {
        self.instances.clear();
        self.draw_commands.clear();
        self.frame = TerrainFrame::default();
        self.active = None;
        self.backend.begin_frame();

        let terrain = self.terrain.clone();
        let Some(source) = terrain.try_get() else {
            if !self.missing_terrain_reported {
                log::warn!("[terrain] update skipped: no height source attached");
                self.missing_terrain_reported = true;
            }
            return;
        };

        let ground_height = source.sample(viewer.x, viewer.z);
        let active = make_view(&mut self.levels, &self.layout, &self.config, viewer, ground_height);
        self.active = Some(active);

        let cache = update_textures(&mut self.levels, active, source);
        for &lod in &cache.refreshed_lods {
            self.upload_level(lod);
        }

        self.instances
            .build(&self.levels, active, &self.layout, &source.bounds(), frustum);
        self.draw_commands = self.instances.draw_commands(self.meshes.as_ref());

        let stats = FrameStats {
            refreshed_levels: cache.refreshed_lods.len() as u32,
            texels_written: cache.texels_written,
            instances: self.instances.instances().len() as u32,
            culled: self.instances.culled(),
        };
        self.frame.stats = stats;

        if !self.draw_commands.is_empty() {
            let instance_buffer = self
                .backend
                .allocate_vertex(bytemuck::cast_slice(self.instances.instances()));
            let indirect_buffer = self.backend.allocate_with_custom_alignment(
                bytemuck::cast_slice(&self.draw_commands),
                INDIRECT_BUFFER_ALIGNMENT,
            );
            match (instance_buffer, indirect_buffer) {
                (Some(instances), Some(indirect)) => {
                    self.frame.instance_buffer = Some(instances);
                    self.frame.indirect_buffer = Some(indirect);
                    self.frame.draw_count = self.draw_commands.len() as u32;
                }
                _ => log::warn!(
                    "[terrain] stream buffer exhausted, dropping {} terrain instances",
                    stats.instances
                ),
            }
        }

        log::debug!(
            "[terrain] LODs {}..={}: {} levels refreshed ({} texels), {} instances, {} culled",
            active.min,
            active.max,
            stats.refreshed_levels,
            stats.texels_written,
            stats.instances,
            stats.culled
        );
    }

    fn upload_level(&mut self, lod: u32) {
        let level = &self.levels[lod as usize];
        let size = self.layout.size();
        self.backend.write_rect(
            self.height_texture,
            lod,
            size,
            bytemuck::cast_slice(level.heights()),
        );
        self.backend.write_rect(
            self.normal_texture,
            lod,
            size,
            bytemuck::cast_slice(level.normals()),
        );
    }

    pub fn config(&self) -> &TerrainViewConfig {
        &self.config
    }

    pub fn layout(&self) -> &ClipmapLayout {
        &self.layout
    }

    pub fn terrain(&self) -> &TerrainHandle {
        &self.terrain
    }

    pub fn meshes(&self) -> &Arc<dyn PatchMeshes> {
        &self.meshes
    }

    /// Active range of the last update, `None` if it was skipped
    pub fn active_lods(&self) -> Option<ActiveLods> {
        self.active
    }

    pub fn level(&self, lod: u32) -> Option<&LodLevel> {
        self.levels.get(lod as usize)
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn instances(&self) -> &[InstanceRecord] {
        self.instances.instances()
    }

    pub fn batches(&self) -> &[DrawBatch] {
        self.instances.batches()
    }

    pub fn draw_commands(&self) -> &[DrawIndexedIndirect] {
        &self.draw_commands
    }

    pub fn frame(&self) -> &TerrainFrame {
        &self.frame
    }

    pub fn height_texture(&self) -> TextureHandle {
        self.height_texture
    }

    pub fn normal_texture(&self) -> TextureHandle {
        self.normal_texture
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GpuBackend> Drop for TerrainView<B> {
    fn drop(&mut self) {
        self.backend.release_texture(self.height_texture);
        self.backend.release_texture(self.normal_texture);
    }
}
