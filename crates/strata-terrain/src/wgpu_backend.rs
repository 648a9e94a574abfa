//! wgpu implementation of the terrain GPU seams (feature `wgpu`)

use std::sync::Arc;

use strata_core::{Result, StrataError};

use crate::gpu::{
    align_up, CacheTextureDesc, CacheTextureFormat, GpuBackend, StreamHandle, TextureHandle,
};

/// A cache texture array and the view shaders bind
pub struct GpuCacheTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    desc: CacheTextureDesc,
}

/// Writes cache layers through the queue and bump-allocates a per-frame stream buffer
/// usable as both vertex and indirect buffer.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: Vec<Option<GpuCacheTexture>>,
    stream: wgpu::Buffer,
    stream_capacity: u64,
    stream_cursor: u64,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, stream_capacity: u64) -> Self {
        let stream_capacity = align_up(stream_capacity, wgpu::COPY_BUFFER_ALIGNMENT);
        let stream = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Stream Buffer"),
            size: stream_capacity,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            textures: Vec::new(),
            stream,
            stream_capacity,
            stream_cursor: 0,
        }
    }

    /// Buffer that `StreamHandle` offsets refer to
    pub fn stream_buffer(&self) -> &wgpu::Buffer {
        &self.stream
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&GpuCacheTexture> {
        self.textures.get(handle.0 as usize).and_then(Option::as_ref)
    }

    fn wgpu_format(format: CacheTextureFormat) -> wgpu::TextureFormat {
        match format {
            CacheTextureFormat::HeightRg32Float => wgpu::TextureFormat::Rg32Float,
            CacheTextureFormat::NormalRgba8 => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn create_cache_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureHandle> {
        let limits = self.device.limits();
        if desc.size > limits.max_texture_dimension_2d
            || desc.layers > limits.max_texture_array_layers
        {
            return Err(StrataError::GpuError(format!(
                "Cache texture '{}' ({}x{} x {} layers) exceeds device limits",
                desc.label, desc.size, desc.size, desc.layers
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.size,
                height: desc.size,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(GpuCacheTexture {
            texture,
            view,
            desc: desc.clone(),
        }));
        Ok(handle)
    }

    fn write_rect(&mut self, texture: TextureHandle, layer: u32, size: u32, data: &[u8]) {
        let Some(target) = self.texture(texture) else {
            log::warn!("[terrain] write to unknown cache texture {:?}", texture);
            return;
        };
        let bytes_per_texel = target.desc.format.bytes_per_texel() as u32;
        if data.len() != target.desc.layer_bytes() || size != target.desc.size {
            log::warn!(
                "[terrain] '{}' layer {} write of {} bytes does not match {}x{}",
                target.desc.label,
                layer,
                data.len(),
                size,
                size
            );
            return;
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size * bytes_per_texel),
                rows_per_image: Some(size),
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
        );
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            if let Some(cache) = slot.take() {
                cache.texture.destroy();
            }
        }
    }

    fn begin_frame(&mut self) {
        self.stream_cursor = 0;
    }

    fn allocate_with_custom_alignment(
        &mut self,
        data: &[u8],
        alignment: u64,
    ) -> Option<StreamHandle> {
        let alignment = alignment.max(wgpu::COPY_BUFFER_ALIGNMENT);
        let offset = align_up(self.stream_cursor, alignment);
        let size = data.len() as u64;
        if size % wgpu::COPY_BUFFER_ALIGNMENT != 0 || offset + size > self.stream_capacity {
            return None;
        }

        self.queue.write_buffer(&self.stream, offset, data);
        self.stream_cursor = offset + size;
        Some(StreamHandle { offset, size })
    }
}
