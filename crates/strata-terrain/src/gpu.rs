//! GPU resource seams used by `TerrainView`
//!
//! The view never talks to a graphics API directly. It creates two layered cache
//! textures, rewrites whole layers when a level changes, and streams the per-frame
//! instance and indirect buffers through a bump allocator.

use strata_core::{Result, StrataError};

/// Byte alignment of indirect argument buffers
pub const INDIRECT_BUFFER_ALIGNMENT: u64 = 16;

/// Default alignment of streamed vertex data
pub const VERTEX_BUFFER_ALIGNMENT: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheTextureFormat {
    /// Two 32-bit float channels: own height, coarser height
    HeightRg32Float,
    /// Four bytes in memory order: own normal xz, coarser normal xz
    NormalRgba8,
}

impl CacheTextureFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            CacheTextureFormat::HeightRg32Float => 8,
            CacheTextureFormat::NormalRgba8 => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheTextureDesc {
    pub label: String,
    pub format: CacheTextureFormat,
    /// Texels per side
    pub size: u32,
    /// One layer per LOD
    pub layers: u32,
}

impl CacheTextureDesc {
    pub fn layer_bytes(&self) -> usize {
        (self.size as usize) * (self.size as usize) * self.format.bytes_per_texel()
    }
}

/// Backend-issued texture id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Location of data written into the frame's stream buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    pub offset: u64,
    pub size: u64,
}

/// The GPU operations the terrain view needs.
pub trait GpuBackend {
    fn create_cache_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureHandle>;

    /// Replace one layer of a cache texture. `data` covers the full `size` x `size` layer.
    fn write_rect(&mut self, texture: TextureHandle, layer: u32, size: u32, data: &[u8]);

    fn release_texture(&mut self, texture: TextureHandle);

    /// Reset the stream allocator for a new frame
    fn begin_frame(&mut self);

    /// Returns `None` when the frame's stream space is exhausted.
    fn allocate_vertex(&mut self, data: &[u8]) -> Option<StreamHandle> {
        self.allocate_with_custom_alignment(data, VERTEX_BUFFER_ALIGNMENT)
    }

    fn allocate_with_custom_alignment(
        &mut self,
        data: &[u8],
        alignment: u64,
    ) -> Option<StreamHandle>;
}

/// Round `value` up to a multiple of `alignment` (a power of two)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

struct HostTexture {
    desc: CacheTextureDesc,
    layers: Vec<Vec<u8>>,
    writes: u64,
}

/// Keeps every resource in CPU memory. Used by tests and offline tools.
pub struct HostBackend {
    textures: Vec<Option<HostTexture>>,
    stream: Vec<u8>,
    stream_capacity: usize,
}

impl HostBackend {
    pub fn new(stream_capacity: usize) -> Self {
        Self {
            textures: Vec::new(),
            stream: Vec::with_capacity(stream_capacity),
            stream_capacity,
        }
    }

    fn texture(&self, handle: TextureHandle) -> Option<&HostTexture> {
        self.textures.get(handle.0 as usize).and_then(Option::as_ref)
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&CacheTextureDesc> {
        self.texture(handle).map(|t| &t.desc)
    }

    pub fn layer(&self, handle: TextureHandle, layer: u32) -> Option<&[u8]> {
        self.texture(handle)
            .and_then(|t| t.layers.get(layer as usize))
            .map(Vec::as_slice)
    }

    /// Layer writes since creation
    pub fn write_count(&self, handle: TextureHandle) -> u64 {
        self.texture(handle).map_or(0, |t| t.writes)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    pub fn stream_data(&self, handle: StreamHandle) -> &[u8] {
        let start = handle.offset as usize;
        &self.stream[start..start + handle.size as usize]
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new(4 * 1024 * 1024)
    }
}

impl GpuBackend for HostBackend {
    fn create_cache_texture(&mut self, desc: &CacheTextureDesc) -> Result<TextureHandle> {
        if desc.size == 0 || desc.layers == 0 {
            return Err(StrataError::GpuError(format!(
                "Cache texture '{}' has zero size",
                desc.label
            )));
        }
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(HostTexture {
            desc: desc.clone(),
            layers: vec![vec![0; desc.layer_bytes()]; desc.layers as usize],
            writes: 0,
        }));
        Ok(handle)
    }

    fn write_rect(&mut self, texture: TextureHandle, layer: u32, size: u32, data: &[u8]) {
        let Some(Some(texture)) = self.textures.get_mut(texture.0 as usize) else {
            log::warn!("[terrain] write to unknown cache texture {:?}", texture);
            return;
        };
        let Some(target) = texture.layers.get_mut(layer as usize) else {
            return;
        };
        if size != texture.desc.size || data.len() != target.len() {
            log::warn!(
                "[terrain] '{}' layer {} write of {} bytes does not match {}x{}",
                texture.desc.label,
                layer,
                data.len(),
                size,
                size
            );
            return;
        }
        target.copy_from_slice(data);
        texture.writes += 1;
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            *slot = None;
        }
    }

    fn begin_frame(&mut self) {
        self.stream.clear();
    }

    fn allocate_with_custom_alignment(
        &mut self,
        data: &[u8],
        alignment: u64,
    ) -> Option<StreamHandle> {
        let offset = align_up(self.stream.len() as u64, alignment) as usize;
        let end = offset + data.len();
        if end > self.stream_capacity {
            return None;
        }
        self.stream.resize(offset, 0);
        self.stream.extend_from_slice(data);
        Some(StreamHandle {
            offset: offset as u64,
            size: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(layers: u32) -> CacheTextureDesc {
        CacheTextureDesc {
            label: "heights".into(),
            format: CacheTextureFormat::HeightRg32Float,
            size: 4,
            layers,
        }
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(28, 16), 32);
        assert_eq!(align_up(32, 16), 32);
    }

    #[test]
    fn stream_allocations_are_aligned() {
        let mut backend = HostBackend::new(256);
        let a = backend.allocate_vertex(&[1; 28]).unwrap();
        let b = backend
            .allocate_with_custom_alignment(&[2; 20], INDIRECT_BUFFER_ALIGNMENT)
            .unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 32);
        assert_eq!(backend.stream_data(b), &[2; 20]);

        backend.begin_frame();
        let c = backend.allocate_vertex(&[3; 8]).unwrap();
        assert_eq!(c.offset, 0);
    }

    #[test]
    fn stream_exhaustion_returns_none() {
        let mut backend = HostBackend::new(32);
        assert!(backend.allocate_vertex(&[0; 24]).is_some());
        assert!(backend.allocate_vertex(&[0; 24]).is_none());
    }

    #[test]
    fn layer_writes_replace_contents() {
        let mut backend = HostBackend::default();
        let tex = backend.create_cache_texture(&desc(3)).unwrap();
        let data: Vec<u8> = (0..128).map(|i| i as u8).collect();
        backend.write_rect(tex, 2, 4, &data);
        assert_eq!(backend.layer(tex, 2).unwrap(), data.as_slice());
        assert!(backend.layer(tex, 0).unwrap().iter().all(|&b| b == 0));
        assert_eq!(backend.write_count(tex), 1);

        // Wrong size is ignored
        backend.write_rect(tex, 1, 4, &data[..64]);
        assert_eq!(backend.write_count(tex), 1);
    }

    #[test]
    fn released_textures_are_gone() {
        let mut backend = HostBackend::default();
        let tex = backend.create_cache_texture(&desc(1)).unwrap();
        assert_eq!(backend.live_textures(), 1);
        backend.release_texture(tex);
        assert_eq!(backend.live_textures(), 0);
        assert!(backend.layer(tex, 0).is_none());
    }

    #[test]
    fn zero_layer_texture_is_an_error() {
        let mut backend = HostBackend::default();
        assert!(matches!(
            backend.create_cache_texture(&desc(0)),
            Err(StrataError::GpuError(_))
        ));
    }
}
