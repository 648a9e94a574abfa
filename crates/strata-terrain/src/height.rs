//! Height sources and the shared terrain handle

use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_core::Aabb;

/// Heights above this value are clamped when written to the cache
pub const MAX_CACHED_HEIGHT: f32 = 32768.0;

/// A heightfield over the infinite XZ plane.
///
/// Implementations must be pure and total: the same arguments always give the
/// same height, for any finite coordinate.
pub trait HeightSource: Send + Sync {
    /// Full resolution height at a world position
    fn sample(&self, x: f32, z: f32) -> f32;

    /// Height as seen by the given LOD level. Sources with prefiltered data
    /// read a coarser representation here.
    fn fetch(&self, x: f32, z: f32, lod: u32) -> f32 {
        let _ = lod;
        self.sample(x, z)
    }

    /// World-space bounds of the terrain, used to reject patches before frustum tests
    fn bounds(&self) -> Aabb {
        Aabb::EVERYTHING
    }
}

/// Terrain at a constant height
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlatHeightSource {
    pub height: f32,
}

impl FlatHeightSource {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl HeightSource for FlatHeightSource {
    fn sample(&self, _x: f32, _z: f32) -> f32 {
        self.height
    }

    fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EVERYTHING;
        bounds.min.y = self.height;
        bounds.max.y = self.height;
        bounds
    }
}

/// Shared slot for a height source that may not be loaded yet.
///
/// Clones refer to the same slot, so a loader can attach the source after
/// views have been created with the handle.
#[derive(Clone, Default)]
pub struct TerrainHandle {
    slot: Arc<OnceLock<Arc<dyn HeightSource>>>,
}

impl TerrainHandle {
    /// A handle with nothing attached
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(source: impl HeightSource + 'static) -> Self {
        Self::from_arc(Arc::new(source))
    }

    pub fn from_arc(source: Arc<dyn HeightSource>) -> Self {
        let handle = Self::empty();
        handle.attach(source);
        handle
    }

    /// Attach a source. Returns false if one was already attached; the first one wins.
    pub fn attach(&self, source: Arc<dyn HeightSource>) -> bool {
        self.slot.set(source).is_ok()
    }

    pub fn try_get(&self) -> Option<&dyn HeightSource> {
        self.slot.get().map(|source| source.as_ref())
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// True if both handles share a slot
    pub fn same_slot(&self, other: &TerrainHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for TerrainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
