//! Terrain view configuration

use serde::{Deserialize, Serialize};
use strata_core::{Result, StrataError};

use crate::layout::ClipmapLayout;

/// Number of LOD levels a view allocates
pub const MAX_TERRAIN_LODS: usize = 8;

/// The active range holds at most `MAX_ACTIVE_LOD_SPAN + 1` levels
pub const MAX_ACTIVE_LOD_SPAN: u32 = 5;

/// How the active LOD range is shortened when promotion leaves it too wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodSpanClamp {
    /// `max_lod` is clamped to the constant 5, regardless of `min_lod`.
    #[default]
    Literal,
    /// `max_lod` becomes `min_lod + 5`.
    Anchored,
}

impl LodSpanClamp {
    /// Returns the clamped `max_lod` for the range `[min_lod, max_lod]`.
    pub fn clamp_max_lod(self, min_lod: u32, max_lod: u32) -> u32 {
        if max_lod - min_lod <= MAX_ACTIVE_LOD_SPAN {
            return max_lod;
        }
        match self {
            LodSpanClamp::Literal => MAX_ACTIVE_LOD_SPAN.max(min_lod),
            LodSpanClamp::Anchored => min_lod + MAX_ACTIVE_LOD_SPAN,
        }
    }
}

/// Construction parameters of a `TerrainView`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainViewConfig {
    /// Texels per side of each LOD cache; a power of two
    pub clipmap_size: u32,
    pub min_lod: u32,
    pub max_lod: u32,
    /// Log the cache memory footprint at construction
    pub log_memory_usage: bool,
    pub span_clamp: LodSpanClamp,
}

impl Default for TerrainViewConfig {
    fn default() -> Self {
        Self {
            clipmap_size: 256,
            min_lod: 0,
            max_lod: MAX_TERRAIN_LODS as u32 - 1,
            log_memory_usage: false,
            span_clamp: LodSpanClamp::Literal,
        }
    }
}

impl TerrainViewConfig {
    /// Parse from a TOML document, e.g. the `[terrain]` section body of a level file.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        Ok(config)
    }

    /// Parse from an already loaded TOML table
    pub fn from_toml(table: &toml::value::Table) -> Result<Self> {
        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| StrataError::ConfigError(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// LOD bounds forced into `[0, MAX_TERRAIN_LODS - 1]` with `min_lod <= max_lod`.
    pub fn clamped(&self) -> Self {
        let max_lod = self.max_lod.min(MAX_TERRAIN_LODS as u32 - 1);
        Self {
            min_lod: self.min_lod.min(max_lod),
            max_lod,
            ..self.clone()
        }
    }

    /// Checks the clipmap size and returns the derived layout.
    pub fn layout(&self) -> Result<ClipmapLayout> {
        ClipmapLayout::new(self.clipmap_size)
    }
}
