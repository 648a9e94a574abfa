//! Error types for Strata

use thiserror::Error;

/// The main error type for Strata operations
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Clipmap size must be a power of two, got {0}")]
    ClipmapSizeNotPowerOfTwo(u32),

    #[error("Clipmap size {size} is below the minimum of {min}")]
    ClipmapSizeTooSmall { size: u32, min: u32 },

    #[error("Heightmap error: {0}")]
    HeightmapError(String),

    #[error("Invalid heightmap dimensions: {width}x{depth}")]
    InvalidHeightmapSize { width: u32, depth: u32 },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("GPU error: {0}")]
    GpuError(String),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        StrataError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for StrataError {
    fn from(err: toml::ser::Error) -> Self {
        StrataError::TomlSerError(err.to_string())
    }
}
