//! Heightmap loading and sampling
//!
//! A heightmap tiles the XZ plane infinitely. Each mip level halves the
//! resolution with a 2x2 box filter, so coarse LODs read prefiltered data.

use std::path::Path;

use strata_core::{Aabb, Result, StrataError};

use crate::height::HeightSource;

struct MipLevel {
    /// Row-major height values normalized to [0..1]
    heights: Vec<f32>,
    width: u32,
    depth: u32,
}

impl MipLevel {
    fn get(&self, x: i32, z: i32) -> f32 {
        let x = x.rem_euclid(self.width as i32) as u32;
        let z = z.rem_euclid(self.depth as i32) as u32;
        self.heights[(z * self.width + x) as usize]
    }

    /// Bilinear sample in texel coordinates, wrapping at the edges
    fn sample(&self, fx: f32, fz: f32) -> f32 {
        let x0f = fx.floor();
        let z0f = fz.floor();
        let tx = fx - x0f;
        let tz = fz - z0f;
        let x0 = x0f as i32;
        let z0 = z0f as i32;

        let h00 = self.get(x0, z0);
        let h10 = self.get(x0 + 1, z0);
        let h01 = self.get(x0, z0 + 1);
        let h11 = self.get(x0 + 1, z0 + 1);

        let h0 = h00 * (1.0 - tx) + h10 * tx;
        let h1 = h01 * (1.0 - tx) + h11 * tx;

        h0 * (1.0 - tz) + h1 * tz
    }

    fn downsample(&self) -> Option<MipLevel> {
        if self.width < 2 || self.depth < 2 || self.width % 2 != 0 || self.depth % 2 != 0 {
            return None;
        }
        let width = self.width / 2;
        let depth = self.depth / 2;
        let mut heights = Vec::with_capacity((width * depth) as usize);
        for z in 0..depth as i32 {
            for x in 0..width as i32 {
                let sum = self.get(2 * x, 2 * z)
                    + self.get(2 * x + 1, 2 * z)
                    + self.get(2 * x, 2 * z + 1)
                    + self.get(2 * x + 1, 2 * z + 1);
                heights.push(sum * 0.25);
            }
        }
        Some(MipLevel {
            heights,
            width,
            depth,
        })
    }
}

/// A grayscale heightmap tiled over the XZ plane, with bilinear sampling
pub struct Heightmap {
    /// Mip chain; index 0 is full resolution
    mips: Vec<MipLevel>,
    /// World units per texel at mip 0
    texel_size: f32,
    /// World-space height of a normalized value of 1.0
    height_scale: f32,
    min_value: f32,
    max_value: f32,
}

impl Heightmap {
    /// Load a heightmap from a grayscale PNG file.
    /// Values are normalized to [0..1] regardless of bit depth.
    pub fn from_png(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| {
            StrataError::HeightmapError(format!(
                "Failed to load heightmap '{}': {}",
                path.display(),
                e
            ))
        })?;

        let gray = img.into_luma16();
        let width = gray.width();
        let depth = gray.height();

        let heights: Vec<f32> = gray
            .pixels()
            .map(|p| p.0[0] as f32 / 65535.0)
            .collect();

        Self::from_raw(heights, width, depth)
    }

    /// Create a heightmap from raw float data
    pub fn from_raw(heights: Vec<f32>, width: u32, depth: u32) -> Result<Self> {
        if width == 0 || depth == 0 || heights.len() != (width as usize) * (depth as usize) {
            return Err(StrataError::InvalidHeightmapSize { width, depth });
        }

        let (min_value, max_value) = heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)));

        let mut mips = vec![MipLevel {
            heights,
            width,
            depth,
        }];
        while let Some(next) = mips.last().and_then(MipLevel::downsample) {
            mips.push(next);
        }

        Ok(Self {
            mips,
            texel_size: 1.0,
            height_scale: 1.0,
            min_value,
            max_value,
        })
    }

    pub fn with_texel_size(mut self, texel_size: f32) -> Self {
        self.texel_size = texel_size;
        self
    }

    pub fn with_height_scale(mut self, height_scale: f32) -> Self {
        self.height_scale = height_scale;
        self
    }

    pub fn width(&self) -> u32 {
        self.mips[0].width
    }

    pub fn depth(&self) -> u32 {
        self.mips[0].depth
    }

    pub fn mip_count(&self) -> usize {
        self.mips.len()
    }

    pub fn texel_size(&self) -> f32 {
        self.texel_size
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// World-space height from a mip level; `mip` is clamped to the chain.
    pub fn sample_mip(&self, x: f32, z: f32, mip: usize) -> f32 {
        let mip = mip.min(self.mips.len() - 1);
        let texel = self.texel_size * (1u32 << mip) as f32;
        self.mips[mip].sample(x / texel, z / texel) * self.height_scale
    }
}

impl HeightSource for Heightmap {
    fn sample(&self, x: f32, z: f32) -> f32 {
        self.sample_mip(x, z, 0)
    }

    fn fetch(&self, x: f32, z: f32, lod: u32) -> f32 {
        self.sample_mip(x, z, lod as usize)
    }

    fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EVERYTHING;
        bounds.min.y = self.min_value * self.height_scale;
        bounds.max.y = self.max_value * self.height_scale;
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn height_sampling_returns_correct_values() {
        // 3x3 heightmap with center peak
        let heights = vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let hm = Heightmap::from_raw(heights, 3, 3).unwrap();

        assert_relative_eq!(hm.sample(1.0, 1.0), 1.0);
        assert_relative_eq!(hm.sample(0.0, 0.0), 0.0);
        // Halfway between corner and peak
        assert_relative_eq!(hm.sample(0.5, 0.5), 0.25);
    }

    #[test]
    fn sampling_wraps_across_tiles() {
        let heights: Vec<f32> = (0..16).map(|i| (i as f32) / 16.0).collect();
        let hm = Heightmap::from_raw(heights, 4, 4)
            .unwrap()
            .with_texel_size(2.0)
            .with_height_scale(10.0);

        for &(x, z) in &[(0.0, 0.0), (1.3, 2.7), (5.5, 0.25)] {
            let h = hm.sample(x, z);
            assert_relative_eq!(hm.sample(x + 8.0, z), h, epsilon = 1e-4);
            assert_relative_eq!(hm.sample(x, z - 16.0), h, epsilon = 1e-4);
        }
    }

    #[test]
    fn mip_chain_box_filters() {
        // 4x4 checkerboard averages to 0.5 at mip 1
        let heights: Vec<f32> = (0..16)
            .map(|i| if (i % 4 + i / 4) % 2 == 0 { 1.0 } else { 0.0 })
            .collect();
        let hm = Heightmap::from_raw(heights, 4, 4).unwrap();
        assert_eq!(hm.mip_count(), 3);
        assert_relative_eq!(hm.fetch(1.0, 3.0, 1), 0.5);
        assert_relative_eq!(hm.fetch(0.0, 0.0, 7), 0.5);
        assert_relative_eq!(hm.fetch(0.0, 0.0, 0), 1.0);
    }

    #[test]
    fn odd_dimensions_stop_the_chain() {
        let hm = Heightmap::from_raw(vec![0.0; 6 * 3], 6, 3).unwrap();
        assert_eq!(hm.mip_count(), 1);
    }

    #[test]
    fn mismatched_data_is_rejected() {
        assert!(matches!(
            Heightmap::from_raw(vec![0.0; 5], 2, 2),
            Err(StrataError::InvalidHeightmapSize { width: 2, depth: 2 })
        ));
        assert!(Heightmap::from_raw(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn bounds_follow_height_scale() {
        let hm = Heightmap::from_raw(vec![0.25, 0.5, 0.75, 1.0], 2, 2)
            .unwrap()
            .with_height_scale(100.0);
        let bounds = hm.bounds();
        assert_relative_eq!(bounds.min.y, 25.0);
        assert_relative_eq!(bounds.max.y, 100.0);
    }

    #[test]
    fn missing_png_is_a_heightmap_error() {
        let result = Heightmap::from_png(Path::new("does/not/exist.png"));
        assert!(matches!(result, Err(StrataError::HeightmapError(_))));
    }
}
