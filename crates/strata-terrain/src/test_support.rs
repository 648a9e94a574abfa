//! Deterministic randomness and analytic height sources for tests

use crate::height::HeightSource;

/// xorshift32, seeded so property tests replay the same paths
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a float in [0, 1]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() as f32) / (u32::MAX as f32)
    }

    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Returns an integer in [min, max)
    pub fn range_i32(&mut self, min: i32, max: i32) -> i32 {
        let span = (max - min) as u32;
        min + (self.next_u32() % span) as i32
    }
}

/// `h = a*x + b*z + c`
pub struct LinearSlope {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl HeightSource for LinearSlope {
    fn sample(&self, x: f32, z: f32) -> f32 {
        self.a * x + self.b * z + self.c
    }
}

/// Smooth periodic hills with a different response per LOD
pub struct RollingHills;

impl HeightSource for RollingHills {
    fn sample(&self, x: f32, z: f32) -> f32 {
        (x * 0.05).sin() * 12.0 + (z * 0.031).cos() * 7.0 + (x * 0.2 + z * 0.13).sin()
    }

    fn fetch(&self, x: f32, z: f32, lod: u32) -> f32 {
        // Coarser LODs lose the high-frequency term
        let detail = if lod == 0 { (x * 0.2 + z * 0.13).sin() } else { 0.0 };
        (x * 0.05).sin() * 12.0 + (z * 0.031).cos() * 7.0 + detail
    }
}
