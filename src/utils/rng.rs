//! Seedable random number generator.
//!
//! A single [`SimpleRng`] is owned by the network and threaded through
//! parameter initialization, so a fixed seed reproduces the same weights.

/// Xorshift PRNG with uniform and Gaussian sampling.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
    spare_gaussian: Option<f32>,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self {
            state,
            spare_gaussian: None,
        }
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Convert to [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Normal sample with the given mean and standard deviation (Box-Muller).
    pub fn gen_normal_f32(&mut self, mean: f32, std_dev: f32) -> f32 {
        let z = match self.spare_gaussian.take() {
            Some(z) => z,
            None => {
                // u1 in (0, 1] so the log stays finite
                let u1 = 1.0 - self.next_f32();
                let u2 = self.next_f32();
                let radius = (-2.0 * u1.ln()).sqrt();
                let theta = 2.0 * std::f32::consts::PI * u2;
                self.spare_gaussian = Some(radius * theta.sin());
                radius * theta.cos()
            }
        };
        mean + std_dev * z
    }
}
