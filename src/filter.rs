//! Exponential moving average: `new = α·sample + (1−α)·old`.
//!
//! The filter is unseeded until the first sample arrives; the first sample
//! becomes the initial value so a cold start does not drag the output
//! through zero.

#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    value: Option<f32>,
}

impl Ema {
    /// Create a filter with the given smoothing constant, clamped to
    /// [0.01, 0.9] — outside that band the filter either freezes or stops
    /// filtering.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 0.9),
            value: None,
        }
    }

    /// Seed the filter with a known-good starting value (e.g. a burst
    /// average taken at initialization).
    pub fn seed(&mut self, value: f32) {
        self.value = Some(value);
    }

    /// Feed one sample, returning the updated filtered value.
    pub fn update(&mut self, sample: f32) -> f32 {
        let v = match self.value {
            None => sample,
            Some(old) => self.alpha * sample + (1.0 - self.alpha) * old,
        };
        self.value = Some(v);
        v
    }

    /// Current filtered value, if any sample has been seen.
    pub fn value(&self) -> Option<f32> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds() {
        let mut f = Ema::new(0.2);
        assert_eq!(f.update(42.0), 42.0);
    }

    #[test]
    fn converges_to_constant_input() {
        let mut f = Ema::new(0.2);
        for _ in 0..100 {
            f.update(10.0);
        }
        assert!((f.value().unwrap() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn smooths_a_step() {
        let mut f = Ema::new(0.2);
        f.update(0.0);
        let after_step = f.update(100.0);
        assert!((after_step - 20.0).abs() < 1e-4);
    }

    #[test]
    fn alpha_is_clamped() {
        let mut f = Ema::new(5.0); // clamped to 0.9
        f.update(0.0);
        let v = f.update(100.0);
        assert!((v - 90.0).abs() < 1e-4);
    }

    #[test]
    fn explicit_seed_skips_cold_start() {
        let mut f = Ema::new(0.2);
        f.seed(50.0);
        let v = f.update(60.0);
        assert!((v - 52.0).abs() < 1e-4);
    }
}
