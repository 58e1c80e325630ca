//! Fixed-capacity sample history.
//!
//! A ring buffer with FIFO eviction, used two ways by the estimators:
//! short windows (~8–10 samples) for smoothing via [`BoundedHistory::mean`],
//! and a long window (~180 samples) for distributional estimates via
//! [`BoundedHistory::percentile`]. The buffer never exceeds its capacity.

/// Ring buffer of the `N` most recent `f32` samples.
#[derive(Debug, Clone)]
pub struct BoundedHistory<const N: usize> {
    buf: [f32; N],
    head: usize,
    count: usize,
}

impl<const N: usize> Default for BoundedHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BoundedHistory<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0.0; N],
            head: 0,
            count: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: f32) {
        self.buf[self.head] = sample;
        self.head = (self.head + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Fraction of the capacity currently filled, in [0, 1].
    pub fn fill_ratio(&self) -> f32 {
        self.count as f32 / N as f32
    }

    /// Arithmetic mean of the stored samples; 0.0 when empty.
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let sum: f32 = self.iter().sum();
        sum / self.count as f32
    }

    /// The `p`-th percentile (0.0–1.0) from a sorted copy of the samples.
    ///
    /// Returns `None` when empty. Uses the same index convention as the
    /// field-tuned estimators: `max(0, floor(p·n) − 1)` for the low tail,
    /// `min(n − 1, floor(p·n))` for the high tail, split at the median.
    pub fn percentile(&self, p: f32) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let mut sorted: heapless::Vec<f32, N> = heapless::Vec::new();
        for v in self.iter() {
            // Capacity matches exactly, push cannot fail.
            let _ = sorted.push(v);
        }
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));

        let n = sorted.len();
        let idx = if p <= 0.5 {
            ((p * n as f32) as usize).saturating_sub(1)
        } else {
            ((p * n as f32) as usize).min(n - 1)
        };
        Some(sorted[idx])
    }

    /// Variance of the stored samples; 0.0 with fewer than two samples.
    pub fn variance(&self) -> f32 {
        if self.count < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let ss: f32 = self.iter().map(|v| (v - mean) * (v - mean)).sum();
        ss / self.count as f32
    }

    fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.buf[..self.count].iter().copied()
    }
}
