//! Gaussian-weighted moving average over the raw bearing stream.
//!
//! ## Algorithm
//!
//! 1. Store the newest bearing at `history[idx]`, advance `idx` mod 7.
//! 2. `filtered = Σ history[(stored − i) mod 7] · w[i] / Σ w[i]` where the
//!    weights are a normalized Gaussian (σ = 1) centred on the window middle.
//!
//! The centre weight lands on the sample three frames back, so this behaves
//! as a symmetric smoother with roughly half a window of delay.

/// Smoothing window length in frames.
pub const WINDOW_SIZE: usize = 7;

/// Gaussian σ for the weight vector.
const SIGMA: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct GaussianSmoother {
    history: [f32; WINDOW_SIZE],
    idx: usize,
    weights: [f32; WINDOW_SIZE],
}

impl GaussianSmoother {
    pub fn new() -> Self {
        Self {
            history: [0.0; WINDOW_SIZE],
            idx: 0,
            weights: gaussian_weights(),
        }
    }

    /// Store `angle` and return the filtered bearing over the window.
    ///
    /// Entries never written read as zero, so early output ramps from zero
    /// toward the input level until the window fills.
    pub fn push(&mut self, angle: f32) -> f32 {
        let stored = self.idx;
        self.history[stored] = angle;
        self.idx = (self.idx + 1) % WINDOW_SIZE;

        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for (i, w) in self.weights.iter().enumerate() {
            let data_index = (stored + WINDOW_SIZE - i) % WINDOW_SIZE;
            sum += self.history[data_index] * w;
            weight_sum += w;
        }
        // The weights are normalized at construction; divide anyway.
        sum / weight_sum
    }
}

impl Default for GaussianSmoother {
    fn default() -> Self {
        Self::new()
    }
}

/// Precompute the normalized Gaussian weight vector.
fn gaussian_weights() -> [f32; WINDOW_SIZE] {
    let mut weights = [0.0f32; WINDOW_SIZE];
    let center = (WINDOW_SIZE - 1) as f32 / 2.0;
    let mut sum = 0.0f32;
    for (i, w) in weights.iter_mut().enumerate() {
        let x = i as f32 - center;
        *w = (-(x * x) / (2.0 * SIGMA * SIGMA)).exp();
        sum += *w;
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_normalized_and_symmetric() {
        let weights = gaussian_weights();
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum={sum}");

        for i in 0..WINDOW_SIZE / 2 {
            let mirror = WINDOW_SIZE - 1 - i;
            assert!(
                (weights[i] - weights[mirror]).abs() < 1e-6,
                "w[{i}]={} vs w[{mirror}]={}",
                weights[i],
                weights[mirror]
            );
        }
        // The centre carries the largest weight.
        assert!(weights[3] > weights[2]);
        assert!(weights[2] > weights[1]);
    }

    #[test]
    fn constant_input_passes_through_once_window_fills() {
        let mut smoother = GaussianSmoother::new();
        let mut filtered = 0.0;
        for _ in 0..WINDOW_SIZE {
            filtered = smoother.push(42.0);
        }
        assert!((filtered - 42.0).abs() < 1e-4, "filtered={filtered}");
    }

    #[test]
    fn output_ramps_from_zero_while_filling() {
        let mut smoother = GaussianSmoother::new();
        let first = smoother.push(100.0);
        // Only the newest tap (smallest weight) sees the sample.
        assert!(first > 0.0 && first < 1.0, "first={first}");

        let mut last = first;
        for _ in 0..WINDOW_SIZE - 1 {
            let next = smoother.push(100.0);
            assert!(next > last, "expected monotonic ramp: {next} <= {last}");
            last = next;
        }
    }

    #[test]
    fn window_wraps_and_forgets_old_values() {
        let mut smoother = GaussianSmoother::new();
        for _ in 0..WINDOW_SIZE {
            smoother.push(10.0);
        }
        let mut filtered = 0.0;
        for _ in 0..WINDOW_SIZE {
            filtered = smoother.push(20.0);
        }
        assert!((filtered - 20.0).abs() < 1e-4, "filtered={filtered}");
    }
}
