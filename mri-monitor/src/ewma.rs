/// Smoothing factor of the delay and queue estimates.
pub const DEFAULT_ALPHA: f64 = 0.1;

/// An exponentially weighted moving average, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ewma {
    alpha: f64,
    value: f64,
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl Ewma {
    /// Creates an average with smoothing factor `alpha`, clamped to `[0, 1]`.
    pub fn new(alpha: f64) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0), value: 0.0 }
    }

    /// Folds `sample` into the average and returns the new value.
    ///
    /// Computes `(1 - alpha) * value + alpha * sample` as `value + alpha * (sample - value)`,
    /// which cannot overshoot a constant input.
    #[inline]
    pub fn update(&mut self, sample: f64) -> f64 {
        self.value += self.alpha * (sample - self.value);
        self.value
    }

    /// The current average.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The smoothing factor.
    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
