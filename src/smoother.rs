// src/smoother.rs

/// Exponential moving average over raw per-detection vehicle counts.
///
/// `smoothed = (1 - alpha) * smoothed_prev + alpha * raw`
#[derive(Debug, Clone)]
pub struct CountSmoother {
    alpha: f32,
    value: f32,
}

impl CountSmoother {
    /// # Arguments
    /// * `alpha` - Weight of the newest sample, in (0, 1]
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            value: 0.0,
        }
    }

    pub fn update(&mut self, raw: f32) -> f32 {
        self.value = (1.0 - self.alpha) * self.value + self.alpha * raw;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Count reported to the aggregator and overlay.
    pub fn stable_count(&self) -> u32 {
        self.value.max(0.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_initial(alpha: f32, value: f32) -> CountSmoother {
        let mut smoother = CountSmoother::new(alpha);
        smoother.value = value;
        smoother
    }

    #[test]
    fn test_ema_update() {
        let mut smoother = with_initial(0.4, 5.0);
        let smoothed = smoother.update(10.0);
        assert!((smoothed - 7.0).abs() < 1e-5);
        assert_eq!(smoother.stable_count(), 7);
    }

    #[test]
    fn test_alpha_one_tracks_raw() {
        let mut smoother = CountSmoother::new(1.0);
        smoother.update(4.0);
        assert_eq!(smoother.value(), 4.0);
        smoother.update(9.0);
        assert_eq!(smoother.stable_count(), 9);
    }

    #[test]
    fn test_feeding_previous_value_pins_count() {
        let mut smoother = with_initial(0.4, 6.0);
        for _ in 0..10 {
            let prev = smoother.value();
            smoother.update(prev);
        }
        assert!((smoother.value() - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_converges_toward_constant_input() {
        let mut smoother = CountSmoother::new(0.4);
        for _ in 0..30 {
            smoother.update(12.0);
        }
        assert_eq!(smoother.stable_count(), 12);
    }
}
