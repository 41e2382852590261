//! Shortest-arc exponential heading filter.

use std::f32::consts::PI;

/// Wrap an angle to `(-π, π]`.
pub fn wrap_angle(mut a: f32) -> f32 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Exponential filter over headings that always moves along the shortest
/// arc, so a pose flipping between +179° and −179° smooths across the seam
/// instead of spinning the long way round.
#[derive(Debug, Clone, Default)]
pub struct HeadingSmoother {
    alpha: f32,
    value: Option<f32>,
}

impl HeadingSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    /// Feed one raw heading; returns the smoothed value. The first sample
    /// initializes the filter.
    pub fn smooth(&mut self, raw: f32) -> f32 {
        let next = match self.value {
            None => wrap_angle(raw),
            Some(prev) => wrap_angle(prev + self.alpha * wrap_angle(raw - prev)),
        };
        self.value = Some(next);
        next
    }

    pub fn current(&self) -> Option<f32> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes() {
        let mut s = HeadingSmoother::new(0.2);
        assert_eq!(s.smooth(0.5), 0.5);
    }

    #[test]
    fn converges_toward_constant_input() {
        let mut s = HeadingSmoother::new(0.2);
        s.smooth(0.0);
        let mut last = 0.0;
        for _ in 0..50 {
            last = s.smooth(1.0);
        }
        assert!((last - 1.0).abs() < 0.01);
    }

    #[test]
    fn crosses_the_pi_seam_along_the_short_arc() {
        let mut s = HeadingSmoother::new(0.5);
        s.smooth(3.1);
        let next = s.smooth(-3.1);
        // Short arc from 3.1 to -3.1 is +0.083 rad; half of it lands past π
        // and wraps negative.
        assert!(
            (wrap_angle(next - 3.1).abs() - 0.0416).abs() < 1e-3,
            "moved {next}"
        );
        assert!(next > 3.1 || next < -3.0, "wrapped the wrong way: {next}");
    }

    #[test]
    fn wrap_angle_bounds() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(-3.0 * PI) - PI).abs() < 1e-6);
        assert_eq!(wrap_angle(0.0), 0.0);
    }
}
