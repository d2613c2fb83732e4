// PIDF gains and the closed-loop controller that runs them
//
// output = p*e + i*sum(e*dt) + d*de/dt + f*setpoint
// The caller adds arbitrary feedforward and clamps to the output range.

use serde::{Deserialize, Serialize};

use super::error::{MotorError, Result};

/// Default output range in volts
pub const DEFAULT_OUTPUT_MIN: f64 = -12.0;
pub const DEFAULT_OUTPUT_MAX: f64 = 12.0;

/// Closed-loop gains for one slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidfConfig {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub f: f64,
    /// Integral zone: the integrator is cleared while |error| exceeds it (0 = always integrate)
    pub iz: f64,
    /// Bound on the accumulated error (0 = whatever keeps `i * integral` inside the output range)
    pub integral_limit: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl Default for PidfConfig {
    fn default() -> Self {
        Self {
            p: 0.0,
            i: 0.0,
            d: 0.0,
            f: 0.0,
            iz: 0.0,
            integral_limit: 0.0,
            output_min: DEFAULT_OUTPUT_MIN,
            output_max: DEFAULT_OUTPUT_MAX,
        }
    }
}

impl PidfConfig {
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self {
            p,
            i,
            d,
            ..Self::default()
        }
    }

    pub fn with_feedforward(mut self, f: f64) -> Self {
        self.f = f;
        self
    }

    pub fn with_integral_zone(mut self, iz: f64) -> Self {
        self.iz = iz;
        self
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    pub fn with_output_range(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Check gains before anything is written to hardware
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.p,
            self.i,
            self.d,
            self.f,
            self.iz,
            self.integral_limit,
            self.output_min,
            self.output_max,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MotorError::InvalidConfiguration(format!(
                "PIDF values must be finite: {:?}",
                self
            )));
        }
        if self.iz < 0.0 {
            return Err(MotorError::InvalidConfiguration(format!(
                "integral zone must be >= 0, got {}",
                self.iz
            )));
        }
        if self.integral_limit < 0.0 {
            return Err(MotorError::InvalidConfiguration(format!(
                "integral limit must be >= 0, got {}",
                self.integral_limit
            )));
        }
        if self.output_min > self.output_max {
            return Err(MotorError::InvalidConfiguration(format!(
                "output range min {} > max {}",
                self.output_min, self.output_max
            )));
        }
        Ok(())
    }

    pub fn clamp_output(&self, output: f64) -> f64 {
        output.clamp(self.output_min, self.output_max)
    }

    /// Largest magnitude the integrator may hold; only meaningful when `i != 0`
    fn integral_bound(&self) -> f64 {
        if self.integral_limit > 0.0 {
            self.integral_limit
        } else {
            self.output_min.abs().max(self.output_max.abs()) / self.i.abs()
        }
    }
}

/// Circular input range for the position loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidWrapping {
    pub min_input: f64,
    pub max_input: f64,
}

impl PidWrapping {
    pub fn new(min_input: f64, max_input: f64) -> Result<Self> {
        if !min_input.is_finite() || !max_input.is_finite() || max_input <= min_input {
            return Err(MotorError::InvalidConfiguration(format!(
                "wrapping range requires min < max, got [{}, {})",
                min_input, max_input
            )));
        }
        Ok(Self {
            min_input,
            max_input,
        })
    }

    pub fn range(&self) -> f64 {
        self.max_input - self.min_input
    }

    /// Shortest signed distance, in `[-range/2, range/2)`
    ///
    /// `error` is setpoint minus measured: setpoint 359 and measured 1 over
    /// `[0, 360)` wraps to -2, so the output drives the shaft backwards.
    pub fn wrap_error(&self, error: f64) -> f64 {
        let range = self.range();
        let half = range / 2.0;
        (error + half).rem_euclid(range) - half
    }
}

/// Loop error, taking the shortest way around when wrapping is enabled
pub fn loop_error(setpoint: f64, measured: f64, wrapping: Option<&PidWrapping>) -> f64 {
    let error = setpoint - measured;
    match wrapping {
        Some(w) => w.wrap_error(error),
        None => error,
    }
}

/// Stateful PIDF loop stepped once per control cycle
#[derive(Debug, Clone)]
pub struct PidfController {
    gains: PidfConfig,
    period: f64,
    integral: f64,
    prev_error: Option<f64>,
}

impl PidfController {
    /// `period` is the control loop period in seconds and must be > 0
    pub fn new(gains: PidfConfig, period: f64) -> Self {
        Self {
            gains,
            period,
            integral: 0.0,
            prev_error: None,
        }
    }

    pub fn gains(&self) -> &PidfConfig {
        &self.gains
    }

    /// PIDF term for one cycle, before arbitrary feedforward and clamping
    pub fn calculate(&mut self, setpoint: f64, error: f64) -> f64 {
        let g = &self.gains;

        if g.i == 0.0 || (g.iz > 0.0 && error.abs() > g.iz) {
            self.integral = 0.0;
        } else {
            let bound = g.integral_bound();
            self.integral = (self.integral + error * self.period).clamp(-bound, bound);
        }

        let derivative = match self.prev_error {
            Some(prev) if g.d != 0.0 => (error - prev) / self.period,
            _ => 0.0,
        };
        self.prev_error = Some(error);

        g.p * error + g.i * self.integral + g.d * derivative + g.f * setpoint
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.02;

    #[test]
    fn test_wrapped_error_takes_short_way() {
        let wrap = PidWrapping::new(0.0, 360.0).unwrap();
        let error = loop_error(359.0, 1.0, Some(&wrap));
        assert!((error.abs() - 2.0).abs() < 1e-9, "error was {}", error);
        assert!((error + 2.0).abs() < 1e-9);

        let error = loop_error(1.0, 359.0, Some(&wrap));
        assert!((error - 2.0).abs() < 1e-9, "error was {}", error);
    }

    #[test]
    fn test_unwrapped_error_is_plain_difference() {
        assert_eq!(loop_error(359.0, 1.0, None), 358.0);
    }

    #[test]
    fn test_wrapping_rejects_empty_range() {
        assert!(PidWrapping::new(0.0, 0.0).is_err());
        assert!(PidWrapping::new(10.0, -10.0).is_err());
        assert!(PidWrapping::new(-180.0, 180.0).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(PidfConfig::default().validate().is_ok());
        assert!(
            PidfConfig::new(1.0, 0.0, 0.0)
                .with_output_range(1.0, -1.0)
                .validate()
                .is_err()
        );
        assert!(PidfConfig::new(f64::NAN, 0.0, 0.0).validate().is_err());
        assert!(
            PidfConfig::new(1.0, 0.1, 0.0)
                .with_integral_zone(-1.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = PidfController::new(PidfConfig::new(0.5, 0.0, 0.0), DT);
        assert_eq!(pid.calculate(10.0, 4.0), 2.0);
        // no memory between cycles
        assert_eq!(pid.calculate(10.0, 4.0), 2.0);
    }

    #[test]
    fn test_integral_accumulates_and_respects_zone() {
        let gains = PidfConfig::new(0.0, 1.0, 0.0).with_integral_zone(5.0);
        let mut pid = PidfController::new(gains, DT);

        let first = pid.calculate(0.0, 2.0);
        let second = pid.calculate(0.0, 2.0);
        assert!((first - 0.04).abs() < 1e-12);
        assert!((second - 0.08).abs() < 1e-12);

        // outside the zone the integrator is cleared
        assert_eq!(pid.calculate(0.0, 10.0), 0.0);
        assert!((pid.calculate(0.0, 1.0) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_integral_stops_winding_up() {
        let gains = PidfConfig::new(0.0, 1.0, 0.0).with_output_range(-1.0, 1.0);
        let mut pid = PidfController::new(gains, DT);

        // 10 s of saturating error
        for _ in 0..500 {
            pid.calculate(0.0, 10.0);
        }
        assert_eq!(pid.calculate(0.0, 10.0), 1.0);

        // unwinds from the bound, not from 50
        let out = pid.calculate(0.0, -10.0);
        assert!((out - 0.8).abs() < 1e-9, "output was {}", out);
    }

    #[test]
    fn test_explicit_integral_limit() {
        let gains = PidfConfig::new(0.0, 2.0, 0.0).with_integral_limit(0.1);
        let mut pid = PidfController::new(gains, DT);
        for _ in 0..100 {
            pid.calculate(0.0, -3.0);
        }
        assert!((pid.calculate(0.0, -3.0) + 0.2).abs() < 1e-12);

        assert!(gains.with_integral_limit(-1.0).validate().is_err());
    }

    #[test]
    fn test_derivative_skips_first_cycle() {
        let mut pid = PidfController::new(PidfConfig::new(0.0, 0.0, 0.1), DT);
        assert_eq!(pid.calculate(0.0, 1.0), 0.0);
        let out = pid.calculate(0.0, 3.0);
        assert!((out - 0.1 * 2.0 / DT).abs() < 1e-9);

        pid.reset();
        assert_eq!(pid.calculate(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_feedforward_gain_scales_setpoint() {
        let mut pid = PidfController::new(PidfConfig::default().with_feedforward(0.25), DT);
        assert_eq!(pid.calculate(4.0, 0.0), 1.0);
    }
}
