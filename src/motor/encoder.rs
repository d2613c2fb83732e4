// Integrated encoder unit conversion
//
// Raw readings are encoder counts and counts/second. Drive motors convert to
// meters of wheel travel, steering motors convert to degrees of module angle.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::controller::MotorRole;
use super::error::{MotorError, Result};

/// Mechanical parameters needed to convert encoder counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderGeometry {
    /// Encoder counts per motor shaft revolution
    pub counts_per_revolution: f64,
    /// Motor revolutions per output revolution
    pub gear_ratio: f64,
    /// Wheel diameter in meters (drive motors only)
    #[serde(default)]
    pub wheel_diameter_m: f64,
}

impl EncoderGeometry {
    pub fn validate(&self, role: MotorRole) -> Result<()> {
        if !(self.counts_per_revolution > 0.0) || !(self.gear_ratio > 0.0) {
            return Err(MotorError::InvalidConfiguration(format!(
                "encoder counts ({}) and gear ratio ({}) must be > 0",
                self.counts_per_revolution, self.gear_ratio
            )));
        }
        if role == MotorRole::Drive && !(self.wheel_diameter_m > 0.0) {
            return Err(MotorError::InvalidConfiguration(format!(
                "drive motor needs a wheel diameter > 0, got {}",
                self.wheel_diameter_m
            )));
        }
        Ok(())
    }
}

/// Physical units per encoder count
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderConversion {
    pub position_factor: f64,
    pub velocity_factor: f64,
}

impl Default for EncoderConversion {
    /// Raw counts
    fn default() -> Self {
        Self {
            position_factor: 1.0,
            velocity_factor: 1.0,
        }
    }
}

impl EncoderConversion {
    pub fn for_role(role: MotorRole, geometry: &EncoderGeometry) -> Result<Self> {
        geometry.validate(role)?;
        let counts_per_output_rev = geometry.gear_ratio * geometry.counts_per_revolution;

        let factor = match role {
            // meters per count
            MotorRole::Drive => (PI * geometry.wheel_diameter_m) / counts_per_output_rev,
            // degrees per count
            MotorRole::Steer => 360.0 / counts_per_output_rev,
        };

        // raw velocity is counts/second, so the same factor gives units/second
        Ok(Self {
            position_factor: factor,
            velocity_factor: factor,
        })
    }
}

/// Maps raw counts to the calibrated position frame
///
/// `set_position` pins a physical value to the current raw reading. While the
/// raw reading stays put the pinned value comes back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeasurementFrame {
    anchor: Option<(f64, f64)>, // (raw counts, position)
}

impl MeasurementFrame {
    pub fn position(&self, raw: f64, factor: f64) -> f64 {
        match self.anchor {
            Some((raw_zero, position_zero)) => position_zero + (raw - raw_zero) * factor,
            None => raw * factor,
        }
    }

    pub fn rebase(&mut self, raw: f64, position: f64) {
        self.anchor = Some((raw, position));
    }

    /// Re-express the anchor after the feedback sign flips
    ///
    /// The pinned point negates along with the raw reading, so the shaft
    /// position reads as `-p` without moving.
    pub fn negate(&mut self) {
        if let Some((raw_zero, position_zero)) = self.anchor {
            self.anchor = Some((-raw_zero, -position_zero));
        }
    }

    pub fn clear(&mut self) {
        self.anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> EncoderGeometry {
        EncoderGeometry {
            counts_per_revolution: 42.0,
            gear_ratio: 6.75,
            wheel_diameter_m: 0.1016,
        }
    }

    #[test]
    fn test_drive_conversion_is_meters_per_count() {
        let conv = EncoderConversion::for_role(MotorRole::Drive, &geometry()).unwrap();
        let counts_per_wheel_rev = 42.0 * 6.75;
        let meters = conv.position_factor * counts_per_wheel_rev;
        assert!((meters - PI * 0.1016).abs() < 1e-12);
        assert_eq!(conv.position_factor, conv.velocity_factor);
    }

    #[test]
    fn test_steer_conversion_is_degrees_per_count() {
        let geom = EncoderGeometry {
            counts_per_revolution: 4096.0,
            gear_ratio: 12.8,
            wheel_diameter_m: 0.0,
        };
        let conv = EncoderConversion::for_role(MotorRole::Steer, &geom).unwrap();
        assert!((conv.position_factor * 4096.0 * 12.8 - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_drive_requires_wheel_diameter() {
        let geom = EncoderGeometry {
            wheel_diameter_m: 0.0,
            ..geometry()
        };
        assert!(matches!(
            EncoderConversion::for_role(MotorRole::Drive, &geom),
            Err(MotorError::InvalidConfiguration(_))
        ));
        assert!(EncoderConversion::for_role(MotorRole::Steer, &geom).is_ok());
    }

    #[test]
    fn test_frame_rebase_is_exact() {
        let mut frame = MeasurementFrame::default();
        let factor = 360.0 / (4096.0 * 12.8);
        frame.rebase(1234.5, 90.1);
        assert_eq!(frame.position(1234.5, factor), 90.1);
        assert!((frame.position(1234.5 + 4096.0 * 12.8, factor) - 450.1).abs() < 1e-9);

        frame.clear();
        assert_eq!(frame.position(10.0, 2.0), 20.0);
    }

    #[test]
    fn test_negated_frame_mirrors_reading() {
        let mut frame = MeasurementFrame::default();
        let factor = 0.5;
        frame.rebase(200.0, 30.0);
        frame.negate();
        assert_eq!(frame.position(-200.0, factor), -30.0);
        // moves keep the new sign
        assert_eq!(frame.position(-210.0, factor), -35.0);

        // no anchor: raw reading already carries the sign
        let mut bare = MeasurementFrame::default();
        bare.negate();
        assert_eq!(bare.position(-4.0, factor), -2.0);
    }
}
