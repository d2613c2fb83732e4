// Hardware-agnostic motor controller contract
//
// Configuration calls (factory_defaults ... burn_flash) belong to setup or
// infrequent mode changes. Drive calls (set, set_reference) run once per
// control cycle. Every method takes &mut self, so configuration and drive
// calls can never overlap on the same instance.

use serde::{Deserialize, Serialize};

use super::backend::{MotorSettings, StickyFaults};
use super::error::Result;
use super::pidf::PidfConfig;

/// Role a motor plays inside a swerve module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorRole {
    /// Wheel motor: velocity loop, meters and meters/second
    Drive,
    /// Steering motor: position loop, degrees
    Steer,
}

/// Behavior when no output is commanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    /// Actively resist motion
    Brake,
    /// Freewheel
    #[default]
    Coast,
}

/// Sign convention for output and feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inversion {
    #[default]
    Normal,
    Inverted,
}

impl Inversion {
    /// Multiplier applied to commands and encoder feedback
    pub fn sign(self) -> f64 {
        match self {
            Inversion::Normal => 1.0,
            Inversion::Inverted => -1.0,
        }
    }
}

impl From<bool> for Inversion {
    fn from(inverted: bool) -> Self {
        if inverted {
            Inversion::Inverted
        } else {
            Inversion::Normal
        }
    }
}

/// Configuration lifecycle of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// Nothing applied since construction
    Unconfigured,
    /// Configuration changed and not yet persisted
    Configured,
    /// Flash matches the current configuration
    Persisted,
}

/// One motor with an integrated encoder, independent of the hardware family
/// behind it.
pub trait MotorController {
    /// Role this controller was bound to at construction
    fn role(&self) -> MotorRole;

    /// Hardware id of the wrapped motor
    fn id(&self) -> u8;

    /// Reset to vendor defaults, dropping all runtime configuration
    fn factory_defaults(&mut self) -> Result<()>;

    /// Clear latched hardware fault flags
    fn clear_sticky_faults(&mut self) -> Result<()>;

    /// Set encoder conversion factors for the given role
    ///
    /// Drive motors report meters and meters/second, steering motors report
    /// degrees and degrees/second.
    fn configure_integrated_encoder(&mut self, role: MotorRole) -> Result<()>;

    /// Install closed-loop gains for the role's slot (velocity for drive,
    /// position for steer). A zero gain disables that term.
    fn configure_pidf(&mut self, role: MotorRole, config: &PidfConfig) -> Result<()>;

    /// Treat the position loop input as circular over `[min_input, max_input)`
    fn configure_pid_wrapping(&mut self, min_input: f64, max_input: f64) -> Result<()>;

    /// Set idle behavior
    fn set_motor_brake(&mut self, mode: IdleMode) -> Result<()>;

    /// Flip output and feedback sign together
    fn set_inverted(&mut self, inversion: Inversion) -> Result<()>;

    /// Scale open-loop output to a nominal supply voltage
    fn set_voltage_compensation(&mut self, nominal_volts: f64) -> Result<()>;

    /// Limit motor current
    fn set_current_limit(&mut self, amps: f64) -> Result<()>;

    /// Seconds to go from zero to full output
    fn set_loop_ramp_rate(&mut self, seconds: f64) -> Result<()>;

    /// Persist the current configuration to non-volatile storage
    ///
    /// Blocking. Must not be called from the control loop. A no-op when
    /// nothing changed since the last persist.
    fn burn_flash(&mut self) -> Result<()>;

    /// Open-loop output in `[-1.0, 1.0]`; out-of-range values are clamped
    fn set(&mut self, percent_output: f64) -> Result<()>;

    /// Closed-loop setpoint
    ///
    /// # Arguments
    /// * `setpoint` - m/s for drive, degrees for steer
    /// * `feedforward` - volts added to the PID output
    fn set_reference(&mut self, role: MotorRole, setpoint: f64, feedforward: f64) -> Result<()>;

    /// Converted velocity from a fresh encoder poll
    fn get_velocity(&mut self) -> Result<f64>;

    /// Converted position from a fresh encoder poll
    fn get_position(&mut self) -> Result<f64>;

    /// Re-baseline the measured position without moving the shaft
    fn set_position(&mut self, position: f64) -> Result<()>;

    /// Last output issued to the backend
    fn applied_output(&self) -> f64;

    /// Currently latched fault flags
    fn sticky_faults(&mut self) -> Result<StickyFaults>;

    fn config_state(&self) -> ConfigState;

    fn settings(&self) -> &MotorSettings;
}
