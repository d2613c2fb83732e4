// Register-level seam between the generic controller and a hardware family
//
// A backend only moves data to and from the device. Unit conversion, the
// closed loop and configuration bookkeeping live in SmartMotor.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::controller::{IdleMode, Inversion};
use super::encoder::EncoderConversion;
use super::error::BackendError;
use super::pidf::{PidWrapping, PidfConfig};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Output command sent once per cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    /// Fraction of supply voltage, `[-1.0, 1.0]`
    DutyCycle(f64),
    /// Volts
    Voltage(f64),
}

impl MotorCommand {
    pub fn value(&self) -> f64 {
        match *self {
            MotorCommand::DutyCycle(v) | MotorCommand::Voltage(v) => v,
        }
    }
}

/// One encoder poll
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncoderSample {
    /// Accumulated counts
    pub position: f64,
    /// Counts per second
    pub velocity: f64,
}

bitflags! {
    /// Latched hardware fault flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StickyFaults: u16 {
        const BROWNOUT = 1 << 0;
        const OVER_CURRENT = 1 << 1;
        const OVER_TEMPERATURE = 1 << 2;
        const SENSOR_FAULT = 1 << 3;
        const CAN_FAULT = 1 << 4;
        const HAS_RESET = 1 << 5;
    }
}

/// Full configuration image of one controller
///
/// `MotorSettings::default()` is the factory-default image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorSettings {
    pub idle_mode: IdleMode,
    pub inversion: Inversion,
    pub conversion: EncoderConversion,
    /// Gains for the slot of the bound role
    pub pidf: Option<PidfConfig>,
    pub wrapping: Option<PidWrapping>,
    /// Nominal volts for open-loop output, `None` = raw duty cycle
    pub voltage_compensation: Option<f64>,
    pub current_limit: Option<f64>,
    /// Seconds from zero to full output, 0 = disabled
    pub ramp_rate: f64,
}

/// Hardware (or simulated) motor controller device
pub trait MotorBackend {
    /// Device id on the bus
    fn id(&self) -> u8;

    fn restore_factory_defaults(&mut self) -> BackendResult<()>;

    /// Write a complete configuration image to volatile registers
    fn apply(&mut self, settings: &MotorSettings) -> BackendResult<()>;

    /// Write a configuration image to non-volatile storage
    fn persist(&mut self, settings: &MotorSettings) -> BackendResult<()>;

    fn command(&mut self, command: MotorCommand) -> BackendResult<()>;

    fn read_encoder(&mut self) -> BackendResult<EncoderSample>;

    fn sticky_faults(&mut self) -> BackendResult<StickyFaults>;

    fn clear_sticky_faults(&mut self) -> BackendResult<()>;
}
