// Motor control layer for swerve modules
//
// Provides:
// - The hardware-agnostic MotorController contract
// - SmartMotor: software PIDF, encoder conversion and config bookkeeping
//   on top of any MotorBackend
// - A simulated backend with fault injection

pub mod backend;
mod controller;
pub mod encoder;
mod error;
pub mod pidf;
pub mod sim;
mod smart;
mod vendor;

pub use backend::{EncoderSample, MotorBackend, MotorCommand, MotorSettings, StickyFaults};
pub use controller::{ConfigState, IdleMode, Inversion, MotorController, MotorRole};
pub use encoder::{EncoderConversion, EncoderGeometry};
pub use error::{BackendError, MotorError, Result};
pub use pidf::{PidWrapping, PidfConfig, PidfController};
pub use sim::SimBackend;
pub use smart::{DEFAULT_LOOP_PERIOD, SmartMotor};
pub use vendor::{BoxedMotor, MotorVendor, build_motor};
