// Backend selection at construction time

use serde::{Deserialize, Serialize};
use tracing::info;

use super::controller::{MotorController, MotorRole};
use super::encoder::EncoderGeometry;
use super::sim::{DEFAULT_FREE_SPEED_CPS, SimBackend};
use super::smart::SmartMotor;

pub type BoxedMotor = Box<dyn MotorController + Send>;

/// Hardware family behind a motor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotorVendor {
    Simulated {
        #[serde(default = "default_free_speed")]
        free_speed_cps: f64,
    },
}

fn default_free_speed() -> f64 {
    DEFAULT_FREE_SPEED_CPS
}

impl Default for MotorVendor {
    fn default() -> Self {
        MotorVendor::Simulated {
            free_speed_cps: DEFAULT_FREE_SPEED_CPS,
        }
    }
}

/// Build a controller for one motor
///
/// # Arguments
/// * `period` - control loop period in seconds
pub fn build_motor(
    vendor: &MotorVendor,
    id: u8,
    role: MotorRole,
    geometry: EncoderGeometry,
    period: f64,
) -> BoxedMotor {
    match vendor {
        MotorVendor::Simulated { free_speed_cps } => {
            info!("Motor {}: simulated {:?} motor", id, role);
            let backend = SimBackend::new(id)
                .with_period(period)
                .with_free_speed(*free_speed_cps);
            Box::new(SmartMotor::new(backend, role, geometry).with_period(period))
        }
    }
}
