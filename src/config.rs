// Timeouts, topics, drivetrain configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::motor::{EncoderGeometry, IdleMode, MotorRole, MotorVendor, PidfConfig};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;
// Highest accepted loop frequency
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MODULES: &str = "swerve/cmd/modules"; // module setpoints
pub const TOPIC_STATE_MODULES: &str = "swerve/state/modules"; // encoder telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

/// Steering loop wraps over one revolution
pub const ANGLE_WRAP_MIN_DEG: f64 = 0.0;
pub const ANGLE_WRAP_MAX_DEG: f64 = 360.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One motor of a swerve module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    pub id: u8,
    #[serde(default)]
    pub vendor: MotorVendor,
    pub gear_ratio: f64,
    pub counts_per_revolution: f64,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub idle_mode: IdleMode,
    #[serde(default)]
    pub pidf: PidfConfig,
    #[serde(default)]
    pub current_limit: Option<f64>,
    #[serde(default)]
    pub ramp_rate: f64,
    #[serde(default)]
    pub voltage_compensation: Option<f64>,
}

impl MotorConfig {
    pub fn geometry(&self, wheel_diameter_m: f64) -> EncoderGeometry {
        EncoderGeometry {
            counts_per_revolution: self.counts_per_revolution,
            gear_ratio: self.gear_ratio,
            wheel_diameter_m,
        }
    }
}

/// One swerve module: a drive motor and an angle motor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub wheel_diameter_m: f64,
    /// Drive feedforward in volts per m/s
    #[serde(default)]
    pub drive_kv: f64,
    /// Module angle at power-up, degrees
    #[serde(default)]
    pub initial_angle_deg: f64,
    pub drive: MotorConfig,
    pub angle: MotorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivetrainConfig {
    #[serde(default = "default_loop_hz")]
    pub loop_hz: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    pub modules: Vec<ModuleConfig>,
}

fn default_loop_hz() -> u64 {
    LOOP_HZ
}

fn default_command_timeout_ms() -> u64 {
    CMD_TIMEOUT.as_millis() as u64
}

impl DrivetrainConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading drivetrain configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Four simulated MK4-style modules
    pub fn simulated() -> Self {
        let names = ["front_left", "front_right", "back_left", "back_right"];
        let modules = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let drive_id = (i * 2 + 1) as u8;
                ModuleConfig {
                    name: name.to_string(),
                    wheel_diameter_m: 0.1016,
                    drive_kv: 2.3,
                    initial_angle_deg: 0.0,
                    drive: MotorConfig {
                        id: drive_id,
                        vendor: MotorVendor::default(),
                        gear_ratio: 6.75,
                        counts_per_revolution: 42.0,
                        inverted: false,
                        idle_mode: IdleMode::Brake,
                        pidf: PidfConfig::new(0.2, 0.0, 0.0),
                        current_limit: Some(40.0),
                        ramp_rate: 0.25,
                        voltage_compensation: Some(12.0),
                    },
                    angle: MotorConfig {
                        id: drive_id + 1,
                        vendor: MotorVendor::default(),
                        gear_ratio: 12.8,
                        counts_per_revolution: 42.0,
                        inverted: false,
                        idle_mode: IdleMode::Brake,
                        pidf: PidfConfig::new(0.1, 0.0, 0.001),
                        current_limit: Some(20.0),
                        ramp_rate: 0.0,
                        voltage_compensation: Some(12.0),
                    },
                }
            })
            .collect();

        Self {
            loop_hz: LOOP_HZ,
            command_timeout_ms: default_command_timeout_ms(),
            modules,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_hz == 0 || self.loop_hz > MAX_LOOP_HZ {
            return Err(ConfigError::Invalid(format!(
                "loop_hz must be in 1..={}, got {}",
                MAX_LOOP_HZ, self.loop_hz
            )));
        }
        if self.modules.is_empty() {
            return Err(ConfigError::Invalid("no modules configured".to_string()));
        }

        let mut ids = Vec::new();
        for module in &self.modules {
            for (motor, role) in [(&module.drive, MotorRole::Drive), (&module.angle, MotorRole::Steer)] {
                if ids.contains(&motor.id) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate motor id {} in module {}",
                        motor.id, module.name
                    )));
                }
                ids.push(motor.id);

                motor
                    .geometry(module.wheel_diameter_m)
                    .validate(role)
                    .and_then(|_| motor.pidf.validate())
                    .map_err(|e| ConfigError::Invalid(format!("module {}: {}", module.name, e)))?;
            }
        }
        Ok(())
    }

    /// Control loop period in seconds
    pub fn period(&self) -> f64 {
        1.0 / self.loop_hz as f64
    }

    /// Control loop period as a tick interval, matching `period()`
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.period())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
