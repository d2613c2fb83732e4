// Define message types for the runtime

use serde::{Deserialize, Serialize};

/// Setpoint for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCommand {
    pub module: String,
    pub speed_mps: f64,
    pub angle_deg: f64,
}

// Command from the drivetrain controller -> runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub modules: Vec<ModuleCommand>,
}

impl DriveCommand {
    pub fn for_module(&self, name: &str) -> Option<&ModuleCommand> {
        self.modules.iter().find(|c| c.module == name)
    }
}

/// Encoder telemetry for one module, read once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub module: String,
    pub speed_mps: f64,
    pub distance_m: f64,
    pub angle_deg: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// At least one module missed its command this cycle
    Degraded,
}
