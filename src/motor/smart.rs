// Generic motor controller over a register-level backend
//
// Runs the PIDF loop, encoder conversion and configuration bookkeeping in
// software so each hardware family only implements MotorBackend.

use tracing::{debug, info, warn};

use super::backend::{MotorBackend, MotorCommand, MotorSettings, StickyFaults};
use super::controller::{ConfigState, IdleMode, Inversion, MotorController, MotorRole};
use super::encoder::{EncoderConversion, EncoderGeometry, MeasurementFrame};
use super::error::{MotorError, Result};
use super::pidf::{PidWrapping, PidfConfig, PidfController, loop_error};

/// Default closed-loop period in seconds (50 Hz)
pub const DEFAULT_LOOP_PERIOD: f64 = 0.02;

/// Motor controller bound to one role for its whole life
pub struct SmartMotor<B: MotorBackend> {
    backend: B,
    role: MotorRole,
    geometry: EncoderGeometry,
    period: f64,

    settings: MotorSettings,
    state: ConfigState,
    frame: MeasurementFrame,
    closed_loop: Option<PidfController>,
    applied_output: f64,
}

impl<B: MotorBackend> SmartMotor<B> {
    pub fn new(backend: B, role: MotorRole, geometry: EncoderGeometry) -> Self {
        Self {
            backend,
            role,
            geometry,
            period: DEFAULT_LOOP_PERIOD,
            settings: MotorSettings::default(),
            state: ConfigState::Unconfigured,
            frame: MeasurementFrame::default(),
            closed_loop: None,
            applied_output: 0.0,
        }
    }

    /// Control loop period in seconds, used for the integral and derivative terms
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn check_role(&self, requested: MotorRole) -> Result<()> {
        if requested != self.role {
            return Err(MotorError::RoleMismatch {
                bound: self.role,
                requested,
            });
        }
        Ok(())
    }

    /// Write a modified copy of the settings and keep it only if the backend
    /// accepted it
    fn stage(&mut self, change: impl FnOnce(&mut MotorSettings)) -> Result<()> {
        let mut next = self.settings.clone();
        change(&mut next);
        self.backend.apply(&next)?;
        self.settings = next;
        self.state = ConfigState::Configured;
        Ok(())
    }

    fn send(&mut self, command: MotorCommand) -> Result<()> {
        self.backend.command(command)?;
        self.applied_output = command.value();
        Ok(())
    }

    fn sign(&self) -> f64 {
        self.settings.inversion.sign()
    }
}

fn require_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(MotorError::InvalidInput(format!(
            "{} must be finite, got {}",
            name, value
        )));
    }
    Ok(())
}

impl<B: MotorBackend> MotorController for SmartMotor<B> {
    fn role(&self) -> MotorRole {
        self.role
    }

    fn id(&self) -> u8 {
        self.backend.id()
    }

    fn factory_defaults(&mut self) -> Result<()> {
        info!("Motor {}: restoring factory defaults", self.id());
        self.backend.restore_factory_defaults()?;
        self.settings = MotorSettings::default();
        self.state = ConfigState::Configured;
        self.frame.clear();
        self.closed_loop = None;
        self.applied_output = 0.0;
        Ok(())
    }

    fn clear_sticky_faults(&mut self) -> Result<()> {
        self.backend.clear_sticky_faults()?;
        Ok(())
    }

    fn configure_integrated_encoder(&mut self, role: MotorRole) -> Result<()> {
        self.check_role(role)?;
        let conversion = EncoderConversion::for_role(role, &self.geometry)?;
        debug!(
            "Motor {}: encoder factor {} per count",
            self.id(),
            conversion.position_factor
        );
        self.stage(|s| s.conversion = conversion)?;
        self.frame.clear();
        Ok(())
    }

    fn configure_pidf(&mut self, role: MotorRole, config: &PidfConfig) -> Result<()> {
        self.check_role(role)?;
        config.validate()?;
        debug!("Motor {}: PIDF {:?}", self.id(), config);
        self.stage(|s| s.pidf = Some(*config))?;
        self.closed_loop = Some(PidfController::new(*config, self.period));
        Ok(())
    }

    fn configure_pid_wrapping(&mut self, min_input: f64, max_input: f64) -> Result<()> {
        // only the steering position loop wraps
        self.check_role(MotorRole::Steer)?;
        let wrapping = PidWrapping::new(min_input, max_input)?;
        self.stage(|s| s.wrapping = Some(wrapping))
    }

    fn set_motor_brake(&mut self, mode: IdleMode) -> Result<()> {
        self.stage(|s| s.idle_mode = mode)
    }

    fn set_inverted(&mut self, inversion: Inversion) -> Result<()> {
        let previous = self.settings.inversion;
        self.stage(|s| s.inversion = inversion)?;
        if previous != inversion {
            // calibrated position keeps its magnitude, feedback sign flips
            self.frame.negate();
        }
        Ok(())
    }

    fn set_voltage_compensation(&mut self, nominal_volts: f64) -> Result<()> {
        if !(nominal_volts > 0.0) || !nominal_volts.is_finite() {
            return Err(MotorError::InvalidConfiguration(format!(
                "nominal voltage must be > 0, got {}",
                nominal_volts
            )));
        }
        self.stage(|s| s.voltage_compensation = Some(nominal_volts))
    }

    fn set_current_limit(&mut self, amps: f64) -> Result<()> {
        if !(amps > 0.0) || !amps.is_finite() {
            return Err(MotorError::InvalidConfiguration(format!(
                "current limit must be > 0, got {}",
                amps
            )));
        }
        self.stage(|s| s.current_limit = Some(amps))
    }

    fn set_loop_ramp_rate(&mut self, seconds: f64) -> Result<()> {
        if !(seconds >= 0.0) || !seconds.is_finite() {
            return Err(MotorError::InvalidConfiguration(format!(
                "ramp rate must be >= 0, got {}",
                seconds
            )));
        }
        self.stage(|s| s.ramp_rate = seconds)
    }

    fn burn_flash(&mut self) -> Result<()> {
        if self.state == ConfigState::Persisted {
            debug!("Motor {}: flash already up to date", self.id());
            return Ok(());
        }
        info!("Motor {}: burning configuration to flash", self.id());
        self.backend.persist(&self.settings)?;
        self.state = ConfigState::Persisted;
        Ok(())
    }

    fn set(&mut self, percent_output: f64) -> Result<()> {
        let percent = if percent_output.is_finite() {
            percent_output.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        if percent != percent_output {
            debug!(
                "Motor {}: clamped output {} to {}",
                self.id(),
                percent_output,
                percent
            );
        }

        let command = match self.settings.voltage_compensation {
            Some(nominal) => MotorCommand::Voltage(percent * nominal * self.sign()),
            None => MotorCommand::DutyCycle(percent * self.sign()),
        };
        self.send(command)?;

        // leaving closed loop, drop stale integrator state
        if let Some(closed_loop) = self.closed_loop.as_mut() {
            closed_loop.reset();
        }
        Ok(())
    }

    fn set_reference(&mut self, role: MotorRole, setpoint: f64, feedforward: f64) -> Result<()> {
        self.check_role(role)?;
        require_finite("setpoint", setpoint)?;
        require_finite("feedforward", feedforward)?;
        let gains = self
            .settings
            .pidf
            .ok_or(MotorError::NotConfigured("no PIDF gains installed"))?;

        let (measured, wrapping) = match role {
            MotorRole::Drive => (self.get_velocity()?, None),
            MotorRole::Steer => (self.get_position()?, self.settings.wrapping),
        };
        let error = loop_error(setpoint, measured, wrapping.as_ref());

        // step a copy; loop state only advances once the command lands
        let mut next = self
            .closed_loop
            .clone()
            .unwrap_or_else(|| PidfController::new(gains, self.period));
        let output = gains.clamp_output(next.calculate(setpoint, error) + feedforward);

        let command = MotorCommand::Voltage(output * self.sign());
        self.send(command)?;
        self.closed_loop = Some(next);
        Ok(())
    }

    fn get_velocity(&mut self) -> Result<f64> {
        let sample = self.backend.read_encoder()?;
        Ok(sample.velocity * self.sign() * self.settings.conversion.velocity_factor)
    }

    fn get_position(&mut self) -> Result<f64> {
        let sample = self.backend.read_encoder()?;
        let raw = sample.position * self.sign();
        Ok(self
            .frame
            .position(raw, self.settings.conversion.position_factor))
    }

    fn set_position(&mut self, position: f64) -> Result<()> {
        require_finite("position", position)?;
        let sample = self.backend.read_encoder()?;
        self.frame.rebase(sample.position * self.sign(), position);
        debug!("Motor {}: position set to {}", self.id(), position);
        Ok(())
    }

    fn applied_output(&self) -> f64 {
        self.applied_output
    }

    fn sticky_faults(&mut self) -> Result<StickyFaults> {
        Ok(self.backend.sticky_faults()?)
    }

    fn config_state(&self) -> ConfigState {
        self.state
    }

    fn settings(&self) -> &MotorSettings {
        &self.settings
    }
}

impl<B: MotorBackend> Drop for SmartMotor<B> {
    fn drop(&mut self) {
        // Try to leave the motor idle when the controller goes away
        if let Err(e) = self.backend.command(MotorCommand::DutyCycle(0.0)) {
            warn!("Failed to stop motor {} on drop: {}", self.backend.id(), e);
        }
    }
}
