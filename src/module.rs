// Swerve module: one drive motor and one angle motor
//
// Runs the configuration sequence at startup and issues one closed-loop
// command per motor per control cycle.

use tracing::{debug, info};

use crate::config::{ANGLE_WRAP_MAX_DEG, ANGLE_WRAP_MIN_DEG, ModuleConfig, MotorConfig};
use crate::messages::ModuleState;
use crate::motor::{BoxedMotor, MotorController, MotorError, MotorRole, build_motor};

pub struct SwerveModule {
    name: String,
    drive: BoxedMotor,
    angle: BoxedMotor,
    drive_kv: f64,
}

impl SwerveModule {
    /// Build both motors from the configuration and configure them
    ///
    /// `period` is the control loop period in seconds.
    pub fn new(config: &ModuleConfig, period: f64) -> Result<Self, MotorError> {
        let drive = build_motor(
            &config.drive.vendor,
            config.drive.id,
            MotorRole::Drive,
            config.drive.geometry(config.wheel_diameter_m),
            period,
        );
        let angle = build_motor(
            &config.angle.vendor,
            config.angle.id,
            MotorRole::Steer,
            config.angle.geometry(config.wheel_diameter_m),
            period,
        );
        Self::from_motors(config, drive, angle)
    }

    /// Configure already-built motors
    pub fn from_motors(
        config: &ModuleConfig,
        mut drive: BoxedMotor,
        mut angle: BoxedMotor,
    ) -> Result<Self, MotorError> {
        info!("Configuring module {}", config.name);
        configure_motor(drive.as_mut(), &config.drive)?;
        configure_motor(angle.as_mut(), &config.angle)?;
        angle.set_position(config.initial_angle_deg)?;

        Ok(Self {
            name: config.name.clone(),
            drive,
            angle,
            drive_kv: config.drive_kv,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Track a wheel speed (m/s) and module angle (degrees)
    ///
    /// Both motors are commanded even if the first one fails; the first error
    /// is returned.
    pub fn set_desired_state(&mut self, speed_mps: f64, angle_deg: f64) -> Result<(), MotorError> {
        let drive = self
            .drive
            .set_reference(MotorRole::Drive, speed_mps, self.drive_kv * speed_mps);
        let angle = self.angle.set_reference(MotorRole::Steer, angle_deg, 0.0);
        drive.and(angle)
    }

    /// Zero output on both motors
    pub fn stop(&mut self) -> Result<(), MotorError> {
        let drive = self.drive.set(0.0);
        let angle = self.angle.set(0.0);
        drive.and(angle)
    }

    pub fn state(&mut self) -> Result<ModuleState, MotorError> {
        Ok(ModuleState {
            module: self.name.clone(),
            speed_mps: self.drive.get_velocity()?,
            distance_m: self.drive.get_position()?,
            angle_deg: self.angle.get_position()?,
        })
    }

    pub fn drive_motor(&self) -> &dyn MotorController {
        self.drive.as_ref()
    }

    pub fn angle_motor(&self) -> &dyn MotorController {
        self.angle.as_ref()
    }
}

/// Fresh-setup sequence, ending with a flash write
pub fn configure_motor(
    motor: &mut (dyn MotorController + Send),
    config: &MotorConfig,
) -> Result<(), MotorError> {
    let role = motor.role();
    debug!("Motor {}: configuring as {:?}", motor.id(), role);

    motor.factory_defaults()?;
    motor.clear_sticky_faults()?;
    motor.configure_integrated_encoder(role)?;
    motor.configure_pidf(role, &config.pidf)?;
    if role == MotorRole::Steer {
        motor.configure_pid_wrapping(ANGLE_WRAP_MIN_DEG, ANGLE_WRAP_MAX_DEG)?;
    }
    motor.set_motor_brake(config.idle_mode)?;
    motor.set_inverted(config.inverted.into())?;
    if let Some(amps) = config.current_limit {
        motor.set_current_limit(amps)?;
    }
    if let Some(volts) = config.voltage_compensation {
        motor.set_voltage_compensation(volts)?;
    }
    motor.set_loop_ramp_rate(config.ramp_rate)?;
    motor.burn_flash()
}
