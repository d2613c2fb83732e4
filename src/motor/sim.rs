// Simulated motor controller
//
// First-order model advanced one control period per command. Used by tests
// and by the runtime when no hardware is configured.

use tracing::debug;

use super::backend::{
    BackendResult, EncoderSample, MotorBackend, MotorCommand, MotorSettings, StickyFaults,
};
use super::controller::IdleMode;
use super::error::BackendError;

/// Counts/second at full output
pub const DEFAULT_FREE_SPEED_CPS: f64 = 4000.0;
pub const DEFAULT_NOMINAL_VOLTS: f64 = 12.0;
/// Simulation step per command, seconds
pub const DEFAULT_PERIOD: f64 = 0.02;

/// Current drawn at full effort with the shaft stalled, amps
pub const DEFAULT_STALL_CURRENT_A: f64 = 105.0;

/// Fraction of velocity kept per idle step while coasting
const COAST_DECAY: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct SimBackend {
    id: u8,
    free_speed_cps: f64,
    nominal_volts: f64,
    period: f64,
    stall_current: f64,

    sample: EncoderSample,
    effort: f64,
    current: f64,
    settings: MotorSettings,
    flash: Option<MotorSettings>,
    flash_writes: usize,
    last_command: Option<MotorCommand>,
    faults: StickyFaults,

    connected: bool,
    failures_pending: usize,
}

impl SimBackend {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            free_speed_cps: DEFAULT_FREE_SPEED_CPS,
            nominal_volts: DEFAULT_NOMINAL_VOLTS,
            period: DEFAULT_PERIOD,
            stall_current: DEFAULT_STALL_CURRENT_A,
            sample: EncoderSample::default(),
            effort: 0.0,
            current: 0.0,
            settings: MotorSettings::default(),
            flash: None,
            flash_writes: 0,
            last_command: None,
            faults: StickyFaults::empty(),
            connected: true,
            failures_pending: 0,
        }
    }

    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    pub fn with_free_speed(mut self, counts_per_second: f64) -> Self {
        self.free_speed_cps = counts_per_second;
        self
    }

    // === Fault injection ===

    /// Every call times out until `reconnect`
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// The next `count` calls time out
    pub fn fail_next(&mut self, count: usize) {
        self.failures_pending = count;
    }

    pub fn latch_faults(&mut self, faults: StickyFaults) {
        self.faults |= faults;
    }

    // === Inspection ===

    /// Normalised effort actually applied on the last command, after ramp and current limit
    pub fn effort(&self) -> f64 {
        self.effort
    }

    /// Estimated phase current on the last command, amps
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.last_command
    }

    /// Settings currently in volatile registers
    pub fn applied_settings(&self) -> &MotorSettings {
        &self.settings
    }

    /// Settings in non-volatile storage
    pub fn flash(&self) -> Option<&MotorSettings> {
        self.flash.as_ref()
    }

    pub fn flash_writes(&self) -> usize {
        self.flash_writes
    }

    pub fn set_raw_position(&mut self, counts: f64) {
        self.sample.position = counts;
    }

    pub fn set_raw_velocity(&mut self, counts_per_second: f64) {
        self.sample.velocity = counts_per_second;
    }

    fn check_link(&mut self) -> BackendResult<()> {
        if !self.connected {
            return Err(BackendError::Timeout { id: self.id });
        }
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(BackendError::Timeout { id: self.id });
        }
        Ok(())
    }

    fn requested_effort(&self, command: MotorCommand) -> f64 {
        let effort = match command {
            MotorCommand::DutyCycle(duty) => duty,
            MotorCommand::Voltage(volts) => volts / self.nominal_volts,
        };
        effort.clamp(-1.0, 1.0)
    }

    /// Shape a non-zero request by the ramp rate and the current limit
    ///
    /// Current scales with the effort left over after back-EMF, so the limit
    /// bounds how far the effort may lead the shaft speed.
    fn limit_effort(&self, requested: f64) -> f64 {
        let mut effort = requested;

        if self.settings.ramp_rate > 0.0 {
            let max_step = self.period / self.settings.ramp_rate;
            effort = self.effort + (effort - self.effort).clamp(-max_step, max_step);
        }

        if let Some(limit) = self.settings.current_limit {
            let back_emf = self.sample.velocity / self.free_speed_cps;
            let headroom = (limit / self.stall_current).min(2.0);
            effort = back_emf + (effort - back_emf).clamp(-headroom, headroom);
        }
        effort.clamp(-1.0, 1.0)
    }
}

impl MotorBackend for SimBackend {
    fn id(&self) -> u8 {
        self.id
    }

    fn restore_factory_defaults(&mut self) -> BackendResult<()> {
        self.check_link()?;
        self.settings = MotorSettings::default();
        Ok(())
    }

    fn apply(&mut self, settings: &MotorSettings) -> BackendResult<()> {
        self.check_link()?;
        self.settings = settings.clone();
        Ok(())
    }

    fn persist(&mut self, settings: &MotorSettings) -> BackendResult<()> {
        self.check_link()?;
        debug!("Sim motor {}: writing flash", self.id);
        self.flash = Some(settings.clone());
        self.flash_writes += 1;
        Ok(())
    }

    fn command(&mut self, command: MotorCommand) -> BackendResult<()> {
        self.check_link()?;
        let requested = self.requested_effort(command);

        // zero output releases the bridge at once, idle mode takes over
        let effort = if requested != 0.0 {
            self.limit_effort(requested)
        } else {
            0.0
        };
        self.current = if effort != 0.0 {
            (effort - self.sample.velocity / self.free_speed_cps).abs() * self.stall_current
        } else {
            0.0
        };
        self.effort = effort;

        self.sample.velocity = if effort != 0.0 {
            effort * self.free_speed_cps
        } else {
            match self.settings.idle_mode {
                IdleMode::Brake => 0.0,
                IdleMode::Coast => self.sample.velocity * COAST_DECAY,
            }
        };
        self.sample.position += self.sample.velocity * self.period;
        self.last_command = Some(command);
        Ok(())
    }

    fn read_encoder(&mut self) -> BackendResult<EncoderSample> {
        self.check_link()?;
        Ok(self.sample)
    }

    fn sticky_faults(&mut self) -> BackendResult<StickyFaults> {
        self.check_link()?;
        Ok(self.faults)
    }

    fn clear_sticky_faults(&mut self) -> BackendResult<()> {
        self.check_link()?;
        self.faults = StickyFaults::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_advances_model() {
        let mut sim = SimBackend::new(1);
        sim.command(MotorCommand::DutyCycle(0.5)).unwrap();
        let sample = sim.read_encoder().unwrap();
        assert_eq!(sample.velocity, 2000.0);
        assert!((sample.position - 40.0).abs() < 1e-9);

        // 6V of 12V nominal is the same effort
        sim.command(MotorCommand::Voltage(6.0)).unwrap();
        assert_eq!(sim.read_encoder().unwrap().velocity, 2000.0);
    }

    #[test]
    fn test_idle_mode_on_zero_output() {
        let mut sim = SimBackend::new(1);
        sim.command(MotorCommand::DutyCycle(1.0)).unwrap();
        sim.command(MotorCommand::DutyCycle(0.0)).unwrap();
        assert!((sim.read_encoder().unwrap().velocity - 3600.0).abs() < 1e-9);

        let settings = MotorSettings {
            idle_mode: IdleMode::Brake,
            ..MotorSettings::default()
        };
        sim.apply(&settings).unwrap();
        sim.command(MotorCommand::DutyCycle(0.0)).unwrap();
        assert_eq!(sim.read_encoder().unwrap().velocity, 0.0);
    }

    #[test]
    fn test_ramp_rate_limits_slew() {
        let mut sim = SimBackend::new(1).with_period(0.02);
        let settings = MotorSettings {
            ramp_rate: 0.1,
            ..MotorSettings::default()
        };
        sim.apply(&settings).unwrap();

        // 0.1 s from zero to full at 20 ms per step: five commands
        for _ in 0..4 {
            sim.command(MotorCommand::DutyCycle(1.0)).unwrap();
        }
        assert!((sim.effort() - 0.8).abs() < 1e-9);
        assert!(sim.read_encoder().unwrap().velocity < 0.85 * DEFAULT_FREE_SPEED_CPS);

        sim.command(MotorCommand::DutyCycle(1.0)).unwrap();
        let velocity = sim.read_encoder().unwrap().velocity;
        assert!((velocity - DEFAULT_FREE_SPEED_CPS).abs() < 1e-6);

        // stopping is not ramped
        sim.command(MotorCommand::DutyCycle(0.0)).unwrap();
        assert_eq!(sim.effort(), 0.0);
    }

    #[test]
    fn test_current_limit_caps_effort_from_standstill() {
        let mut sim = SimBackend::new(1);
        let settings = MotorSettings {
            current_limit: Some(21.0),
            ..MotorSettings::default()
        };
        sim.apply(&settings).unwrap();

        sim.command(MotorCommand::DutyCycle(1.0)).unwrap();
        assert!((sim.effort() - 0.2).abs() < 1e-9);
        assert!((sim.current() - 21.0).abs() < 1e-9);
        assert!((sim.read_encoder().unwrap().velocity - 800.0).abs() < 1e-9);

        // back-EMF frees headroom as the shaft spins up
        sim.command(MotorCommand::DutyCycle(1.0)).unwrap();
        assert!((sim.effort() - 0.4).abs() < 1e-9);

        // without a limit the full request goes through
        let mut free = SimBackend::new(2);
        free.command(MotorCommand::DutyCycle(1.0)).unwrap();
        assert_eq!(free.effort(), 1.0);
        assert!((free.current() - DEFAULT_STALL_CURRENT_A).abs() < 1e-9);
    }

    #[test]
    fn test_fail_next_then_recover() {
        let mut sim = SimBackend::new(3);
        sim.fail_next(2);
        assert_eq!(sim.read_encoder(), Err(BackendError::Timeout { id: 3 }));
        assert!(sim.read_encoder().is_err());
        assert!(sim.read_encoder().is_ok());

        sim.disconnect();
        assert!(sim.clear_sticky_faults().is_err());
        sim.reconnect();
        assert!(sim.clear_sticky_faults().is_ok());
    }

    #[test]
    fn test_sticky_faults_latch_until_cleared() {
        let mut sim = SimBackend::new(1);
        sim.latch_faults(StickyFaults::BROWNOUT);
        sim.latch_faults(StickyFaults::OVER_CURRENT);
        assert_eq!(
            sim.sticky_faults().unwrap(),
            StickyFaults::BROWNOUT | StickyFaults::OVER_CURRENT
        );
        sim.clear_sticky_faults().unwrap();
        assert!(sim.sticky_faults().unwrap().is_empty());
    }
}
