// Fixed-rate drive loop with watchdog
// Note: a watchdog stops the modules if commands stop arriving, so a crashed
// drivetrain controller can't leave the robot driving on its last setpoint.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{DrivetrainConfig, TOPIC_CMD_MODULES, TOPIC_HEALTH, TOPIC_STATE_MODULES};
use crate::messages::{DriveCommand, ModuleState, RuntimeHealth};
use crate::module::SwerveModule;
use crate::motor::MotorError;

pub struct Runtime {
    modules: Vec<SwerveModule>,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    cmd_timeout: Duration,
    health: RuntimeHealth,
}

impl Runtime {
    /// Build and configure every module; any configuration error aborts
    pub fn new(config: &DrivetrainConfig) -> Result<Self, MotorError> {
        let period = config.period();
        let modules = config
            .modules
            .iter()
            .map(|m| SwerveModule::new(m, period))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::with_modules(modules, config.command_timeout()))
    }

    pub fn with_modules(modules: Vec<SwerveModule>, cmd_timeout: Duration) -> Self {
        Self {
            modules,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            cmd_timeout,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Run one control cycle
    ///
    /// A module that fails is skipped for this cycle; the others still get
    /// their commands.
    pub fn step(&mut self) {
        let cmd_age = self.cmd_received_at.elapsed();
        let active = match self.latest_cmd {
            Some(ref cmd) if cmd_age <= self.cmd_timeout => Some(cmd),
            _ => None,
        };

        let mut failed = false;
        match active {
            Some(cmd) => {
                for module in &mut self.modules {
                    // modules without a setpoint in this command hold still
                    let result = match cmd.for_module(module.name()) {
                        Some(c) => module.set_desired_state(c.speed_mps, c.angle_deg),
                        None => module.stop(),
                    };
                    if let Err(e) = result {
                        warn!("Module {} skipped this cycle: {}", module.name(), e);
                        failed = true;
                    }
                }
            }
            None => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale && self.latest_cmd.is_some() {
                    warn!("Command stale ({:?} old), stopping modules", cmd_age);
                }
                for module in &mut self.modules {
                    if let Err(e) = module.stop() {
                        warn!("Failed to stop module {}: {}", module.name(), e);
                        failed = true;
                    }
                }
            }
        }

        self.health = match (active.is_some(), failed) {
            (_, true) => RuntimeHealth::Degraded,
            (true, false) => RuntimeHealth::Ok,
            (false, false) => RuntimeHealth::CmdStale,
        };
    }

    /// Encoder telemetry for every module that answered
    pub fn module_states(&mut self) -> Vec<ModuleState> {
        self.modules
            .iter_mut()
            .filter_map(|m| match m.state() {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("No telemetry from module {}: {}", m.name(), e);
                    None
                }
            })
            .collect()
    }
}

pub async fn run(config: DrivetrainConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MODULES).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_MODULES).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(config.tick_period());

    info!(
        "Runtime started: {} modules, {}Hz loop, {}ms watchdog timeout",
        config.modules.len(),
        config.loop_hz,
        config.command_timeout_ms
    );
    info!("Subscribed to: {}", TOPIC_CMD_MODULES);
    info!("Publishing to: {}, {}", TOPIC_STATE_MODULES, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Drive every module (includes watchdog logic)
        runtime.step();

        // 3. Publish telemetry
        let states_json = serde_json::to_string(&runtime.module_states())?;
        pub_state.put(states_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrivetrainConfig;
    use crate::messages::ModuleCommand;
    use crate::motor::backend::{BackendResult, EncoderSample, MotorCommand, MotorSettings};
    use crate::motor::{
        BackendError, BoxedMotor, MotorBackend, MotorRole, SimBackend, SmartMotor, StickyFaults,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sim backend whose drive commands can be cut from outside
    struct FlakyBackend {
        inner: SimBackend,
        offline: Arc<AtomicBool>,
    }

    impl MotorBackend for FlakyBackend {
        fn id(&self) -> u8 {
            self.inner.id()
        }
        fn restore_factory_defaults(&mut self) -> BackendResult<()> {
            self.inner.restore_factory_defaults()
        }
        fn apply(&mut self, settings: &MotorSettings) -> BackendResult<()> {
            self.inner.apply(settings)
        }
        fn persist(&mut self, settings: &MotorSettings) -> BackendResult<()> {
            self.inner.persist(settings)
        }
        fn command(&mut self, command: MotorCommand) -> BackendResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(BackendError::Timeout { id: self.id() });
            }
            self.inner.command(command)
        }
        fn read_encoder(&mut self) -> BackendResult<EncoderSample> {
            self.inner.read_encoder()
        }
        fn sticky_faults(&mut self) -> BackendResult<StickyFaults> {
            self.inner.sticky_faults()
        }
        fn clear_sticky_faults(&mut self) -> BackendResult<()> {
            self.inner.clear_sticky_faults()
        }
    }

    fn command(speed_mps: f64, angle_deg: f64) -> DriveCommand {
        DriveCommand {
            modules: ["front_left", "front_right", "back_left", "back_right"]
                .iter()
                .map(|name| ModuleCommand {
                    module: name.to_string(),
                    speed_mps,
                    angle_deg,
                })
                .collect(),
        }
    }

    #[test]
    fn test_stale_until_first_command() {
        let mut runtime = Runtime::new(&DrivetrainConfig::simulated()).unwrap();
        runtime.step();
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);

        runtime.on_command(command(0.5, 0.0));
        runtime.step();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let states = runtime.module_states();
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(|s| s.speed_mps > 0.0));
    }

    #[test]
    fn test_watchdog_stops_modules() {
        let config = DrivetrainConfig::simulated();
        let modules = config
            .modules
            .iter()
            .map(|m| SwerveModule::new(m, config.period()).unwrap())
            .collect();
        let mut runtime = Runtime::with_modules(modules, Duration::ZERO);

        runtime.on_command(command(1.0, 45.0));
        std::thread::sleep(Duration::from_millis(2));
        runtime.step();

        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert!(runtime.module_states().iter().all(|s| s.speed_mps == 0.0));
    }

    #[test]
    fn test_missing_module_holds_still() {
        let mut runtime = Runtime::new(&DrivetrainConfig::simulated()).unwrap();
        let mut cmd = command(1.0, 0.0);
        cmd.modules.retain(|c| c.module != "back_right");
        runtime.on_command(cmd);
        runtime.step();

        let states = runtime.module_states();
        let back_right = states.iter().find(|s| s.module == "back_right").unwrap();
        assert_eq!(back_right.speed_mps, 0.0);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_failed_module_is_skipped() {
        let config = DrivetrainConfig::simulated();
        let offline = Arc::new(AtomicBool::new(false));

        let mut modules = Vec::new();
        for (i, m) in config.modules.iter().enumerate() {
            if i == 0 {
                let drive: BoxedMotor = Box::new(SmartMotor::new(
                    FlakyBackend {
                        inner: SimBackend::new(m.drive.id),
                        offline: offline.clone(),
                    },
                    MotorRole::Drive,
                    m.drive.geometry(m.wheel_diameter_m),
                ));
                let angle: BoxedMotor = Box::new(SmartMotor::new(
                    SimBackend::new(m.angle.id),
                    MotorRole::Steer,
                    m.angle.geometry(m.wheel_diameter_m),
                ));
                modules.push(SwerveModule::from_motors(m, drive, angle).unwrap());
            } else {
                modules.push(SwerveModule::new(m, config.period()).unwrap());
            }
        }
        let mut runtime = Runtime::with_modules(modules, Duration::from_secs(10));

        offline.store(true, Ordering::SeqCst);
        runtime.on_command(command(0.5, 0.0));
        runtime.step();
        assert_eq!(runtime.health(), RuntimeHealth::Degraded);

        // the other modules still got their setpoints
        let states = runtime.module_states();
        assert_eq!(states[0].speed_mps, 0.0);
        assert!(states[1..].iter().all(|s| s.speed_mps > 0.0));

        offline.store(false, Ordering::SeqCst);
        runtime.step();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }
}
