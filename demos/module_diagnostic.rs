// Module diagnostic: configure every module and exercise it for a few cycles
//
// Runs entirely against the configured backends; with the default
// configuration nothing leaves the process.
//
// Usage: cargo run --example module_diagnostic -- [config.json]

use swerve_motor::config::DrivetrainConfig;
use swerve_motor::module::SwerveModule;

const TEST_SPEED_MPS: f64 = 0.5;
const TEST_ANGLE_DEG: f64 = 90.0;
const TEST_CYCLES: usize = 25;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DrivetrainConfig::load(path)?,
        None => DrivetrainConfig::simulated(),
    };
    let period = config.period();

    println!("Step 1: Configuring {} modules...", config.modules.len());
    let mut modules = Vec::new();
    for module_config in &config.modules {
        match SwerveModule::new(module_config, period) {
            Ok(module) => {
                println!("  ✓ {} configured and persisted", module_config.name);
                modules.push(module);
            }
            Err(e) => {
                println!("  ✗ {} failed: {}", module_config.name, e);
                return Err(e.into());
            }
        }
    }
    println!();

    println!(
        "Step 2: Driving {} m/s at {}° for {} cycles...",
        TEST_SPEED_MPS, TEST_ANGLE_DEG, TEST_CYCLES
    );
    for _ in 0..TEST_CYCLES {
        for module in &mut modules {
            module.set_desired_state(TEST_SPEED_MPS, TEST_ANGLE_DEG)?;
        }
    }

    for module in &mut modules {
        let state = module.state()?;
        println!(
            "  {:<12} speed={:>6.3} m/s  distance={:>6.3} m  angle={:>7.2}°",
            state.module, state.speed_mps, state.distance_m, state.angle_deg
        );
        for (label, motor) in [("drive", module.drive_motor()), ("angle", module.angle_motor())] {
            println!(
                "    {} motor {}: applied={:.3} state={:?}",
                label,
                motor.id(),
                motor.applied_output(),
                motor.config_state()
            );
        }
    }
    println!();

    println!("Step 3: Stopping...");
    for module in &mut modules {
        module.stop()?;
    }
    println!("  ✓ Done");
    Ok(())
}
