use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_motor::config::DrivetrainConfig;

/// Swerve drivetrain motor runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drivetrain configuration (JSON). Uses four simulated modules when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match args.config {
        Some(path) => match DrivetrainConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(2);
            }
        },
        None => {
            info!("No configuration given, using simulated drivetrain");
            DrivetrainConfig::simulated()
        }
    };

    if let Err(e) = swerve_motor::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
