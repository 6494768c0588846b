//! # nubot
//! Runs the runtime core against the simulated platform.
//!
//! Configuration comes from an optional TOML file; command-line flags
//! override robot identity and a few timing knobs. Ctrl-C requests an
//! orderly shutdown.

use std::{path::PathBuf, process, sync::Arc, thread, time::Duration};

use clap::Parser;
use log::{error, info};

use nubot_runtime::{
    Modules, NuBot, Platform, RuntimeConfig, SimulatedPlatform, config::NetworkConfig,
};

#[derive(Parser, Debug)]
#[command(name = "nubot")]
#[command(about = "NUbot runtime core on a simulated robot", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    robot: Option<u8>,

    #[arg(long)]
    team: Option<u8>,

    /// Drive the loops from simulator steps of this many milliseconds
    #[arg(long)]
    step_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Disable every network port
    #[arg(long)]
    offline: bool,

    /// CSV file for per-cycle timing events
    #[arg(long)]
    cycle_log: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match RuntimeConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                process::exit(2);
            }
        },
        None => RuntimeConfig::default(),
    };
    if let Some(robot) = args.robot {
        config.robot_number = robot;
    }
    if let Some(team) = args.team {
        config.team_number = team;
    }
    if args.offline {
        config.network = NetworkConfig::offline();
    }
    if args.cycle_log.is_some() {
        config.cycle_log = args.cycle_log.clone();
    }

    let platform: Arc<dyn Platform> = match args.step_ms {
        Some(step_ms) => Arc::new(SimulatedPlatform::stepped(
            config.robot_number,
            config.team_number,
            step_ms,
        )),
        None => Arc::new(SimulatedPlatform::new(config.robot_number, config.team_number)),
    };

    let mut nubot = match NuBot::new(platform, config, Modules::standard) {
        Ok(nubot) => nubot,
        Err(e) => {
            error!("startup failed: {e}");
            process::exit(1);
        }
    };

    let shutdown = nubot.shutdown_handle();
    let on_interrupt = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupt received, shutting down");
        on_interrupt.request();
    }) {
        error!("failed to install Ctrl-C handler: {e}");
    }

    if let Some(secs) = args.duration_secs {
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            info!("run time of {secs} s elapsed");
            shutdown.request();
        });
    }

    if let Err(e) = nubot.run() {
        error!("runtime stopped: {e}");
        process::exit(1);
    }
    info!("bye");
}
