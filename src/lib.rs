pub mod capture;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod settings;
pub mod sink;
pub mod testing;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pipeline::{listen_for_termination, Pipeline, ShutdownController};
use settings::{CliArgs, RelayConfig};

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;
/// Exit code when the pipeline fails to start.
const EXIT_INIT_FAILED: u8 = 1;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Parse the command line, build the pipeline and relay until shutdown.
pub fn run() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let config = match RelayConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            eprintln!("camrelay: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    info!(
        "source {}, outputs: {}",
        config.source,
        config
            .sinks
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let controller = Arc::new(ShutdownController::new());
    if let Err(e) = listen_for_termination(Arc::clone(&controller)) {
        warn!("termination signals will not be handled: {e}");
    }

    let mut pipeline = match Pipeline::from_config(&config, controller) {
        Ok(pipeline) => pipeline,
        Err(e) => return init_failed(e),
    };
    match pipeline.run() {
        Ok(reason) => {
            info!("relay stopped: {reason}");
            if reason.exit_code() != 0 {
                eprintln!("camrelay: {reason}");
            }
            ExitCode::from(reason.exit_code())
        }
        Err(e) => init_failed(e),
    }
}

fn init_failed(e: error::RelayError) -> ExitCode {
    error!("{e}");
    eprintln!("camrelay: {e}");
    ExitCode::from(EXIT_INIT_FAILED)
}
