use std::io::{self, Write};
use std::process::ExitCode;

use dpid::{run_daemon, telemetry};
use dpid_config::Config;
use tracing::{debug, error};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => error.exit(),
    };
    match telemetry::initialise(config.log_filter(), config.log_format()) {
        Ok(format) => debug!(target: "dpid", %format, "logging to stderr"),
        Err(error) => {
            let _ = writeln!(io::stderr(), "dpid: {error}");
            return ExitCode::FAILURE;
        }
    }
    match run_daemon(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            error!(target: "dpid", %error, "daemon failed");
            ExitCode::FAILURE
        }
    }
}
