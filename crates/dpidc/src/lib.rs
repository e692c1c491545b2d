//! Command-line client for the dpid plugin daemon.
//!
//! The client locates the daemon through the socket directory pointer in the
//! per-user configuration directory, authenticates with the shared secret
//! from the keys file, and sends one rendezvous command. Output and error
//! streams are injected so tests can capture them.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use dpip::RendezvousClient;

mod cli;
mod errors;

use cli::{Cli, CliCommand};
use errors::AppError;

/// Runs the client using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => return report(stderr, &AppError::CliUsage(error)),
    };
    match execute(&cli, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(stderr, &error),
    }
}

fn execute<W: Write>(cli: &Cli, stdout: &mut W) -> Result<(), AppError> {
    let client = RendezvousClient::from_config_dir(&config_dir(cli)?)?;
    match &cli.command {
        CliCommand::Stop => client.bye()?,
        CliCommand::Register => client.register_all()?,
        CliCommand::Check { service } => {
            let socket = client.check_server(service)?;
            writeln!(stdout, "{}", socket.display()).map_err(AppError::Output)?;
        }
    }
    Ok(())
}

fn config_dir(cli: &Cli) -> Result<PathBuf, AppError> {
    cli.config_dir
        .clone()
        .or_else(dpid_config::default_config_dir)
        .ok_or(AppError::MissingConfigDir)
}

fn report<E: Write>(stderr: &mut E, error: &AppError) -> ExitCode {
    let _ = writeln!(stderr, "dpidc: {error}");
    ExitCode::FAILURE
}
