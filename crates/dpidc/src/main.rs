//! Entry point for the `dpidc` binary; delegates to [`dpidc::run`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    dpidc::run(std::env::args_os(), &mut stdout, &mut stderr)
}
