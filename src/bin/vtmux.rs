//! Entry point: parse args, install logging, build a [`Controller`], run it.

use std::process::ExitCode;

use vtmux::cli::{Cli, Outcome};
use vtmux::Controller;

fn main() -> ExitCode {
    let options = match Cli::parse_args(std::env::args_os()) {
        Outcome::Run(options) => options,
        Outcome::ExitAfterUsage => return ExitCode::from(1),
        Outcome::ArgumentError(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };

    vtmux::logging::init(options.verbosity);

    let mut controller = match Controller::init(options) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(event = "main.setup_failed", error = %e, "failed to initialise controller");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = controller.run() {
        tracing::error!(event = "main.run_failed", error = %e, "event loop exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
