//! Command-line surface, built with `clap`'s derive API and converted into the
//! runtime [`Options`]/[`KeyBindings`] the controller actually consumes.
//!
//! Exit codes follow the documented contract: 0 success, 1 graceful exit after
//! printing usage/version (`-h`/`-H`), 2 argument error.

use clap::Parser;

use crate::controller::{KeyBindings, Options};

/// A terminal multiplexer: one process, many PTY-backed shells.
#[derive(Debug, Parser)]
#[command(name = "vtmux", version, about, disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Print usage and exit.
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,

    /// Print a version banner and exit.
    #[arg(short = 'H', long = "hello", action = clap::ArgAction::SetTrue)]
    pub hello: bool,

    /// Enable the (currently identity) local-echo predictor.
    #[arg(short = 'p', long = "predict", default_value_t = false)]
    predict: bool,

    /// Command used to spawn a new buffer's shell.
    #[arg(short = 's', long = "shell", default_value = "/bin/sh")]
    shell: String,

    /// Increase verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (repeatable).
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
    quiet: u8,
}

/// Exit code to use once [`Cli::parse_args`] or `-h`/`-H` handling has produced
/// terminal output rather than a runnable [`Options`].
pub enum Outcome {
    Run(Options),
    ExitAfterUsage,
    ArgumentError(String),
}

impl Cli {
    pub fn parse_args<I, T>(args: I) -> Outcome
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match Cli::try_parse_from(args) {
            Ok(cli) if cli.help => {
                use clap::CommandFactory;
                Cli::command().print_help().ok();
                println!();
                Outcome::ExitAfterUsage
            }
            Ok(cli) if cli.hello => {
                println!("vtmux {} -- a terminal multiplexer", env!("CARGO_PKG_VERSION"));
                Outcome::ExitAfterUsage
            }
            Ok(cli) => Outcome::Run(cli.into_options()),
            Err(e) => Outcome::ArgumentError(e.to_string()),
        }
    }

    fn into_options(self) -> Options {
        let verbosity = i8::try_from(self.verbose).unwrap_or(i8::MAX)
            - i8::try_from(self.quiet).unwrap_or(i8::MAX);
        Options {
            predict: self.predict,
            verbosity,
            new_buf_command: self.shell,
            session_name: "vtmux".to_string(),
            keys: KeyBindings::default(),
        }
    }
}
