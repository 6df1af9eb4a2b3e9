//! `tracing` subscriber setup.
//!
//! Output always goes to stderr, since stdout/the controlling tty are owned by the
//! multiplexed screen. Verbosity is controlled by repeated `-v`/`-q` flags rather
//! than `RUST_LOG`, though `RUST_LOG` still wins if set (`EnvFilter::from_default_env`
//! falls back to it).

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `verbosity` is `-v` count minus `-q` count, already
/// folded by [`crate::cli::Options`].
pub fn init(verbosity: i8) {
    let default_level = match verbosity {
        i8::MIN..=-1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
}
