//! Diagnostic logging to stderr.

use anyhow::{Context, Result};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Environment variable that overrides the level chosen by `-v` / `-q`.
pub const LOG_ENV: &str = "METAYAML_LOG";

/// Map `-v` occurrences and `-q` to a level.
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber.
pub fn setup_logging(verbosity: u8, quiet: bool) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(verbosity, quiet).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install logger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(5, false), LevelFilter::TRACE);
    }

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }
}
