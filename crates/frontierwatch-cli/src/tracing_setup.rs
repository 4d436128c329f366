//! Subscriber setup for the `frontierwatch` binary.
//!
//! Logs go to stderr; stdout is reserved for the JSON report. Filter
//! resolution, first match wins:
//!
//! 1. `FRONTIERWATCH_LOG` (full directives, e.g. `frontierwatch=trace`)
//! 2. `RUST_LOG`
//! 3. `-v` / `-q`
//! 4. `FRONTIERWATCH_LOG_LEVEL`, else `warn`

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use frontierwatch_core::tracing_config::{level_from_env, scoped_directive};

const DIRECTIVES_ENV_KEY: &str = "FRONTIERWATCH_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// `-v` beats `-q`.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Self::Verbose,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn directive(self) -> String {
        match self {
            Self::Verbose => scoped_directive(Level::WARN, Level::DEBUG),
            Self::Quiet => Level::ERROR.to_string(),
            Self::Normal => level_from_env(Level::WARN).to_string(),
        }
    }
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_subscriber(verbosity: Verbosity, no_color: bool) {
    let ansi = !no_color && std::io::stderr().is_terminal();
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true);
    let registry = tracing_subscriber::registry().with(resolve_filter(verbosity));

    // A daily run can take minutes, so verbose output carries uptime stamps.
    let _ = match verbosity {
        Verbosity::Verbose => registry
            .with(layer.with_timer(fmt::time::uptime()))
            .try_init(),
        Verbosity::Quiet | Verbosity::Normal => {
            registry.with(layer.without_time().compact()).try_init()
        }
    };
}

fn resolve_filter(verbosity: Verbosity) -> EnvFilter {
    std::env::var(DIRECTIVES_ENV_KEY)
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(verbosity.directive()))
}
