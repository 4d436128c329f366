//! Log target and level conventions shared by the frontierwatch crates.
//!
//! Library crates only emit events under the `frontierwatch` target; the
//! binary owns the subscriber.

use tracing::Level;

/// Target prefix for every span and event emitted by frontierwatch.
pub const TARGET_PREFIX: &str = "frontierwatch";

/// Env var holding a bare level used when no filter directives are set.
pub const LEVEL_ENV_KEY: &str = "FRONTIERWATCH_LOG_LEVEL";

/// Parse a level name, ignoring case.
#[must_use]
pub fn parse_level(raw: &str) -> Option<Level> {
    raw.parse::<Level>().ok()
}

/// `FRONTIERWATCH_LOG_LEVEL`, or `default` when unset or unparsable.
#[must_use]
pub fn level_from_env(default: Level) -> Level {
    std::env::var(LEVEL_ENV_KEY)
        .ok()
        .and_then(|raw| parse_level(&raw))
        .unwrap_or(default)
}

/// Directive that keeps third-party crates at `base` while raising
/// frontierwatch targets to `ours`.
#[must_use]
pub fn scoped_directive(base: Level, ours: Level) -> String {
    format!("{base},{TARGET_PREFIX}={}", ours.as_str().to_ascii_lowercase())
}
