use std::collections::{HashMap, HashSet};
use std::fs;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use std::time::Duration;

use frontierwatch_core::{Baseline, FrontierError, FrontierResult};
use frontierwatch_probe::{ExhaustedRetryPolicy, OracleConfig, RetryConfig, SearchBudget};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PRECEDENCE: [ConfigSource; 4] = [
    ConfigSource::Cli,
    ConfigSource::Env,
    ConfigSource::File,
    ConfigSource::Defaults,
];

/// Environment variables holding the oracle credential, in priority order.
pub const CREDENTIAL_ENV_KEYS: [&str; 2] = ["FRONTIERWATCH_TOKEN", "GITHUB_TOKEN"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleSettings {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    /// Used when a rate-limit response carries no `Retry-After`.
    pub rate_limit_wait_secs: u64,
    pub transient_backoff_secs: u64,
    pub on_exhausted: ExhaustedRetryPolicy,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: frontierwatch_probe::oracle::DEFAULT_BASE_URL.into(),
            user_agent: format!("frontierwatch/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_ms: 8_000,
            max_attempts: 3,
            rate_limit_wait_secs: 60,
            transient_backoff_secs: 5,
            on_exhausted: ExhaustedRetryPolicy::TreatAsAbsent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailySettings {
    pub deadline_secs: u64,
    pub search_window: u64,
}

impl Default for DailySettings {
    fn default() -> Self {
        Self {
            deadline_secs: 8 * 60,
            search_window: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractiveSettings {
    pub deadline_ms: u64,
    /// Seed used by `probe` when `--last` is not given.
    pub default_last: u64,
}

impl Default for InteractiveSettings {
    fn default() -> Self {
        Self {
            deadline_ms: 9_000,
            default_last: 262_206_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSettings {
    pub history_path: String,
    /// Empty selects the bundled baseline.
    pub baseline_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            history_path: "data/history.json".into(),
            baseline_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FrontierwatchConfig {
    pub oracle: OracleSettings,
    pub daily: DailySettings,
    pub interactive: InteractiveSettings,
    pub storage: StorageSettings,
}

impl FrontierwatchConfig {
    #[must_use]
    pub fn oracle_config(&self, credential: Option<String>) -> OracleConfig {
        OracleConfig {
            base_url: self.oracle.base_url.clone(),
            user_agent: self.oracle.user_agent.clone(),
            request_timeout: Duration::from_millis(self.oracle.request_timeout_ms),
            rate_limit_wait: Duration::from_secs(self.oracle.rate_limit_wait_secs),
            credential,
        }
    }

    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.oracle.max_attempts,
            transient_backoff: Duration::from_secs(self.oracle.transient_backoff_secs),
            exhausted: self.oracle.on_exhausted,
        }
    }

    #[must_use]
    pub const fn daily_budget(&self) -> SearchBudget {
        SearchBudget::daily()
            .with_deadline(Duration::from_secs(self.daily.deadline_secs))
            .with_max_window(Some(self.daily.search_window))
    }

    #[must_use]
    pub const fn interactive_budget(&self) -> SearchBudget {
        SearchBudget::interactive().with_deadline(Duration::from_millis(self.interactive.deadline_ms))
    }

    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.history_path)
    }

    #[must_use]
    pub fn baseline_path(&self) -> Option<PathBuf> {
        let raw = self.storage.baseline_path.trim();
        (!raw.is_empty()).then(|| PathBuf::from(raw))
    }

    /// Load and validate the configured baseline (bundled when unset).
    ///
    /// # Errors
    ///
    /// Returns [`FrontierError::InvalidBaseline`] for a malformed baseline and
    /// [`FrontierError::Io`] if the file cannot be read.
    pub fn load_baseline(&self) -> FrontierResult<Baseline> {
        match self.baseline_path() {
            Some(path) => Baseline::load(&path),
            None => Baseline::bundled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
struct OracleSettingsPatch {
    base_url: Option<String>,
    user_agent: Option<String>,
    request_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    rate_limit_wait_secs: Option<u64>,
    transient_backoff_secs: Option<u64>,
    on_exhausted: Option<ExhaustedRetryPolicy>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
struct DailySettingsPatch {
    deadline_secs: Option<u64>,
    search_window: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
struct InteractiveSettingsPatch {
    deadline_ms: Option<u64>,
    default_last: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
struct StorageSettingsPatch {
    history_path: Option<String>,
    baseline_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
struct FrontierwatchConfigPatch {
    oracle: Option<OracleSettingsPatch>,
    daily: Option<DailySettingsPatch>,
    interactive: Option<InteractiveSettingsPatch>,
    storage: Option<StorageSettingsPatch>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Cli,
    Env,
    File,
    Defaults,
    Runtime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigWarning {
    pub reason_code: String,
    pub field: String,
    pub source: ConfigSource,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoadResult {
    pub config: FrontierwatchConfig,
    pub source_precedence: [ConfigSource; 4],
    pub config_file_used: Option<PathBuf>,
    pub cli_flags_used: Vec<String>,
    pub env_keys_used: Vec<String>,
    pub warnings: Vec<ConfigWarning>,
}

/// Overrides taken from command-line flags; highest precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub history_path: Option<String>,
    pub baseline_path: Option<String>,
    pub daily_deadline_secs: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn used_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.config_path.is_some() {
            flags.push("--config".into());
        }
        if self.base_url.is_some() {
            flags.push("--base-url".into());
        }
        if self.history_path.is_some() {
            flags.push("--history".into());
        }
        if self.baseline_path.is_some() {
            flags.push("--baseline".into());
        }
        if self.daily_deadline_secs.is_some() {
            flags.push("--deadline-secs".into());
        }
        flags
    }
}

/// Oracle credential and the variable it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub env_key: &'static str,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("env_key", &self.env_key)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// First non-empty credential among [`CREDENTIAL_ENV_KEYS`].
#[must_use]
pub fn resolve_credential<S: BuildHasher>(env: &HashMap<String, String, S>) -> Option<Credential> {
    CREDENTIAL_ENV_KEYS.iter().find_map(|&key| {
        env.get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|token| Credential {
                env_key: key,
                token: token.to_owned(),
            })
    })
}

#[must_use]
pub fn default_config_file_path(home_dir: &Path) -> PathBuf {
    if let Some(xdg_config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join("frontierwatch")
            .join("config.toml");
    }

    home_dir
        .join(".config")
        .join("frontierwatch")
        .join("config.toml")
}

/// Load config from file/env/CLI overlays (`CLI > env > file > defaults`).
///
/// # Errors
///
/// Returns `FrontierError::InvalidConfig` for parse/validation failures and
/// `FrontierError::Io` if reading a present file fails.
pub fn load_from_sources<S>(
    config_file: Option<&Path>,
    env: &HashMap<String, String, S>,
    cli: &CliOverrides,
    home_dir: &Path,
) -> FrontierResult<ConfigLoadResult>
where
    S: BuildHasher,
{
    let (toml_contents, config_file_used) = match config_file {
        Some(path) if path.exists() => (Some(fs::read_to_string(path)?), Some(path.to_path_buf())),
        Some(_) | None => (None, None),
    };

    load_from_str(
        toml_contents.as_deref(),
        config_file_used.as_deref(),
        env,
        cli,
        home_dir,
    )
}

/// Load config from raw TOML plus env/CLI overlays.
///
/// # Errors
///
/// Returns `FrontierError::InvalidConfig` when parsing/validation fails.
pub fn load_from_str<S>(
    config_toml: Option<&str>,
    config_file_path: Option<&Path>,
    env: &HashMap<String, String, S>,
    cli: &CliOverrides,
    home_dir: &Path,
) -> FrontierResult<ConfigLoadResult>
where
    S: BuildHasher,
{
    let mut config = FrontierwatchConfig::default();
    let mut warnings = Vec::new();

    if let Some(config_toml) = config_toml {
        warnings.extend(collect_unknown_key_warnings(config_toml)?);
        let patch: FrontierwatchConfigPatch = toml::from_str(config_toml)
            .map_err(|error| FrontierError::config("config_file", "<toml>", error.to_string()))?;
        apply_patch(&mut config, patch);
    }

    let env_keys_used = apply_env_overrides(&mut config, env)?;
    apply_cli_overrides(&mut config, cli);
    expand_tilde_paths(&mut config, home_dir);
    validate_config(&config, &mut warnings)?;

    Ok(ConfigLoadResult {
        config,
        source_precedence: PRECEDENCE,
        config_file_used: config_file_path.map(Path::to_path_buf),
        cli_flags_used: cli.used_flags(),
        env_keys_used,
        warnings,
    })
}

pub fn emit_config_loaded(result: &ConfigLoadResult) {
    for warning in &result.warnings {
        warn!(
            reason_code = %warning.reason_code,
            field = %warning.field,
            source = ?warning.source,
            "{}",
            warning.message
        );
    }
    info!(
        precedence = ?result.source_precedence,
        config_file_used = ?result.config_file_used,
        cli_flags_used = ?result.cli_flags_used,
        env_keys_used = ?result.env_keys_used,
        base_url = %result.config.oracle.base_url,
        history_path = %result.config.storage.history_path,
        "frontierwatch configuration loaded"
    );
}

fn apply_patch(config: &mut FrontierwatchConfig, patch: FrontierwatchConfigPatch) {
    if let Some(oracle) = patch.oracle {
        if let Some(base_url) = oracle.base_url {
            config.oracle.base_url = base_url;
        }
        if let Some(user_agent) = oracle.user_agent {
            config.oracle.user_agent = user_agent;
        }
        if let Some(request_timeout_ms) = oracle.request_timeout_ms {
            config.oracle.request_timeout_ms = request_timeout_ms;
        }
        if let Some(max_attempts) = oracle.max_attempts {
            config.oracle.max_attempts = max_attempts;
        }
        if let Some(rate_limit_wait_secs) = oracle.rate_limit_wait_secs {
            config.oracle.rate_limit_wait_secs = rate_limit_wait_secs;
        }
        if let Some(transient_backoff_secs) = oracle.transient_backoff_secs {
            config.oracle.transient_backoff_secs = transient_backoff_secs;
        }
        if let Some(on_exhausted) = oracle.on_exhausted {
            config.oracle.on_exhausted = on_exhausted;
        }
    }

    if let Some(daily) = patch.daily {
        if let Some(deadline_secs) = daily.deadline_secs {
            config.daily.deadline_secs = deadline_secs;
        }
        if let Some(search_window) = daily.search_window {
            config.daily.search_window = search_window;
        }
    }

    if let Some(interactive) = patch.interactive {
        if let Some(deadline_ms) = interactive.deadline_ms {
            config.interactive.deadline_ms = deadline_ms;
        }
        if let Some(default_last) = interactive.default_last {
            config.interactive.default_last = default_last;
        }
    }

    if let Some(storage) = patch.storage {
        if let Some(history_path) = storage.history_path {
            config.storage.history_path = history_path;
        }
        if let Some(baseline_path) = storage.baseline_path {
            config.storage.baseline_path = baseline_path;
        }
    }
}

fn apply_env_overrides(
    config: &mut FrontierwatchConfig,
    env: &HashMap<String, String, impl BuildHasher>,
) -> FrontierResult<Vec<String>> {
    let mut keys_used = Vec::new();

    if let Some(value) = env.get("FRONTIERWATCH_ORACLE_BASE_URL") {
        config.oracle.base_url.clone_from(value);
        keys_used.push("FRONTIERWATCH_ORACLE_BASE_URL".into());
    }

    if let Some(value) = env.get("FRONTIERWATCH_ORACLE_TIMEOUT_MS") {
        config.oracle.request_timeout_ms = parse_u64(value, "oracle.request_timeout_ms")?;
        keys_used.push("FRONTIERWATCH_ORACLE_TIMEOUT_MS".into());
    }

    if let Some(value) = env.get("FRONTIERWATCH_DAILY_DEADLINE_SECS") {
        config.daily.deadline_secs = parse_u64(value, "daily.deadline_secs")?;
        keys_used.push("FRONTIERWATCH_DAILY_DEADLINE_SECS".into());
    }

    if let Some(value) = env.get("FRONTIERWATCH_HISTORY_PATH") {
        config.storage.history_path.clone_from(value);
        keys_used.push("FRONTIERWATCH_HISTORY_PATH".into());
    }

    if let Some(value) = env.get("FRONTIERWATCH_BASELINE_PATH") {
        config.storage.baseline_path.clone_from(value);
        keys_used.push("FRONTIERWATCH_BASELINE_PATH".into());
    }

    Ok(keys_used)
}

fn apply_cli_overrides(config: &mut FrontierwatchConfig, cli: &CliOverrides) {
    if let Some(base_url) = &cli.base_url {
        config.oracle.base_url.clone_from(base_url);
    }

    if let Some(history_path) = &cli.history_path {
        config.storage.history_path.clone_from(history_path);
    }

    if let Some(baseline_path) = &cli.baseline_path {
        config.storage.baseline_path.clone_from(baseline_path);
    }

    if let Some(deadline_secs) = cli.daily_deadline_secs {
        config.daily.deadline_secs = deadline_secs;
    }
}

fn collect_unknown_key_warnings(config_toml: &str) -> FrontierResult<Vec<ConfigWarning>> {
    let value: toml::Value = toml::from_str(config_toml)
        .map_err(|error| FrontierError::config("config_file", "<toml>", error.to_string()))?;

    let root = value
        .as_table()
        .ok_or_else(|| FrontierError::config("config_file", "<toml>", "expected table at root"))?;

    let known_top_level: HashSet<&str> = ["oracle", "daily", "interactive", "storage"]
        .into_iter()
        .collect();

    let mut warnings = Vec::new();

    for (section, section_value) in root {
        if !known_top_level.contains(section.as_str()) {
            warnings.push(ConfigWarning {
                reason_code: "config.unknown_key.warning".into(),
                field: format!("config.{section}"),
                source: ConfigSource::File,
                message: format!("Unknown section {section} ignored"),
            });
            continue;
        }

        let Some(section_table) = section_value.as_table() else {
            continue;
        };

        let known_section_keys: HashSet<&str> = match section.as_str() {
            "oracle" => [
                "base_url",
                "user_agent",
                "request_timeout_ms",
                "max_attempts",
                "rate_limit_wait_secs",
                "transient_backoff_secs",
                "on_exhausted",
            ]
            .into_iter()
            .collect(),
            "daily" => ["deadline_secs", "search_window"].into_iter().collect(),
            "interactive" => ["deadline_ms", "default_last"].into_iter().collect(),
            "storage" => ["history_path", "baseline_path"].into_iter().collect(),
            _ => HashSet::new(),
        };

        for key in section_table.keys() {
            if !known_section_keys.contains(key.as_str()) {
                warnings.push(ConfigWarning {
                    reason_code: "config.unknown_key.warning".into(),
                    field: format!("{section}.{key}"),
                    source: ConfigSource::File,
                    message: format!("Unknown key {section}.{key} ignored"),
                });
            }
        }
    }

    Ok(warnings)
}

fn expand_tilde_paths(config: &mut FrontierwatchConfig, home_dir: &Path) {
    if let Some(expanded) = expand_tilde(&config.storage.history_path, home_dir) {
        config.storage.history_path = expanded;
    }
    if let Some(expanded) = expand_tilde(&config.storage.baseline_path, home_dir) {
        config.storage.baseline_path = expanded;
    }
}

fn expand_tilde(value: &str, home_dir: &Path) -> Option<String> {
    if value == "~" {
        return Some(home_dir.to_string_lossy().into_owned());
    }

    value
        .strip_prefix("~/")
        .map(|rest| home_dir.join(rest).to_string_lossy().into_owned())
}

fn validate_config(
    config: &FrontierwatchConfig,
    warnings: &mut Vec<ConfigWarning>,
) -> FrontierResult<()> {
    let base_url = config.oracle.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(FrontierError::config(
            "oracle.base_url",
            base_url,
            "must start with http:// or https://",
        ));
    }

    if config.oracle.request_timeout_ms == 0 {
        return Err(FrontierError::config(
            "oracle.request_timeout_ms",
            "0",
            "must be positive",
        ));
    }

    if config.oracle.max_attempts == 0 {
        return Err(FrontierError::config(
            "oracle.max_attempts",
            "0",
            "must be at least 1",
        ));
    }

    if config.daily.deadline_secs == 0 {
        return Err(FrontierError::config(
            "daily.deadline_secs",
            "0",
            "must be positive",
        ));
    }

    if config.daily.search_window == 0 {
        return Err(FrontierError::config(
            "daily.search_window",
            "0",
            "must be positive",
        ));
    }

    if config.interactive.deadline_ms == 0 {
        return Err(FrontierError::config(
            "interactive.deadline_ms",
            "0",
            "must be positive",
        ));
    }

    if config.storage.history_path.trim().is_empty() {
        return Err(FrontierError::config(
            "storage.history_path",
            "",
            "must not be empty",
        ));
    }

    if config.oracle.rate_limit_wait_secs >= config.daily.deadline_secs {
        warnings.push(ConfigWarning {
            reason_code: "config.oracle.rate_limit_wait_exceeds_deadline".into(),
            field: "oracle.rate_limit_wait_secs".into(),
            source: ConfigSource::Runtime,
            message: "a single rate-limit wait can consume the whole daily deadline".into(),
        });
    }

    Ok(())
}

fn parse_u64(value: &str, field: &str) -> FrontierResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| FrontierError::config(field, value, "expected unsigned integer"))
}
