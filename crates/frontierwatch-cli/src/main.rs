use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use frontierwatch_cli::{
    CliCommand, DailyUpdate, FrontierwatchConfig, ProbeQuery, QueryService, USAGE, Verbosity,
    default_config_file_path, emit_config_loaded, emit_json, init_subscriber, load_from_sources,
    load_status, parse_cli_args, resolve_credential,
};
use frontierwatch_core::{FrontierError, FrontierResult};
use frontierwatch_probe::{HttpOracle, SystemClock};
use tracing::{info, warn};

fn main() -> FrontierResult<()> {
    let cli_input = parse_cli_args(std::env::args().skip(1))?;

    match cli_input.command {
        CliCommand::Version => {
            println!("frontierwatch {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        CliCommand::Help => {
            print!("{USAGE}");
            return Ok(());
        }
        CliCommand::Update | CliCommand::Probe | CliCommand::Status => {}
    }

    let verbosity = Verbosity::from_flags(cli_input.verbose, cli_input.quiet);
    init_subscriber(verbosity, cli_input.no_color);

    let env_map: HashMap<String, String> = std::env::vars().collect();
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));

    let config_path = match cli_input.overrides.config_path.as_deref() {
        Some(path) => {
            let path = expand_cli_path(path, &home_dir);
            if !path.exists() {
                return Err(FrontierError::InvalidConfig {
                    field: "config_file".to_owned(),
                    value: path.display().to_string(),
                    reason: "explicitly provided --config path does not exist".to_owned(),
                });
            }
            path
        }
        None => default_config_file_path(&home_dir),
    };
    let loaded = load_from_sources(
        Some(config_path.as_path()),
        &env_map,
        &cli_input.overrides,
        &home_dir,
    )?;
    emit_config_loaded(&loaded);

    let config = loaded.config;
    let baseline = config.load_baseline()?;

    match cli_input.command {
        CliCommand::Status => emit_json(&load_status(&baseline, &config.history_path())?),
        CliCommand::Update => {
            let oracle = build_oracle(&config, &env_map)?;
            let report = DailyUpdate::new(
                &oracle,
                &SystemClock,
                &baseline,
                config.retry_config(),
                config.daily_budget(),
                config.history_path(),
            )?
            .run(Utc::now())?;
            emit_json(&report)
        }
        CliCommand::Probe => {
            let oracle = build_oracle(&config, &env_map)?;
            let service = QueryService::new(
                &oracle,
                &SystemClock,
                &baseline,
                config.retry_config(),
                config.interactive_budget(),
            )?;
            let response = service.handle(ProbeQuery {
                last: cli_input.last.unwrap_or(config.interactive.default_last),
                mode: cli_input.mode,
                id: cli_input.id,
            });
            emit_json(&response)
        }
        CliCommand::Version | CliCommand::Help => Ok(()),
    }
}

fn build_oracle(
    config: &FrontierwatchConfig,
    env: &HashMap<String, String>,
) -> FrontierResult<HttpOracle> {
    let credential = resolve_credential(env);
    match &credential {
        Some(credential) => info!(source = credential.env_key, "oracle credential configured"),
        None => warn!("no oracle credential set; unauthenticated rate limits apply"),
    }
    HttpOracle::new(config.oracle_config(credential.map(|credential| credential.token)))
}

fn expand_cli_path(path: &Path, home_dir: &Path) -> PathBuf {
    match path.to_str() {
        Some("~") => home_dir.to_path_buf(),
        Some(raw) => raw
            .strip_prefix("~/")
            .map_or_else(|| path.to_path_buf(), |rest| home_dir.join(rest)),
        None => path.to_path_buf(),
    }
}
