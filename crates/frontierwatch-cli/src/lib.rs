//! The `frontierwatch` binary surface: layered configuration, argument
//! parsing, logging setup and the `update` / `probe` / `status` commands.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod commands;
pub mod config;
pub mod tracing_setup;

pub use adapters::cli::{CliCommand, CliInput, USAGE, parse_cli_args};
pub use commands::daily::{DailyReport, DailyUpdate};
pub use commands::query::{
    ProbeMode, ProbeQuery, QueryResponse, QueryService, ScanResponse, VerifyResponse,
};
pub use commands::status::{StatusReport, build_status, load_status};
pub use commands::{emit_json, write_json};
pub use config::{
    CREDENTIAL_ENV_KEYS, CliOverrides, ConfigLoadResult, ConfigSource, ConfigWarning, Credential,
    DailySettings, FrontierwatchConfig, InteractiveSettings, OracleSettings, StorageSettings,
    default_config_file_path, emit_config_loaded, load_from_sources, load_from_str,
    resolve_credential,
};
pub use tracing_setup::{Verbosity, init_subscriber};
