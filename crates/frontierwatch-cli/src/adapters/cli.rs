use std::path::PathBuf;
use std::str::FromStr;

use frontierwatch_core::{FrontierError, FrontierResult};

use crate::commands::query::ProbeMode;
use crate::config::CliOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CliCommand {
    /// Daily frontier search and ledger update.
    Update,
    /// Interactive scan or single-ID verification.
    Probe,
    /// Ledger summary and growth projections.
    #[default]
    Status,
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliInput {
    pub command: CliCommand,
    pub overrides: CliOverrides,
    /// `--last`: seed for an interactive scan.
    pub last: Option<u64>,
    pub mode: ProbeMode,
    /// `--id`: target of `--mode verify`; defaults to `--last`.
    pub id: Option<u64>,
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
}

pub const USAGE: &str = "\
usage: frontierwatch [update|probe|status|version|help] [flags]

commands:
  update    search for today's frontier and record it in the history ledger
  probe     run a bounded interactive scan, or verify one ID with --mode verify
  status    summarize the history ledger with growth projections (default)

flags:
  --config <path>         configuration file
  --history <path>        history ledger (storage.history_path)
  --baseline <path>       baseline JSON (storage.baseline_path)
  --base-url <url>        oracle base URL (oracle.base_url)
  --deadline-secs <n>     daily search deadline (daily.deadline_secs)
  --last <id>             seed for probe scans
  --mode <scan|verify>    probe mode
  --id <id>               ID to verify (defaults to --last)
  -v, --verbose           debug logging
  -q, --quiet             errors only
  --no-color              disable ANSI colors
";

/// Parse CLI arguments (excluding the executable name).
///
/// # Errors
///
/// Returns `FrontierError::InvalidConfig` for unknown commands/flags, missing
/// flag values, or malformed numbers.
pub fn parse_cli_args<I, S>(args: I) -> FrontierResult<CliInput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    let (command, mut idx) = extract_command(&tokens)?;
    let mut input = CliInput {
        command,
        ..CliInput::default()
    };

    while idx < tokens.len() {
        let flag = tokens[idx].as_str();
        match flag {
            "--config" => {
                let value = expect_value(&tokens, idx, "--config")?;
                input.overrides.config_path = Some(PathBuf::from(value));
                idx += 2;
            }
            "--history" => {
                let value = expect_value(&tokens, idx, "--history")?;
                input.overrides.history_path = Some(value.to_owned());
                idx += 2;
            }
            "--baseline" => {
                let value = expect_value(&tokens, idx, "--baseline")?;
                input.overrides.baseline_path = Some(value.to_owned());
                idx += 2;
            }
            "--base-url" => {
                let value = expect_value(&tokens, idx, "--base-url")?;
                input.overrides.base_url = Some(value.to_owned());
                idx += 2;
            }
            "--deadline-secs" => {
                let value = expect_value(&tokens, idx, "--deadline-secs")?;
                input.overrides.daily_deadline_secs =
                    Some(parse_u64(value, "daily.deadline_secs")?);
                idx += 2;
            }
            "--last" => {
                let value = expect_value(&tokens, idx, "--last")?;
                input.last = Some(parse_u64(value, "probe.last")?);
                idx += 2;
            }
            "--mode" => {
                let value = expect_value(&tokens, idx, "--mode")?;
                input.mode =
                    ProbeMode::from_str(value).map_err(|()| FrontierError::InvalidConfig {
                        field: "probe.mode".into(),
                        value: value.into(),
                        reason: "expected scan|verify".into(),
                    })?;
                idx += 2;
            }
            "--id" => {
                let value = expect_value(&tokens, idx, "--id")?;
                input.id = Some(parse_u64(value, "probe.id")?);
                idx += 2;
            }
            "-v" | "--verbose" => {
                input.verbose = true;
                idx += 1;
            }
            "-q" | "--quiet" => {
                input.quiet = true;
                idx += 1;
            }
            "--no-color" => {
                input.no_color = true;
                idx += 1;
            }
            "-h" | "--help" => {
                input.command = CliCommand::Help;
                idx += 1;
            }
            _ => {
                return Err(FrontierError::InvalidConfig {
                    field: "cli.flag".into(),
                    value: flag.into(),
                    reason: "unsupported flag".into(),
                });
            }
        }
    }

    validate_probe_args(&input)?;
    Ok(input)
}

fn validate_probe_args(input: &CliInput) -> FrontierResult<()> {
    if input.id.is_some() && input.mode != ProbeMode::Verify {
        return Err(FrontierError::InvalidConfig {
            field: "probe.id".into(),
            value: input.id.map(|id| id.to_string()).unwrap_or_default(),
            reason: "--id requires --mode verify".into(),
        });
    }
    Ok(())
}

fn extract_command(tokens: &[String]) -> FrontierResult<(CliCommand, usize)> {
    if let Some(token) = tokens.first()
        && !token.starts_with('-')
    {
        return Ok((parse_command(token)?, 1));
    }
    Ok((CliCommand::default(), 0))
}

fn parse_command(token: &str) -> FrontierResult<CliCommand> {
    match token {
        "update" => Ok(CliCommand::Update),
        "probe" => Ok(CliCommand::Probe),
        "status" => Ok(CliCommand::Status),
        "version" => Ok(CliCommand::Version),
        "help" => Ok(CliCommand::Help),
        _ => Err(FrontierError::InvalidConfig {
            field: "cli.command".into(),
            value: token.into(),
            reason: "expected update|probe|status|version|help".into(),
        }),
    }
}

fn expect_value<'a>(tokens: &'a [String], idx: usize, flag: &str) -> FrontierResult<&'a str> {
    tokens
        .get(idx + 1)
        .map(String::as_str)
        .ok_or_else(|| FrontierError::InvalidConfig {
            field: "cli.flag".into(),
            value: flag.into(),
            reason: "missing value".into(),
        })
}

fn parse_u64(value: &str, field: &str) -> FrontierResult<u64> {
    value
        .trim()
        .replace('_', "")
        .parse::<u64>()
        .map_err(|_| FrontierError::InvalidConfig {
            field: field.into(),
            value: value.into(),
            reason: "expected unsigned integer".into(),
        })
}
