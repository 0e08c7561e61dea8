use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;

/// Argument list with positional `rc.key=value` tokens pulled out.
#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

/// A `--rc KEY=VALUE` flag.
#[derive(Debug, Clone)]
pub struct RcOverride {
    pub key: String,
    pub value: String,
}

impl FromStr for RcOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("missing key in --rc {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasksheet",
    version,
    about = "Upcoming checklist, delegation and maintenance tasks from a sheet export",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Override one configuration key.
    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<RcOverride>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<RcOverride>,

    /// Read configuration from this file instead of ~/.tasksheetrc.
    #[arg(long = "rc-file", value_name = "PATH")]
    pub rc_file: Option<PathBuf>,

    /// Directory holding tasks.json and workdays.json.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

impl GlobalCli {
    /// Positional overrides first, then `--rc` flags, so flags win.
    pub fn all_overrides(
        &self,
        positional: Vec<(String, String)>,
    ) -> Vec<(String, String)> {
        positional
            .into_iter()
            .chain(
                self.rc_overrides
                    .iter()
                    .map(|kv| (kv.key.clone(), kv.value.clone())),
            )
            .collect()
    }
}

fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) => "warn",
        (0, 3..) => "trace",
        (0, 2) => "debug",
        (0, 1) => "info",
        _ => "warn",
    }
}

/// Logs go to stderr so command output on stdout stays pipeable.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = default_level(verbose, quiet);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_ansi(io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

fn positional_override(arg: &str) -> Option<(String, String)> {
    let rest = arg.strip_prefix("rc.")?;
    let (key, value) = rest.split_once(['=', ':'])?;
    if key.is_empty() {
        return None;
    }
    Some((format!("rc.{key}"), value.to_string()))
}

#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    for (idx, arg) in raw.iter().enumerate() {
        // argv[0] is never an override.
        let parsed = (idx > 0)
            .then(|| positional_override(&arg.to_string_lossy()))
            .flatten();
        match parsed {
            Some((key, value)) => {
                debug!(key = %key, value = %value, "captured positional rc override");
                overrides.push((key, value));
            }
            None => cleaned.push(arg.clone()),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// `[filter terms] <command> [args]`, resolved against the command table.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub filter_terms: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        if let Some(inv) = split_filter_command(&tokens) {
            return Ok(inv);
        }

        let command = cfg.default_command();
        if tokens.is_empty() {
            debug!(command = %command, "no explicit command, using default");
        } else {
            warn!(
                command = %command,
                "no command detected, treated all terms as filter for default command"
            );
        }
        Ok(Self {
            filter_terms: tokens,
            command,
            command_args: vec![],
        })
    }
}

fn split_filter_command(tokens: &[String]) -> Option<Invocation> {
    let known = known_command_names();
    let (idx, command) = tokens.iter().enumerate().find_map(|(idx, token)| {
        expand_command_abbrev(token, &known).map(|command| (idx, command))
    })?;

    debug!(
        token = %tokens[idx],
        expanded = %command,
        split_index = idx,
        "resolved command token"
    );
    Some(Invocation {
        filter_terms: tokens[..idx].to_vec(),
        command: command.to_string(),
        command_args: tokens[idx + 1..].to_vec(),
    })
}
