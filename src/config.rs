//! Server configuration.
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags, environment variables, built-in defaults.
//!
//! | Setting     | Flag                      | Env           | Default          |
//! |-------------|---------------------------|---------------|------------------|
//! | host        | `--host`, `-h`            | `HOST`        | `127.0.0.1`      |
//! | port        | `--port`, `-p`            | `PORT`        | `6379`           |
//! | AOF enabled | `--appendonly <yes\|no>`  | `AOF_ENABLED` | `yes`            |
//! | AOF path    | `--appendfilename <path>` | `AOF_FILE`    | `appendonly.aof` |

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use thiserror::Error;

/// Default append-only file name, relative to the working directory
pub const DEFAULT_AOF_FILE: &str = "appendonly.aof";

/// Errors produced while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number '{value}' (from {source_name})")]
    InvalidPort { value: String, source_name: String },

    #[error("invalid boolean '{value}' (from {source_name}); expected yes or no")]
    InvalidBool { value: String, source_name: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Whether writes are logged and the log replayed at startup
    pub aof_enabled: bool,
    /// Location of the append-only file
    pub aof_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            aof_enabled: true,
            aof_path: PathBuf::from(DEFAULT_AOF_FILE),
        }
    }
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Serve(Config),
    Help,
    Version,
}

impl Config {
    /// Reads configuration from the process arguments and environment.
    pub fn load() -> Result<Invocation, ConfigError> {
        Self::from_sources(std::env::args().skip(1), |name| std::env::var(name).ok())
    }

    /// Resolves configuration from an argument list (without the program
    /// name) and an environment lookup.
    pub fn from_sources<I, S, E>(args: I, env: E) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = env("HOST") {
            config.host = host;
        }
        if let Some(port) = env("PORT") {
            config.port = parse_port(&port, "PORT")?;
        }
        if let Some(enabled) = env("AOF_ENABLED") {
            config.aof_enabled = parse_bool(&enabled, "AOF_ENABLED")?;
        }
        if let Some(path) = env("AOF_FILE") {
            config.aof_path = PathBuf::from(path);
        }

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = require_value(&mut args, &arg)?,
                "--port" | "-p" => {
                    let value = require_value(&mut args, &arg)?;
                    config.port = parse_port(&value, &arg)?;
                }
                "--appendonly" => {
                    let value = require_value(&mut args, &arg)?;
                    config.aof_enabled = parse_bool(&value, &arg)?;
                }
                "--appendfilename" => {
                    config.aof_path = PathBuf::from(require_value(&mut args, &arg)?);
                }
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(Invocation::Serve(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_port(value: &str, source_name: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidPort {
        value: value.to_string(),
        source_name: source_name.to_string(),
    })
}

fn parse_bool(value: &str, source_name: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            value: value.to_string(),
            source_name: source_name.to_string(),
        }),
    }
}

/// Usage text printed for `--help`.
pub fn usage() -> String {
    format!(
        r#"ledgerkv {version} - in-memory key-value server with an append-only log

USAGE:
    ledgerkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (env HOST, default: {host})
    -p, --port <PORT>              Port to listen on (env PORT, default: {port})
        --appendonly <yes|no>      Log writes and replay them at startup
                                   (env AOF_ENABLED, default: yes)
        --appendfilename <PATH>    Append-only file location
                                   (env AOF_FILE, default: {aof})
    -v, --version                  Print version information
        --help                     Print this help message

Log verbosity follows RUST_LOG (default: info).
"#,
        version = crate::VERSION,
        host = DEFAULT_HOST,
        port = DEFAULT_PORT,
        aof = DEFAULT_AOF_FILE,
    )
}
