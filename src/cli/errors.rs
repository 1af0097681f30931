//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::indexer::IndexError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    /// stdin/stdout failure
    IoError,
    /// A stdin line is not a track
    InputError,
    IndexFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TRACKDEX_CLI_CONFIG_ERROR",
            Self::IoError => "TRACKDEX_CLI_IO_ERROR",
            Self::InputError => "TRACKDEX_CLI_INPUT_ERROR",
            Self::IndexFailed => "TRACKDEX_CLI_INDEX_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Line `line` (1-based) of the input could not be parsed
    pub fn bad_input(line: usize, msg: impl fmt::Display) -> Self {
        Self::new(
            CliErrorCode::InputError,
            format!("line {}: {}", line, msg),
        )
    }

    pub fn index_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IndexFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Config(inner) => Self::from(inner),
            other => Self::index_failed(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
