use serde::{Serialize, Deserialize};
use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ThisError)]
pub enum Error {
    /// A contract violation at construction time: negative or non-finite rates,
    /// a population that does not add up, a zero horizon, and so on.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("invalid input path: {0}")]
    InvalidInputPath(String),
    #[error("invalid input file: {0}")]
    InvalidInputFile(String),
    #[error("failed to read input")]
    InputReadFailure,
    #[error("invalid JSON at line {}, column {}: {}", .0.line, .0.column, .0.description)]
    InvalidJson(JsonError),
    #[error("failed to write output: {0}")]
    OutputFailure(String),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("failed to initialise logging: {0}")]
    LoggingFailure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonError {
    pub description: String,
    pub category: String,
    pub line: usize,
    pub column: usize,
}

impl From<serde_json::error::Error> for Error {
    fn from(e: serde_json::error::Error) -> Self {
        Self::InvalidJson(JsonError {
            description: format!("{}", e),
            category: format!("{:?}", e.classify()),
            line: e.line(),
            column: e.column(),
        })
    }
}

/// Shorthand for building an `InvalidParameters` error.
pub fn invalid<S: Into<String>>(message: S) -> Error {
    Error::InvalidParameters(message.into())
}

/// Non-fatal diagnostics attached to a result.
///
/// These describe a parameter regime rather than a programming error, so they
/// never abort a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Warning {
    NumericalInstability {
        source: String,
        detail: String,
    },
}

impl Warning {
    pub fn numerical_instability<S: Into<String>, D: Into<String>>(source: S, detail: D) -> Self {
        let warning = Warning::NumericalInstability {
            source: source.into(),
            detail: detail.into(),
        };
        log::warn!("{}", warning);
        warning
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Warning::NumericalInstability { source, detail } => {
                write!(f, "numerical instability in {}: {}", source, detail)
            }
        }
    }
}
