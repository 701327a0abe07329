//! Domain error types.

use std::time::Duration;

/// Why a single strategy run produced no result.
///
/// Every variant carries enough text to be written to the error log as-is.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {script}: {reason}")]
    ProcessSpawn { script: String, reason: String },

    #[error("Timeout after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("{stderr_tail}")]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{reason}")]
    Parse { reason: String },
}

impl RunError {
    /// Short classification label used in console output.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::ProcessSpawn { .. } => "ERROR",
            RunError::Timeout { .. } => "TIMEOUT",
            RunError::NonZeroExit { .. } | RunError::Parse { .. } => "FAILED",
        }
    }
}

/// Top-level error type for alphascan.
#[derive(Debug, thiserror::Error)]
pub enum AlphascanError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data returned for {ticker}")]
    DataUnavailable { ticker: String },

    #[error("unreadable cache file {path}: {reason}")]
    CacheCorrupt { path: String, reason: String },

    #[error("invalid result: {reason}")]
    InvalidResult { reason: String },

    #[error("notification failed: {reason}")]
    Notifier { reason: String },

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&AlphascanError> for std::process::ExitCode {
    fn from(err: &AlphascanError) -> Self {
        let code: u8 = match err {
            AlphascanError::ConfigParse { .. } | AlphascanError::ConfigInvalid { .. } => 2,
            AlphascanError::DataUnavailable { .. } | AlphascanError::CacheCorrupt { .. } => 5,
            AlphascanError::Run(_)
            | AlphascanError::InvalidResult { .. }
            | AlphascanError::Notifier { .. }
            | AlphascanError::Csv(_)
            | AlphascanError::Io(_) => 1,
        };
        std::process::ExitCode::from(code)
    }
}
