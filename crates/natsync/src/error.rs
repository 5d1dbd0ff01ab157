//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use natsync_config::ConfigError;
use natsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONFIG: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the router at {address}")]
    #[diagnostic(
        code(natsync::connection_failed),
        help(
            "Check that the API service is enabled (/ip service enable api)\n\
             and that {address} is reachable from this host.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("Lost the connection to the router")]
    #[diagnostic(code(natsync::disconnected), help("Reason: {reason}"))]
    Disconnected { reason: String },

    #[error("Router did not answer within {timeout_ms}ms")]
    #[diagnostic(
        code(natsync::timeout),
        help("Raise read_timeout with: natsync config set read_timeout <seconds>")
    )]
    Timeout { timeout_ms: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Router rejected the login: {message}")]
    #[diagnostic(
        code(natsync::auth_failed),
        help(
            "Verify the API user and password.\n\
             Run: natsync config set user <name> && natsync config set pass <password>"
        )
    )]
    AuthFailed { message: String },

    // ── Router-side failures ─────────────────────────────────────────
    #[error("Router rejected {command}: {message}")]
    #[diagnostic(code(natsync::command_failed))]
    CommandFailed { command: String, message: String },

    #[error("{failed} router command(s) failed")]
    #[diagnostic(
        code(natsync::partial_failure),
        help("Rerun with -v to see which rules the router rejected.")
    )]
    PartialFailure { failed: usize },

    #[error("Protocol error: {message}")]
    #[diagnostic(
        code(natsync::protocol),
        help("The router sent data that could not be parsed; the session was dropped.")
    )]
    Protocol { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(natsync::config),
        help("Check the file shown by: natsync config path")
    )]
    Config(#[from] ConfigError),

    #[error("Invalid setting: {message}")]
    #[diagnostic(
        code(natsync::invalid_setting),
        help("Fix it with: natsync config set <key> <value>")
    )]
    InvalidSetting { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(natsync::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(natsync::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(natsync::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Config(_) | Self::InvalidSetting { .. } => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }
            CoreError::Disconnected { reason } => CliError::Disconnected { reason },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::CommandFailed { command, message } => {
                CliError::CommandFailed { command, message }
            }
            CoreError::Protocol { message } => CliError::Protocol { message },
            CoreError::Config { message } => CliError::InvalidSetting { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
