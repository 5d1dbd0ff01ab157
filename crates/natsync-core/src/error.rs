// ── Core error types ──
//
// Reconciliation-level errors. Callers see one of a handful of categories
// (connection, timeout, authentication, command, protocol, config) rather
// than the individual wire failures; the `From<natsync_api::Error>` impl
// does the folding.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to router at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Router connection lost: {reason}")]
    Disconnected { reason: String },

    #[error("Router did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Router rejected {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if the router could not be reached or dropped the link.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } | Self::Timeout { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

// ── Conversion from session-layer errors ─────────────────────────────

impl From<natsync_api::Error> for CoreError {
    fn from(err: natsync_api::Error) -> Self {
        use natsync_api::Error as Api;

        match err {
            Api::Connect { address, source } => CoreError::ConnectionFailed {
                address,
                reason: source.to_string(),
            },
            Api::ConnectTimeout {
                address,
                timeout_ms,
            } => CoreError::ConnectionFailed {
                address,
                reason: format!("connect timed out after {timeout_ms}ms"),
            },
            Api::ReadTimeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            Api::Io(e) => CoreError::Disconnected {
                reason: e.to_string(),
            },
            Api::ConnectionClosed => CoreError::Disconnected {
                reason: "connection closed by router".into(),
            },
            Api::Fatal { message } => CoreError::Disconnected { reason: message },
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::Trap {
                command, message, ..
            } => CoreError::CommandFailed { command, message },
            e @ (Api::ReservedControlByte(_)
            | Api::OversizedWord { .. }
            | Api::TagMismatch { .. }
            | Api::UnexpectedSentence(_)) => CoreError::Protocol {
                message: e.to_string(),
            },
            Api::NotReady { state } => {
                CoreError::Internal(format!("session used while {state}"))
            }
        }
    }
}
