use thiserror::Error;

use crate::sentence::TrapCategory;
use crate::session::SessionState;

/// Top-level error type for the `natsync-api` crate.
///
/// Covers every failure mode of a RouterOS API session: transport,
/// authentication, per-command traps, and wire framing. `natsync-core`
/// maps these into its own reconciliation-level categories.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect refused, unreachable, or DNS failure.
    #[error("Cannot connect to router at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not complete within the connect deadline.
    #[error("Connecting to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: String, timeout_ms: u64 },

    /// Read or write failure on an established connection.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The router closed the connection mid-exchange.
    #[error("Connection closed by router")]
    ConnectionClosed,

    /// No word arrived within the read deadline.
    #[error("No reply from router within {timeout_ms}ms")]
    ReadTimeout { timeout_ms: u64 },

    /// `!fatal` reply: the router is tearing the session down.
    #[error("Router closed the session: {message}")]
    Fatal { message: String },

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (trap during the handshake, bad challenge, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Command ─────────────────────────────────────────────────────
    /// A single command ended in `!trap`. The session stays usable.
    #[error("Command {command} failed: {message}")]
    Trap {
        command: String,
        message: String,
        category: Option<TrapCategory>,
    },

    // ── Framing ─────────────────────────────────────────────────────
    /// Length prefix started with a reserved control byte (`0xF8..=0xFF`).
    #[error("Framing error: reserved control byte {0:#04x} in length prefix")]
    ReservedControlByte(u8),

    /// Length prefix announced a word larger than the configured limit.
    #[error("Framing error: word of {len} bytes exceeds limit of {max} bytes")]
    OversizedWord { len: usize, max: usize },

    /// Reply carried a `.tag` belonging to some other command.
    #[error("Framing error: expected reply tag {expected}, got {got}")]
    TagMismatch { expected: String, got: String },

    /// Sentence without a recognised reply type inside a command exchange.
    #[error("Framing error: unexpected sentence {0:?}")]
    UnexpectedSentence(String),

    // ── Session state ───────────────────────────────────────────────
    /// Operation attempted while the session is in the wrong state.
    #[error("Session is not ready (state: {state})")]
    NotReady { state: SessionState },
}

impl Error {
    /// Returns `true` if the byte stream can no longer be trusted.
    ///
    /// Framing errors always end the session; nothing after them is read.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::ReservedControlByte(_)
                | Self::OversizedWord { .. }
                | Self::TagMismatch { .. }
                | Self::UnexpectedSentence(_)
        )
    }

    /// Returns `true` for login rejections.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the transport failed or could not be established.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectTimeout { .. }
                | Self::Io(_)
                | Self::ConnectionClosed
                | Self::ReadTimeout { .. }
                | Self::Fatal { .. }
        )
    }

    /// Returns `true` if only the one command failed and the session
    /// can carry on with the next one.
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }
}
