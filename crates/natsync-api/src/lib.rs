//! Async client for the MikroTik RouterOS binary API.
//!
//! Layered bottom-up:
//!
//! - **[`codec`]**: length-prefixed words as a `tokio_util` codec.
//! - **[`sentence`]**: groups words into reply sentences.
//! - **[`command`]**: request builder and the aggregated [`CommandResult`].
//! - **[`Session`]**: one connection: connect, login (plain or MD5
//!   challenge), then strictly sequential command exchanges.
//! - **[`nat`]**: the firewall NAT endpoints used for port forwarding.

mod auth;
pub mod codec;
pub mod command;
pub mod error;
pub mod nat;
pub mod sentence;
pub mod session;

pub use auth::challenge_response;
pub use codec::{WordCodec, decode_length, encode_length};
pub use command::{Command, CommandResult, Status};
pub use error::Error;
pub use nat::{DstNatRule, NatRuleSummary, Protocol, RuleFilter};
pub use sentence::{Attributes, Reply, Sentence, SentenceFramer, TrapCategory};
pub use session::{DEFAULT_PORT, LoginMethod, Session, SessionOptions, SessionState};
