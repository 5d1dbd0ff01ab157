//! Keeps router-side NAT port forwards in step with an allocation registry.
//!
//! - **[`Reconciler`]**: opens one [`natsync_api::Session`] per operation,
//!   adds the TCP + UDP dst-nat pair for an allocation, or finds and deletes
//!   rules by comment tag. Returns a [`ReconcileReport`] or a [`CoreError`].
//!
//! - **[`LifecycleHooks`]**: the entry points a hosting application calls
//!   on server / allocation events. They never fail outward: missing
//!   configuration is a silent no-op and every error is logged.
//!
//! - **[`tag`]**: the `"Pelican: <uuid> [<port>]"` comment convention that
//!   is the only link between a local entity and its remote rules.
//!
//! - **[`config`]**: the [`ConfigProvider`] capability and the resolved
//!   [`RouterSettings`].

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod reconcile;
pub mod tag;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ConfigProvider, EnvProvider, RouterSettings};
pub use error::CoreError;
pub use lifecycle::LifecycleHooks;
pub use model::{Allocation, LifecycleAction, Server};
pub use reconcile::{ReconcileReport, Reconciler};
pub use tag::Scope;
