// ── Lifecycle entry points ──
//
// What a hosting application calls when servers and allocations come and
// go. These never return errors: a hosting transaction must not fail
// because the router is down. Outcomes go to the log.

use tracing::{debug, error, info, warn};

use crate::config::{ConfigProvider, RouterSettings};
use crate::error::CoreError;
use crate::model::{Allocation, LifecycleAction, Server};
use crate::reconcile::{ReconcileReport, Reconciler};

/// Lifecycle hooks bound to a configuration source.
///
/// Settings are resolved on every call, so edits to the underlying
/// configuration take effect on the next event without a restart.
#[derive(Debug, Clone)]
pub struct LifecycleHooks<P> {
    provider: P,
}

impl<P: ConfigProvider> LifecycleHooks<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Server created (`Add`) or deleting (`Remove`).
    pub async fn on_server_lifecycle(&self, server: &Server, action: LifecycleAction) {
        let Some(reconciler) = self.reconciler() else {
            return;
        };
        let outcome = reconciler.reconcile_server(server, action).await;
        log_outcome("server", &server.uuid, action, outcome);
    }

    /// Allocation created (`Add`) or deleting (`Remove`).
    pub async fn on_allocation_lifecycle(
        &self,
        allocation: &Allocation,
        server: &Server,
        action: LifecycleAction,
    ) {
        let Some(reconciler) = self.reconciler() else {
            return;
        };
        let outcome = reconciler
            .reconcile_allocation(allocation, server, action)
            .await;
        log_outcome("allocation", &server.uuid, action, outcome);
    }

    /// Allocation updated with a different owning server.
    pub async fn on_allocation_reassigned(&self, allocation: &Allocation, from: &Server, to: &Server) {
        if from.uuid == to.uuid {
            debug!(server = %to.uuid, %allocation, "allocation owner unchanged, nothing to do");
            return;
        }
        let Some(reconciler) = self.reconciler() else {
            return;
        };
        let outcome = reconciler.reassign_allocation(allocation, from, to).await;
        match outcome {
            Ok(report) => log_report("reassign", &to.uuid, report),
            Err(e) => log_error("reassign", &to.uuid, &e),
        }
    }

    /// A reconciler for the current settings, or `None` when the router is
    /// not configured (or configured badly, which is logged).
    fn reconciler(&self) -> Option<Reconciler> {
        match RouterSettings::resolve(&self.provider) {
            Ok(Some(settings)) => Some(Reconciler::new(settings)),
            Ok(None) => {
                debug!("router not configured, skipping");
                None
            }
            Err(e) => {
                error!(error = %e, "router configuration invalid, skipping");
                None
            }
        }
    }
}

fn log_outcome(
    scope: &str,
    server: &str,
    action: LifecycleAction,
    outcome: Result<ReconcileReport, CoreError>,
) {
    let operation = format!("{scope} {action}");
    match outcome {
        Ok(report) => log_report(&operation, server, report),
        Err(e) => log_error(&operation, server, &e),
    }
}

fn log_report(operation: &str, server: &str, report: ReconcileReport) {
    if report.is_clean() {
        info!(
            operation,
            server,
            created = report.created,
            removed = report.removed,
            "router updated"
        );
    } else {
        warn!(
            operation,
            server,
            created = report.created,
            removed = report.removed,
            failed = report.failed,
            "router partially updated"
        );
    }
}

fn log_error(operation: &str, server: &str, e: &CoreError) {
    error!(operation, server, error = %e, "router update failed");
}
