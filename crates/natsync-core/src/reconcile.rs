// ── Reconciliation engine ──
//
// One operation = one session: connect, log in, issue the commands, close.
// Nothing is cached between operations; the router's rule table filtered
// by comment tag is the only state.
//
// Failure policy inside an operation:
//   - a trap on one rule add/remove is logged and counted, the rest go on
//   - a trap on the listing command counts as one failure (nothing to delete)
//   - a server-scope regex lookup that finds nothing or is rejected is
//     repeated as a plain comment listing filtered locally
//   - connection, auth and framing errors abort the operation

use natsync_api::{DstNatRule, NatRuleSummary, Protocol, RuleFilter, Session};
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::config::RouterSettings;
use crate::error::CoreError;
use crate::model::{Allocation, LifecycleAction, Server};
use crate::tag::{Scope, allocation_tag};

/// What one operation changed on the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rules added.
    pub created: usize,
    /// Rules deleted.
    pub removed: usize,
    /// Commands the router rejected.
    pub failed: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Drives rule changes against one configured router.
#[derive(Debug, Clone)]
pub struct Reconciler {
    settings: RouterSettings,
}

impl Reconciler {
    pub fn new(settings: RouterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// The TCP + UDP rule pair forwarding `allocation` under `server`.
    pub fn rules_for(&self, server: &str, allocation: &Allocation) -> Vec<DstNatRule> {
        Protocol::iter()
            .map(|protocol| DstNatRule {
                protocol,
                dst_port: allocation.port,
                in_interface: self.settings.interface.clone(),
                to_address: allocation.address.to_string(),
                to_port: allocation.port,
                comment: allocation_tag(server, allocation.port),
            })
            .collect()
    }

    // ── Public operations ────────────────────────────────────────────

    /// Forward (or stop forwarding) one allocation of `server`.
    pub async fn reconcile_allocation(
        &self,
        allocation: &Allocation,
        server: &Server,
        action: LifecycleAction,
    ) -> Result<ReconcileReport, CoreError> {
        let mut session = self.open().await?;
        let mut report = ReconcileReport::default();
        let outcome = match action {
            LifecycleAction::Add => {
                self.add_allocation(&mut session, &server.uuid, allocation, &mut report)
                    .await
            }
            LifecycleAction::Remove => {
                let scope = Scope::Allocation {
                    server: &server.uuid,
                    port: allocation.port,
                };
                self.remove_scope(&mut session, scope, &mut report).await
            }
        };
        session.close().await;
        outcome.map(|()| report)
    }

    /// Forward every allocation of `server`, or remove all of its rules.
    ///
    /// Removal matches on the server tag, so it also finds rules of
    /// allocations the caller no longer knows about.
    pub async fn reconcile_server(
        &self,
        server: &Server,
        action: LifecycleAction,
    ) -> Result<ReconcileReport, CoreError> {
        let mut session = self.open().await?;
        let mut report = ReconcileReport::default();
        let outcome = match action {
            LifecycleAction::Add => {
                self.add_server(&mut session, server, &mut report).await
            }
            LifecycleAction::Remove => {
                self.remove_scope(&mut session, Scope::Server(&server.uuid), &mut report)
                    .await
            }
        };
        session.close().await;
        outcome.map(|()| report)
    }

    /// Move `allocation` from one server to another: drop the old pair,
    /// then add the new one, over a single session.
    pub async fn reassign_allocation(
        &self,
        allocation: &Allocation,
        from: &Server,
        to: &Server,
    ) -> Result<ReconcileReport, CoreError> {
        let mut session = self.open().await?;
        let mut report = ReconcileReport::default();
        let old = Scope::Allocation {
            server: &from.uuid,
            port: allocation.port,
        };
        let mut outcome = self.remove_scope(&mut session, old, &mut report).await;
        if outcome.is_ok() {
            outcome = self
                .add_allocation(&mut session, &to.uuid, allocation, &mut report)
                .await;
        }
        session.close().await;
        outcome.map(|()| report)
    }

    /// List rules in `scope`, or every NAT rule when `None`.
    pub async fn list_rules(
        &self,
        scope: Option<Scope<'_>>,
    ) -> Result<Vec<NatRuleSummary>, CoreError> {
        let filter = scope.map_or(natsync_api::RuleFilter::All, |s| s.filter());
        let mut session = self.open().await?;
        let outcome = session.list_nat_rules(&filter).await;
        session.close().await;
        Ok(outcome?)
    }

    // ── Steps ────────────────────────────────────────────────────────

    async fn open(&self) -> Result<Session, CoreError> {
        let settings = &self.settings;
        debug!(address = %settings.address, "opening router session");
        Ok(Session::open(
            settings.address.as_str(),
            settings.session.clone(),
            &settings.username,
            &settings.password,
        )
        .await?)
    }

    async fn add_server(
        &self,
        session: &mut Session,
        server: &Server,
        report: &mut ReconcileReport,
    ) -> Result<(), CoreError> {
        for allocation in &server.allocations {
            self.add_allocation(session, &server.uuid, allocation, report)
                .await?;
        }
        Ok(())
    }

    async fn add_allocation(
        &self,
        session: &mut Session,
        server: &str,
        allocation: &Allocation,
        report: &mut ReconcileReport,
    ) -> Result<(), CoreError> {
        let before = report.created;
        for rule in self.rules_for(server, allocation) {
            match session.add_nat_rule(&rule).await {
                Ok(id) => {
                    report.created += 1;
                    debug!(server, port = allocation.port, protocol = %rule.protocol, id = ?id, "rule created");
                }
                Err(e) if e.is_command() => {
                    report.failed += 1;
                    warn!(server, port = allocation.port, protocol = %rule.protocol, error = %e, "router rejected rule");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(server, %allocation, created = report.created - before, "port forward added");
        Ok(())
    }

    async fn remove_scope(
        &self,
        session: &mut Session,
        scope: Scope<'_>,
        report: &mut ReconcileReport,
    ) -> Result<(), CoreError> {
        let before = report.removed;
        let ids = match scoped_ids(session, scope).await {
            Ok(ids) => ids,
            Err(e) if e.is_command() => {
                report.failed += 1;
                warn!(tag = %scope.tag(), error = %e, "router rejected rule lookup");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        debug!(tag = %scope.tag(), matched = ids.len(), "rules matched");

        for id in &ids {
            match session.remove_nat_rule(id).await {
                Ok(()) => report.removed += 1,
                Err(e) if e.is_command() => {
                    report.failed += 1;
                    warn!(tag = %scope.tag(), id, error = %e, "router rejected rule removal");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(tag = %scope.tag(), removed = report.removed - before, "port forwards removed");
        Ok(())
    }
}

/// `.id` of every rule in `scope`.
///
/// Not every firmware honours the `?~` regex query word. When a
/// server-scope lookup comes back empty or trapped, list `.id` + `comment`
/// for the whole table and apply [`Scope::matches`] locally.
async fn scoped_ids(
    session: &mut Session,
    scope: Scope<'_>,
) -> Result<Vec<String>, natsync_api::Error> {
    let server_scope = matches!(scope, Scope::Server(_));
    match session.find_nat_rule_ids(&scope.filter()).await {
        Ok(ids) if !(server_scope && ids.is_empty()) => return Ok(ids),
        Err(e) if !(server_scope && e.is_command()) => return Err(e),
        Ok(_) => debug!(tag = %scope.tag(), "regex lookup matched nothing; filtering locally"),
        Err(e) => debug!(tag = %scope.tag(), error = %e, "regex lookup rejected; filtering locally"),
    }

    let rows = session.list_nat_comments(&RuleFilter::All).await?;
    Ok(rows
        .into_iter()
        .filter(|(_, comment)| scope.matches(comment))
        .map(|(id, _)| id)
        .collect())
}
