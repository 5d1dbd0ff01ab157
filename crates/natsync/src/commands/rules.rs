//! Rule listing.

use natsync_api::NatRuleSummary;
use natsync_core::Scope;
use tabled::Tabled;

use crate::cli::{GlobalOpts, RulesArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Proto")]
    protocol: String,
    #[tabled(rename = "Port")]
    dst_port: String,
    #[tabled(rename = "Interface")]
    in_interface: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Comment")]
    comment: String,
    #[tabled(rename = "Off")]
    disabled: String,
}

impl From<&NatRuleSummary> for RuleRow {
    fn from(r: &NatRuleSummary) -> Self {
        let to = match (&r.to_addresses, &r.to_ports) {
            (Some(addr), Some(port)) => format!("{addr}:{port}"),
            (Some(addr), None) => addr.clone(),
            (None, Some(port)) => format!(":{port}"),
            (None, None) => String::new(),
        };
        Self {
            id: r.id.clone(),
            protocol: r.protocol.clone().unwrap_or_default(),
            dst_port: r.dst_port.clone().unwrap_or_default(),
            in_interface: r.in_interface.clone().unwrap_or_default(),
            to,
            comment: r.comment.clone().unwrap_or_default(),
            disabled: if r.disabled { "yes".into() } else { String::new() },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: RulesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(reconciler) = super::reconciler(global)? else {
        return Ok(());
    };

    let scope = match (&args.server, args.port) {
        (Some(server), Some(port)) => Some(Scope::Allocation { server, port }),
        (Some(server), None) => Some(Scope::Server(server)),
        (None, _) => None,
    };
    let rules = reconciler.list_rules(scope).await?;

    let out = output::render_list(&global.output, &rules, |r| RuleRow::from(r), |r| r.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
