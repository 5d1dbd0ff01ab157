// NAT rule endpoints
//
// Only what port-forward reconciliation needs: add a dst-nat rule, look
// rules up by comment, and remove them by `.id`.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::command::Command;
use crate::error::Error;
use crate::sentence::Attributes;
use crate::session::Session;

pub const NAT_ADD: &str = "/ip/firewall/nat/add";
pub const NAT_PRINT: &str = "/ip/firewall/nat/print";
pub const NAT_REMOVE: &str = "/ip/firewall/nat/remove";

/// Transport protocol of a forwarding rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

// ── Rule creation ────────────────────────────────────────────────────

/// A dst-nat rule forwarding `dst_port` on `in_interface` to
/// `to_address:to_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DstNatRule {
    pub protocol: Protocol,
    pub dst_port: u16,
    pub in_interface: String,
    pub to_address: String,
    pub to_port: u16,
    pub comment: String,
}

impl DstNatRule {
    pub fn to_command(&self) -> Command {
        Command::new(NAT_ADD)
            .attr("chain", "dstnat")
            .attr("action", "dst-nat")
            .attr("to-addresses", &self.to_address)
            .attr("to-ports", self.to_port)
            .attr("protocol", self.protocol)
            .attr("dst-port", self.dst_port)
            .attr("in-interface", &self.in_interface)
            .attr("comment", &self.comment)
    }
}

// ── Rule lookup ──────────────────────────────────────────────────────

/// Which rules a lookup should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    /// Every NAT rule.
    All,
    /// Rules whose comment equals the string exactly.
    CommentEquals(String),
    /// Rules whose comment matches the (POSIX) regular expression.
    CommentMatches(String),
}

impl RuleFilter {
    fn apply(&self, cmd: Command) -> Command {
        match self {
            Self::All => cmd,
            Self::CommentEquals(comment) => cmd.query("comment", comment),
            Self::CommentMatches(pattern) => cmd.query_regex("comment", pattern),
        }
    }
}

/// The fields of a NAT rule worth showing an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NatRuleSummary {
    pub id: String,
    pub comment: Option<String>,
    pub protocol: Option<String>,
    pub dst_port: Option<String>,
    pub in_interface: Option<String>,
    pub to_addresses: Option<String>,
    pub to_ports: Option<String>,
    pub disabled: bool,
}

impl NatRuleSummary {
    const FIELDS: &'static [&'static str] = &[
        ".id",
        "comment",
        "protocol",
        "dst-port",
        "in-interface",
        "to-addresses",
        "to-ports",
        "disabled",
    ];

    fn from_row(row: &Attributes) -> Option<Self> {
        let field = |key: &str| row.get(key).cloned();
        Some(Self {
            id: row.get(".id")?.clone(),
            comment: field("comment"),
            protocol: field("protocol"),
            dst_port: field("dst-port"),
            in_interface: field("in-interface"),
            to_addresses: field("to-addresses"),
            to_ports: field("to-ports"),
            disabled: row.get("disabled").is_some_and(|v| v == "true"),
        })
    }
}

// ── Session endpoints ────────────────────────────────────────────────

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a dst-nat rule. Returns the router-assigned `.id`, if sent.
    pub async fn add_nat_rule(&mut self, rule: &DstNatRule) -> Result<Option<String>, Error> {
        let result = self
            .execute(&rule.to_command())
            .await?
            .into_result(NAT_ADD)?;
        let id = result.ret().map(str::to_owned);
        debug!(protocol = %rule.protocol, port = rule.dst_port, id = ?id, "nat rule added");
        Ok(id)
    }

    /// Return the `.id` of every NAT rule the filter selects.
    pub async fn find_nat_rule_ids(&mut self, filter: &RuleFilter) -> Result<Vec<String>, Error> {
        let cmd = filter.apply(Command::new(NAT_PRINT)).proplist(&[".id"]);
        let result = self.execute(&cmd).await?.into_result(NAT_PRINT)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get(".id").cloned())
            .collect())
    }

    /// Return `(.id, comment)` for every commented NAT rule the filter
    /// selects.
    pub async fn list_nat_comments(
        &mut self,
        filter: &RuleFilter,
    ) -> Result<Vec<(String, String)>, Error> {
        let cmd = filter
            .apply(Command::new(NAT_PRINT))
            .proplist(&[".id", "comment"]);
        let result = self.execute(&cmd).await?.into_result(NAT_PRINT)?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|mut row| Some((row.remove(".id")?, row.remove("comment")?)))
            .collect())
    }

    /// Return a summary of every NAT rule the filter selects.
    pub async fn list_nat_rules(
        &mut self,
        filter: &RuleFilter,
    ) -> Result<Vec<NatRuleSummary>, Error> {
        let cmd = filter
            .apply(Command::new(NAT_PRINT))
            .proplist(NatRuleSummary::FIELDS);
        let result = self.execute(&cmd).await?.into_result(NAT_PRINT)?;
        Ok(result
            .rows
            .iter()
            .filter_map(NatRuleSummary::from_row)
            .collect())
    }

    /// Delete one NAT rule by `.id`.
    pub async fn remove_nat_rule(&mut self, id: &str) -> Result<(), Error> {
        let cmd = Command::new(NAT_REMOVE).attr(".id", id);
        self.execute(&cmd).await?.into_result(NAT_REMOVE)?;
        debug!(id, "nat rule removed");
        Ok(())
    }
}
