//! Clap derive structures for the `natsync` CLI.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use natsync_core::Allocation;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// natsync -- keep MikroTik port forwards in step with game-server allocations
#[derive(Debug, Parser)]
#[command(
    name = "natsync",
    version,
    about = "Sync game-server port forwards to a MikroTik router",
    long_about = "Adds and removes dst-nat rules on a RouterOS device over its API.\n\n\
        Rules are tagged \"Pelican: <server> <port>\" in their comment; that tag is\n\
        the only link between a server and its rules, nothing is stored locally.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: platform config dir)
    #[arg(long, env = "NATSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Never read or write the OS keyring
    #[arg(long, env = "NATSYNC_NO_KEYRING", global = true)]
    pub no_keyring: bool,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// One value per line, for scripting
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forward, unforward or move a single allocation
    #[command(alias = "alloc", alias = "a")]
    Allocation(AllocationArgs),

    /// Forward or unforward every allocation of a server
    #[command(alias = "srv", alias = "s")]
    Server(ServerArgs),

    /// List NAT rules on the router
    Rules(RulesArgs),

    /// Show and edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ALLOCATION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AllocationArgs {
    #[command(subcommand)]
    pub command: AllocationCommand,
}

#[derive(Debug, Args)]
pub struct AllocationTarget {
    /// Owning server UUID
    #[arg(long)]
    pub server: String,

    /// Address the game server listens on
    #[arg(long)]
    pub address: IpAddr,

    /// Allocation port (forwarded 1:1)
    #[arg(long)]
    pub port: u16,
}

impl AllocationTarget {
    pub fn allocation(&self) -> Allocation {
        Allocation::new(self.address, self.port)
    }
}

#[derive(Debug, Subcommand)]
pub enum AllocationCommand {
    /// Create the TCP + UDP forward for an allocation
    Add(AllocationTarget),

    /// Delete the forwards of an allocation
    #[command(alias = "rm")]
    Remove(AllocationTarget),

    /// Re-tag an allocation's forwards for a new owning server
    #[command(alias = "mv")]
    Move {
        /// Previous owner
        #[arg(long)]
        from: String,

        /// New owner
        #[arg(long)]
        to: String,

        #[arg(long)]
        address: IpAddr,

        #[arg(long)]
        port: u16,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SERVER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Forward every allocation of a server
    Add {
        /// Server UUID
        #[arg(long)]
        server: String,

        /// Allocation as ip:port (repeatable)
        #[arg(long = "allocation", short = 'a', value_name = "IP:PORT")]
        allocations: Vec<Allocation>,
    },

    /// Delete every forward tagged for a server
    #[command(alias = "rm")]
    Remove {
        /// Server UUID
        #[arg(long)]
        server: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RULES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RulesArgs {
    /// Only rules tagged for this server
    #[arg(long)]
    pub server: Option<String>,

    /// Only the allocation on this port (needs --server)
    #[arg(long, requires = "server")]
    pub port: Option<u16>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (password redacted)
    Show,

    /// Print the config file path
    Path,

    /// Set a configuration value in the config file
    ///
    /// `pass` goes to the OS keyring unless --no-keyring is given.
    Set {
        /// ip, user, pass, interface, port, connect_timeout, read_timeout, login_method
        key: String,

        /// Value to set
        value: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
