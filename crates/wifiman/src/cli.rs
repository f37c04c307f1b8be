//! Clap derive structures for the `wifiman` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wifiman -- scan, connect and keep WiFi passwords in an encrypted vault
#[derive(Debug, Parser)]
#[command(
    name = "wifiman",
    version,
    about = "Manage WiFi networks and saved passwords from the command line",
    long_about = "Scan for wireless networks, connect and disconnect, mark favorites,\n\
        and keep network passwords in a local encrypted vault.\n\n\
        `wifiman serve` exposes the same operations as JSON lines on stdin/stdout.",
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
    /// Config file to use instead of the platform default
    #[arg(long, env = "WIFIMAN_CONFIG", global = true, hide_env = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WIFIMAN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Connect timeout in seconds (overrides config)
    #[arg(long, env = "WIFIMAN_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan, list, connect to and favorite networks
    #[command(alias = "net", alias = "n")]
    Networks(NetworksArgs),

    /// Manage saved network passwords
    #[command(alias = "pw")]
    Password(PasswordArgs),

    /// Show scan, link and vault status
    Status,

    /// Serve JSON-line requests on stdin, responses on stdout
    Serve(ServeArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Networks ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NetworksArgs {
    #[command(subcommand)]
    pub command: NetworksCommand,
}

#[derive(Debug, Subcommand)]
pub enum NetworksCommand {
    /// Run a fresh scan and list the result
    Scan,

    /// List the catalog, strongest signal first
    #[command(alias = "ls")]
    List {
        /// Only favorites
        #[arg(long, short = 'f')]
        favorites: bool,
    },

    /// Show one network
    Get {
        /// Network name (SSID)
        ssid: String,
    },

    /// Connect to a network, saving the password on success
    Connect {
        /// Network name (SSID)
        ssid: String,

        /// Password to use (stored in the vault once the connection succeeds)
        #[arg(long, short = 'p', conflicts_with = "ask")]
        password: Option<String>,

        /// Prompt for the password without echo
        #[arg(long)]
        ask: bool,
    },

    /// Disconnect from a network
    Disconnect {
        /// Network name (SSID)
        ssid: String,
    },

    /// Mark or unmark a network as favorite
    #[command(alias = "fav")]
    Favorite {
        /// Network name (SSID)
        ssid: String,

        /// Remove the favorite mark instead of setting it
        #[arg(long, conflicts_with = "toggle")]
        off: bool,

        /// Flip the current favorite mark
        #[arg(long)]
        toggle: bool,
    },
}

// ── Password ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PasswordArgs {
    #[command(subcommand)]
    pub command: PasswordCommand,
}

#[derive(Debug, Subcommand)]
pub enum PasswordCommand {
    /// Save or replace the password for a network
    #[command(alias = "set")]
    Save {
        /// Network name (SSID)
        ssid: String,

        /// Password (prompted without echo when omitted)
        #[arg(long, short = 'p')]
        password: Option<String>,
    },

    /// Print the saved password for a network
    Get {
        /// Network name (SSID)
        ssid: String,
    },

    /// Delete the saved password for a network
    #[command(alias = "rm")]
    Delete {
        /// Network name (SSID)
        ssid: String,
    },

    /// List networks with a saved password (never prints secrets)
    #[command(alias = "ls")]
    List,

    /// Decrypt every entry once and report unreadable ones
    Audit,
}

// ── Serve ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Interleave service events with responses
    #[arg(long)]
    pub events: bool,

    /// Reconnect to favorite networks with a saved password after scans
    #[arg(long)]
    pub auto_reconnect: bool,

    /// Periodic scan interval in seconds (0 disables)
    #[arg(long)]
    pub scan_interval: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create the config file with guided setup
    Init,

    /// Display the resolved configuration
    Show,

    /// Print the config, vault and key locations
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
