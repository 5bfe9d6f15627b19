//! Clap derive structures for the `devlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devlink -- render and simulate DeviceLink reconciliation
#[derive(Debug, Parser)]
#[command(
    name = "devlink",
    version,
    about = "Render and simulate DeviceLink reconciliation",
    long_about = "Work with DeviceLink manifests offline.\n\n\
        `render` shows the device a link declares, `simulate` runs admission\n\
        and the reconciler against in-memory collaborators and reports every pass.",
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
    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, env = "DEVLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Node this controller acts as (overrides config)
    #[arg(long, short = 'n', env = "DEVLINK_NODE", global = true)]
    pub node: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DEVLINK_OUTPUT",
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
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, ValueEnum)]
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
    /// Print the device a DeviceLink manifest declares
    Render(RenderArgs),

    /// Run admission and reconciliation passes against in-memory collaborators
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Render ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// DeviceLink manifest (YAML or JSON)
    pub manifest: PathBuf,
}

// ── Simulate ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// DeviceLink manifest (YAML or JSON)
    pub manifest: PathBuf,

    /// Adaptor to register with the bridge (repeatable; defaults to the
    /// adaptor the manifest declares)
    #[arg(long = "adaptor", short = 'a', value_name = "NAME")]
    pub adaptors: Vec<String>,

    /// Leave the device model unregistered in the store
    #[arg(long)]
    pub no_model: bool,

    /// Stop after this many passes if the link has not settled
    #[arg(long, default_value = "12", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_passes: u32,

    /// Make the first connect attempt fail
    #[arg(long)]
    pub fail_connect: bool,

    /// Delete the link after it settles and run the finalizer cleanup
    #[arg(long)]
    pub delete: bool,

    /// Let the dispatcher's worker pool drive the link, using the
    /// configured workers and requeue delays
    #[arg(long)]
    pub dispatch: bool,

    /// How long --dispatch waits for the link to settle
    #[arg(long, value_name = "MS", default_value = "5000", requires = "dispatch")]
    pub wait_ms: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with defaults
    Init {
        /// Node name to store in the new config
        #[arg(long)]
        node_name: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
