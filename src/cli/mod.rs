//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Galaxy panel - capture, archive and state tooling for the Galaxy Engine.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "gpanel", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "GPANEL_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose output (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, short = 'c', global = true, env = "GPANEL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert colors to and from the engine's packed form
    #[command(subcommand)]
    Color(ColorCommand),

    /// Build tar archives
    #[command(subcommand)]
    Archive(ArchiveCommand),

    /// Run frame captures
    #[command(subcommand)]
    Capture(CaptureCommand),

    /// Inspect and manage the persisted panel state
    #[command(subcommand)]
    State(StateCommand),

    /// Manage the saved scene library
    #[command(subcommand)]
    Scenes(ScenesCommand),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum ColorCommand {
    /// Pack components into a u32
    Pack {
        r: u8,
        g: u8,
        b: u8,
        /// Alpha (defaults to opaque)
        #[arg(default_value_t = 255)]
        a: u8,
    },
    /// Unpack a u32 (decimal or 0x-prefixed hex)
    Unpack {
        #[arg(value_parser = parse_packed)]
        value: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum ArchiveCommand {
    /// Pack files into a ustar archive
    Pack {
        /// Files to include, stored under their file names
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output archive path
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Modification time for every entry (seconds since the epoch)
        #[arg(long)]
        mtime: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CaptureCommand {
    /// Capture an animated test surface into a frame archive
    Demo(CaptureDemoArgs),
}

#[derive(Parser, Debug)]
pub struct CaptureDemoArgs {
    /// Capture length in seconds
    #[arg(long, short = 's', default_value_t = 2.0)]
    pub seconds: f64,

    /// Frames per second (defaults to the configured rate)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Surface width in pixels
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = 180)]
    pub height: u32,

    /// Directory for the archive (defaults to the configured output dir)
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Show the state the panel would start with
    Show,
    /// Reset to the saved defaults (or built-in values)
    Reset,
    /// Save the current state as the defaults
    Promote,
    /// Forget the saved defaults
    ClearDefaults,
}

#[derive(Subcommand, Debug)]
pub enum ScenesCommand {
    /// List saved scenes
    List,
    /// Delete a saved scene
    Delete { id: String },
    /// Rename a saved scene
    Rename { id: String, name: String },
    /// Drop stale catalog rows and orphaned scene blobs
    Prune,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write a default configuration file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_packed(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("'{s}' is not a u32: {e}"))
}
