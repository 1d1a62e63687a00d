//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Development loop: watch, rebuild, restart, reload browsers
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch a project, rebuild and restart it on change
    #[command(visible_alias = "r")]
    Run {
        /// Port for the status page and live reload endpoints
        #[arg(short, long)]
        port: Option<u16>,

        /// Project root (default: current directory)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: Option<PathBuf>,
    },

    /// Print a random alphanumeric string
    Secret {
        /// Number of characters
        #[arg(short, long, default_value_t = 64)]
        length: usize,
    },
}
