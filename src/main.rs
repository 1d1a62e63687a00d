//! devloop - development loop for server binaries.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use devloop::cli::{self, Cli, Commands};
use devloop::{core, log, logger};

fn main() {
    let args = Cli::parse();

    // Set global color override based on CLI option
    match args.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(args.verbose);

    if let Err(e) = dispatch(&args) {
        log!("error"; "{:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(args: &Cli) -> Result<()> {
    match &args.command {
        Commands::Secret { length } => cli::secret::print_secret(*length),
        Commands::Run { port, path } => {
            // Setup global Ctrl+C handler (before any blocking operations)
            let shutdown_rx = core::setup_shutdown_handler()?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(cli::run::run(*port, path.as_deref(), shutdown_rx))
        }
    }
}
