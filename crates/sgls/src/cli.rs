use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::args::GlobalArgs;
use crate::commands::Command;
use crate::commands::SglsCommand;
use crate::exit::Exit;

/// The main CLI structure that defines the command-line interface
#[derive(Parser)]
#[command(name = "sgls")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: SglsCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command
pub fn run(args: Vec<String>) -> Result<Exit> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    // The server installs its own subscriber that talks to the client.
    if !matches!(cli.command, SglsCommand::Serve(_)) {
        init_logging(&cli.args.global);
    }

    cli.command.execute(&cli.args)
}

fn init_logging(global: &GlobalArgs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(global.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
