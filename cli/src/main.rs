//! Entry point for the `fileshell` binary: a thin, non-interactive front end
//! over the console subsystem, mostly useful for exercising it from scripts
//! and for debugging backends.

use clap::Parser;

use fileshell_cli::Cli;
use fileshell_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    let cli = Cli::parse();
    run_main(cli).await
}
