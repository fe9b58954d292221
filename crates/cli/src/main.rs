mod cli;
mod commands;
mod logging;

use std::process;

use clap::Parser;
use tracing::error;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::execute(&cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
