mod batch;
mod cli;
mod client;
mod commands;
mod constants;
mod timefmt;

use clap::Parser;
use cli::{Cli, Commands};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => commands::fetch::execute(args).await,
        Commands::Filter(args) => commands::filter::execute(args),
        Commands::Prettify(args) => commands::prettify::execute(args),
    }
}
