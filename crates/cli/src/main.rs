// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Init, Replay, Version};

use bucket_ledger::logging::init_logging;
use bucket_ledger::AppState;
use tracing::level_filters::LevelFilter;

command_enum! {
    (Init, Init),
    (Replay, Replay),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log level: config file when initialized, otherwise info
    let level = AppState::load(args.config_path.clone())
        .ok()
        .and_then(|state| state.config.level_filter().ok())
        .unwrap_or(LevelFilter::INFO);
    init_logging(level);

    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
