pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bucket-ledger")]
#[command(about = "Replay bucket operation scripts against an in-memory ledger")]
pub struct Args {
    /// Path to the state directory (defaults to ~/.bucket-ledger)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
