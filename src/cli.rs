use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ephem")]
#[command(about = "Ephemeral Service - Throwaway database servers for tests")]
pub struct Cli {
    /// Config file path (defaults to ephemeral.yaml, searched upward)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a PostgreSQL instance and keep it running until Ctrl-C
    Run {
        /// Listening port (defaults to a free ephemeral port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for data, sockets and logs (kept on exit).
        /// Defaults to a temp directory that is removed on exit.
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Clone this pre-initialized data directory instead of running initdb
        #[arg(long)]
        copy_data_from: Option<PathBuf>,

        /// Database created after startup
        #[arg(short, long)]
        database: Option<String>,

        /// Print connection details as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which initdb and postgres executables would be used
    Which,
}
