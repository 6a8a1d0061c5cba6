mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use ephemeral_service::{Error as EphemeralError, Parser as ConfigParser};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<EphemeralError>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ConfigParser::new().load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            port,
            base_dir,
            copy_data_from,
            database,
            json,
        } => {
            let options = commands::RunOptions {
                port,
                base_dir,
                copy_data_from,
                database,
                json,
            };
            commands::run_server(config, options, &output::CliOutput).await
        }
        Commands::Which => commands::run_which(&config, &output::CliOutput),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
