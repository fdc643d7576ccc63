use clap::Parser;
use eyre::Result;

use chatprobe::cli::{Cli, Commands};
use chatprobe::commands::{
    Command, batch::BatchCommand, chat::ChatCommand, list::ListCommand,
};
use chatprobe_core::utils::{TracingOptions, init_tracing};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre for better error reports
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load .env file if it exists, before the environment is read for config
    chatprobe::cli::config::load_env()?;

    let config = chatprobe::load_config(&cli)?;

    let log_file = init_tracing(&TracingOptions {
        verbose: cli.verbose,
        log_dir: config.log_dir.clone(),
    })?;
    if let Some(path) = log_file {
        debug!(target: "chatprobe", path = %path.display(), "Logging to file");
    }
    debug!(target: "chatprobe", base_url = %config.base_url, concurrency = config.concurrency, "Configuration loaded");

    match cli.command {
        Commands::Batch {
            path,
            names,
            show_chat,
            ..
        } => {
            BatchCommand {
                path,
                names,
                show_chat,
                config,
            }
            .execute()
            .await
        }
        Commands::List { path, names } => ListCommand { path, names }.execute().await,
        Commands::Chat { app_id, .. } => ChatCommand { app_id, config }.execute().await,
    }
}
