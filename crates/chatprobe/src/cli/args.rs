use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chatprobe_core::config::ConfigOverrides;

/// Plays scripted conversations against dialogue agents and reports which ones went wrong.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./.chatprobe/config.toml or the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the dialogue platform
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a timestamped file in this directory
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run test batches found under a directory
    Batch {
        /// Directory holding app folders with `app.yaml` and `tests/`
        path: PathBuf,
        /// Only run batches with this name, or whose path matches this `*` pattern (repeatable)
        #[arg(short = 'n', long = "name", value_name = "NAME")]
        names: Vec<String>,
        /// Save every run result under this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of batches run side by side
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Print the conversations as they happen
        #[arg(short, long)]
        show_chat: bool,
    },
    /// List the batches found under a directory
    List {
        path: PathBuf,
        #[arg(short = 'n', long = "name", value_name = "NAME")]
        names: Vec<String>,
    },
    /// Chat with an application's agent from the terminal
    Chat {
        app_id: String,
        /// Session language, e.g. it-IT
        #[arg(short, long)]
        language: Option<String>,
    },
}

impl Cli {
    /// Config values given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            base_url: self.base_url.clone(),
            log_dir: self.log_dir.clone(),
            ..ConfigOverrides::default()
        };
        match &self.command {
            Commands::Batch {
                output,
                concurrency,
                ..
            } => {
                overrides.output_dir = output.clone();
                overrides.concurrency = *concurrency;
            }
            Commands::Chat { language, .. } => {
                overrides.language = language.clone();
            }
            Commands::List { .. } => {}
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_flags_become_overrides() {
        let cli = Cli::parse_from([
            "chatprobe",
            "batch",
            "apps",
            "-n",
            "ticket",
            "-n",
            "*hours*",
            "-o",
            "out",
            "-c",
            "3",
            "-s",
        ]);

        assert!(matches!(
            &cli.command,
            Commands::Batch { names, show_chat: true, .. } if names == &["ticket", "*hours*"]
        ));

        let overrides = cli.overrides();
        assert_eq!(overrides.output_dir, Some(PathBuf::from("out")));
        assert_eq!(overrides.concurrency, Some(3));
        assert!(overrides.language.is_none());
    }

    #[test]
    fn chat_language_becomes_override() {
        let cli = Cli::parse_from(["chatprobe", "--verbose", "chat", "poa", "-l", "it-IT"]);
        assert!(cli.verbose);
        assert_eq!(cli.overrides().language.as_deref(), Some("it-IT"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["chatprobe", "list", "apps", "--base-url", "http://x"]);
        assert_eq!(cli.overrides().base_url.as_deref(), Some("http://x"));
    }
}
