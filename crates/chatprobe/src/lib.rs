#![expect(clippy::print_stdout)]

pub mod cli;
pub mod commands;

pub use chatprobe_core::{batch, chat, config, orchestrator, platform, steps, utils};

use std::sync::Arc;

use chatprobe_core::config::{ConfigLoader, ProbeConfig};
use chatprobe_core::platform::http::HttpPlatform;
use chatprobe_core::platform::Platform;
use eyre::{Result, WrapErr};

use crate::cli::Cli;

/// Resolves the configuration for this invocation: file, environment, then flags.
pub fn load_config(cli: &Cli) -> Result<ProbeConfig> {
    ConfigLoader::new(cli.config.clone())
        .with_overrides(cli.overrides())
        .load()
        .wrap_err("Failed to load configuration")
}

pub fn connect_platform(config: &ProbeConfig) -> Result<Arc<dyn Platform>> {
    let platform = HttpPlatform::new(config.base_url.clone(), config.token.clone())
        .wrap_err_with(|| format!("Failed to create client for {}", config.base_url))?;
    Ok(Arc::new(platform))
}
