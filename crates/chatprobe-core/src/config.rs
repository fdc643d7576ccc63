use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::chat::{DEFAULT_LANGUAGE, PollTiming};
use crate::utils::AppPaths;

pub const BASE_URL_ENV: &str = "CHATPROBE_BASE_URL";
pub const TOKEN_ENV: &str = "CHATPROBE_TOKEN";

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid base URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration as written in a TOML file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialProbeConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub language: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub polling: Option<PartialPollingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PartialPollingConfig {
    pub interval_ms: Option<u64>,
    pub idle_polls: Option<u32>,
    pub quiet_polls: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub idle_polls: u32,
    pub quiet_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let timing = PollTiming::default();
        Self {
            interval_ms: timing.interval.as_millis() as u64,
            idle_polls: timing.idle_polls,
            quiet_polls: timing.quiet_polls,
        }
    }
}

impl PollingConfig {
    pub fn timing(&self) -> PollTiming {
        PollTiming {
            interval: Duration::from_millis(self.interval_ms),
            idle_polls: self.idle_polls,
            quiet_polls: self.quiet_polls,
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub base_url: Url,
    pub token: Option<String>,
    /// Where run results are written. Nothing is written when unset.
    pub output_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub language: String,
    pub log_dir: Option<PathBuf>,
    pub polling: PollingConfig,
}

impl ProbeConfig {
    fn defaults() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            token: None,
            output_dir: None,
            concurrency: 1,
            language: DEFAULT_LANGUAGE.to_string(),
            log_dir: None,
            polling: PollingConfig::default(),
        })
    }

    fn apply(&mut self, partial: PartialProbeConfig) -> Result<(), ConfigError> {
        if let Some(base_url) = partial.base_url {
            self.base_url = Url::parse(&base_url)?;
        }
        if partial.token.is_some() {
            self.token = partial.token;
        }
        if partial.output_dir.is_some() {
            self.output_dir = partial.output_dir;
        }
        if let Some(concurrency) = partial.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(language) = partial.language {
            self.language = language;
        }
        if partial.log_dir.is_some() {
            self.log_dir = partial.log_dir;
        }
        if let Some(polling) = partial.polling {
            if let Some(interval_ms) = polling.interval_ms {
                self.polling.interval_ms = interval_ms;
            }
            if let Some(idle_polls) = polling.idle_polls {
                self.polling.idle_polls = idle_polls;
            }
            if let Some(quiet_polls) = polling.quiet_polls {
                self.polling.quiet_polls = quiet_polls;
            }
        }
        Ok(())
    }
}

/// Overrides that can be applied from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub language: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl From<ConfigOverrides> for PartialProbeConfig {
    fn from(overrides: ConfigOverrides) -> Self {
        Self {
            base_url: overrides.base_url,
            token: overrides.token,
            output_dir: overrides.output_dir,
            concurrency: overrides.concurrency,
            language: overrides.language,
            log_dir: overrides.log_dir,
            polling: None,
        }
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves [`ProbeConfig`] from defaults, a TOML file, the environment and
/// CLI overrides, later layers winning.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
    env: EnvLookup,
}

impl ConfigLoader {
    /// With no explicit path, `./.chatprobe/config.toml` or the user config
    /// file is used when present.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        debug!(target: "chatprobe::config", ?config_path, "Loading config");
        Self {
            config_path,
            overrides: ConfigOverrides::default(),
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn load(self) -> Result<ProbeConfig, ConfigError> {
        let mut config = ProbeConfig::defaults()?;

        let path = self.config_path.clone().or_else(AppPaths::discover_config);
        if let Some(path) = path {
            config.apply(read_partial(&path)?)?;
        }

        config.apply(PartialProbeConfig {
            base_url: (self.env)(BASE_URL_ENV).filter(|v| !v.is_empty()),
            token: (self.env)(TOKEN_ENV).filter(|v| !v.is_empty()),
            ..PartialProbeConfig::default()
        })?;
        config.apply(self.overrides.into())?;

        validate(&config)?;
        Ok(config)
    }
}

fn read_partial(path: &Path) -> Result<PartialProbeConfig, ConfigError> {
    debug!(target: "chatprobe::config", path = %path.display(), "Reading config file");
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

fn validate(config: &ProbeConfig) -> Result<(), ConfigError> {
    if config.concurrency == 0 {
        return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
    }
    if config.polling.interval_ms == 0 {
        return Err(ConfigError::Invalid("polling.interval_ms must be at least 1".to_string()));
    }
    if config.polling.idle_polls == 0 || config.polling.quiet_polls == 0 {
        return Err(ConfigError::Invalid(
            "polling.idle_polls and polling.quiet_polls must be at least 1".to_string(),
        ));
    }
    if config.language.trim().is_empty() {
        return Err(ConfigError::Invalid("language cannot be empty".to_string()));
    }
    Ok(())
}
