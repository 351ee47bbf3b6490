//! Configuration file support for merchsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `MERCHSYNC_`, e.g., `MERCHSYNC_REMOTE_API_KEY`)
//! 3. Config file (~/.config/merchsync/config.toml or ./merchsync.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/merchsync/products.db"  # optional, this is the default
//!
//! [remote]
//! base_url = "https://api.commerce.example.com"
//! api_key = "sk_..."  # or use MERCHSYNC_REMOTE_API_KEY env var
//! timeout_secs = 30
//! allow_name_fallback = false
//!
//! [migration]
//! batch_size = 50
//! concurrency = 5
//! checkpoint_interval = 10
//! inter_batch_delay_ms = 500
//! verify_sample_every = 10
//! max_retries = 3
//! requests_per_window = 25
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source database configuration.
    pub database: DatabaseConfig,
    /// Remote commerce platform configuration.
    pub remote: RemoteConfig,
    /// Default migration run options.
    pub migration: MigrationConfig,
}

/// Source database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL (sqlite:// scheme).
    /// Defaults to `sqlite://~/.local/state/merchsync/products.db` if not specified.
    pub url: Option<String>,
}

/// Remote platform configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote platform API.
    pub base_url: String,
    /// API key. Can also be set via MERCHSYNC_REMOTE_API_KEY.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Allow matching existing remote products by exact name when no
    /// metadata match exists. First-match, lower confidence.
    pub allow_name_fallback: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.commerce.example.com".to_string(),
            api_key: None,
            timeout_secs: 30,
            allow_name_fallback: false,
        }
    }
}

/// Default migration run options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Records per batch.
    pub batch_size: u64,
    /// Concurrent per-record pipelines within a batch.
    pub concurrency: usize,
    /// Records between checkpoint saves.
    pub checkpoint_interval: u64,
    /// Delay between batches in milliseconds.
    pub inter_batch_delay_ms: u64,
    /// Verify every k-th successful record after the run; 0 disables.
    pub verify_sample_every: usize,
    /// Maximum retry attempts per remote call.
    pub max_retries: usize,
    /// Rate limiter bucket capacity per one-second window.
    pub requests_per_window: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 5,
            checkpoint_interval: 10,
            inter_batch_delay_ms: 500,
            verify_sample_every: 10,
            max_retries: 3,
            requests_per_window: merchsync::rate_limits::DEFAULT_REQUESTS_PER_WINDOW,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/merchsync/config.toml)
    /// 3. Local config file (./merchsync.toml)
    /// 4. Environment variables with MERCHSYNC_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "merchsync") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        // Local config file overrides the XDG one
        let local_config = PathBuf::from("merchsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./merchsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g. MERCHSYNC_REMOTE_API_KEY -> remote.api_key
        builder = builder.add_source(
            Environment::with_prefix("MERCHSYNC")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory
    /// path. The `mode=rwc` parameter creates the file if it is missing.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("products.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Default location for the checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        Self::default_state_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("checkpoint.json")
    }

    /// Default location for the run report artifact.
    pub fn report_path(&self) -> PathBuf {
        Self::default_state_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("report.json")
    }

    /// Get the default state directory path.
    ///
    /// On Linux this is `$XDG_STATE_HOME/merchsync` or
    /// `~/.local/state/merchsync`.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "merchsync")
            .map(|dirs| dirs.state_dir().unwrap_or(dirs.data_dir()).to_path_buf())
    }
}
