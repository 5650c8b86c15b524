//! src/config.rs
//! ============================================================================
//! # Config: Share Core Configuration Loader and Saver
//!
//! Loads and saves settings as TOML from the platform config path using the
//! [`directories`](https://docs.rs/directories) crate.
//!
//! ## Sections
//! - `share`   : where shares are mounted, collation locale, default principal
//! - `transfer`: chunk size, download directory override
//! - `cache`   : decode cache budget
//! - `wake`    : default wake port, fixed broadcast address
//! - `logging` : see [`LoggerConfig`]
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::info;

use crate::fs::collator::DEFAULT_COLLATION_LOCALE;
use crate::logging::LoggerConfig;
use crate::net::wake_on_lan::DEFAULT_PORT;
use crate::tasks::transfer_task::DEFAULT_CHUNK_SIZE;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "smbx";
const APPLICATION: &str = "smbx";

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))
}

/// Remote share access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Local directory holding `<server>/<share>/...` mounts.
    pub mount_root: PathBuf,

    /// BCP-47 tag used to order listings.
    pub collation_locale: String,

    /// Principal applied at startup; empty means anonymous.
    pub username: String,

    pub password: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        let mount_root: PathBuf = project_dirs().map_or_else(
            |_e| PathBuf::from("./mounts"),
            |dirs: ProjectDirs| dirs.data_dir().join("mounts"),
        );

        Self {
            mount_root,
            collation_locale: DEFAULT_COLLATION_LOCALE.to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per read/write step.
    pub chunk_size: usize,

    /// Downloads land here instead of the per-category user directories.
    pub download_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_dir: None,
        }
    }
}

/// Decode cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fixed budget in bytes; unset means a fraction of available memory.
    pub budget_bytes: Option<u64>,

    /// Budget = available memory / divisor.
    pub heap_fraction_divisor: u64,

    /// Enable cache statistics
    pub enable_stats: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: None,
            heap_fraction_divisor: 5,
            enable_stats: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub default_port: u16,

    /// Skip interface discovery and always use this address.
    pub broadcast_address: Option<Ipv4Addr>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            broadcast_address: None,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub share: ShareConfig,

    pub transfer: TransferConfig,

    pub cache: CacheConfig,

    pub wake: WakeConfig,

    pub logging: LoggerConfig,
}

impl Config {
    /// Loads config from the platform config dir, creating it with defaults
    /// when missing.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/smbx/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> anyhow::Result<Self> {
        let path: PathBuf = Self::config_path()?;
        Self::load_from(&path).await
    }

    /// Load from an explicit file, creating it with defaults when missing.
    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if TokioFs::try_exists(path).await.unwrap_or(false) {
            info!(
                marker = "CONFIG",
                operation_type = "load",
                path = %path.display(),
                "Loading config"
            );

            let text: String = TokioFs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let cfg: Self = toml::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?;

            Ok(cfg)
        } else {
            info!(
                marker = "CONFIG",
                operation_type = "create_default",
                path = %path.display(),
                "No config file found, writing defaults"
            );

            let default_config: Self = Self::default();
            default_config.save_to(path).await?;

            Ok(default_config)
        }
    }

    /// Saves config to the platform config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        let path: PathBuf = Self::config_path()?;
        self.save_to(&path).await
    }

    pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        info!(
            marker = "CONFIG",
            operation_type = "save",
            path = %path.display(),
            "Saving config"
        );

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str: String = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str).await?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(project_dirs()?.config_dir().to_path_buf())
    }
}
