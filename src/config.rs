//! Configuration management for podkiln
//!
//! Settings load from environment variables with sensible defaults, so the
//! CLI works with no configuration at all and CI systems can steer it
//! without flags.
//!
//! # Environment Variables
//!
//! - `PODKILN_INSTALLER`: Installer backend (pip|offline) - default: "pip"
//! - `PODKILN_PIP_BINARY`: pip executable name or path - default: "pip3"
//! - `PODKILN_INSTALL_TIMEOUT`: Installer timeout in seconds - default: "600"
//! - `PODKILN_STORE_DIR`: Image layout directory - default: user cache dir + "podkiln"
//! - `PODKILN_LOG_LEVEL`: Logging level - default: "info"
//! - `SOURCE_DATE_EPOCH`: Unix timestamp stamped into image metadata and
//!   layer entries - default: "0" (reproducible builds)

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::install::{Installer, OfflineInstaller, PipInstaller};

const DEFAULT_PIP_BINARY: &str = "pip3";
const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 600;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SOURCE_DATE_EPOCH: u64 = 0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which installer backend runs the dependency stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    /// Drive a real pip binary.
    Pip,
    /// Materialize pins without a network.
    Offline,
}

impl fmt::Display for InstallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallerKind::Pip => write!(f, "pip"),
            InstallerKind::Offline => write!(f, "offline"),
        }
    }
}

/// Main configuration structure for podkiln
///
/// Constructed with `Default::default()`, which reads `PODKILN_*`
/// environment variables and falls back to defaults for anything unset.
#[derive(Debug, Clone)]
pub struct PodkilnConfig {
    /// Installer backend selection
    pub installer: InstallerKind,

    /// pip executable used by the pip backend
    pub pip_binary: String,

    /// Timeout for a single installer invocation, in seconds
    pub install_timeout_secs: u64,

    /// Layout directory images are published into
    pub store_dir: PathBuf,

    /// Timestamp recorded in image metadata and layer entries
    pub source_date_epoch: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PodkilnConfig {
    fn default() -> Self {
        let installer = env::var("PODKILN_INSTALLER")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "pip" => Some(InstallerKind::Pip),
                "offline" => Some(InstallerKind::Offline),
                _ => None,
            })
            .unwrap_or(InstallerKind::Pip);

        let pip_binary =
            env::var("PODKILN_PIP_BINARY").unwrap_or_else(|_| DEFAULT_PIP_BINARY.to_string());

        let install_timeout_secs = env::var("PODKILN_INSTALL_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_INSTALL_TIMEOUT_SECS);

        let store_dir = env::var("PODKILN_STORE_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("podkiln")
            });

        let source_date_epoch = env::var("SOURCE_DATE_EPOCH")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SOURCE_DATE_EPOCH);

        let log_level = env::var("PODKILN_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            installer,
            pip_binary,
            install_timeout_secs,
            store_dir,
            source_date_epoch,
            log_level,
        }
    }
}

impl PodkilnConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pip_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "pip binary cannot be empty".to_string(),
            ));
        }

        if self.install_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Install timeout must be at least 1 second".to_string(),
            ));
        }
        if self.install_timeout_secs > 7200 {
            return Err(ConfigError::ValidationFailed(
                "Install timeout cannot exceed 2 hours".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Instantiate the configured installer backend.
    pub fn create_installer(&self) -> Arc<dyn Installer> {
        match self.installer {
            InstallerKind::Pip => Arc::new(PipInstaller::new(
                self.pip_binary.clone(),
                Duration::from_secs(self.install_timeout_secs),
            )),
            InstallerKind::Offline => Arc::new(OfflineInstaller::new()),
        }
    }
}

impl fmt::Display for PodkilnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Podkiln Configuration:")?;
        writeln!(f, "  Installer: {}", self.installer)?;
        writeln!(f, "  Pip Binary: {}", self.pip_binary)?;
        writeln!(f, "  Install Timeout: {}s", self.install_timeout_secs)?;
        writeln!(f, "  Store Dir: {}", self.store_dir.display())?;
        writeln!(f, "  Source Date Epoch: {}", self.source_date_epoch)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
