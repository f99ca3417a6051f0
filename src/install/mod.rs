//! Dependency installation seam
//!
//! The provisioning stages never shell out directly. They talk to an
//! [`Installer`], which places Python distributions into a staged
//! filesystem. [`PipInstaller`] drives a real `pip` binary;
//! [`OfflineInstaller`] materializes pinned distributions without touching
//! the network, which keeps builds reproducible in sealed environments and
//! lets the full pipeline run in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

pub mod offline;
pub mod pip;

pub use offline::OfflineInstaller;
pub use pip::PipInstaller;

/// Directories an installer writes into, already re-rooted under the
/// staging filesystem.
#[derive(Debug, Clone)]
pub struct InstallTarget {
    /// Acts as the interpreter's site-packages directory.
    pub site_packages: PathBuf,
    /// Where console entry points belong.
    pub bin_dir: PathBuf,
}

/// Summary of one installer invocation.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Requirements as installed, in manifest order.
    pub packages: Vec<String>,
    /// Non-fatal findings, e.g. requirements that are not exact pins.
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("'{command}' failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("'{command}' timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },
    #[error("failed to launch '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("requirement '{line}' is not an exact pin and cannot be installed offline")]
    Unpinned { line: String },
    #[error("failed to write package files")]
    Io(#[from] std::io::Error),
}

/// Installs Python distributions into a staged filesystem.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install every requirement listed in the manifest file.
    async fn install_requirements(
        &self,
        manifest: &Path,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError>;

    /// Install a single package given as `name` or `name==version`.
    async fn install_package(
        &self,
        package: &str,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError>;

    fn name(&self) -> &str;
}

/// One requirement line, as this tool understands it. The manifest stays
/// opaque beyond this: anything that is not an exact `name==version` pin is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Pinned { name: String, version: String },
    Loose(String),
}

impl Requirement {
    /// Parse a single requirement, ignoring a trailing comment.
    pub fn parse(line: &str) -> Option<Self> {
        let line = match line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => line.trim(),
        };
        if line.is_empty() {
            return None;
        }

        let pin_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*==\s*([A-Za-z0-9.!+_-]+)$")
            .expect("valid regex");
        if let Some(captures) = pin_re.captures(line) {
            return Some(Requirement::Pinned {
                name: captures[1].to_string(),
                version: captures[2].to_string(),
            });
        }
        Some(Requirement::Loose(line.to_string()))
    }

    pub fn display_line(&self) -> String {
        match self {
            Requirement::Pinned { name, version } => format!("{}=={}", name, version),
            Requirement::Loose(line) => line.clone(),
        }
    }
}

/// Parse a whole requirements manifest, skipping blanks and comments.
pub fn parse_manifest(content: &str) -> Vec<Requirement> {
    content.lines().filter_map(Requirement::parse).collect()
}

/// Warnings for requirements that are not exact pins.
pub fn lint_pins(requirements: &[Requirement]) -> Vec<String> {
    requirements
        .iter()
        .filter_map(|req| match req {
            Requirement::Loose(line) => Some(format!(
                "requirement '{}' is not pinned to an exact version",
                line
            )),
            Requirement::Pinned { .. } => None,
        })
        .collect()
}
