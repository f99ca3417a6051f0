//! Stage trait and the fatal error taxonomy
//!
//! A stage mutates the staging filesystem and the env contract, then
//! declares which image paths its layer should snapshot. Every error is
//! fatal: the pipeline aborts on the first one and publishes nothing.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use super::context::BuildContext;
use crate::install::InstallError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Cloud client installation into the base runtime failed.
    #[error("failed to install '{package}' into the base runtime")]
    ToolInstall {
        package: String,
        #[source]
        source: InstallError,
    },

    /// The dependency manifest is missing, unreadable, or lists nothing.
    #[error("dependency manifest '{path}' is missing or unreadable")]
    ManifestMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Installing the manifest into the isolated environment failed.
    #[error("failed to install dependency manifest '{path}'")]
    DependencyInstall {
        path: PathBuf,
        #[source]
        source: InstallError,
    },

    /// A control-file or payload copy failed.
    #[error("failed to copy {what} '{from}' to '{to}'")]
    Copy {
        what: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing into the staging filesystem failed.
    #[error("failed to stage '{path}'")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Committing a stage's snapshot into the blob store failed.
    #[error("failed to commit layer for stage '{stage}'")]
    Layer {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

/// What a stage reports back to the pipeline.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Image paths whose staged content becomes this stage's layer. Empty
    /// for stages that only touch the env contract.
    pub paths: Vec<String>,

    /// Provenance line recorded as this stage's history entry.
    pub created_by: String,

    /// Non-fatal findings, surfaced but never aborting the build.
    pub warnings: Vec<String>,
}

impl StageOutcome {
    /// Outcome of a stage that contributes no filesystem content.
    pub fn env_only(created_by: impl Into<String>) -> Self {
        Self {
            paths: Vec::new(),
            created_by: created_by.into(),
            warnings: Vec::new(),
        }
    }

    /// Outcome of a stage whose layer snapshots the given image paths.
    pub fn layered(created_by: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            paths,
            created_by: created_by.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// One step of the provisioning pipeline.
#[async_trait]
pub trait ProvisionStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_only_outcome_has_no_paths() {
        let outcome = StageOutcome::env_only("FROM python:3.8-slim-buster");
        assert!(outcome.paths.is_empty());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.created_by, "FROM python:3.8-slim-buster");
    }

    #[test]
    fn test_layered_outcome_keeps_path_order() {
        let outcome = StageOutcome::layered(
            "COPY . /root/pod",
            vec!["/root/pod".to_string(), "/root/sandbox.config".to_string()],
        )
        .with_warnings(vec!["something loose".to_string()]);

        assert_eq!(outcome.paths[0], "/root/pod");
        assert_eq!(outcome.paths[1], "/root/sandbox.config");
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_error_messages_name_the_artifact() {
        let err = ProvisionError::ManifestMissing {
            path: PathBuf::from("/ctx/requirements.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("requirements.txt"));

        let err = ProvisionError::Copy {
            what: "policy file",
            from: PathBuf::from("/ctx/sandbox.config"),
            to: PathBuf::from("/staging/root/sandbox.config"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("policy file"));
        assert!(err.to_string().contains("sandbox.config"));
    }
}
