//! Pod specification schema
//!
//! The declarative input to a build: which interpreter distribution to
//! start from, which dependency manifest to install, and which files make
//! up the task payload. Loaded from YAML; every field has a default that
//! matches the conventional pod layout, so a minimal spec is `{}`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read pod spec {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse pod spec {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid pod spec: {0}")]
    Invalid(String),
}

fn default_name() -> String {
    "pod".to_string()
}

fn default_base_image() -> String {
    "python:3.8-slim-buster".to_string()
}

fn default_python_version() -> String {
    "3.8".to_string()
}

fn default_cloud_client() -> String {
    "awscli".to_string()
}

fn default_requirements() -> String {
    "requirements.txt".to_string()
}

fn default_makefile() -> String {
    "in_container.mk".to_string()
}

fn default_code_tree() -> String {
    ".".to_string()
}

fn default_policy_file() -> String {
    "sandbox.config".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSpec {
    /// Image title, recorded as an annotation on the manifest.
    #[serde(default = "default_name")]
    pub name: String,

    /// Interpreter distribution the image builds on.
    #[serde(default = "default_base_image")]
    pub base_image: String,

    /// `major.minor` interpreter version, used to derive site-packages paths.
    #[serde(default = "default_python_version")]
    pub python_version: String,

    /// Package installed globally before the isolated environment exists.
    #[serde(default = "default_cloud_client")]
    pub cloud_client: String,

    /// Dependency manifest, relative to the build context.
    #[serde(default = "default_requirements")]
    pub requirements: String,

    /// Build-control file staged as /root/Makefile.
    #[serde(default = "default_makefile")]
    pub makefile: String,

    /// Directory copied verbatim under /root.
    #[serde(default = "default_code_tree")]
    pub code_tree: String,

    /// Execution policy file staged next to the code tree.
    #[serde(default = "default_policy_file")]
    pub policy_file: String,

    /// Extra environment variables appended after the standard contract.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for PodSpec {
    fn default() -> Self {
        Self {
            name: default_name(),
            base_image: default_base_image(),
            python_version: default_python_version(),
            cloud_client: default_cloud_client(),
            requirements: default_requirements(),
            makefile: default_makefile(),
            code_tree: default_code_tree(),
            policy_file: default_policy_file(),
            env: BTreeMap::new(),
        }
    }
}

impl PodSpec {
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, SpecError> {
        let spec: PodSpec = serde_yaml::from_str(content).map_err(|source| SpecError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, path)
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::Invalid("name cannot be empty".to_string()));
        }
        if self.base_image.trim().is_empty() {
            return Err(SpecError::Invalid("base_image cannot be empty".to_string()));
        }

        let version_re = Regex::new(r"^\d+\.\d+$").expect("valid regex");
        if !version_re.is_match(&self.python_version) {
            return Err(SpecError::Invalid(format!(
                "python_version must be 'major.minor', got '{}'",
                self.python_version
            )));
        }

        if self.cloud_client.trim().is_empty() {
            return Err(SpecError::Invalid(
                "cloud_client cannot be empty".to_string(),
            ));
        }
        for (field, value) in [
            ("requirements", &self.requirements),
            ("makefile", &self.makefile),
            ("code_tree", &self.code_tree),
            ("policy_file", &self.policy_file),
        ] {
            if value.trim().is_empty() {
                return Err(SpecError::Invalid(format!("{} cannot be empty", field)));
            }
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(SpecError::Invalid(format!(
                    "invalid environment variable name '{}'",
                    key
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for PodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pod Spec: {}", self.name)?;
        writeln!(f, "  Base Image:     {}", self.base_image)?;
        writeln!(f, "  Python:         {}", self.python_version)?;
        writeln!(f, "  Cloud Client:   {}", self.cloud_client)?;
        writeln!(f, "  Requirements:   {}", self.requirements)?;
        writeln!(f, "  Makefile:       {}", self.makefile)?;
        writeln!(f, "  Code Tree:      {}", self.code_tree)?;
        writeln!(f, "  Policy File:    {}", self.policy_file)?;
        if !self.env.is_empty() {
            writeln!(f, "  Extra Env:")?;
            for (key, value) in &self.env {
                writeln!(f, "    {}={}", key, value)?;
            }
        }
        Ok(())
    }
}
