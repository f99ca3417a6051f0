//! Shared state threaded through the pipeline stages
//!
//! A [`BuildContext`] owns everything a stage may touch: the pod spec, the
//! build tag, the staging filesystem the image is assembled in, the env
//! contract accumulated so far, and the installer backend. Stages receive it
//! mutably one at a time, so ordering is the only synchronization needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::image::EnvContract;
use crate::install::{InstallTarget, Installer};
use crate::spec::PodSpec;

/// Root of the isolated interpreter environment inside the image.
pub const VENV_ROOT: &str = "/opt/venv";

/// Working directory of the produced image; payload and control files land
/// under it.
pub const IMAGE_ROOT: &str = "/root";

pub struct BuildContext {
    /// Declarative build input.
    pub spec: PodSpec,

    /// Externally supplied identity tag. May be empty; never defaulted.
    pub tag: String,

    /// Directory the spec's relative input paths resolve against.
    pub context_dir: PathBuf,

    /// Environment contract accumulated by the stages, in declaration order.
    pub env: EnvContract,

    /// Working directory recorded in the image config.
    pub working_dir: String,

    /// Backend that places Python distributions into the staging filesystem.
    pub installer: Arc<dyn Installer>,

    staging_root: PathBuf,
}

impl BuildContext {
    pub fn new(
        spec: PodSpec,
        tag: String,
        context_dir: PathBuf,
        staging_root: PathBuf,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self {
            spec,
            tag,
            context_dir,
            env: EnvContract::new(),
            working_dir: String::new(),
            installer,
            staging_root,
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// On-disk location of an absolute image path, re-rooted under the
    /// staging filesystem.
    pub fn staged(&self, image_path: &str) -> PathBuf {
        self.staging_root.join(image_path.trim_start_matches('/'))
    }

    /// Resolve one of the spec's relative input paths against the build
    /// context directory.
    pub fn context_path(&self, relative: &str) -> PathBuf {
        self.context_dir.join(relative)
    }

    /// Site-packages of the base runtime, where the cloud client lands.
    pub fn global_site_packages(&self) -> String {
        format!(
            "/usr/local/lib/python{}/site-packages",
            self.spec.python_version
        )
    }

    /// Executable directory of the base runtime.
    pub fn global_bin(&self) -> String {
        "/usr/local/bin".to_string()
    }

    /// Site-packages of the isolated environment.
    pub fn venv_site_packages(&self) -> String {
        format!(
            "{}/lib/python{}/site-packages",
            VENV_ROOT, self.spec.python_version
        )
    }

    /// Executable directory of the isolated environment.
    pub fn venv_bin(&self) -> String {
        format!("{}/bin", VENV_ROOT)
    }

    /// Installer target for a pair of image paths, re-rooted for staging.
    pub fn install_target(&self, site_packages: &str, bin_dir: &str) -> InstallTarget {
        InstallTarget {
            site_packages: self.staged(site_packages),
            bin_dir: self.staged(bin_dir),
        }
    }
}
