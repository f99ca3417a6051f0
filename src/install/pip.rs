//! Installer backed by a real `pip` binary

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{lint_pins, parse_manifest, InstallError, InstallReport, InstallTarget, Installer};

/// Runs `pip install` with a target directory, so packages land in the
/// staged filesystem instead of the host interpreter.
pub struct PipInstaller {
    pip_binary: String,
    timeout: Duration,
}

impl PipInstaller {
    pub fn new(pip_binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pip_binary: pip_binary.into(),
            timeout,
        }
    }

    fn base_args(target: &InstallTarget) -> Vec<String> {
        vec![
            "install".to_string(),
            "--no-cache-dir".to_string(),
            "--no-compile".to_string(),
            "--disable-pip-version-check".to_string(),
            "--target".to_string(),
            target.site_packages.display().to_string(),
        ]
    }

    async fn run(&self, args: Vec<String>) -> Result<(), InstallError> {
        let command_line = format!("{} {}", self.pip_binary, args.join(" "));
        debug!(command = %command_line, "running installer");

        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.pip_binary)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(InstallError::Spawn {
                    command: self.pip_binary.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(InstallError::TimedOut {
                    command: command_line,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(InstallError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Installer for PipInstaller {
    async fn install_requirements(
        &self,
        manifest: &Path,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError> {
        let content = std::fs::read_to_string(manifest)?;
        let requirements = parse_manifest(&content);
        let warnings = lint_pins(&requirements);

        let mut args = Self::base_args(target);
        args.push("-r".to_string());
        args.push(manifest.display().to_string());
        self.run(args).await?;

        info!(
            count = requirements.len(),
            manifest = %manifest.display(),
            "installed requirements"
        );
        Ok(InstallReport {
            packages: requirements
                .iter()
                .map(|req| req.display_line())
                .collect(),
            warnings,
        })
    }

    async fn install_package(
        &self,
        package: &str,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError> {
        let mut args = Self::base_args(target);
        args.push(package.to_string());
        self.run(args).await?;

        info!(package, "installed package");
        Ok(InstallReport {
            packages: vec![package.to_string()],
            warnings: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "pip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target_in(dir: &TempDir) -> InstallTarget {
        InstallTarget {
            site_packages: dir.path().join("site-packages"),
            bin_dir: dir.path().join("bin"),
        }
    }

    #[test]
    fn test_base_args_point_at_site_packages() {
        let dir = TempDir::new().unwrap();
        let target = target_in(&dir);
        let args = PipInstaller::base_args(&target);
        assert_eq!(args[0], "install");
        assert!(args.contains(&"--no-cache-dir".to_string()));
        assert!(args.contains(&"--no-compile".to_string()));
        let target_pos = args.iter().position(|a| a == "--target").unwrap();
        assert_eq!(args[target_pos + 1], target.site_packages.display().to_string());
    }

    #[tokio::test]
    async fn test_run_surfaces_command_failure() {
        let dir = TempDir::new().unwrap();
        let installer = PipInstaller::new("false", Duration::from_secs(5));
        let err = installer
            .install_package("anything", &target_in(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_run_surfaces_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let installer = PipInstaller::new("/nonexistent/pip-binary", Duration::from_secs(5));
        let err = installer
            .install_package("anything", &target_in(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_successful_run_reports_manifest_order() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("requirements.txt");
        std::fs::write(&manifest, "flytekit==0.16.0\nwheel==0.36.2\n").unwrap();

        // `true` ignores its arguments and exits 0, standing in for pip.
        let installer = PipInstaller::new("true", Duration::from_secs(5));
        let report = installer
            .install_requirements(&manifest, &target_in(&dir))
            .await
            .unwrap();
        assert_eq!(report.packages, vec!["flytekit==0.16.0", "wheel==0.36.2"]);
        assert!(report.warnings.is_empty());
    }
}
