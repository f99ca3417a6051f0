//! Installer that materializes pins without a network
//!
//! Writes the minimal on-disk shape of an installed distribution: the
//! import package plus a `dist-info` directory carrying METADATA, RECORD
//! and INSTALLER. Only exact pins are accepted, since there is no resolver
//! to interpret anything looser. Identical manifests therefore produce
//! byte-identical site-packages trees.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::{parse_manifest, InstallError, InstallReport, InstallTarget, Installer, Requirement};

#[derive(Debug, Default)]
pub struct OfflineInstaller;

impl OfflineInstaller {
    pub fn new() -> Self {
        Self
    }

    fn materialize(
        name: &str,
        version: &str,
        target: &InstallTarget,
    ) -> Result<(), InstallError> {
        let module = name.to_lowercase().replace(['-', '.'], "_");
        let module_dir = target.site_packages.join(&module);
        fs::create_dir_all(&module_dir)?;
        fs::write(
            module_dir.join("__init__.py"),
            format!("__version__ = \"{}\"\n", version),
        )?;

        let dist_info = target
            .site_packages
            .join(format!("{}-{}.dist-info", name, version));
        fs::create_dir_all(&dist_info)?;
        fs::write(
            dist_info.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {}\nVersion: {}\n", name, version),
        )?;
        fs::write(dist_info.join("RECORD"), "")?;
        fs::write(dist_info.join("INSTALLER"), "offline\n")?;

        fs::create_dir_all(&target.bin_dir)?;
        Ok(())
    }

    fn pin_of(package: &str) -> Result<(String, String), InstallError> {
        match Requirement::parse(package) {
            Some(Requirement::Pinned { name, version }) => Ok((name, version)),
            Some(Requirement::Loose(line)) => {
                // A bare, well-formed name gets a synthetic version. Anything
                // with specifiers needs a resolver this installer lacks.
                if line
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                {
                    Ok((line, "0.0.0".to_string()))
                } else {
                    Err(InstallError::Unpinned { line })
                }
            }
            None => Err(InstallError::Unpinned {
                line: package.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Installer for OfflineInstaller {
    async fn install_requirements(
        &self,
        manifest: &Path,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError> {
        let content = fs::read_to_string(manifest)?;
        let requirements = parse_manifest(&content);

        let mut packages = Vec::with_capacity(requirements.len());
        for requirement in &requirements {
            match requirement {
                Requirement::Pinned { name, version } => {
                    Self::materialize(name, version, target)?;
                    packages.push(requirement.display_line());
                }
                Requirement::Loose(line) => {
                    return Err(InstallError::Unpinned { line: line.clone() });
                }
            }
        }

        info!(count = packages.len(), "materialized pinned requirements");
        Ok(InstallReport {
            packages,
            warnings: Vec::new(),
        })
    }

    async fn install_package(
        &self,
        package: &str,
        target: &InstallTarget,
    ) -> Result<InstallReport, InstallError> {
        let (name, version) = Self::pin_of(package)?;
        Self::materialize(&name, &version, target)?;
        Ok(InstallReport {
            packages: vec![format!("{}=={}", name, version)],
            warnings: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "offline"
    }
}
