//! Pinned dependency installation stage

use std::fs;
use std::io;

use async_trait::async_trait;
use tracing::info;

use crate::install::parse_manifest;
use crate::provision::context::{BuildContext, IMAGE_ROOT, VENV_ROOT};
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};
use crate::provision::stages::{copy_into_staging, file_name_of};

/// Installs the dependency manifest into the isolated environment's
/// site-packages and stages the manifest itself under `/root`, so the
/// image documents exactly what went into it.
///
/// A manifest that cannot be read, or that lists nothing, aborts the build:
/// a pod image without its pinned dependencies is useless no matter how far
/// the remaining stages would get.
pub struct RequirementsStage;

#[async_trait]
impl ProvisionStage for RequirementsStage {
    fn name(&self) -> &'static str {
        "requirements"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let manifest_path = ctx.context_path(&ctx.spec.requirements);
        let content =
            fs::read_to_string(&manifest_path).map_err(|source| ProvisionError::ManifestMissing {
                path: manifest_path.clone(),
                source,
            })?;
        let requirements = parse_manifest(&content);
        if requirements.is_empty() {
            return Err(ProvisionError::ManifestMissing {
                path: manifest_path,
                source: io::Error::new(io::ErrorKind::InvalidData, "no requirements listed"),
            });
        }

        let manifest_name = file_name_of(&ctx.spec.requirements);
        let staged_manifest = format!("{}/{}", IMAGE_ROOT, manifest_name);
        let dest = ctx.staged(&staged_manifest);
        copy_into_staging(&manifest_path, &dest, "dependency manifest")?;

        let site_packages = ctx.venv_site_packages();
        let target = ctx.install_target(&site_packages, &ctx.venv_bin());
        let installer = ctx.installer.clone();
        let report = installer
            .install_requirements(&manifest_path, &target)
            .await
            .map_err(|source| ProvisionError::DependencyInstall {
                path: manifest_path.clone(),
                source,
            })?;

        info!(
            count = report.packages.len(),
            manifest = %manifest_path.display(),
            "installed pinned requirements"
        );

        Ok(StageOutcome::layered(
            format!(
                "RUN {}/bin/pip install -r {}",
                VENV_ROOT, staged_manifest
            ),
            vec![site_packages, staged_manifest],
        )
        .with_warnings(report.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_installs_and_stages_manifest() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::write(
            context.path().join("requirements.txt"),
            "flytekit==0.16.0\nwheel==0.36.2\n",
        )
        .unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());

        let outcome = RequirementsStage.execute(&mut ctx).await.unwrap();

        let site = staging.path().join("opt/venv/lib/python3.8/site-packages");
        assert!(site.join("flytekit/__init__.py").exists());
        assert!(site.join("wheel-0.36.2.dist-info").is_dir());
        assert!(staging.path().join("root/requirements.txt").exists());

        assert_eq!(
            outcome.paths,
            vec![
                "/opt/venv/lib/python3.8/site-packages".to_string(),
                "/root/requirements.txt".to_string(),
            ]
        );
        assert_eq!(
            outcome.created_by,
            "RUN /opt/venv/bin/pip install -r /root/requirements.txt"
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_fatal() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());

        let err = RequirementsStage.execute(&mut ctx).await.unwrap_err();
        assert!(
            matches!(err, ProvisionError::ManifestMissing { ref path, .. } if path.ends_with("requirements.txt"))
        );
    }

    #[tokio::test]
    async fn test_manifest_without_requirements_is_fatal() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::write(
            context.path().join("requirements.txt"),
            "# pinned deps\n\n   \n",
        )
        .unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());

        let err = RequirementsStage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ManifestMissing { .. }));
    }

    #[tokio::test]
    async fn test_nested_manifest_lands_under_root_by_basename() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::create_dir_all(context.path().join("deps")).unwrap();
        fs::write(
            context.path().join("deps/requirements.txt"),
            "flytekit==0.16.0\n",
        )
        .unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());
        ctx.spec.requirements = "deps/requirements.txt".to_string();

        let outcome = RequirementsStage.execute(&mut ctx).await.unwrap();

        assert!(staging.path().join("root/requirements.txt").exists());
        assert!(outcome.paths.contains(&"/root/requirements.txt".to_string()));
    }

    #[tokio::test]
    async fn test_unpinned_line_fails_offline_install() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::write(
            context.path().join("requirements.txt"),
            "flytekit==0.16.0\nnumpy>=1.19\n",
        )
        .unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());

        let err = RequirementsStage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DependencyInstall { .. }));
    }
}
