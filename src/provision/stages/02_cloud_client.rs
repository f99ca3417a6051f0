//! Cloud client installation stage

use async_trait::async_trait;
use tracing::info;

use crate::provision::context::BuildContext;
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};

/// Installs the cloud CLI package into the base runtime's *global*
/// site-packages, before any isolated environment exists. The tool must
/// survive `/opt/venv/bin` later shadowing the interpreter, which is why it
/// does not go through the virtualenv.
pub struct CloudClientStage;

#[async_trait]
impl ProvisionStage for CloudClientStage {
    fn name(&self) -> &'static str {
        "cloud-client"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let package = ctx.spec.cloud_client.clone();
        let site_packages = ctx.global_site_packages();
        let bin_dir = ctx.global_bin();
        let target = ctx.install_target(&site_packages, &bin_dir);

        let installer = ctx.installer.clone();
        let report = installer
            .install_package(&package, &target)
            .await
            .map_err(|source| ProvisionError::ToolInstall {
                package: package.clone(),
                source,
            })?;

        info!(
            package = %package,
            installer = installer.name(),
            "installed cloud client"
        );

        // Snapshot only what the installer actually created; pip's target
        // mode never writes entry-point scripts.
        let mut paths = Vec::new();
        for path in [site_packages, bin_dir] {
            if ctx.staged(&path).exists() {
                paths.push(path);
            }
        }

        Ok(
            StageOutcome::layered(format!("RUN pip3 install {}", package), paths)
                .with_warnings(report.warnings),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_installs_into_global_site_packages() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());

        let outcome = CloudClientStage.execute(&mut ctx).await.unwrap();

        let site = staging
            .path()
            .join("usr/local/lib/python3.8/site-packages");
        assert!(site.join("awscli/__init__.py").exists());
        assert!(outcome
            .paths
            .contains(&"/usr/local/lib/python3.8/site-packages".to_string()));
        assert_eq!(outcome.created_by, "RUN pip3 install awscli");
    }

    #[tokio::test]
    async fn test_honors_pinned_client() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());
        ctx.spec.cloud_client = "awscli==1.22.0".to_string();

        CloudClientStage.execute(&mut ctx).await.unwrap();

        let dist_info = staging
            .path()
            .join("usr/local/lib/python3.8/site-packages/awscli-1.22.0.dist-info");
        assert!(dist_info.is_dir());
    }

    #[tokio::test]
    async fn test_invalid_client_is_fatal() {
        let context = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut ctx = BuildContext::for_tests(context.path(), staging.path());
        ctx.spec.cloud_client = "awscli>=1.0".to_string();

        let err = CloudClientStage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ToolInstall { package, .. } if package == "awscli>=1.0"));
    }
}
