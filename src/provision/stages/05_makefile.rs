//! Build-control file staging stage

use async_trait::async_trait;
use tracing::debug;

use crate::provision::context::{BuildContext, IMAGE_ROOT};
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};
use crate::provision::stages::copy_into_staging;

/// Copies the build-control file to `/root/Makefile`. The rename is part of
/// the contract: in-pod tooling invokes `make` from the working directory
/// and expects the conventional name, whatever the file was called in the
/// build context.
pub struct MakefileStage;

const MAKEFILE_DEST: &str = "Makefile";

#[async_trait]
impl ProvisionStage for MakefileStage {
    fn name(&self) -> &'static str {
        "makefile"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let from = ctx.context_path(&ctx.spec.makefile);
        let image_path = format!("{}/{}", IMAGE_ROOT, MAKEFILE_DEST);
        let to = ctx.staged(&image_path);

        copy_into_staging(&from, &to, "build-control file")?;

        debug!(from = %from.display(), to = %image_path, "staged makefile");
        Ok(StageOutcome::layered(
            format!("COPY {} {}", ctx.spec.makefile, image_path),
            vec![image_path],
        ))
    }
}
