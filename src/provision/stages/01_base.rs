//! Base runtime reference stage

use async_trait::async_trait;
use tracing::debug;

use crate::provision::context::{BuildContext, IMAGE_ROOT};
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};

/// Pins the interpreter distribution the image builds on and seeds the
/// UTF-8 locale pair plus the working directory.
///
/// Contributes no filesystem content: the base distribution stays a parent
/// reference in the image metadata rather than being unpacked locally, so
/// every layer this pipeline writes is one it authored itself.
pub struct BaseRuntimeStage;

#[async_trait]
impl ProvisionStage for BaseRuntimeStage {
    fn name(&self) -> &'static str {
        "base-runtime"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        ctx.env.set("LANG", "C.UTF-8");
        ctx.env.set("LC_ALL", "C.UTF-8");
        ctx.working_dir = IMAGE_ROOT.to_string();

        debug!(base = %ctx.spec.base_image, "pinned base runtime");
        Ok(StageOutcome::env_only(format!(
            "FROM {}",
            ctx.spec.base_image
        )))
    }
}
