//! Version stamp stage

use async_trait::async_trait;
use tracing::debug;

use crate::image::env::IDENTITY_ENV;
use crate::provision::context::BuildContext;
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};

/// Exposes the externally supplied build tag as `FLYTE_INTERNAL_IMAGE` and
/// appends any extra variables the spec declares.
///
/// The tag is never computed or defaulted here. Registration systems match
/// it against their own records, and a fabricated value would pass silently
/// where an empty one gets noticed.
pub struct VersionStampStage;

#[async_trait]
impl ProvisionStage for VersionStampStage {
    fn name(&self) -> &'static str {
        "version-stamp"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let mut warnings = Vec::new();
        if ctx.tag.is_empty() {
            warnings.push(format!(
                "no build tag supplied; {} is stamped empty",
                IDENTITY_ENV
            ));
        }

        let tag = ctx.tag.clone();
        ctx.env.set(IDENTITY_ENV, tag.clone());

        for (key, value) in &ctx.spec.env {
            ctx.env.set(key.clone(), value.clone());
        }

        debug!(tag = %tag, extras = ctx.spec.env.len(), "stamped image identity");
        Ok(
            StageOutcome::env_only(format!("ENV {}={}", IDENTITY_ENV, tag))
                .with_warnings(warnings),
        )
    }
}
