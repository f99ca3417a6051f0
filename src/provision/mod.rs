//! The pod image provisioning pipeline.

pub mod context;
pub mod pipeline;
pub mod stage;
pub mod stages;

pub use context::BuildContext;
pub use pipeline::{provision, ProvisionPipeline};
pub use stage::{ProvisionError, ProvisionStage, StageOutcome};
