//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started {
                spec_name,
                stage_count,
            } => {
                info!(spec = %spec_name, stages = stage_count, "Starting build");
            }
            ProgressEvent::StageStarted {
                stage,
                index,
                total,
            } => {
                info!(
                    stage = %stage,
                    progress = format!("{}/{}", index, total),
                    "Running stage"
                );
            }
            ProgressEvent::StageComplete {
                stage,
                index,
                total,
                duration,
                layer,
            } => {
                info!(
                    stage = %stage,
                    progress = format!("{}/{}", index, total),
                    duration_ms = duration.as_millis(),
                    layer = layer.as_deref().unwrap_or("none"),
                    "Stage complete"
                );
            }
            ProgressEvent::LayerCommitted {
                stage,
                digest,
                size,
                reused,
            } => {
                debug!(
                    stage = %stage,
                    digest = %digest,
                    size,
                    reused,
                    "Layer committed"
                );
            }
            ProgressEvent::Warning { stage, message } => {
                warn!(stage = %stage, "{}", message);
            }
            ProgressEvent::Completed {
                image_id,
                tag,
                layers,
                total_time,
            } => {
                info!(
                    image = %image_id,
                    tag = %tag,
                    layers,
                    total_time_ms = total_time.as_millis(),
                    "Build complete"
                );
            }
            ProgressEvent::Failed { stage, error } => {
                warn!(stage = %stage, error = %error, "Build failed");
            }
        }
    }
}
