//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while a pod image is provisioned
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Build started
    Started {
        spec_name: String,
        stage_count: usize,
    },

    /// A pipeline stage began executing
    StageStarted {
        stage: String,
        index: usize,
        total: usize,
    },

    /// A pipeline stage finished
    StageComplete {
        stage: String,
        index: usize,
        total: usize,
        duration: Duration,
        /// Digest of the layer the stage produced, if it touched the rootfs
        layer: Option<String>,
    },

    /// A layer blob landed in the store
    LayerCommitted {
        stage: String,
        digest: String,
        size: u64,
        reused: bool,
    },

    /// A non-fatal finding surfaced by a stage
    Warning { stage: String, message: String },

    /// Build completed successfully
    Completed {
        image_id: String,
        tag: String,
        layers: usize,
        total_time: Duration,
    },

    /// Build failed
    Failed { stage: String, error: String },
}

/// Trait for handling progress events during a build
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
