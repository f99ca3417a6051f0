//! Pipeline orchestration: stage ordering, layer commits, publication

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PodkilnConfig;
use crate::image::manifest::timestamp_rfc3339;
use crate::image::{
    CommittedLayer, Descriptor, HistoryEntry, ImageConfig, ImageHandle, LayerStore, LayerWriter,
};
use crate::progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
use crate::spec::PodSpec;

use super::context::BuildContext;
use super::stage::{ProvisionError, ProvisionStage, StageOutcome};
use super::stages::{
    BaseRuntimeStage, CloudClientStage, MakefileStage, PayloadStage, RequirementsStage,
    VersionStampStage, VirtualenvStage,
};

/// The ordered provisioning pipeline.
///
/// Stage order is the only concurrency discipline: each stage sees exactly
/// the staging filesystem and env contract its predecessors left behind, so
/// there is nothing to synchronize and nothing to roll back. On the first
/// fatal error the build aborts and the layout index is never touched.
pub struct ProvisionPipeline {
    stages: Vec<Box<dyn ProvisionStage>>,
    progress: Arc<dyn ProgressHandler>,
}

impl ProvisionPipeline {
    /// The standard seven-stage pipeline, in its fixed order.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(BaseRuntimeStage),
                Box::new(CloudClientStage),
                Box::new(VirtualenvStage),
                Box::new(RequirementsStage),
                Box::new(MakefileStage),
                Box::new(PayloadStage),
                Box::new(VersionStampStage),
            ],
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order and publish the resulting image.
    ///
    /// All-or-nothing: the image becomes visible in the layout index only
    /// after the last stage succeeded. A failed build leaves at most orphan
    /// blobs behind.
    pub async fn run(
        &self,
        spec: PodSpec,
        context_dir: &Path,
        tag: &str,
        config: &PodkilnConfig,
    ) -> Result<ImageHandle> {
        spec.validate().context("invalid pod spec")?;
        config.validate().context("invalid configuration")?;

        let start = Instant::now();
        let build_id = Uuid::new_v4();
        let total = self.stages.len();

        info!(
            build_id = %build_id,
            spec = %spec.name,
            tag = %tag,
            context = %context_dir.display(),
            installer = %config.installer,
            "starting pod image build"
        );
        self.progress.on_progress(&ProgressEvent::Started {
            spec_name: spec.name.clone(),
            stage_count: total,
        });

        let store = LayerStore::open(&config.store_dir)?;
        let staging = TempDir::new().context("failed to create staging directory")?;
        let mut ctx = BuildContext::new(
            spec,
            tag.to_string(),
            context_dir.to_path_buf(),
            staging.path().to_path_buf(),
            config.create_installer(),
        );

        let epoch = config.source_date_epoch;
        let created = timestamp_rfc3339(epoch);
        let mut layers: Vec<Descriptor> = Vec::new();
        let mut diff_ids: Vec<String> = Vec::new();
        let mut history: Vec<HistoryEntry> = Vec::new();

        for (position, stage) in self.stages.iter().enumerate() {
            let index = position + 1;
            let name = stage.name();
            self.progress.on_progress(&ProgressEvent::StageStarted {
                stage: name.to_string(),
                index,
                total,
            });
            let stage_start = Instant::now();

            let outcome = self.stage_result(name, stage.execute(&mut ctx).await)?;
            for warning in &outcome.warnings {
                self.progress.on_progress(&ProgressEvent::Warning {
                    stage: name.to_string(),
                    message: warning.clone(),
                });
            }

            let committed =
                self.stage_result(name, commit_layer(&store, &ctx, name, &outcome, epoch))?;
            if let Some(committed) = &committed {
                self.progress.on_progress(&ProgressEvent::LayerCommitted {
                    stage: name.to_string(),
                    digest: committed.layer.digest.to_string(),
                    size: committed.layer.size,
                    reused: committed.reused,
                });
                layers.push(Descriptor::layer(
                    committed.layer.digest.to_string(),
                    committed.layer.size,
                ));
                diff_ids.push(committed.layer.diff_id.to_string());
            }

            history.push(HistoryEntry {
                created: Some(created.clone()),
                created_by: Some(outcome.created_by.clone()),
                empty_layer: committed.is_none(),
            });

            self.progress.on_progress(&ProgressEvent::StageComplete {
                stage: name.to_string(),
                index,
                total,
                duration: stage_start.elapsed(),
                layer: committed.as_ref().map(|c| c.layer.digest.to_string()),
            });
            debug!(stage = name, "stage complete");
        }

        let mut image_config = ImageConfig::new(created);
        image_config.config.env = ctx.env.to_config_strings();
        image_config.config.working_dir = ctx.working_dir.clone();
        image_config.rootfs.diff_ids = diff_ids;
        image_config.history = history;

        let handle = store
            .publish_image(&image_config, layers, &ctx.tag, &ctx.spec.base_image)
            .context("failed to publish image")?;

        info!(
            image = %handle.image_id,
            short = handle.short_id(),
            layers = handle.layers.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "published pod image"
        );
        self.progress.on_progress(&ProgressEvent::Completed {
            image_id: handle.image_id.to_string(),
            tag: handle.tag.clone(),
            layers: handle.layers.len(),
            total_time: start.elapsed(),
        });

        Ok(handle)
    }

    /// Surface a stage failure as a progress event before converting it
    /// into the build error.
    fn stage_result<T>(&self, stage: &str, result: Result<T, ProvisionError>) -> Result<T> {
        result.map_err(|err| {
            self.progress.on_progress(&ProgressEvent::Failed {
                stage: stage.to_string(),
                error: err.to_string(),
            });
            anyhow::Error::new(err).context(format!("stage '{}' failed", stage))
        })
    }
}

/// Snapshot the paths a stage declared into one committed layer. Stages
/// that declared nothing produce no layer, only a history entry.
fn commit_layer(
    store: &LayerStore,
    ctx: &BuildContext,
    stage: &'static str,
    outcome: &StageOutcome,
    epoch: u64,
) -> Result<Option<CommittedLayer>, ProvisionError> {
    if outcome.paths.is_empty() {
        return Ok(None);
    }

    let layer_err = |source| ProvisionError::Layer { stage, source };
    let mut writer = LayerWriter::create(store.layout_dir(), epoch).map_err(layer_err)?;
    for path in &outcome.paths {
        writer
            .append_staged_path(ctx.staging_root(), path)
            .map_err(layer_err)?;
    }
    writer.finish().map(Some).map_err(layer_err)
}

/// Build a pod image from a spec: the crate's entry point.
///
/// Provisioning never runs as an import side effect; callers invoke this
/// explicitly. Progress is reported through the logging handler.
pub async fn provision(
    spec: PodSpec,
    context_dir: &Path,
    tag: &str,
    config: &PodkilnConfig,
) -> Result<ImageHandle> {
    ProvisionPipeline::standard()
        .with_progress(Arc::new(LoggingHandler))
        .run(spec, context_dir, tag, config)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstallerKind;
    use crate::image::env::BASE_PATH;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn offline_config(store: &TempDir) -> PodkilnConfig {
        PodkilnConfig {
            installer: InstallerKind::Offline,
            pip_binary: "pip3".to_string(),
            install_timeout_secs: 600,
            store_dir: store.path().to_path_buf(),
            source_date_epoch: 0,
            log_level: "info".to_string(),
        }
    }

    fn seed_context() -> TempDir {
        let context = TempDir::new().unwrap();
        fs::write(
            context.path().join("requirements.txt"),
            "flytekit==0.16.0\nwheel==0.36.2\n",
        )
        .unwrap();
        fs::write(
            context.path().join("in_container.mk"),
            "serialize:\n\tpyflyte serialize\n",
        )
        .unwrap();
        fs::create_dir_all(context.path().join("tasks")).unwrap();
        fs::write(context.path().join("tasks/wf.py"), "def wf(): pass\n").unwrap();
        fs::write(context.path().join("sandbox.config"), "allow: s3\n").unwrap();
        context
    }

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<String>>,
    }

    impl ProgressHandler for RecordingHandler {
        fn on_progress(&self, event: &ProgressEvent) {
            let label = match event {
                ProgressEvent::Started { .. } => "started".to_string(),
                ProgressEvent::StageStarted { stage, .. } => format!("stage-started:{}", stage),
                ProgressEvent::StageComplete { stage, .. } => format!("stage-complete:{}", stage),
                ProgressEvent::LayerCommitted { stage, .. } => format!("layer:{}", stage),
                ProgressEvent::Warning { stage, .. } => format!("warning:{}", stage),
                ProgressEvent::Completed { .. } => "completed".to_string(),
                ProgressEvent::Failed { stage, .. } => format!("failed:{}", stage),
            };
            self.events.lock().unwrap().push(label);
        }
    }

    #[tokio::test]
    async fn test_full_build_publishes_expected_contract() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);

        let handle = ProvisionPipeline::standard()
            .run(PodSpec::default(), context.path(), "v123", &config)
            .await
            .unwrap();

        assert!(store.path().join("oci-layout").exists());
        assert!(store.path().join("index.json").exists());

        assert_eq!(
            handle.config.config.env,
            vec![
                "LANG=C.UTF-8".to_string(),
                "LC_ALL=C.UTF-8".to_string(),
                "VENV=/opt/venv".to_string(),
                format!("PATH=/opt/venv/bin:{}", BASE_PATH),
                "PYTHONPATH=/root".to_string(),
                "FLYTE_INTERNAL_IMAGE=v123".to_string(),
            ]
        );
        assert_eq!(handle.config.config.working_dir, "/root");
        assert_eq!(handle.tag, "v123");

        // Seven history entries; env-only stages carry no layer.
        assert_eq!(handle.config.history.len(), 7);
        let empty_flags: Vec<bool> = handle
            .config
            .history
            .iter()
            .map(|h| h.empty_layer)
            .collect();
        assert_eq!(
            empty_flags,
            vec![true, false, false, false, false, false, true]
        );
        assert_eq!(handle.layers.len(), 5);
        assert_eq!(handle.config.rootfs.diff_ids.len(), 5);
        assert_eq!(
            handle.config.history[0].created_by.as_deref(),
            Some("FROM python:3.8-slim-buster")
        );
        assert_eq!(
            handle.config.history[6].created_by.as_deref(),
            Some("ENV FLYTE_INTERNAL_IMAGE=v123")
        );
    }

    #[tokio::test]
    async fn test_identical_inputs_build_identical_images() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);

        let first = ProvisionPipeline::standard()
            .run(PodSpec::default(), context.path(), "v1", &config)
            .await
            .unwrap();
        let second = ProvisionPipeline::standard()
            .run(PodSpec::default(), context.path(), "v1", &config)
            .await
            .unwrap();

        assert_eq!(first.image_id, second.image_id);
        assert_eq!(first.manifest_digest, second.manifest_digest);
        let first_layers: Vec<_> = first.layers.iter().map(|l| &l.digest).collect();
        let second_layers: Vec<_> = second.layers.iter().map(|l| &l.digest).collect();
        assert_eq!(first_layers, second_layers);
    }

    #[tokio::test]
    async fn test_failed_build_publishes_nothing() {
        let store = TempDir::new().unwrap();
        let context = TempDir::new().unwrap(); // no requirements.txt
        let config = offline_config(&store);

        let err = ProvisionPipeline::standard()
            .run(PodSpec::default(), context.path(), "v1", &config)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("requirements"));
        assert!(!store.path().join("index.json").exists());
        assert!(!store.path().join("oci-layout").exists());
    }

    #[tokio::test]
    async fn test_progress_event_sequence() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);
        let recorder = Arc::new(RecordingHandler::default());

        ProvisionPipeline::standard()
            .with_progress(recorder.clone())
            .run(PodSpec::default(), context.path(), "v1", &config)
            .await
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("started"));
        assert_eq!(events.last().map(String::as_str), Some("completed"));
        let starts: Vec<_> = events
            .iter()
            .filter(|e| e.starts_with("stage-started:"))
            .collect();
        assert_eq!(starts.len(), 7);
        assert_eq!(starts[0], "stage-started:base-runtime");
        assert_eq!(starts[6], "stage-started:version-stamp");
        assert!(events.iter().any(|e| e == "layer:virtualenv"));
        assert!(!events.iter().any(|e| e.starts_with("failed")));
    }

    #[tokio::test]
    async fn test_failure_emits_failed_event() {
        let store = TempDir::new().unwrap();
        let context = TempDir::new().unwrap();
        let config = offline_config(&store);
        let recorder = Arc::new(RecordingHandler::default());

        let result = ProvisionPipeline::standard()
            .with_progress(recorder.clone())
            .run(PodSpec::default(), context.path(), "v1", &config)
            .await;
        assert!(result.is_err());

        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| e == "failed:requirements"));
        assert!(!events.iter().any(|e| e == "completed"));
    }

    #[tokio::test]
    async fn test_empty_tag_warns_and_stamps_empty() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);
        let recorder = Arc::new(RecordingHandler::default());

        let handle = ProvisionPipeline::standard()
            .with_progress(recorder.clone())
            .run(PodSpec::default(), context.path(), "", &config)
            .await
            .unwrap();

        assert_eq!(handle.config.env_value("FLYTE_INTERNAL_IMAGE"), Some(""));
        let events = recorder.events.lock().unwrap();
        assert!(events.iter().any(|e| e == "warning:version-stamp"));
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_before_any_stage() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);
        let recorder = Arc::new(RecordingHandler::default());

        let spec = PodSpec {
            python_version: "py38".to_string(),
            ..PodSpec::default()
        };
        let result = ProvisionPipeline::standard()
            .with_progress(recorder.clone())
            .run(spec, context.path(), "v1", &config)
            .await;
        assert!(result.is_err());
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provision_entry_point() {
        let store = TempDir::new().unwrap();
        let context = seed_context();
        let config = offline_config(&store);

        let handle = provision(PodSpec::default(), context.path(), "v9", &config)
            .await
            .unwrap();
        assert_eq!(handle.config.env_value("FLYTE_INTERNAL_IMAGE"), Some("v9"));

        let loaded = LayerStore::load(store.path(), Some("v9")).unwrap();
        assert_eq!(loaded.image_id, handle.image_id);
    }
}
