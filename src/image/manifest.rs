//! OCI image metadata schemas
//!
//! Serde models for the three JSON documents a layout carries: the index,
//! per-image manifests, and the image config. Field names follow the OCI
//! image-spec exactly, which mixes conventions: descriptors are camelCase,
//! `rootfs`/`history` are snake_case, and the runtime section uses the
//! Go-style capitalized keys (`Env`, `WorkingDir`).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const OCI_SCHEMA_VERSION: i32 = 2;
pub const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";
pub const ANNOTATION_BASE_NAME: &str = "org.opencontainers.image.base.name";

pub const DEFAULT_ARCHITECTURE: &str = "amd64";
pub const DEFAULT_OS: &str = "linux";

/// Content of the `oci-layout` marker file.
pub const LAYOUT_VERSION_CONTENT: &str = "{\"imageLayoutVersion\": \"1.0.0\"}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub digest: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub config: RuntimeConfig,
    pub rootfs: RootFs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

/// Runtime section of the image config (`Env`, `WorkingDir`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "Env", default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(rename = "WorkingDir", default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    #[serde(rename = "Cmd", default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub diff_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_layer: bool,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self {
            schema_version: OCI_SCHEMA_VERSION,
            media_type: Some(INDEX_MEDIA_TYPE.to_string()),
            manifests: Vec::new(),
        }
    }

    /// Insert a manifest descriptor, replacing any existing entry that
    /// carries the same `ref.name` annotation. Rebuilding a tag points it at
    /// the new manifest instead of accumulating stale entries.
    pub fn add_or_replace(&mut self, descriptor: Descriptor) {
        let name = descriptor.ref_name().map(str::to_string);
        if let Some(name) = name {
            self.manifests
                .retain(|m| m.ref_name() != Some(name.as_str()));
        }
        self.manifests.push(descriptor);
    }

    pub fn find_by_ref(&self, name: &str) -> Option<&Descriptor> {
        self.manifests.iter().find(|m| m.ref_name() == Some(name))
    }

    /// Most recently added manifest.
    pub fn latest(&self) -> Option<&Descriptor> {
        self.manifests.last()
    }
}

impl Default for ImageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptor {
    pub fn manifest(digest: String, size: u64) -> Self {
        Self::new(MANIFEST_MEDIA_TYPE, digest, size)
    }

    pub fn config(digest: String, size: u64) -> Self {
        Self::new(CONFIG_MEDIA_TYPE, digest, size)
    }

    pub fn layer(digest: String, size: u64) -> Self {
        Self::new(LAYER_MEDIA_TYPE, digest, size)
    }

    fn new(media_type: &str, digest: String, size: u64) -> Self {
        Self {
            media_type: Some(media_type.to_string()),
            digest,
            size,
            annotations: None,
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    pub fn ref_name(&self) -> Option<&str> {
        self.annotation(ANNOTATION_REF_NAME)
    }
}

impl ImageManifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: OCI_SCHEMA_VERSION,
            media_type: Some(MANIFEST_MEDIA_TYPE.to_string()),
            config,
            layers,
            annotations: None,
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl ImageConfig {
    pub fn new(created: String) -> Self {
        Self {
            created: Some(created),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            os: DEFAULT_OS.to_string(),
            config: RuntimeConfig::default(),
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids: Vec::new(),
            },
            history: Vec::new(),
        }
    }

    /// Value of one environment variable in the runtime section, if present.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        let prefix = format!("{}=", key);
        self.config
            .env
            .iter()
            .find(|entry| entry.starts_with(&prefix))
            .map(|entry| &entry[prefix.len()..])
    }
}

/// Format a unix epoch as the RFC 3339 timestamp OCI metadata expects.
/// Out-of-range values clamp to the epoch itself.
pub fn timestamp_rfc3339(epoch: u64) -> String {
    DateTime::<Utc>::from_timestamp(epoch as i64, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_serializes_camel_case() {
        let mut index = ImageIndex::new();
        index.add_or_replace(
            Descriptor::manifest("sha256:abc".to_string(), 42)
                .with_annotation(ANNOTATION_REF_NAME, "v1"),
        );

        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], INDEX_MEDIA_TYPE);
        assert_eq!(json["manifests"][0]["mediaType"], MANIFEST_MEDIA_TYPE);
        assert_eq!(json["manifests"][0]["digest"], "sha256:abc");
        assert_eq!(
            json["manifests"][0]["annotations"][ANNOTATION_REF_NAME],
            "v1"
        );
    }

    #[test]
    fn test_add_or_replace_keyed_on_ref_name() {
        let mut index = ImageIndex::new();
        index.add_or_replace(
            Descriptor::manifest("sha256:old".to_string(), 1)
                .with_annotation(ANNOTATION_REF_NAME, "v1"),
        );
        index.add_or_replace(
            Descriptor::manifest("sha256:other".to_string(), 1)
                .with_annotation(ANNOTATION_REF_NAME, "v2"),
        );
        index.add_or_replace(
            Descriptor::manifest("sha256:new".to_string(), 1)
                .with_annotation(ANNOTATION_REF_NAME, "v1"),
        );

        assert_eq!(index.manifests.len(), 2);
        assert_eq!(index.find_by_ref("v1").unwrap().digest, "sha256:new");
        assert_eq!(index.find_by_ref("v2").unwrap().digest, "sha256:other");
        assert_eq!(index.latest().unwrap().digest, "sha256:new");
    }

    #[test]
    fn test_config_round_trip_field_names() {
        let mut config = ImageConfig::new(timestamp_rfc3339(0));
        config.config.env = vec!["LANG=C.UTF-8".to_string(), "VENV=/opt/venv".to_string()];
        config.config.working_dir = "/root".to_string();
        config.rootfs.diff_ids = vec!["sha256:d1".to_string()];
        config.history.push(HistoryEntry {
            created: Some(timestamp_rfc3339(0)),
            created_by: Some("base-runtime".to_string()),
            empty_layer: true,
        });
        config.history.push(HistoryEntry {
            created: Some(timestamp_rfc3339(0)),
            created_by: Some("payload".to_string()),
            empty_layer: false,
        });

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["created"], "1970-01-01T00:00:00Z");
        assert_eq!(json["config"]["Env"][1], "VENV=/opt/venv");
        assert_eq!(json["config"]["WorkingDir"], "/root");
        assert_eq!(json["rootfs"]["type"], "layers");
        assert_eq!(json["rootfs"]["diff_ids"][0], "sha256:d1");
        assert_eq!(json["history"][0]["empty_layer"], true);
        assert!(json["history"][1].get("empty_layer").is_none());

        let parsed: ImageConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.env_value("VENV"), Some("/opt/venv"));
        assert_eq!(parsed.env_value("MISSING"), None);
        assert!(!parsed.history[1].empty_layer);
    }

    #[test]
    fn test_env_value_on_empty_assignment() {
        let mut config = ImageConfig::new(timestamp_rfc3339(0));
        config.config.env = vec!["FLYTE_INTERNAL_IMAGE=".to_string()];
        assert_eq!(config.env_value("FLYTE_INTERNAL_IMAGE"), Some(""));
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(timestamp_rfc3339(0), "1970-01-01T00:00:00Z");
        assert_eq!(timestamp_rfc3339(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
