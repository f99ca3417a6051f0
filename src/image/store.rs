//! Content-addressed layout store
//!
//! Owns one OCI layout directory: `oci-layout`, `index.json` and
//! `blobs/sha256/*`. Blobs are written through temp files and moved into
//! place with `persist_noclobber`, so concurrent builds of identical content
//! never clobber each other. The index is the only mutable file and is
//! guarded by an advisory file lock.
//!
//! A failed build never reaches [`LayerStore::publish_image`], so it leaves
//! at most orphan blobs behind, never an `index.json`.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use super::digest::Digest;
use super::layer::LayerWriter;
use super::manifest::{
    Descriptor, ImageConfig, ImageIndex, ImageManifest, ANNOTATION_BASE_NAME,
    ANNOTATION_REF_NAME, LAYOUT_VERSION_CONTENT,
};

/// Handle to a published image inside a layout directory.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub layout_dir: PathBuf,
    /// Digest of the image config blob. This is the image ID.
    pub image_id: Digest,
    pub manifest_digest: Digest,
    /// Identity tag recorded at build time. May be empty.
    pub tag: String,
    pub config: ImageConfig,
    pub layers: Vec<Descriptor>,
}

impl ImageHandle {
    /// Abbreviated image ID for human-facing output.
    pub fn short_id(&self) -> &str {
        let hash = self.image_id.hash();
        &hash[..hash.len().min(12)]
    }
}

pub struct LayerStore {
    layout_dir: PathBuf,
}

impl LayerStore {
    /// Open (creating if needed) the blob side of a layout directory.
    pub fn open(layout_dir: &Path) -> Result<Self> {
        fs::create_dir_all(layout_dir.join("blobs/sha256")).with_context(|| {
            format!("failed to create blob store under {}", layout_dir.display())
        })?;
        Ok(Self {
            layout_dir: layout_dir.to_path_buf(),
        })
    }

    pub fn layout_dir(&self) -> &Path {
        &self.layout_dir
    }

    /// Start a new layer whose blob will be committed into this store.
    pub fn layer_writer(&self, mtime: u64) -> Result<LayerWriter> {
        LayerWriter::create(&self.layout_dir, mtime).context("failed to open layer writer")
    }

    /// Serialize `value` as a JSON blob and store it by digest.
    pub fn put_json_blob<T: Serialize>(&self, value: &T) -> Result<(Digest, u64)> {
        let bytes = serde_json::to_vec_pretty(value).context("failed to serialize blob")?;
        let digest = Digest::of_bytes(&bytes);
        let blob_path = digest.to_blob_path(&self.layout_dir);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = NamedTempFile::new_in(self.layout_dir.join("blobs"))
            .context("failed to create temp blob")?;
        tmp.write_all(&bytes).context("failed to write blob")?;
        match tmp.persist_noclobber(&blob_path) {
            Ok(_) => {}
            Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(digest = %digest, "blob already present, reusing");
            }
            Err(err) => {
                return Err(err.error)
                    .with_context(|| format!("failed to persist blob {}", blob_path.display()));
            }
        }
        Ok((digest, bytes.len() as u64))
    }

    pub fn read_json_blob<T: DeserializeOwned>(&self, digest: &str) -> Result<T> {
        let digest = Digest::parse(digest)?;
        let path = digest.to_blob_path(&self.layout_dir);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read blob {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse blob {}", path.display()))
    }

    /// Read-modify-write the layout index under an exclusive file lock.
    pub fn update_index<F>(&self, update_fn: F) -> Result<()>
    where
        F: FnOnce(&mut ImageIndex),
    {
        let index_path = self.layout_dir.join("index.json");
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)
            .with_context(|| format!("failed to open {}", index_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", index_path.display()))?;

        let mut content = String::new();
        let mut index = match file.read_to_string(&mut content) {
            Ok(_) if !content.is_empty() => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", index_path.display()))?,
            _ => ImageIndex::new(),
        };

        update_fn(&mut index);

        file.set_len(0)
            .with_context(|| format!("failed to truncate {}", index_path.display()))?;
        file.seek(SeekFrom::Start(0))?;
        let serialized =
            serde_json::to_string_pretty(&index).context("failed to serialize index")?;
        file.write_all(serialized.as_bytes())
            .with_context(|| format!("failed to write {}", index_path.display()))?;

        debug!(
            manifests = index.manifests.len(),
            path = %index_path.display(),
            "updated layout index"
        );
        Ok(())
    }

    /// Read the layout index under a shared lock. Missing index is an error:
    /// a layout without one was never published.
    pub fn read_index(&self) -> Result<ImageIndex> {
        let index_path = self.layout_dir.join("index.json");
        if !index_path.exists() {
            bail!("no image layout at {}", self.layout_dir.display());
        }

        let mut file = fs::File::open(&index_path)
            .with_context(|| format!("failed to open {}", index_path.display()))?;
        file.lock_shared()
            .with_context(|| format!("failed to lock {}", index_path.display()))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("failed to read {}", index_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", index_path.display()))
    }

    /// Store the config and manifest blobs and make the image visible in the
    /// index. This is the commit point of a build.
    pub fn publish_image(
        &self,
        config: &ImageConfig,
        layers: Vec<Descriptor>,
        tag: &str,
        base_image: &str,
    ) -> Result<ImageHandle> {
        let (config_digest, config_size) = self
            .put_json_blob(config)
            .context("failed to store image config")?;

        let manifest = ImageManifest::new(
            Descriptor::config(config_digest.to_string(), config_size),
            layers.clone(),
        )
        .with_annotation(ANNOTATION_BASE_NAME, base_image);
        let (manifest_digest, manifest_size) = self
            .put_json_blob(&manifest)
            .context("failed to store image manifest")?;

        fs::write(self.layout_dir.join("oci-layout"), LAYOUT_VERSION_CONTENT)
            .context("failed to write oci-layout marker")?;

        let descriptor = Descriptor::manifest(manifest_digest.to_string(), manifest_size)
            .with_annotation(ANNOTATION_REF_NAME, tag)
            .with_annotation(ANNOTATION_BASE_NAME, base_image);
        self.update_index(|index| index.add_or_replace(descriptor))?;

        Ok(ImageHandle {
            layout_dir: self.layout_dir.clone(),
            image_id: config_digest,
            manifest_digest,
            tag: tag.to_string(),
            config: config.clone(),
            layers,
        })
    }

    /// Load a published image back out of a layout directory.
    ///
    /// With a tag the lookup is exact; without one the most recently
    /// published image wins.
    pub fn load(layout_dir: &Path, tag: Option<&str>) -> Result<ImageHandle> {
        let store = Self::open(layout_dir)?;
        let index = store.read_index()?;

        let descriptor = match tag {
            Some(tag) => index
                .find_by_ref(tag)
                .with_context(|| format!("no image tagged '{}' in {}", tag, layout_dir.display()))?,
            None => index
                .latest()
                .with_context(|| format!("no images in {}", layout_dir.display()))?,
        };

        let manifest: ImageManifest = store.read_json_blob(&descriptor.digest)?;
        let config: ImageConfig = store.read_json_blob(&manifest.config.digest)?;

        Ok(ImageHandle {
            layout_dir: layout_dir.to_path_buf(),
            image_id: Digest::parse(&manifest.config.digest)?,
            manifest_digest: Digest::parse(&descriptor.digest)?,
            tag: descriptor.ref_name().unwrap_or_default().to_string(),
            config,
            layers: manifest.layers,
        })
    }
}
