//! Deterministic layer authoring
//!
//! A layer is written once, through a hashing chain that computes both
//! digests the image metadata needs in a single pass:
//!
//! ```text
//! tar::Builder -> HashingWriter (diff_id, uncompressed)
//!              -> GzEncoder
//!              -> HashingWriter (blob digest, compressed)
//!              -> NamedTempFile
//! ```
//!
//! The temp file is persisted into the blob store under its own digest, so
//! identical content written by two runs lands on the same path and the
//! second write is a no-op.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest as _, Sha256};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::digest::Digest;

/// Immutable reference to a committed layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRef {
    /// Digest of the compressed blob, as referenced from the manifest.
    pub digest: Digest,
    /// Digest of the uncompressed tar stream, as listed in `rootfs.diff_ids`.
    pub diff_id: Digest,
    /// Size of the compressed blob in bytes.
    pub size: u64,
}

/// Result of persisting a finished layer into the blob store.
#[derive(Debug, Clone)]
pub struct CommittedLayer {
    pub layer: LayerRef,
    /// True when an identical blob already existed and was kept.
    pub reused: bool,
}

/// `Write` adapter that hashes everything flowing through it.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    fn finalize(self) -> (W, Digest, u64) {
        let digest = Digest::sha256(hex::encode(self.hasher.finalize()));
        (self.inner, digest, self.bytes_written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

type LayerSink = HashingWriter<GzEncoder<HashingWriter<NamedTempFile>>>;

/// Writes one layer tar with normalized metadata.
///
/// All entries carry uid/gid 0 and the mtime passed at construction, so a
/// rebuild from identical inputs produces byte-identical blobs.
pub struct LayerWriter {
    builder: Builder<LayerSink>,
    layout_dir: PathBuf,
    mtime: u64,
    seen_dirs: HashSet<PathBuf>,
}

impl LayerWriter {
    /// Open a writer whose finished blob will land under `layout_dir/blobs`.
    pub fn create(layout_dir: &Path, mtime: u64) -> io::Result<Self> {
        let blobs = layout_dir.join("blobs");
        fs::create_dir_all(&blobs)?;
        let tmp = NamedTempFile::new_in(&blobs)?;
        let gz = GzEncoder::new(HashingWriter::new(tmp), Compression::default());
        let builder = Builder::new(HashingWriter::new(gz));
        Ok(Self {
            builder,
            layout_dir: layout_dir.to_path_buf(),
            mtime,
            seen_dirs: HashSet::new(),
        })
    }

    fn base_header(&self, entry_type: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        header
    }

    /// Emit directory entries for every ancestor of `archive_path` that this
    /// layer has not emitted yet.
    fn ensure_parents(&mut self, archive_path: &Path) -> io::Result<()> {
        let mut accumulated = PathBuf::new();
        let mut pending = Vec::new();
        let components: Vec<_> = archive_path.components().collect();
        for component in &components[..components.len().saturating_sub(1)] {
            if let Component::Normal(part) = component {
                accumulated.push(part);
                if self.seen_dirs.insert(accumulated.clone()) {
                    pending.push(accumulated.clone());
                }
            }
        }
        for dir in pending {
            let mut header = self.base_header(EntryType::dir(), 0o755, 0);
            let name = format!("{}/", dir.display());
            self.builder.append_data(&mut header, name, io::empty())?;
        }
        Ok(())
    }

    /// Append a regular file with inline content.
    pub fn append_file_bytes(
        &mut self,
        image_path: &str,
        mode: u32,
        data: &[u8],
    ) -> io::Result<()> {
        let archive_path = archive_path(image_path);
        self.ensure_parents(&archive_path)?;
        let mut header = self.base_header(EntryType::Regular, mode, data.len() as u64);
        self.builder.append_data(&mut header, archive_path, data)
    }

    fn append_dir_entry(&mut self, archive_path: &Path, mode: u32) -> io::Result<()> {
        self.ensure_parents(archive_path)?;
        if !self.seen_dirs.insert(archive_path.to_path_buf()) {
            return Ok(());
        }
        let mut header = self.base_header(EntryType::dir(), mode, 0);
        let name = format!("{}/", archive_path.display());
        self.builder.append_data(&mut header, name, io::empty())
    }

    fn append_symlink_entry(&mut self, archive_path: &Path, target: &Path) -> io::Result<()> {
        self.ensure_parents(archive_path)?;
        let mut header = self.base_header(EntryType::symlink(), 0o777, 0);
        self.builder.append_link(&mut header, archive_path, target)
    }

    fn append_file_entry(&mut self, archive_path: &Path, source: &Path) -> io::Result<()> {
        self.ensure_parents(archive_path)?;
        let meta = source.metadata()?;
        let mut header = self.base_header(EntryType::Regular, file_mode(&meta), meta.len());
        let file = fs::File::open(source)?;
        self.builder.append_data(&mut header, archive_path, file)
    }

    /// Snapshot one path out of a staged root filesystem.
    ///
    /// `image_path` is the absolute path inside the image; its on-disk
    /// counterpart is the same path re-rooted under `staging_root`. A
    /// directory is walked in file-name order so the entry sequence does not
    /// depend on readdir order.
    pub fn append_staged_path(&mut self, staging_root: &Path, image_path: &str) -> io::Result<()> {
        let source_root = staging_root.join(image_path.trim_start_matches('/'));
        let meta = fs::symlink_metadata(&source_root)?;

        if !meta.is_dir() {
            return self.append_staged_entry(&archive_path(image_path), &source_root, &meta);
        }

        for entry in WalkDir::new(&source_root).sort_by_file_name() {
            let entry = entry.map_err(into_io_error)?;
            let rel = entry
                .path()
                .strip_prefix(&source_root)
                .map_err(into_io_error)?;
            let mapped = if rel.as_os_str().is_empty() {
                archive_path(image_path)
            } else {
                archive_path(image_path).join(rel)
            };
            let meta = entry.metadata().map_err(into_io_error)?;
            self.append_staged_entry(&mapped, entry.path(), &meta)?;
        }
        Ok(())
    }

    fn append_staged_entry(
        &mut self,
        archive_path: &Path,
        source: &Path,
        meta: &fs::Metadata,
    ) -> io::Result<()> {
        if meta.file_type().is_symlink() {
            let target = fs::read_link(source)?;
            self.append_symlink_entry(archive_path, &target)
        } else if meta.is_dir() {
            self.append_dir_entry(archive_path, dir_mode(meta))
        } else {
            self.append_file_entry(archive_path, source)
        }
    }

    /// Finish the tar stream and move the blob into the store.
    pub fn finish(self) -> io::Result<CommittedLayer> {
        let tar_sink = self.builder.into_inner()?;
        let (gz, diff_id, _) = tar_sink.finalize();
        let blob_sink = gz.finish()?;
        let (tmp, digest, size) = blob_sink.finalize();

        let blob_path = digest.to_blob_path(&self.layout_dir);
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let reused = match tmp.persist_noclobber(&blob_path) {
            Ok(_) => false,
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => true,
            Err(err) => return Err(err.error),
        };

        Ok(CommittedLayer {
            layer: LayerRef {
                digest,
                diff_id,
                size,
            },
            reused,
        })
    }
}

/// Convert an absolute image path into the relative form tar entries use.
fn archive_path(image_path: &str) -> PathBuf {
    PathBuf::from(image_path.trim_start_matches('/'))
}

fn into_io_error<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::Other, err)
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn dir_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn dir_mode(_meta: &fs::Metadata) -> u32 {
    0o755
}
