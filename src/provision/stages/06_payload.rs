//! Payload and policy staging stage

use std::fs;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;
use walkdir::WalkDir;

use crate::provision::context::{BuildContext, IMAGE_ROOT};
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};
use crate::provision::stages::{copy_into_staging, file_name_of};

/// Copies the task code tree to `/root/<tree-name>` and the execution
/// policy file to `/root/<file-name>`, both verbatim: no filtering, no
/// rewriting, symlinks preserved as symlinks. Sets `PYTHONPATH=/root` so
/// the copied code is importable from the working directory.
pub struct PayloadStage;

impl PayloadStage {
    /// Directory name the code tree lands under. A context-root tree (`.`)
    /// has no basename of its own, so the pod name stands in.
    fn payload_dir_name(ctx: &BuildContext) -> String {
        Path::new(&ctx.spec.code_tree)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ctx.spec.name.clone())
    }
}

#[async_trait]
impl ProvisionStage for PayloadStage {
    fn name(&self) -> &'static str {
        "payload"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let tree_source = ctx.context_path(&ctx.spec.code_tree);
        let tree_image_path = format!("{}/{}", IMAGE_ROOT, Self::payload_dir_name(ctx));
        copy_tree(&tree_source, &ctx.staged(&tree_image_path))?;

        let policy_source = ctx.context_path(&ctx.spec.policy_file);
        let policy_image_path = format!("{}/{}", IMAGE_ROOT, file_name_of(&ctx.spec.policy_file));
        copy_into_staging(&policy_source, &ctx.staged(&policy_image_path), "policy file")?;

        ctx.env.set("PYTHONPATH", IMAGE_ROOT);

        info!(tree = %tree_image_path, policy = %policy_image_path, "staged payload");
        Ok(StageOutcome::layered(
            format!(
                "COPY {} {} {}/",
                ctx.spec.code_tree, ctx.spec.policy_file, IMAGE_ROOT
            ),
            vec![tree_image_path, policy_image_path],
        ))
    }
}

/// Replicate a directory tree into staging, entry by entry.
fn copy_tree(source_root: &Path, dest_root: &Path) -> Result<(), ProvisionError> {
    for entry in WalkDir::new(source_root).follow_links(false) {
        let entry = entry.map_err(|err| {
            let io_err = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
            tree_copy_err(source_root, dest_root, io_err)
        })?;

        let rel = entry
            .path()
            .strip_prefix(source_root)
            .map_err(|err| {
                tree_copy_err(
                    entry.path(),
                    dest_root,
                    io::Error::new(io::ErrorKind::Other, err),
                )
            })?
            .to_path_buf();
        let dest = dest_root.join(&rel);

        let replicate = || -> io::Result<()> {
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                replicate_symlink(entry.path(), &dest)
            } else if file_type.is_dir() {
                fs::create_dir_all(&dest)
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &dest).map(|_| ())
            }
        };
        replicate().map_err(|err| tree_copy_err(entry.path(), &dest, err))?;
    }
    Ok(())
}

fn tree_copy_err(from: &Path, to: &Path, source: io::Error) -> ProvisionError {
    ProvisionError::Copy {
        what: "code tree",
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn replicate_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(link)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn replicate_symlink(link: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(link, dest).map(|_| ())
}
