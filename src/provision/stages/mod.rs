//! The seven ordered provisioning stages
//!
//! Each stage is self-contained: it mutates the staging filesystem and the
//! env contract, then declares which image paths its layer should snapshot.
//! The pipeline owns ordering and layer commits; stages never write blobs.

use std::fs;
use std::path::Path;

use super::stage::ProvisionError;

#[path = "01_base.rs"]
pub mod base;
#[path = "02_cloud_client.rs"]
pub mod cloud_client;
#[path = "03_virtualenv.rs"]
pub mod virtualenv;
#[path = "04_requirements.rs"]
pub mod requirements;
#[path = "05_makefile.rs"]
pub mod makefile;
#[path = "06_payload.rs"]
pub mod payload;
#[path = "07_stamp.rs"]
pub mod stamp;

pub use base::BaseRuntimeStage;
pub use cloud_client::CloudClientStage;
pub use makefile::MakefileStage;
pub use payload::PayloadStage;
pub use requirements::RequirementsStage;
pub use stamp::VersionStampStage;
pub use virtualenv::VirtualenvStage;

/// Basename of a context-relative input, for `/root/<file-name>` staging.
pub(crate) fn file_name_of(relative: &str) -> String {
    Path::new(relative)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.to_string())
}

/// Copy one file into the staging filesystem, creating parent directories.
pub(crate) fn copy_into_staging(
    from: &Path,
    to: &Path,
    what: &'static str,
) -> Result<(), ProvisionError> {
    let copy_err = |source| ProvisionError::Copy {
        what,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(copy_err)?;
    }
    fs::copy(from, to).map_err(copy_err)?;
    Ok(())
}
