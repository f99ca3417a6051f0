//! Isolated environment stage

use std::fs;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::image::env::VENV_ENV;
use crate::provision::context::{BuildContext, VENV_ROOT};
use crate::provision::stage::{ProvisionError, ProvisionStage, StageOutcome};

/// Creates the self-contained interpreter environment under `/opt/venv`
/// and wires it into the env contract: `VENV=/opt/venv` and `/opt/venv/bin`
/// prepended to `PATH`. Precedence over the base interpreter comes from
/// `PATH` ordering alone; nothing global is removed.
pub struct VirtualenvStage;

impl VirtualenvStage {
    fn pyvenv_cfg(python_version: &str) -> String {
        format!(
            "home = /usr/local/bin\ninclude-system-site-packages = false\nversion = {}\n",
            python_version
        )
    }

    fn activate_script() -> &'static str {
        concat!(
            "# Activate the isolated environment: `. /opt/venv/bin/activate`\n",
            "export VIRTUAL_ENV=\"/opt/venv\"\n",
            "export PATH=\"$VIRTUAL_ENV/bin:$PATH\"\n",
            "unset PYTHONHOME\n",
        )
    }
}

#[async_trait]
impl ProvisionStage for VirtualenvStage {
    fn name(&self) -> &'static str {
        "virtualenv"
    }

    async fn execute(&self, ctx: &mut BuildContext) -> Result<StageOutcome, ProvisionError> {
        let venv = ctx.staged(VENV_ROOT);
        let bin = venv.join("bin");
        let site_packages = ctx.staged(&ctx.venv_site_packages());

        create_dir(&bin)?;
        create_dir(&site_packages)?;
        write_file(
            &venv.join("pyvenv.cfg"),
            Self::pyvenv_cfg(&ctx.spec.python_version),
        )?;
        write_file(&bin.join("activate"), Self::activate_script())?;

        ctx.env.set(VENV_ENV, VENV_ROOT);
        ctx.env.prepend_path(&ctx.venv_bin());

        debug!(root = VENV_ROOT, "created isolated environment");
        Ok(StageOutcome::layered(
            format!("RUN python3 -m venv {}", VENV_ROOT),
            vec![VENV_ROOT.to_string()],
        ))
    }
}

fn create_dir(path: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(path).map_err(|source| staging_err(path, source))
}

fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), ProvisionError> {
    fs::write(path, content).map_err(|source| staging_err(path, source))
}

fn staging_err(path: &Path, source: io::Error) -> ProvisionError {
    ProvisionError::Staging {
        path: path.to_path_buf(),
        source,
    }
}
