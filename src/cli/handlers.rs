//! Command handlers for the podkiln binary
//!
//! Each handler consumes parsed arguments, drives the library, and returns a
//! process exit code: 0 on success, 1 when a build or inspection fails, and 2
//! for usage errors such as a missing context, a bad spec, or invalid
//! configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::cli::commands::{BuildArgs, InspectArgs};
use crate::cli::output::{ImageReport, OutputFormat, OutputFormatter};
use crate::config::{InstallerKind, PodkilnConfig};
use crate::image::LayerStore;
use crate::provision::provision;
use crate::spec::PodSpec;

/// Spec file looked up inside the build context when none is given.
pub const DEFAULT_SPEC_FILE: &str = "pod.yaml";

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    info!("Starting pod image build");

    let context = match &args.context {
        Some(path) => path.clone(),
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to resolve current directory: {}", e);
                return 2;
            }
        },
    };

    if !context.exists() {
        error!("Build context does not exist: {}", context.display());
        return 2;
    }

    if !context.is_dir() {
        error!("Build context is not a directory: {}", context.display());
        return 2;
    }

    let context: PathBuf = match context.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to canonicalize build context: {}", e);
            return 2;
        }
    };
    debug!("Build context: {}", context.display());

    let spec = match load_spec(args, &context) {
        Ok(spec) => spec,
        Err(code) => return code,
    };

    let default_config = PodkilnConfig::default();
    let config = PodkilnConfig {
        installer: if args.offline {
            InstallerKind::Offline
        } else {
            default_config.installer
        },
        store_dir: args.store.clone().unwrap_or(default_config.store_dir),
        ..default_config
    };
    if args.store.is_some() {
        debug!("Layer store overridden to: {}", config.store_dir.display());
    }
    if args.offline {
        debug!("Offline installer forced");
    }

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check your environment variables and command-line arguments.");
        return 2;
    }

    let tag = args.tag.as_deref().unwrap_or("");

    info!("Building '{}' from {}", spec.name, context.display());

    let handle = match provision(spec, &context, tag, &config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Build failed: {}", e);
            return 1;
        }
    };

    info!(
        "Build complete: {} ({} layers)",
        handle.short_id(),
        handle.layers.len()
    );

    let format: OutputFormat = args.format.into();
    let formatter = OutputFormatter::new(format);
    let report = ImageReport::from(&handle);

    let output = match formatter.format_image(&report) {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to format output: {}", e);
            return 1;
        }
    };

    if let Some(output_file) = &args.output {
        match fs::write(output_file, &output) {
            Ok(_) => {
                info!("Output written to: {}", output_file.display());
                if !quiet {
                    println!("Output written to: {}", output_file.display());
                }
            }
            Err(e) => {
                error!("Failed to write output to file: {}", e);
                return 1;
            }
        }
    } else {
        println!("{}", output);
    }

    0
}

pub async fn handle_inspect(args: &InspectArgs) -> i32 {
    let layout = match &args.layout {
        Some(path) => path.clone(),
        None => PodkilnConfig::default().store_dir,
    };
    debug!("Inspecting layout at {}", layout.display());

    let handle = match LayerStore::load(&layout, args.tag.as_deref()) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to load image: {}", e);
            return 1;
        }
    };

    let format: OutputFormat = args.format.into();
    let formatter = OutputFormatter::new(format);
    let report = ImageReport::from(&handle);

    match formatter.format_image(&report) {
        Ok(out) => {
            println!("{}", out);
            0
        }
        Err(e) => {
            error!("Failed to format output: {}", e);
            1
        }
    }
}

/// Resolve the spec: an explicit path must exist, otherwise `pod.yaml` in the
/// context is used when present, and built-in defaults apply when it is not.
fn load_spec(args: &BuildArgs, context: &Path) -> Result<PodSpec, i32> {
    if let Some(path) = &args.spec {
        if !path.exists() {
            error!("Spec file does not exist: {}", path.display());
            return Err(2);
        }
        return PodSpec::from_yaml_file(path).map_err(|e| {
            error!("Failed to load spec: {}", e);
            2
        });
    }

    let default_path = context.join(DEFAULT_SPEC_FILE);
    if default_path.exists() {
        debug!("Using spec at {}", default_path.display());
        return PodSpec::from_yaml_file(&default_path).map_err(|e| {
            error!("Failed to load spec: {}", e);
            2
        });
    }

    debug!("No spec file found in context, using built-in defaults");
    Ok(PodSpec::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::OutputFormatArg;
    use std::fs::File;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn seed_context(dir: &Path) {
        let mut manifest = File::create(dir.join("requirements.txt")).unwrap();
        writeln!(manifest, "flytekit==0.16.0").unwrap();
        fs::write(dir.join("in_container.mk"), "serialize:\n\ttrue\n").unwrap();
        fs::write(dir.join("sandbox.config"), "[sandbox]\n").unwrap();
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("src/wf.py"), "print('hi')\n").unwrap();
    }

    fn build_args(context: &TempDir, store: &TempDir) -> BuildArgs {
        BuildArgs {
            spec: None,
            tag: Some("v-test".to_string()),
            context: Some(context.path().to_path_buf()),
            store: Some(store.path().to_path_buf()),
            offline: true,
            format: OutputFormatArg::Json,
            output: None,
        }
    }

    #[tokio::test]
    async fn test_build_missing_context_is_usage_error() {
        let store = TempDir::new().unwrap();
        let mut args = build_args(&store, &store);
        args.context = Some(PathBuf::from("/nonexistent/podkiln-context"));

        assert_eq!(handle_build(&args, true).await, 2);
    }

    #[tokio::test]
    async fn test_build_bad_spec_is_usage_error() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        seed_context(context.path());
        fs::write(context.path().join("pod.yaml"), "name: [not a string\n").unwrap();

        assert_eq!(handle_build(&build_args(&context, &store), true).await, 2);
    }

    #[tokio::test]
    async fn test_build_missing_explicit_spec_is_usage_error() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        seed_context(context.path());
        let mut args = build_args(&context, &store);
        args.spec = Some(context.path().join("absent.yaml"));

        assert_eq!(handle_build(&args, true).await, 2);
    }

    #[tokio::test]
    async fn test_build_succeeds_and_publishes() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        seed_context(context.path());

        assert_eq!(handle_build(&build_args(&context, &store), true).await, 0);
        assert!(store.path().join("index.json").exists());
        assert!(store.path().join("oci-layout").exists());
    }

    #[tokio::test]
    async fn test_build_writes_output_file() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        seed_context(context.path());
        let out_path = store.path().join("report.json");
        let mut args = build_args(&context, &store);
        args.output = Some(out_path.clone());

        assert_eq!(handle_build(&args, true).await, 0);

        let report: ImageReport =
            serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
        assert_eq!(report.tag, "v-test");
        assert!(!report.layers.is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_exits_one() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        // No requirements.txt in the context.
        fs::write(context.path().join("in_container.mk"), "all:\n").unwrap();
        fs::write(context.path().join("sandbox.config"), "[sandbox]\n").unwrap();

        assert_eq!(handle_build(&build_args(&context, &store), true).await, 1);
        assert!(!store.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn test_inspect_empty_layout_fails() {
        let layout = TempDir::new().unwrap();
        let args = InspectArgs {
            layout: Some(layout.path().to_path_buf()),
            tag: None,
            format: OutputFormatArg::Json,
        };

        assert_eq!(handle_inspect(&args).await, 1);
    }

    #[tokio::test]
    async fn test_inspect_after_build() {
        let context = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        seed_context(context.path());
        assert_eq!(handle_build(&build_args(&context, &store), true).await, 0);

        let args = InspectArgs {
            layout: Some(store.path().to_path_buf()),
            tag: Some("v-test".to_string()),
            format: OutputFormatArg::Yaml,
        };
        assert_eq!(handle_inspect(&args).await, 0);
    }
}
