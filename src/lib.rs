//! podkiln - deterministic pod image provisioning
//!
//! This library turns a declarative pod spec into an OCI image layout through
//! a fixed pipeline of provisioning stages: base runtime setup, cloud client
//! install, virtualenv creation, pinned dependency install, build-control
//! staging, payload copy, and version stamping. Every byte that reaches a
//! layer is produced deterministically, so rebuilding the same inputs yields
//! the same image ID.
//!
//! # Core Concepts
//!
//! - **Pod spec**: A YAML document naming the base image, Python version,
//!   dependency manifest, code tree, and policy file to bake into the image
//! - **Stages**: Ordered steps that each stage files under a scratch root
//!   and contribute one layer (or only environment changes) to the image
//! - **Layer store**: A content-addressed OCI layout on disk; publishing an
//!   image is all-or-nothing, so a failed build never updates the index
//!
//! # Example Usage
//!
//! ```ignore
//! use podkiln::config::PodkilnConfig;
//! use podkiln::provision::provision;
//! use podkiln::spec::PodSpec;
//! use std::path::Path;
//!
//! async fn build(context: &Path) -> anyhow::Result<()> {
//!     let spec = PodSpec::from_yaml_file(&context.join("pod.yaml"))?;
//!     let config = PodkilnConfig::default();
//!
//!     let handle = provision(spec, context, "v0.16.2", &config).await?;
//!
//!     println!("built {} as {}", handle.short_id(), handle.tag);
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`spec`]: Pod spec parsing and validation
//! - [`provision`]: The stage pipeline and build orchestration
//! - [`install`]: Dependency installer backends (pip and offline)
//! - [`image`]: OCI layout authoring, layers, and the layer store
//! - [`progress`]: Build progress events and handlers

// Public modules
pub mod cli;
pub mod config;
pub mod image;
pub mod install;
pub mod progress;
pub mod provision;
pub mod spec;
pub mod util;

// Re-export key types for convenient access
pub use config::{ConfigError, InstallerKind, PodkilnConfig};
pub use image::{ImageHandle, LayerStore};
pub use install::{InstallError, Installer};
pub use progress::{ProgressEvent, ProgressHandler};
pub use provision::{provision, BuildContext, ProvisionError, ProvisionPipeline};
pub use spec::{PodSpec, SpecError};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
