//! Image assembly: digests, layers, the blob store and OCI metadata.

pub mod digest;
pub mod env;
pub mod layer;
pub mod manifest;
pub mod store;

pub use digest::Digest;
pub use env::EnvContract;
pub use layer::{CommittedLayer, LayerRef, LayerWriter};
pub use manifest::{Descriptor, HistoryEntry, ImageConfig, ImageIndex, ImageManifest};
pub use store::{ImageHandle, LayerStore};
