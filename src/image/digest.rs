use anyhow::{Context, Result};
use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};

/// A content-addressable digest in `algorithm:hash` form (e.g. "sha256:abc123...").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hash: String,
}

impl Digest {
    /// Parse a digest string in format "algorithm:hash"
    pub fn parse(digest: &str) -> Result<Self> {
        let (algorithm, hash) = digest.split_once(':').with_context(|| {
            format!(
                "Invalid digest format (expected 'algorithm:hash'): {}",
                digest
            )
        })?;

        if algorithm.is_empty() || hash.is_empty() {
            anyhow::bail!("Digest has an empty algorithm or hash part: {}", digest);
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hash: hash.to_string(),
        })
    }

    /// Wrap an already-computed sha256 hex string.
    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            hash: hex.into(),
        }
    }

    /// Digest of an in-memory byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::sha256(hex::encode(hasher.finalize()))
    }

    /// Get the algorithm part (e.g., "sha256")
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Get the hash part
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Blob storage path for this digest inside an image layout directory.
    pub fn to_blob_path(&self, layout_dir: &Path) -> PathBuf {
        layout_dir
            .join("blobs")
            .join(&self.algorithm)
            .join(&self.hash)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hash)
    }
}
