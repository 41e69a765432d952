//! Filesystem artifact store.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

use suiterun_core::artifact::{ArtifactKey, ArtifactStore};
use suiterun_core::{Error, Result};

/// Stores artifacts under a local root directory, keyed by run.
///
/// Stand-in for object storage: the returned `file://` URL plays the
/// role S3 URLs do in a deployed setup.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn store(&self, local_path: &Path, key: &ArtifactKey) -> Result<String> {
        let dest_dir = self.root.join(key.run_id.to_string());
        tokio::fs::create_dir_all(&dest_dir).await?;
        let dest = dest_dir.join(&key.name);

        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            Error::Storage(format!("cannot read artifact {}: {e}", local_path.display()))
        })?;
        let checksum = sha256_hex(&bytes);
        tokio::fs::write(&dest, &bytes).await?;

        let url = format!("file://{}", dest.display());
        info!(key = %key, checksum, size = bytes.len(), "artifact stored");
        Ok(url)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
