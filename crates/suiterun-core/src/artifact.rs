//! Artifact storage abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ResourceId, Result};

/// Logical key under which an artifact is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Run that produced the artifact.
    pub run_id: ResourceId,
    /// Artifact file name, e.g. `trace.zip`.
    pub name: String,
}

impl ArtifactKey {
    pub fn trace(run_id: ResourceId) -> Self {
        Self {
            run_id,
            name: "trace.zip".to_string(),
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.run_id, self.name)
    }
}

/// Trait for artifact storage backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a local file under the given key, returning a durable
    /// retrieval URL.
    async fn store(&self, local_path: &Path, key: &ArtifactKey) -> Result<String>;
}
