//! Where finished variations go.
//!
//! The engine only needs one thing from persistence: hand over encoded bytes plus
//! a little metadata and get back a URL. Anything richer (signed URLs, database
//! rows) belongs to the service embedding the engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core_modules::codec::OutputFormat;
use crate::error::{RecolorError, Result};
use crate::pipeline::VariationOutput;

/// Describes one stored variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationMetadata {
    /// Position of the variation in the submitted batch.
    pub index: usize,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub format: OutputFormat,
    pub palette: Vec<String>,
}

impl VariationMetadata {
    pub fn for_output(index: usize, output: &VariationOutput) -> Self {
        Self {
            index,
            name: output.name.clone(),
            description: output.description.clone(),
            format: output.format,
            palette: output.palette.clone(),
        }
    }

    /// File-name-safe form of the palette name, with the format extension.
    pub fn file_name(&self) -> String {
        format!("{}.{}", slug(&self.name), self.format.extension())
    }
}

/// Persistence collaborator for finished variations.
#[async_trait::async_trait]
pub trait StorageSink: Send + Sync {
    /// Stores one encoded variation and returns where it can be fetched.
    async fn store(&self, bytes: &[u8], metadata: &VariationMetadata) -> Result<String>;
}

/// One object held by a [`MemoryStorageSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub url: String,
    pub bytes: Vec<u8>,
    pub metadata: VariationMetadata,
}

/// Keeps everything in memory. URLs look like `memory://<n>/<slug>.<ext>`.
#[derive(Debug, Default)]
pub struct MemoryStorageSink {
    objects: Mutex<Vec<StoredObject>>,
}

impl MemoryStorageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageSink for MemoryStorageSink {
    async fn store(&self, bytes: &[u8], metadata: &VariationMetadata) -> Result<String> {
        let mut objects = self.objects.lock().await;
        let url = format!("memory://{}/{}", objects.len(), metadata.file_name());
        objects.push(StoredObject {
            url: url.clone(),
            bytes: bytes.to_vec(),
            metadata: metadata.clone(),
        });
        Ok(url)
    }
}

/// Writes each variation as `<index>-<slug>.<ext>` under a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl StorageSink for DirectorySink {
    async fn store(&self, bytes: &[u8], metadata: &VariationMetadata) -> Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RecolorError::storage(format!("cannot create {}", self.root.display()), e))?;

        let path = self
            .root
            .join(format!("{:02}-{}", metadata.index, metadata.file_name()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RecolorError::storage(format!("cannot write {}", path.display()), e))?;
        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| RecolorError::storage(format!("cannot resolve {}", path.display()), e))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "stored variation");
        Ok(format!("file://{}", path.display()))
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "variation".to_string()
    } else {
        trimmed.to_string()
    }
}
