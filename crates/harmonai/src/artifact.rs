//! Scratch files produced by the pipelines, and their hand-off to storage.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::storage::ObjectStore;

/// What a generated file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    CoverImage,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "wav",
            Self::CoverImage => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/wav",
            Self::CoverImage => "image/png",
        }
    }

    /// Fresh `<uuid>.<ext>` name. Used for both scratch files and storage keys.
    pub fn fresh_name(&self) -> String {
        format!("{}.{}", Uuid::new_v4(), self.extension())
    }
}

/// A file in the scratch directory waiting to be uploaded or read back.
#[derive(Debug)]
pub struct ScratchFile {
    kind: ArtifactKind,
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a unique path under `output_dir`, creating the directory.
    ///
    /// Nothing is written; the pipeline that produces the content does that.
    pub async fn allocate(output_dir: &Path, kind: ArtifactKind) -> Result<Self> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create scratch dir {}", output_dir.display()))?;

        Ok(Self {
            kind,
            path: output_dir.join(kind.fresh_name()),
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    pub async fn remove(self) -> Result<()> {
        tokio::fs::remove_file(&self.path)
            .await
            .with_context(|| format!("Failed to remove {}", self.path.display()))
    }

    /// Upload under a fresh key, then delete the local file.
    ///
    /// The key is independent of the scratch name. If the upload fails the
    /// file stays where it is.
    #[tracing::instrument(
        name = "artifact.upload",
        skip(self, store),
        fields(kind = ?self.kind, key = tracing::field::Empty)
    )]
    pub async fn upload(self, store: &dyn ObjectStore) -> Result<String> {
        let key = self.kind.fresh_name();
        tracing::Span::current().record("key", key.as_str());

        store
            .put_file(&key, &self.path, self.kind.content_type())
            .await?;
        self.remove().await?;

        Ok(key)
    }
}
