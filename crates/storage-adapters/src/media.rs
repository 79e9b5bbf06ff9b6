//! # LocalMediaStorage
//!
//! Filesystem implementation of `MediaStorage`.
//! Files are sharded into two directory levels by the SHA-256 of their
//! content. Every upload gets its own file, so deleting one listing's image
//! never removes a file another listing still points at.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use uuid::Uuid;

use domains::{DomainError, MediaStorage, Result};

pub struct LocalMediaStorage {
    /// Root directory for all uploads (e.g. "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g. "/uploads")
    url_prefix: String,
}

impl LocalMediaStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// "ab/cd/abcd...hash-<uuid>.ext"
    fn relative_path(hash: &str, unique: &Uuid, ext: &str) -> String {
        format!(
            "{}/{}/{hash}-{}.{ext}",
            &hash[0..2],
            &hash[2..4],
            unique.simple()
        )
    }

    /// Maps a public URL back to a file under the root. Rejects anything that
    /// is not ours or would escape the root.
    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let rel = url
            .strip_prefix(&self.url_prefix)?
            .trim_start_matches('/');
        if rel.is_empty() {
            return None;
        }
        let rel = Path::new(rel);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root_path.join(rel))
    }
}

fn extension_for(content_type: &Mime) -> Result<&'static str> {
    if content_type.type_() != mime::IMAGE {
        return Err(DomainError::validation(format!(
            "unsupported media type '{content_type}'"
        )));
    }
    let ext = match content_type.subtype().as_str() {
        "jpeg" => "jpg",
        "png" => "png",
        "gif" => "gif",
        "webp" => "webp",
        _ => mime_guess::get_mime_extensions(content_type)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    };
    Ok(ext)
}

fn io_err(err: std::io::Error) -> DomainError {
    tracing::error!(error = %err, "media storage i/o failure");
    DomainError::internal(err.to_string())
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, data: Bytes, content_type: &Mime) -> Result<String> {
        if data.is_empty() {
            return Err(DomainError::validation("empty upload"));
        }
        let ext = extension_for(content_type)?;

        let hash = format!("{:x}", Sha256::digest(&data));
        let rel = Self::relative_path(&hash, &Uuid::new_v4(), ext);
        let target = self.root_path.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        fs::write(&target, &data).await.map_err(io_err)?;
        tracing::info!(%hash, bytes = data.len(), "upload stored");

        Ok(format!("{}/{rel}", self.url_prefix))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let Some(path) = self.resolve(url) else {
            return Err(DomainError::validation(format!(
                "'{url}' is not a stored media reference"
            )));
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%url, "media already gone");
                Ok(())
            }
            Err(err) => Err(io_err(err)),
        }
    }
}
