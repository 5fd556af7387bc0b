use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// Image formats accepted for upload, detected from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ServerError::BadRequest("Path traversal detected".into()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest("Path traversal detected".into()));
    }
    Ok(resolved)
}

/// Uploaded images on local disk, one file per upload named by its id.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
    public_url: String,
}

impl BlobStore {
    pub async fn new(
        base_path: PathBuf,
        max_size: usize,
        public_url: impl Into<String>,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Upload(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Upload store initialized");

        Ok(Self {
            base_path,
            max_size,
            public_url: public_url.into(),
        })
    }

    /// Public URL under which an upload is served.
    pub fn url_for(&self, id: Uuid) -> String {
        format!("{}/api/uploads/{}", self.public_url, id)
    }

    pub async fn store_image(&self, data: &[u8]) -> Result<Uuid, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty upload".into()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::UploadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }
        let kind = ImageKind::sniff(data)
            .ok_or_else(|| ServerError::BadRequest("Unsupported image format".into()))?;

        let id = Uuid::new_v4();
        let path = self.safe_path(&id)?;

        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::Upload(format!("Failed to write upload {id}: {e}")))?;

        debug!(id = %id, size = data.len(), kind = kind.content_type(), "Stored upload");
        Ok(id)
    }

    pub async fn get_image(&self, id: Uuid) -> Result<(ImageKind, Vec<u8>), ServerError> {
        let path = self.safe_path(&id)?;

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServerError::NotFound(format!("Upload {id}")));
            }
            Err(e) => {
                return Err(ServerError::Upload(format!("Failed to read upload {id}: {e}")));
            }
        };

        let kind = ImageKind::sniff(&data)
            .ok_or_else(|| ServerError::Upload(format!("Stored upload {id} is not an image")))?;
        Ok((kind, data))
    }

    fn safe_path(&self, id: &Uuid) -> Result<PathBuf, ServerError> {
        let raw = self.base_path.join(id.to_string());
        ensure_within(&self.base_path, &raw)
    }
}
