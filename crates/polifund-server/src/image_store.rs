//! Directory-backed image bucket. Files are named by their image id;
//! metadata lives in the store crate's `images` table.

use std::path::{Component, Path, PathBuf};

use image::ImageFormat;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .or_else(|_| target.strip_prefix(&canonical_base))
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ServerError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// MIME type of the image format detected from the file's magic bytes,
/// limited to the formats the platform accepts.
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// `image/jpg` is a common alias of `image/jpeg`.
pub fn canonical_content_type(content_type: &str) -> String {
    let lower = content_type.trim().to_ascii_lowercase();
    if lower == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        lower
    }
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    base_path: PathBuf,
}

impl ImageStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::ImageStorage(format!(
                "Failed to create image directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Image store initialized");

        Ok(Self { base_path })
    }

    /// Write the image under `id` and return its BLAKE3 hash (hex).
    pub async fn put(&self, id: Uuid, data: &[u8]) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Pusty plik".to_string()));
        }

        let path = self.safe_image_path(&id)?;
        fs::write(&path, data)
            .await
            .map_err(|e| ServerError::ImageStorage(format!("Failed to write image {}: {}", id, e)))?;

        let hash = blake3::hash(data).to_hex().to_string();
        debug!(id = %id, size = data.len(), hash = %hash, "Stored image");
        Ok(hash)
    }

    pub async fn get(&self, id: Uuid) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_image_path(&id)?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!(id = %id, size = data.len(), "Read image");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerError::NotFound(format!("Image {id} not found")))
            }
            Err(e) => Err(ServerError::ImageStorage(format!(
                "Failed to read image {}: {}",
                id, e
            ))),
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServerError> {
        let path = self.safe_image_path(&id)?;
        fs::remove_file(&path).await.map_err(|e| {
            ServerError::ImageStorage(format!("Failed to delete image {}: {}", id, e))
        })?;
        debug!(id = %id, "Deleted image");
        Ok(())
    }

    fn safe_image_path(&self, id: &Uuid) -> Result<PathBuf, ServerError> {
        let raw = self.base_path.join(id.to_string());
        ensure_within(&self.base_path, &raw)
    }
}
