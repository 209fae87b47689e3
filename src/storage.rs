//! Collateral image store
//!
//! Applications carry collateral as base64 data URLs; this module decodes
//! them and owns the files on local disk. The loan core never sees binary
//! content, only the filename references returned from `store`.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Maximum decoded image size: 5 MB
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_TYPES: [(&str, &str); 5] = [
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("png", "png"),
    ("gif", "gif"),
    ("webp", "webp"),
];

/// A decoded collateral image ready for storage
#[derive(Debug)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Decode a `data:image/<type>;base64,<payload>` URL into raw bytes.
pub fn decode_data_url(data_url: &str) -> ApiResult<DecodedImage> {
    let rest = data_url.strip_prefix("data:image/").ok_or_else(|| {
        ApiError::Validation(
            "Each image must be a base64 encoded data URL (JPEG, PNG, GIF, or WebP)".to_string(),
        )
    })?;

    let (image_type, payload) = rest.split_once(";base64,").ok_or_else(|| {
        ApiError::Validation("Image data URL is missing the base64 payload".to_string())
    })?;

    let extension = ALLOWED_TYPES
        .iter()
        .find(|(name, _)| *name == image_type.to_lowercase())
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            ApiError::Validation(format!("Unsupported image type: {}", image_type))
        })?;

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ApiError::Validation(format!("Invalid base64 image data: {}", e)))?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::Validation(
            "Image size cannot exceed 5MB".to_string(),
        ));
    }

    Ok(DecodedImage { bytes, extension })
}

/// Reject names that could escape the upload directory.
pub fn validate_filename(filename: &str) -> ApiResult<()> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(ApiError::Validation("Invalid filename".to_string()));
    }
    Ok(())
}

/// Content type for a stored image, from its extension.
pub fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Local-disk image store
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store a decoded image, returning the opaque filename reference.
    pub async fn store(&self, image: &DecodedImage, owner_id: Uuid) -> ApiResult<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create upload dir: {}", e)))?;

        let filename = format!(
            "{}_{}_{:016x}.{}",
            owner_id,
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen::<u64>(),
            image.extension
        );

        tokio::fs::write(self.root.join(&filename), &image.bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to store image: {}", e)))?;

        Ok(filename)
    }

    /// Whether a stored image exists for this reference.
    pub async fn exists(&self, filename: &str) -> bool {
        if validate_filename(filename).is_err() {
            return false;
        }
        tokio::fs::try_exists(self.root.join(filename))
            .await
            .unwrap_or(false)
    }

    /// Load a stored image with its content type.
    pub async fn load(&self, filename: &str) -> ApiResult<(Vec<u8>, &'static str)> {
        validate_filename(filename)?;

        let bytes = tokio::fs::read(self.root.join(filename))
            .await
            .map_err(|_| ApiError::NotFound(format!("Image {} not found", filename)))?;

        Ok((bytes, content_type_for(filename)))
    }

    /// Best-effort removal, used to clean up after a failed application.
    pub async fn remove(&self, filename: &str) {
        if validate_filename(filename).is_err() {
            return;
        }
        if let Err(err) = tokio::fs::remove_file(self.root.join(filename)).await {
            tracing::warn!(filename = %filename, error = %err, "Failed to remove image");
        }
    }
}
