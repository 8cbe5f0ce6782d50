// =====================================================================================
// ATTACHMENT STORAGE
// =====================================================================================

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::validation::Validator;

use crate::models::UploadAttachmentRequest;

/// Where attachment bytes live. Rows keep the returned location.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, AppError>;

    async fn remove(&self, location: &str) -> Result<(), AppError>;
}

/// Files under a root directory, one sub-directory per record.
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.upload_dir)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::BadRequest(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AttachmentStore for LocalDiskStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Internal(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(key.to_string())
    }

    async fn remove(&self, location: &str) -> Result<(), AppError> {
        let path = self.resolve(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Attachment {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(AppError::Internal(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// A checked upload ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DecodedUpload {
    /// `{record_id}/{uuid}-{file_name}`
    pub fn storage_key(&self, record_id: Uuid) -> String {
        format!("{}/{}-{}", record_id, Uuid::new_v4(), self.file_name)
    }
}

/// Keeps the last path segment and replaces anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

/// Validates type and size and decodes the payload. Accepts plain base64 or
/// a `data:<mime>;base64,` URL.
pub fn decode_upload(
    request: UploadAttachmentRequest,
    max_size: usize,
    allowed_types: &[String],
) -> Result<DecodedUpload, AppError> {
    let mime_type = request.mime_type.trim().to_lowercase();
    let mut validator = Validator::new();
    validator.required("fileName", &request.file_name).required("data", &request.data);
    validator.check(
        allowed_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&mime_type)),
        "mimeType",
        &format!("File type must be one of: {}", allowed_types.join(", ")),
    );
    validator.finish()?;

    let encoded = match request.data.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => request.data.as_str(),
    };
    // Encoded length bounds the decoded size; reject early before allocating.
    if encoded.len() / 4 * 3 > max_size + 3 {
        return Err(too_large(max_size));
    }
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| AppError::field("data", &format!("Invalid base64 data: {}", e)))?;
    if bytes.len() > max_size {
        return Err(too_large(max_size));
    }

    Ok(DecodedUpload {
        file_name: sanitize_file_name(&request.file_name),
        mime_type,
        bytes,
    })
}

fn too_large(max_size: usize) -> AppError {
    AppError::PayloadTooLarge(format!("File exceeds the maximum size of {} bytes", max_size))
}
