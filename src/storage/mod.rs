mod local;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use self::local::LocalBlobStore;

/// Photo extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif"];

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Opaque blob storage for photos.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return the public URL.
    async fn upload(&self, data: Bytes, key: &str) -> Result<String, BlobError>;

    /// Read a stored blob back. `None` if the key is unknown.
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Key of a URL this store handed out, `None` for foreign URLs.
    fn key_for(&self, url: &str) -> Option<String>;
}

pub type DynBlobStore = Arc<dyn BlobStore>;

/// `wishes/{wish_id}-{uuid}{ext}` for an uploaded photo, with the extension
/// taken from the client's file name and checked against the allow-list.
pub fn photo_key(wish_id: &str, file_name: &str) -> Result<String, BlobError> {
    let ext = file_name
        .rfind('.')
        .map(|i| file_name[i..].to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(BlobError::UnsupportedType(file_name.to_string()));
    }

    Ok(format!("wishes/{}-{}{}", wish_id, Uuid::now_v7(), ext))
}

/// Keys are relative paths of plain segments.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if bad {
        Err(BlobError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
