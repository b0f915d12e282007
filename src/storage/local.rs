use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use super::{validate_key, BlobError, BlobStore};

/// Blobs as plain files under the uploads directory.
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, data: Bytes, key: &str) -> Result<String, BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        tracing::debug!(key = %key, bytes = data.len(), "Blob stored");
        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn key_for(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_url)?.strip_prefix('/')?;
        validate_key(key).ok()?;
        Some(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path(), "/uploads/");

        let url = store
            .upload(Bytes::from_static(b"png-bytes"), "wishes/w1-a.png")
            .await
            .unwrap();
        assert_eq!(url, "/uploads/wishes/w1-a.png");
        assert!(tmp.path().join("wishes/w1-a.png").exists());

        let data = store.fetch("wishes/w1-a.png").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"png-bytes")));
        assert_eq!(store.fetch("wishes/missing.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path(), "/uploads");
        store
            .upload(Bytes::from_static(b"x"), "wishes/w1-b.gif")
            .await
            .unwrap();

        store.delete("wishes/w1-b.gif").await.unwrap();
        store.delete("wishes/w1-b.gif").await.unwrap();
        assert_eq!(store.fetch("wishes/w1-b.gif").await.unwrap(), None);
    }

    #[test]
    fn key_for_only_recognises_own_urls() {
        let store = LocalBlobStore::new("/tmp/unused", "https://cdn.example.com/u");
        assert_eq!(
            store.key_for("https://cdn.example.com/u/wishes/w1-a.png").as_deref(),
            Some("wishes/w1-a.png")
        );
        assert_eq!(store.key_for("https://elsewhere.com/u/wishes/w1-a.png"), None);
        assert_eq!(store.key_for("https://cdn.example.com/u/../x.png"), None);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(tmp.path(), "/uploads");
        assert!(matches!(
            store.upload(Bytes::from_static(b"x"), "../escape.png").await,
            Err(BlobError::InvalidKey(_))
        ));
    }
}
