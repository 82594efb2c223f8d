use crate::services::ObjectStorage;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use strata_storage::admin::validate_identifier;
use tracing::debug;
use uuid::Uuid;

/// Object storage rooted at a local directory.
///
/// Keys map to relative paths. Replicas live under `replicas/{region}/`.
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::object_storage_permanent(format!(
                "Invalid object key: {:?}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn not_found(key: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("Object {}", key))
    } else {
        Error::object_storage(format!("{}: {}", key, e))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::object_storage(format!("{}: {}", key, e)))?;
        }

        // Write-then-rename so readers never see a partial object
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::object_storage(format!("{}: {}", key, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::object_storage(format!("{}: {}", key, e)))?;

        debug!(key = key, size = bytes.len(), "Stored object");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| not_found(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn copy(&self, src_key: &str, dest_region: &str) -> Result<String> {
        validate_identifier(dest_region, "Region")?;
        let dest_key = format!("replicas/{}/{}", dest_region, src_key);
        let data = self.get(src_key).await?;
        self.put(&dest_key, data, "application/octet-stream").await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path());

        let key = "backups/us-east-1/teachlink/abc.enc";
        storage
            .put(key, Bytes::from_static(b"sealed"), "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"sealed"));

        storage.delete(key).await.unwrap();
        assert!(storage.get(key).await.unwrap_err().is_not_found());
        assert!(storage.delete(key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_copy_to_region() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path());
        storage
            .put("backups/a.enc", Bytes::from_static(b"x"), "application/octet-stream")
            .await
            .unwrap();

        let replica = storage.copy("backups/a.enc", "us-west-2").await.unwrap();
        assert_eq!(replica, "replicas/us-west-2/backups/a.enc");
        assert_eq!(storage.get(&replica).await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsObjectStorage::new(dir.path());
        for key in ["../escape", "/etc/passwd", "", "a/../../b"] {
            let err = storage.get(key).await.unwrap_err();
            assert!(!err.is_retryable(), "key {:?} should be rejected", key);
        }
    }
}
