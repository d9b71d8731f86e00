//! Local-disk object store.
//!
//! Payloads live under `base_path/{container}/{shard}/{shard}/{name}` where the
//! shards are the first two bytes of MD5(`container/name`). Writes go to a
//! temporary file that is fsynced and renamed into place, so readers never see
//! a partial object. The content type is kept next to the payload in a
//! `.{name}.content-type` sidecar.

use super::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_NAME_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    base_path: PathBuf,
    container: String,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            container: container.into(),
        }
    }

    /// Rejects names that could escape the container directory or collide
    /// with sidecar and temp files.
    fn ensure_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = name.is_empty()
            || name.len() > MAX_OBJECT_NAME_LEN
            || name.starts_with('.')
            || name.contains('/')
            || name
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn container_root(&self) -> PathBuf {
        self.base_path.join(&self.container)
    }

    fn object_shards(&self, name: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.container, name));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, name: &str) -> PathBuf {
        let (shard_a, shard_b) = self.object_shards(name);
        let mut path = self.container_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(name);
        path
    }

    fn content_type_path(&self, name: &str) -> PathBuf {
        self.object_path(name)
            .with_file_name(format!(".{}.content-type", name))
    }

    /// Write `data` to `path` through a temp file in the same directory.
    async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = Self::write_and_rename(&tmp_path, path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    async fn write_and_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::create(tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(tmp_path, path).await
    }

    /// Return the stored content type, if one was ever set.
    pub async fn content_type(&self, name: &str) -> StoreResult<Option<String>> {
        self.ensure_name_safe(name)?;
        match fs::read_to_string(self.content_type_path(name)).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        match fs::metadata(self.container_root()).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn create_container(&self) -> StoreResult<()> {
        fs::create_dir_all(self.container_root()).await?;
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> StoreResult<bool> {
        self.ensure_name_safe(name)?;
        match fs::metadata(self.object_path(name)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn write_object(&self, name: &str, data: Bytes) -> StoreResult<()> {
        self.ensure_name_safe(name)?;
        let path = self.object_path(name);
        Self::write_atomic(&path, &data).await?;

        // A rewrite starts without metadata, like a fresh remote blob.
        match fs::remove_file(self.content_type_path(name)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::Io(err)),
        }

        debug!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    async fn set_content_type(&self, name: &str, content_type: &str) -> StoreResult<()> {
        if !self.object_exists(name).await? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Self::write_atomic(&self.content_type_path(name), content_type.as_bytes()).await
    }

    async fn read_object(&self, name: &str) -> StoreResult<Bytes> {
        self.ensure_name_safe(name)?;
        match fs::read(self.object_path(name)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}
