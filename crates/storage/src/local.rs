//! Filesystem-backed object store for development and tests

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::constants::{PARTIAL_SUFFIX, READ_CHUNK_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::{ChunkStream, ObjectStore, ObjectStream};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!("Local object store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a handle below the root. Handles are relative `/`-separated
    /// paths made of plain segments only.
    fn object_path(&self, handle: &str) -> StorageResult<PathBuf> {
        let invalid = || StorageError::InvalidHandle(handle.to_string());

        if handle.is_empty() || handle.contains('\\') || handle.ends_with(PARTIAL_SUFFIX) {
            return Err(invalid());
        }
        if handle.split('/').any(|segment| segment.is_empty()) {
            return Err(invalid());
        }

        let relative = Path::new(handle);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid());
        }

        Ok(self.root.join(relative))
    }
}

/// Removes an unfinished upload file unless disarmed
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove partial upload {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        handle: &str,
        mut body: ChunkStream,
        _content_type: &str,
    ) -> StorageResult<u64> {
        let path = self.object_path(handle)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut partial_name = path.as_os_str().to_owned();
        partial_name.push(PARTIAL_SUFFIX);
        let mut partial = PartialFile {
            path: PathBuf::from(partial_name),
            armed: true,
        };

        let mut file = fs::File::create(&partial.path).await?;
        let mut total: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StorageError::Body)?;
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&partial.path, &path).await?;
        partial.armed = false;

        debug!("Stored {} bytes at {}", total, path.display());
        Ok(total)
    }

    async fn get(&self, handle: &str) -> StorageResult<ObjectStream> {
        let path = self.object_path(handle)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let stream = async_stream::stream! {
            loop {
                let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
                match file.read_buf(&mut buf).await {
                    Ok(0) => break,
                    Ok(_) => yield Ok(buf.freeze()),
                    Err(e) => {
                        yield Err(StorageError::Io(e));
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn delete(&self, handle: &str) -> StorageResult<()> {
        let path = self.object_path(handle)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, handle: &str) -> StorageResult<bool> {
        let path = self.object_path(handle)?;
        Ok(fs::try_exists(&path).await?)
    }
}
