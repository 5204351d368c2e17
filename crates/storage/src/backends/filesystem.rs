//! Local filesystem content store.
//!
//! Objects are addressed by the lowercase hex SHA-256 of their content and
//! laid out as `objects/ab/cd/<hex>`. Writes land in `tmp/` first and are
//! renamed into place once fully flushed.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ContentStore, StoredObject, check_range};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ContentAddress, ContentHash, ContentHasher};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";

/// Local filesystem content store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self { root })
    }

    /// Map an address to its object path.
    ///
    /// Only 64-character lowercase hex addresses are accepted, so the
    /// resulting path can never leave the objects directory.
    fn object_path(&self, address: &ContentAddress) -> StorageResult<PathBuf> {
        let hex = address.as_str();
        let is_lower_hex = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !is_lower_hex {
            return Err(StorageError::InvalidAddress(format!(
                "not a sha256 hex address: {address}"
            )));
        }
        Ok(self
            .root
            .join(OBJECTS_DIR)
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(hex))
    }

    /// Check whether an object is present.
    pub async fn contains(&self, address: &ContentAddress) -> StorageResult<bool> {
        let path = self.object_path(address)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    /// Count stored objects.
    pub async fn object_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        let mut stack = vec![self.root.join(OBJECTS_DIR)];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                // file_type() does not follow symlinks
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if file_type.is_file() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn write_stream(
        upload: &mut FilesystemUpload,
        mut data: ByteStream,
    ) -> StorageResult<()> {
        while let Some(chunk) = data.next().await {
            upload.write(&chunk?).await?;
        }
        Ok(())
    }
}

fn open_error(address: &ContentAddress, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(address.to_string())
    } else {
        StorageError::Io(e)
    }
}

fn write_failed(e: std::io::Error) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

#[async_trait]
impl ContentStore for FilesystemBackend {
    #[instrument(skip(self, data), fields(backend = "filesystem"))]
    async fn put(&self, data: ByteStream) -> StorageResult<StoredObject> {
        let temp_path = self
            .root
            .join(TMP_DIR)
            .join(format!(".tmp.{}", Uuid::new_v4()));
        let mut upload = FilesystemUpload::create(temp_path).await?;

        if let Err(e) = Self::write_stream(&mut upload, data).await {
            upload.abort().await;
            return Err(e);
        }

        let (temp_path, hash, size) = upload.finish().await?;
        let address = ContentAddress::from(hash);
        let path = self.object_path(&address)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        if fs::try_exists(&path).await.map_err(write_failed)? {
            // Identical content is already stored under this address.
            let _ = fs::remove_file(&temp_path).await;
            tracing::debug!(address = %address, size, "object already present");
        } else {
            fs::rename(&temp_path, &path).await.map_err(write_failed)?;
            tracing::debug!(address = %address, size, "object stored");
        }

        Ok(StoredObject { address, size })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_range(
        &self,
        address: &ContentAddress,
        offset: u64,
        length: u64,
    ) -> StorageResult<Bytes> {
        check_range(offset, length)?;
        let path = self.object_path(address)?;

        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| open_error(address, e))?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let capacity = usize::try_from(length).map_err(|_| {
            StorageError::InvalidRange(format!(
                "range size {length} exceeds platform address space"
            ))
        })?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(capacity);
        // take() stops at the end of the object, yielding a short read
        file.take(length).read_to_end(&mut buf).await?;

        Ok(Bytes::from(buf))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(self.root.join(OBJECTS_DIR)).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

/// In-progress write into a temp file.
struct FilesystemUpload {
    file: fs::File,
    temp_path: PathBuf,
    hasher: ContentHasher,
    bytes_written: u64,
}

impl FilesystemUpload {
    async fn create(temp_path: PathBuf) -> StorageResult<Self> {
        let file = fs::File::create(&temp_path).await.map_err(write_failed)?;
        Ok(Self {
            file,
            temp_path,
            hasher: ContentHash::hasher(),
            bytes_written: 0,
        })
    }

    async fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data).await.map_err(write_failed)?;
        self.hasher.update(data);
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush to disk and hand back the temp path with the content hash and size.
    async fn finish(self) -> StorageResult<(PathBuf, ContentHash, u64)> {
        let Self {
            mut file,
            temp_path,
            hasher,
            bytes_written,
        } = self;

        let flushed = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = flushed {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_failed(e));
        }
        Ok((temp_path, hasher.finalize(), bytes_written))
    }

    async fn abort(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }
}
