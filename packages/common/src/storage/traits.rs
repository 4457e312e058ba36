use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::BlobError;
use super::key::BlobKey;

/// Boxed async reader handed out by [`BlobStore::open_read`].
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Content-addressed blob repository.
///
/// The store knows nothing about files, owners or directories; callers keep
/// their own catalog mapping names to keys. Inserting the same content twice
/// yields the same key and stores one copy.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Insert a byte buffer, returning its key.
    async fn insert(&self, data: &[u8]) -> Result<BlobKey, BlobError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.insert_stream(reader).await
    }

    /// Insert from an async reader, returning the key of the streamed bytes.
    async fn insert_stream(&self, reader: BoxReader) -> Result<BlobKey, BlobError>;

    /// Open a streaming reader over a stored blob.
    async fn open_read(&self, key: &BlobKey) -> Result<BoxReader, BlobError>;

    /// Read a blob fully into memory.
    async fn read_all(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        let mut reader = self.open_read(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Whether a blob exists under the given key.
    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError>;

    /// Remove a blob. Returns `false` when there was nothing to remove;
    /// deleting an absent key is not an error.
    async fn delete(&self, key: &BlobKey) -> Result<bool, BlobError>;
}
