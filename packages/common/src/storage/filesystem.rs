use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::BlobError;
use super::key::BlobKey;
use super::traits::{BlobStore, BoxReader};

/// Blob store backed by a local directory tree.
///
/// Layout is `{root}/{shard_dir}/{shard_file}` keyed by content hash, so the
/// root fans out over at most 256 shard directories. Writes go to a scratch
/// file first and are renamed into place, which keeps partially written blobs
/// out of the addressable namespace.
pub struct FsBlobStore {
    root: PathBuf,
    max_blob_size: u64,
}

impl FsBlobStore {
    pub async fn new(root: PathBuf, max_blob_size: u64) -> Result<Self, BlobError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".scratch")).await?;
        Ok(Self {
            root,
            max_blob_size,
        })
    }

    fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.root.join(key.shard_dir()).join(key.shard_file())
    }

    fn scratch_path(&self) -> PathBuf {
        self.root
            .join(".scratch")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Move a finished scratch file into its sharded location.
    async fn commit(&self, scratch: &PathBuf, key: &BlobKey) -> Result<(), BlobError> {
        let dest = self.blob_path(key);

        if dest.exists() {
            // Same content already stored; the scratch copy is redundant.
            let _ = fs::remove_file(scratch).await;
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(scratch, &dest).await {
            let _ = fs::remove_file(scratch).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn insert(&self, data: &[u8]) -> Result<BlobKey, BlobError> {
        if data.len() as u64 > self.max_blob_size {
            return Err(BlobError::TooLarge {
                actual: data.len() as u64,
                limit: self.max_blob_size,
            });
        }

        let key = BlobKey::compute(data);
        if self.blob_path(&key).exists() {
            return Ok(key);
        }

        let scratch = self.scratch_path();
        if let Err(e) = fs::write(&scratch, data).await {
            let _ = fs::remove_file(&scratch).await;
            return Err(e.into());
        }

        self.commit(&scratch, &key).await?;
        Ok(key)
    }

    async fn insert_stream(&self, mut reader: BoxReader) -> Result<BlobKey, BlobError> {
        let scratch = self.scratch_path();
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024];
        let mut scratch_file = fs::File::create(&scratch).await?;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            written += n as u64;
            if written > self.max_blob_size {
                drop(scratch_file);
                let _ = fs::remove_file(&scratch).await;
                return Err(BlobError::TooLarge {
                    actual: written,
                    limit: self.max_blob_size,
                });
            }

            hasher.update(&buf[..n]);
            scratch_file.write_all(&buf[..n]).await?;
        }

        scratch_file.flush().await?;
        drop(scratch_file);

        let key = BlobKey::from_digest(hasher.finalize().into());
        self.commit(&scratch, &key).await?;
        Ok(key)
    }

    async fn open_read(&self, key: &BlobKey) -> Result<BoxReader, BlobError> {
        match fs::File::open(self.blob_path(key)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, BlobError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
