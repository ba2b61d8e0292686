//! Log store backed by a single append-only file.
//!
//! Every connection appends to the same file. The file is opened in
//! append mode so each chunk write lands atomically at the current end of
//! file; nothing else serializes writers. Reads always start from offset
//! zero and return the whole file.

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Handle to the shared log file. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file for appending, creating it if absent.
    pub async fn appender(&self) -> io::Result<Appender> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        Ok(Appender { file })
    }

    /// Read the entire file from offset zero.
    ///
    /// The length is sampled first and exactly that many bytes are returned,
    /// so appends racing with the read are not picked up half-way.
    pub async fn read_all(&self) -> io::Result<Bytes> {
        let file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        let mut contents = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut contents).await?;

        debug!(bytes = contents.len(), "Read back log store");
        Ok(Bytes::from(contents))
    }

    /// Delete the file. Returns `false` if there was nothing to delete.
    pub fn remove(&self) -> io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed log store");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Append-mode writer for one connection.
pub struct Appender {
    file: File,
}

impl Appender {
    /// Append one chunk and wait until it reached the file.
    pub async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        // tokio hands writes to a blocking pool; flush waits for completion
        self.file.flush().await
    }
}
