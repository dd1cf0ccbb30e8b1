//! Byte sources
//!
//! A byte source is anything a user can hand us as a "file": a file on the
//! host, an upload already sitting in memory, or a transfer whose length is
//! not known up front.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// A readable, named run of bytes
#[async_trait]
pub trait ByteSource: Send {
    /// File name as supplied by the user, used as the classification hint
    fn name(&self) -> &str;

    /// Total length if the transfer announces it up front
    fn total_len(&self) -> Option<u64>;

    /// Read up to `max` bytes, or `None` once the source is exhausted
    async fn read_chunk(&mut self, max: usize) -> io::Result<Option<Vec<u8>>>;
}

/// A file on the host file system
pub struct FileSource {
    name: String,
    file: tokio::fs::File,
    len: u64,
}

impl FileSource {
    /// Open a host file; its length is taken from the file metadata
    pub async fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Ok(Self { name, file, len })
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_len(&self) -> Option<u64> {
        Some(self.len)
    }

    async fn read_chunk(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; max.max(1)];
        let n = self.file.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        chunk.truncate(n);
        Ok(Some(chunk))
    }
}

/// Bytes already held in memory, e.g. a browser upload
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
    pos: usize,
    len: u64,
    announce_len: bool,
    chunk_size: Option<usize>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            name: name.into(),
            data,
            pos: 0,
            len,
            announce_len: true,
            chunk_size: None,
        }
    }

    /// Hide the length, as a streamed transfer without a content length would
    pub fn without_length(mut self) -> Self {
        self.announce_len = false;
        self
    }

    /// Cap each read at `chunk_size` bytes
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_len(&self) -> Option<u64> {
        self.announce_len.then_some(self.len)
    }

    async fn read_chunk(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return Ok(None);
        }

        let limit = self.chunk_size.map_or(max, |c| c.min(max)).max(1);

        // Whole payload fits in one read: hand the allocation over as is
        if self.pos == 0 && remaining <= limit {
            return Ok(Some(std::mem::take(&mut self.data)));
        }

        let end = self.pos + remaining.min(limit);
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(chunk))
    }
}
