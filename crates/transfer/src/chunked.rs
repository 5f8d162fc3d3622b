use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A slice of file data destined for one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset just past this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in bounded chunks starting at any offset.
///
/// The reader is repositioned with [`seek_to`](Self::seek_to) whenever the
/// server reports where it actually is.
pub struct ChunkReader {
    file: tokio::fs::File,
    path: PathBuf,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset (for resume).
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at the end of the file.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let offset = self.offset;
        let mut data = vec![0u8; read_size];
        self.file.read_exact(&mut data).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransferError::UnexpectedEof {
                    offset,
                    expected: read_size as u64,
                }
            } else {
                TransferError::Io(e)
            }
        })?;

        let chunk = Chunk {
            offset,
            data,
        };
        self.offset = chunk.end();
        Ok(Some(chunk))
    }

    /// Seeks to `offset` and reads one chunk from there.
    pub async fn chunk_at(&mut self, offset: u64) -> Result<Option<Chunk>, TransferError> {
        if offset != self.offset {
            self.seek_to(offset).await?;
        }
        self.next_chunk().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes, as seen when the file was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn chunk_reader_reads_all() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.offset, 0);
        assert_eq!(c1.data, b"AABB");
        assert_eq!(reader.remaining(), 6);

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.offset, 4);
        assert_eq!(c2.data, b"CCDD");

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.offset, 8);
        assert_eq!(c3.data, b"EE");
        assert_eq!(c3.end(), 10);

        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_seek_and_resume() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        reader.seek_to(6).await.unwrap();
        assert_eq!(reader.offset(), 6);
        assert_eq!(reader.remaining(), 4);

        let c = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c.offset, 6);
        assert_eq!(c.data, b"6789");
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_at_rewinds_after_partial_progress() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 3).await.unwrap();
        reader.next_chunk().await.unwrap();
        reader.next_chunk().await.unwrap();

        // Server only kept the first 2 bytes.
        let c = reader.chunk_at(2).await.unwrap().unwrap();
        assert_eq!(c.offset, 2);
        assert_eq!(c.data, b"234");
    }

    #[tokio::test]
    async fn chunk_reader_default_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"x");
        let reader = ChunkReader::open(&path, 0).await.unwrap();
        assert_eq!(reader.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(reader.file_size(), 1);
    }

    #[tokio::test]
    async fn empty_file_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "shrink.bin", b"0123456789");
        let mut reader = ChunkReader::open(&path, 8).await.unwrap();

        std::fs::write(&path, b"0123").unwrap();
        let err = reader.next_chunk().await.unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedEof { offset: 0, .. }));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = ChunkReader::open(&dir.path().join("nope"), 4).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
