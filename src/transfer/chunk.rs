// Sequential chunk reader
// Reads the file front to back, one bounded chunk at a time

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::errors::UploadError;

pub struct ChunkReader {
    file: File,
    path: PathBuf,
    chunk_size: usize,
    file_size: u64,
    total_parts: u32,
    offset: u64,
}

impl ChunkReader {
    pub async fn open(path: &Path, file_size: u64, chunk_size: usize) -> Result<Self, UploadError> {
        let total_parts =
            total_parts(file_size, chunk_size).ok_or_else(|| UploadError::InvalidFile {
                path: path.to_path_buf(),
                reason: format!(
                    "{} bytes in {} byte chunks exceeds {} parts",
                    file_size,
                    chunk_size,
                    u32::MAX
                ),
            })?;

        let file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => UploadError::FileNotFound(path.to_path_buf()),
            _ => UploadError::InvalidFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            chunk_size,
            file_size,
            total_parts,
            offset: 0,
        })
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next chunk, or `None` once `file_size` bytes have been read.
    /// A file that shrinks mid-read is a transfer failure, not a short upload.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, UploadError> {
        let remaining = self.file_size - self.offset;
        if remaining == 0 {
            return Ok(None);
        }

        let len = std::cmp::min(remaining, self.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            let n = self
                .file
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| UploadError::Transfer {
                    reason: format!("failed to read {}: {}", self.path.display(), e),
                    bytes_sent: self.offset,
                })?;
            if n == 0 {
                return Err(UploadError::Transfer {
                    reason: format!(
                        "{} shrank during upload (expected {} bytes)",
                        self.path.display(),
                        self.file_size
                    ),
                    bytes_sent: self.offset,
                });
            }
            filled += n;
        }

        self.offset += len as u64;
        Ok(Some(buffer))
    }
}

/// Number of chunks for `file_size`, `None` if zero-sized chunks or more than `u32::MAX` parts.
pub fn total_parts(file_size: u64, chunk_size: usize) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(file_size.div_ceil(chunk_size as u64)).ok()
}
