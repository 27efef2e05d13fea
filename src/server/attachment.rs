//! Spooling of uploaded images to disk and their inline encoding.
//!
//! An upload is written to a temporary file while the request body is read,
//! then encoded into a base64 [`Part`]. The file is owned by a
//! [`tempfile::TempPath`], so it is removed when the upload is encoded,
//! rejected, or simply dropped on any early return.

use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tempfile::TempPath;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::gemini::Part;

/// MIME type used when the client declares none.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Errors while processing an uploaded image.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Reading or writing the temporary file failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The upload carried no bytes.
    #[error("uploaded image is empty")]
    Empty,

    /// The upload exceeds the configured limit.
    #[error("uploaded image is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Bytes received.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },
}

/// An upload that has been fully written to a temporary file.
#[derive(Debug)]
pub struct SpooledUpload {
    path: TempPath,
    mime_type: String,
    size: usize,
}

impl SpooledUpload {
    /// Create an empty temporary file in `dir` and return a writer for it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create_in(dir: &Path, mime_type: impl Into<String>) -> io::Result<UploadWriter> {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)?
            .into_parts();

        Ok(UploadWriter {
            upload: Self {
                path,
                mime_type: mime_type.into(),
                size: 0,
            },
            file: File::from_std(file),
        })
    }

    /// Location of the temporary file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Declared MIME type.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Bytes written.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Read the file back as an inline data part and delete it.
    ///
    /// The file is removed whether or not encoding succeeds.
    ///
    /// # Errors
    /// Returns an error if the upload is empty, too large, or unreadable.
    pub async fn encode(self, max_bytes: usize) -> Result<Part, AttachmentError> {
        let Self {
            path,
            mime_type,
            size,
        } = self;

        if size == 0 {
            return Err(AttachmentError::Empty);
        }
        if size > max_bytes {
            return Err(AttachmentError::TooLarge {
                size,
                limit: max_bytes,
            });
        }

        let bytes = tokio::fs::read(&path).await;
        let shown = path.display().to_string();
        if let Err(e) = path.close() {
            warn!(path = %shown, error = %e, "failed to remove spooled upload");
        }
        let bytes = bytes?;

        debug!(mime_type = %mime_type, size, "encoded image attachment");
        Ok(Part::inline_data(mime_type, BASE64_STANDARD.encode(bytes)))
    }
}

/// Writer filling a [`SpooledUpload`] chunk by chunk.
#[derive(Debug)]
pub struct UploadWriter {
    upload: SpooledUpload,
    file: File,
}

impl UploadWriter {
    /// Append a chunk.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.upload.size += chunk.len();
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.upload.size
    }

    /// Flush and close the file.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub async fn finish(mut self) -> io::Result<SpooledUpload> {
        self.file.flush().await?;
        Ok(self.upload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spool(dir: &Path, bytes: &[u8]) -> SpooledUpload {
        let mut writer = SpooledUpload::create_in(dir, "image/png").unwrap();
        writer.write_chunk(bytes).await.unwrap();
        writer.finish().await.unwrap()
    }

    #[tokio::test]
    async fn test_encode_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = spool(dir.path(), b"\x89PNG fake image").await;
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(upload.size(), 15);

        let part = upload.encode(1024).await.unwrap();

        assert!(!path.exists());
        assert_eq!(
            part,
            Part::inline_data("image/png", BASE64_STANDARD.encode(b"\x89PNG fake image"))
        );
    }

    #[tokio::test]
    async fn test_chunks_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpooledUpload::create_in(dir.path(), "image/jpeg").unwrap();
        writer.write_chunk(b"abc").await.unwrap();
        writer.write_chunk(b"def").await.unwrap();
        let upload = writer.finish().await.unwrap();

        assert_eq!(upload.mime_type(), "image/jpeg");
        let part = upload.encode(1024).await.unwrap();
        assert_eq!(part, Part::inline_data("image/jpeg", "YWJjZGVm"));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let upload = spool(dir.path(), b"").await;
        let path = upload.path().to_path_buf();

        let result = upload.encode(1024).await;

        assert!(matches!(result, Err(AttachmentError::Empty)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let upload = spool(dir.path(), &[7u8; 64]).await;
        let path = upload.path().to_path_buf();

        let result = upload.encode(16).await;

        assert!(matches!(
            result,
            Err(AttachmentError::TooLarge { size: 64, limit: 16 })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dropped_writer_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SpooledUpload::create_in(dir.path(), "image/gif").unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        drop(writer);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = SpooledUpload::create_in(Path::new("/nonexistent/uploads"), "image/png");
        assert!(result.is_err());
    }
}
