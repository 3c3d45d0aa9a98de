//! Download and delete operations on library entries.
//!
//! Downloads are streamed straight from an open file handle. The handle is
//! owned by [`DownloadStream`] and closed when the stream is dropped, whether
//! the consumer read to the end, hit an error, or disconnected early.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::error::EntryError;
use super::lister::is_missing;
use super::resolver::ResolvedPath;

/// Default read buffer size for downloads (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest accepted read buffer size (1KB).
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Largest accepted read buffer size (1MB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Number of leading bytes inspected when the extension gives no MIME type.
const SNIFF_LEN: usize = 512;

const OCTET_STREAM: &str = "application/octet-stream";

/// A file being downloaded, with the metadata needed to describe it.
///
/// Yields the file contents as `Bytes` chunks.
#[derive(Debug)]
pub struct DownloadStream {
    content_type: String,
    file_name: String,
    size: u64,
    chunk_size: usize,
    inner: ReaderStream<File>,
}

impl DownloadStream {
    /// Best-effort MIME type of the file.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Name the client should save the file under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File size at the time it was opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Drain the stream into memory.
    ///
    /// The first allocation is capped at one chunk.
    pub async fn read_to_end(mut self) -> io::Result<Bytes> {
        let capacity = usize::try_from(self.size)
            .unwrap_or(usize::MAX)
            .min(self.chunk_size);
        let mut buffer = Vec::with_capacity(capacity);
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buffer))
    }
}

impl Stream for DownloadStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl Drop for DownloadStream {
    fn drop(&mut self) {
        debug!(file = %self.file_name, "Released download handle");
    }
}

/// Performs download and delete operations through validated paths.
#[derive(Debug, Clone, Copy)]
pub struct EntryAccessor {
    chunk_size: usize,
}

impl Default for EntryAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryAccessor {
    /// Create an accessor with the default chunk size.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the read buffer size used for downloads.
    ///
    /// Values outside `MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE` are clamped.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Open a file for download.
    ///
    /// Only regular files are downloadable. Directories, FIFOs, sockets and
    /// devices report `NotFound`, as do missing files. The library root itself
    /// is an `InvalidOperation`.
    pub async fn open(&self, resolved: &ResolvedPath) -> Result<DownloadStream, EntryError> {
        let file_name = resolved.file_name().ok_or_else(|| {
            EntryError::InvalidOperation("cannot download the library root".to_string())
        })?;

        let not_found = || EntryError::NotFound(resolved.relative());

        let metadata = match fs::metadata(resolved.as_path()).await {
            Ok(m) => m,
            Err(e) if is_missing(&e) => return Err(not_found()),
            Err(e) => return Err(EntryError::Io(e)),
        };
        if !metadata.is_file() {
            return Err(not_found());
        }

        let mut file = match File::open(resolved.as_path()).await {
            Ok(f) => f,
            Err(e) if is_missing(&e) => return Err(not_found()),
            Err(e) => return Err(EntryError::Io(e)),
        };

        let content_type = detect_content_type(resolved, &mut file).await?;

        debug!(
            path = %resolved.relative(),
            content_type = %content_type,
            size = metadata.len(),
            "Opened entry for download"
        );

        Ok(DownloadStream {
            content_type,
            file_name,
            size: metadata.len(),
            chunk_size: self.chunk_size,
            inner: ReaderStream::with_capacity(file, self.chunk_size),
        })
    }

    /// Remove a file, or a directory and everything beneath it.
    ///
    /// Removing a missing path succeeds. Removing the library root is an
    /// `InvalidOperation`. A recursive delete that fails partway leaves the
    /// tree partially removed and reports the error.
    pub async fn remove(&self, resolved: &ResolvedPath) -> Result<(), EntryError> {
        if resolved.is_root() {
            return Err(EntryError::InvalidOperation(
                "cannot delete the library root".to_string(),
            ));
        }

        // Symlinks are removed as links, never followed.
        let metadata = match fs::symlink_metadata(resolved.as_path()).await {
            Ok(m) => m,
            Err(e) if is_missing(&e) => {
                debug!(path = %resolved.relative(), "Delete target already absent");
                return Ok(());
            }
            Err(e) => return Err(EntryError::Io(e)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(resolved.as_path()).await
        } else {
            fs::remove_file(resolved.as_path()).await
        };

        match result {
            Ok(()) => {
                info!(
                    path = %resolved.relative(),
                    directory = metadata.is_dir(),
                    "Deleted entry"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EntryError::Io(e)),
        }
    }
}

/// Guess the MIME type from the extension, falling back to sniffing content.
///
/// Leaves the file positioned at the start.
async fn detect_content_type(resolved: &ResolvedPath, file: &mut File) -> io::Result<String> {
    if let Some(mime) = mime_guess::from_path(resolved.as_path()).first() {
        return Ok(mime.essence_str().to_string());
    }

    let mut sample = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < sample.len() {
        let n = file.read(&mut sample[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    file.seek(SeekFrom::Start(0)).await?;

    Ok(sniff(&sample[..filled]).to_string())
}

fn sniff(sample: &[u8]) -> &'static str {
    if sample.is_empty() || sample.contains(&0) {
        return OCTET_STREAM;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => "text/plain",
        // A multi-byte character cut off by the sample boundary is still text.
        Err(e) if e.error_len().is_none() => "text/plain",
        Err(_) => OCTET_STREAM,
    }
}
