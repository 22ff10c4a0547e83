//! Incremental reader for a growing log file.
//!
//! A [`LineSource`] remembers the byte offset it has consumed and the identity
//! of the file it was reading. Each [`poll`](LineSource::poll) reads whatever
//! was appended since, and hands back complete lines only.
//!
//! Rotation handling follows what `tail -F` does:
//!
//! - the path now points at a different file (new inode), or
//! - the file is shorter than the consumed offset (truncated in place)
//!
//! In both cases the source rewinds to offset 0 and drops any partial line it
//! was holding.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::error::SourceError;
use crate::line_buffer::LineBuffer;

/// Upper bound on bytes read by a single poll. The remainder is picked up on
/// the next tick.
const MAX_READ_PER_POLL: u64 = 8 * 1024 * 1024;

/// Where reading starts the first time the file is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    /// Read the existing content first.
    Beginning,
    /// Skip existing content, like `tail -f`.
    #[default]
    End,
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
impl FileIdentity {
    fn of(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }
}

#[cfg(not(unix))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    created: Option<std::time::SystemTime>,
}

#[cfg(not(unix))]
impl FileIdentity {
    fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            created: metadata.created().ok(),
        }
    }
}

/// Tail-style reader over one file path.
#[derive(Debug)]
pub struct LineSource {
    path: PathBuf,
    start: StartPosition,
    offset: u64,
    identity: Option<FileIdentity>,
    /// Set once the start position has been applied.
    positioned: bool,
    buffer: LineBuffer,
}

impl LineSource {
    /// Create a source without touching the filesystem.
    ///
    /// The file does not need to exist yet; polls fail with
    /// [`SourceError::Io`] until it does.
    pub fn new(path: impl Into<PathBuf>, start: StartPosition) -> Self {
        Self {
            path: path.into(),
            start,
            offset: 0,
            identity: None,
            positioned: false,
            buffer: LineBuffer::new(),
        }
    }

    /// Create a source for a file that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Io` if the file cannot be stat'ed.
    pub fn open(path: impl Into<PathBuf>, start: StartPosition) -> Result<Self, SourceError> {
        let path = path.into();
        std::fs::metadata(&path).map_err(|e| SourceError::io(&path, e))?;
        Ok(Self::new(path, start))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed from the current file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read lines appended since the previous poll.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Io` if the file is missing or unreadable. The
    /// source stays usable; the next poll simply tries again.
    pub async fn poll(&mut self) -> Result<Vec<String>, SourceError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                // A file that appears later is new content in its entirety.
                self.positioned = true;
                return Err(SourceError::io(&self.path, e));
            }
        };

        let identity = FileIdentity::of(&metadata);
        let len = metadata.len();

        if !self.positioned {
            self.positioned = true;
            self.identity = Some(identity);
            if self.start == StartPosition::End {
                self.offset = len;
                debug!(path = %self.path.display(), offset = len, "Positioned at end of file");
                return Ok(Vec::new());
            }
        } else if self.identity.is_some_and(|known| known != identity) || len < self.offset {
            info!(
                path = %self.path.display(),
                previous_offset = self.offset,
                current_len = len,
                "Log file rotated or truncated, reading from start"
            );
            metrics::counter!("tailwatch_source_rotations_total").increment(1);
            self.offset = 0;
            self.buffer.clear();
        }
        self.identity = Some(identity);

        if len == self.offset {
            return Ok(Vec::new());
        }

        let chunk = self.read_from_offset(len).await?;
        self.offset += chunk.len() as u64;
        self.buffer.push(&chunk);

        Ok(self.buffer.drain_complete_lines())
    }

    async fn read_from_offset(&self, len: u64) -> Result<Vec<u8>, SourceError> {
        let to_read = (len - self.offset).min(MAX_READ_PER_POLL);

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        let mut chunk = Vec::with_capacity(to_read as usize);
        file.take(to_read)
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn beginning_reads_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "one\ntwo\n");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        assert_eq!(source.poll().await.unwrap(), vec!["one", "two"]);
        assert!(source.poll().await.unwrap().is_empty());
        assert_eq!(source.offset(), 8);
    }

    #[tokio::test]
    async fn end_skips_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old line\n");

        let mut source = LineSource::open(&path, StartPosition::End).unwrap();
        assert!(source.poll().await.unwrap().is_empty());

        append(&path, "new line\n");
        assert_eq!(source.poll().await.unwrap(), vec!["new line"]);
    }

    #[tokio::test]
    async fn lines_are_yielded_exactly_once_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        let mut seen = Vec::new();
        for i in 0..5 {
            append(&path, &format!("line {}\n", i));
            seen.extend(source.poll().await.unwrap());
        }
        seen.extend(source.poll().await.unwrap());

        assert_eq!(seen, vec!["line 0", "line 1", "line 2", "line 3", "line 4"]);
    }

    #[tokio::test]
    async fn partial_line_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "complete\npart");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        assert_eq!(source.poll().await.unwrap(), vec!["complete"]);

        append(&path, "ial\n");
        assert_eq!(source.poll().await.unwrap(), vec!["partial"]);
    }

    #[tokio::test]
    async fn truncation_rewinds_to_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "a fairly long first line\nand a second one\n");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        assert_eq!(source.poll().await.unwrap().len(), 2);

        std::fs::write(&path, "fresh\n").unwrap();
        assert_eq!(source.poll().await.unwrap(), vec!["fresh"]);
        assert_eq!(source.offset(), 6);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn replaced_file_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "before rotation\n");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        assert_eq!(source.poll().await.unwrap(), vec!["before rotation"]);

        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        // Longer than the old offset, so only the inode change reveals rotation.
        append(&path, "after rotation, a much longer first line\n");

        assert_eq!(
            source.poll().await.unwrap(),
            vec!["after rotation, a much longer first line"]
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error_and_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.log");

        let mut source = LineSource::new(&path, StartPosition::End);
        let err = source.poll().await.unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));

        // Created after the first poll: everything in it is new.
        append(&path, "first\n");
        assert_eq!(source.poll().await.unwrap(), vec!["first"]);
    }

    #[test]
    fn open_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let err = LineSource::open(dir.path().join("nope.log"), StartPosition::End).unwrap_err();
        assert!(err.to_string().contains("nope.log"));
    }

    #[tokio::test]
    async fn deleted_file_errors_then_resumes_on_recreate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "one long line\n");

        let mut source = LineSource::open(&path, StartPosition::Beginning).unwrap();
        assert_eq!(source.poll().await.unwrap(), vec!["one long line"]);

        std::fs::remove_file(&path).unwrap();
        assert!(source.poll().await.is_err());

        // Shorter than before so the rewind is detected even if the inode is reused.
        append(&path, "two\n");
        assert_eq!(source.poll().await.unwrap(), vec!["two"]);
    }

    #[test]
    fn start_position_deserializes_lowercase() {
        let start: StartPosition = serde_yaml::from_str("beginning").unwrap();
        assert_eq!(start, StartPosition::Beginning);
        assert_eq!(StartPosition::default(), StartPosition::End);
    }
}
