//! JSON-lines audit log backend.
//!
//! Each entry is stored as one JSON object per line, appended to a single
//! file:
//!
//! ```json
//! {"id":"…","schema":"auth.attempt","time":"2009-11-10T23:00:00Z","properties":{"sid":"sid1","user":"bob"}}
//! ```
//!
//! Appends and reads are serialized through one async mutex, so a query
//! never observes a partially written line and concurrent appends never
//! interleave. Lines that fail to parse are skipped with a warning.
//!
//! The file always ends on a line boundary once an append returns. A failed
//! append is rolled back to the previous length, and a torn tail left by a
//! crash is cut off when the file is opened, so the next entry never lands
//! on the end of a partial line.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{AuditEntry, AuditLog, AuditLogError, Filter, Result};

/// Append-only audit log stored in a JSON-lines file
pub struct FileLog {
    path: PathBuf,
    sync_writes: bool,
    file: Mutex<File>,
}

impl FileLog {
    /// Open (or create) the log file at `path`, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>, sync_writes: bool) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        truncate_torn_tail(&path, &file).await?;

        tracing::debug!(path = %path.display(), sync_writes, "Opened audit log file");

        Ok(Self {
            path,
            sync_writes,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The backing file was removed or replaced behind our back; writes
    /// would go to an unlinked inode and never be read again.
    async fn ensure_present(&self) -> Result<()> {
        match fs::try_exists(&self.path).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuditLogError::Unavailable(format!(
                "audit log file {} is missing",
                self.path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn parse_lines(&self, contents: &str) -> Vec<AuditEntry> {
        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "Skipping unreadable audit log line"
                    );
                }
            }
        }
        entries
    }
}

/// Cut the file back to its last newline if a previous writer died mid-line.
async fn truncate_torn_tail(path: &Path, file: &File) -> Result<()> {
    let contents = fs::read(path).await?;
    if contents.last().map_or(true, |&b| b == b'\n') {
        return Ok(());
    }

    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = contents.len() - keep,
        "Truncating partial audit log line"
    );
    file.set_len(keep as u64).await?;
    Ok(())
}

async fn write_line(file: &mut File, line: &[u8], sync_writes: bool) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    if sync_writes {
        file.sync_data().await?;
    }
    Ok(())
}

#[async_trait]
impl AuditLog for FileLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        self.ensure_present().await?;

        let len = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, line.as_bytes(), self.sync_writes).await {
            if let Err(rollback) = file.set_len(len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial audit log append"
                );
            }
            return Err(e.into());
        }

        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<AuditEntry>> {
        let contents = {
            let _guard = self.file.lock().await;
            match fs::read_to_string(&self.path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(AuditLogError::Unavailable(format!(
                        "audit log file {} is missing",
                        self.path.display()
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        };

        let entries = self.parse_lines(&contents);
        Ok(filter.apply(entries.iter()))
    }
}
