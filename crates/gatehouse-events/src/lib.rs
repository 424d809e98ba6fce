//! Gatehouse Audit Events
//!
//! Append-only audit trail for the auth server front end.
//!
//! ## Features
//!
//! - Typed events ([`AuthAttempt`]) converted into string-keyed entries
//! - Causal parent references between entries
//! - Filtered, ordered, limited queries ([`Filter`])
//! - In-memory and JSON-lines file backends behind one [`AuditLog`] trait
//!
//! ## Usage
//!
//! ```ignore
//! use gatehouse_events::{open, AuditEntry, AuditLogConfig, AuthAttempt, Filter, Order};
//!
//! let log = open(AuditLogConfig::file("./data/audit.jsonl")).await?;
//!
//! let attempt = AuthAttempt::new("sid1", "bob").failed("bad certificate");
//! log.append(AuditEntry::new(None, &attempt)).await?;
//!
//! // Two most recent attempts for session sid1
//! let entries = log
//!     .query(&Filter::default().start(now).order(Order::Desc).limit(2).session("sid1"))
//!     .await?;
//! ```
//!
//! ## Timestamps
//!
//! Entry timestamps are supplied by the caller and the log never enforces
//! monotonicity. Queries sort by timestamp at read time, so entries may be
//! appended out of order.
//!
//! ## Environment Variables
//!
//! - `AUDIT_LOG_BACKEND`: `file` or `memory` (default: file)
//! - `AUDIT_LOG_PATH`: Path of the JSON-lines file (default: ./data/audit.jsonl)
//! - `AUDIT_LOG_SYNC`: fsync after every append (default: true)

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub mod entry;
pub mod error;
pub mod file;
pub mod filter;
pub mod memory;

pub use entry::{AuditEntry, AuthAttempt, Event, EventId, SESSION_ID};
pub use error::{AuditLogError, Result};
pub use file::FileLog;
pub use filter::{Filter, Order};
pub use memory::MemoryLog;

/// An append-only store of audit entries.
///
/// Implementations must make concurrent `append` calls linearizable;
/// callers issue appends without any extra synchronization.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Store one entry. Duplicate timestamps are accepted.
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Return the entries selected by `filter`, sorted and truncated.
    async fn query(&self, filter: &Filter) -> Result<Vec<AuditEntry>>;
}

/// Convert `event` into an entry and append it.
pub async fn log_event<E: Event + ?Sized>(
    log: &dyn AuditLog,
    parent: Option<EventId>,
    event: &E,
) -> Result<AuditEntry> {
    let entry = AuditEntry::new(parent, event);
    log.append(entry.clone()).await?;
    Ok(entry)
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditBackend {
    /// JSON-lines file
    File { path: PathBuf },
    /// In-memory (for testing)
    Memory,
}

/// Configuration for the audit log
#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    pub backend: AuditBackend,
    /// fsync after each append (file backend only)
    pub sync_writes: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::File {
                path: PathBuf::from("./data/audit.jsonl"),
            },
            sync_writes: true,
        }
    }
}

impl AuditLogConfig {
    /// Create a file-based config
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: AuditBackend::File { path: path.into() },
            ..Default::default()
        }
    }

    /// Create an in-memory config
    pub fn memory() -> Self {
        Self {
            backend: AuditBackend::Memory,
            ..Default::default()
        }
    }

    /// Disable fsync after every append
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    /// Read the configuration from `AUDIT_LOG_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sync_writes = match lookup("AUDIT_LOG_SYNC").as_deref() {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(AuditLogError::Config(format!(
                    "AUDIT_LOG_SYNC must be true or false, got '{}'",
                    other
                )))
            }
        };

        let backend = match lookup("AUDIT_LOG_BACKEND").as_deref() {
            None | Some("file") => AuditBackend::File {
                path: lookup("AUDIT_LOG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/audit.jsonl")),
            },
            Some("memory") => AuditBackend::Memory,
            Some(other) => {
                return Err(AuditLogError::Config(format!(
                    "unknown AUDIT_LOG_BACKEND '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            backend,
            sync_writes,
        })
    }
}

/// Open the backend described by `config`.
pub async fn open(config: AuditLogConfig) -> Result<Arc<dyn AuditLog>> {
    match config.backend {
        AuditBackend::File { path } => {
            let log = FileLog::open(path, config.sync_writes).await?;
            Ok(Arc::new(log))
        }
        AuditBackend::Memory => Ok(Arc::new(MemoryLog::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = AuditLogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(
            config.backend,
            AuditBackend::File {
                path: PathBuf::from("./data/audit.jsonl")
            }
        );
        assert!(config.sync_writes);
    }

    #[test]
    fn test_config_memory_backend() {
        let config =
            AuditLogConfig::from_lookup(lookup(&[("AUDIT_LOG_BACKEND", "memory")])).unwrap();
        assert_eq!(config.backend, AuditBackend::Memory);
    }

    #[test]
    fn test_config_file_path_and_sync() {
        let config = AuditLogConfig::from_lookup(lookup(&[
            ("AUDIT_LOG_PATH", "/var/lib/gatehouse/audit.jsonl"),
            ("AUDIT_LOG_SYNC", "false"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            AuditBackend::File {
                path: PathBuf::from("/var/lib/gatehouse/audit.jsonl")
            }
        );
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_config_rejects_unknown_backend() {
        let err = AuditLogConfig::from_lookup(lookup(&[("AUDIT_LOG_BACKEND", "bolt")]))
            .unwrap_err();
        assert!(matches!(err, AuditLogError::Config(_)));
    }

    #[test]
    fn test_config_rejects_bad_sync_flag() {
        let err =
            AuditLogConfig::from_lookup(lookup(&[("AUDIT_LOG_SYNC", "sometimes")])).unwrap_err();
        assert!(err.to_string().contains("AUDIT_LOG_SYNC"));
    }

    #[tokio::test]
    async fn test_open_memory_and_log_event() {
        let log = open(AuditLogConfig::memory()).await.unwrap();

        let attempt = AuthAttempt::new("sid1", "alice");
        let entry = log_event(log.as_ref(), None, &attempt).await.unwrap();

        let all = log.query(&Filter::default()).await.unwrap();
        assert_eq!(all, vec![entry]);
    }
}
