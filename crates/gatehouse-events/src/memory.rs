use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{AuditEntry, AuditLog, Filter, Result};

/// Audit log kept in process memory.
///
/// Entries are stored in insertion order; sorting happens per query.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditLog for MemoryLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(filter.apply(entries.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthAttempt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_log_append_and_count() {
        let log = MemoryLog::new();
        assert!(log.is_empty().await);

        for i in 0..5 {
            let attempt = AuthAttempt::new(format!("sid{}", i), "bob");
            log.append(AuditEntry::new(None, &attempt)).await.unwrap();
        }

        assert_eq!(log.len().await, 5);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_all_kept() {
        let log = Arc::new(MemoryLog::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let attempt = AuthAttempt::new(format!("sid{}", i % 4), "bob");
                log.append(AuditEntry::new(None, &attempt)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(log.len().await, 32);
        let sid0 = log.query(&Filter::default().session("sid0")).await.unwrap();
        assert_eq!(sid0.len(), 8);
    }
}
