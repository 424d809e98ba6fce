use thiserror::Error;

/// Errors from the audit log
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit log unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuditLogError>;
