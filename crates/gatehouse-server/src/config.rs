//! Server configuration read from the environment.
//!
//! ## Environment Variables
//!
//! - `GATEHOUSE_ADDR`: Listen address (default: 0.0.0.0:3025)
//! - `GATEHOUSE_LOG_FORMAT`: `text` or `json` (default: text)
//! - `GATEHOUSE_SHUTDOWN_TIMEOUT_SECS`: Drain timeout after a shutdown signal (default: 30)
//! - `AUDIT_LOG_*`: see [`gatehouse_events::AuditLogConfig`]

use gatehouse_events::{AuditLogConfig, AuditLogError};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3025";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("audit log configuration: {0}")]
    AuditLog(#[from] AuditLogError),
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got '{}'", other)),
        }
    }
}

/// Everything the binary needs to start the front end
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub log_format: LogFormat,
    pub shutdown_timeout: Duration,
    pub audit: AuditLogConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("GATEHOUSE_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "GATEHOUSE_ADDR",
                message: e.to_string(),
            })?;

        let log_format = match lookup("GATEHOUSE_LOG_FORMAT") {
            Some(value) => value.parse().map_err(|message| ConfigError::Invalid {
                key: "GATEHOUSE_LOG_FORMAT",
                message,
            })?,
            None => LogFormat::default(),
        };

        let shutdown_timeout = match lookup("GATEHOUSE_SHUTDOWN_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    key: "GATEHOUSE_SHUTDOWN_TIMEOUT_SECS",
                    message: e.to_string(),
                })?,
            None => DEFAULT_SHUTDOWN_TIMEOUT,
        };

        let audit = AuditLogConfig::from_lookup(&lookup)?;

        Ok(Self {
            listen_addr,
            log_format,
            shutdown_timeout,
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_events::AuditBackend;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3025".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(matches!(config.audit.backend, AuditBackend::File { .. }));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GATEHOUSE_ADDR", "127.0.0.1:4025"),
            ("GATEHOUSE_LOG_FORMAT", "JSON"),
            ("GATEHOUSE_SHUTDOWN_TIMEOUT_SECS", "5"),
            ("AUDIT_LOG_BACKEND", "memory"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4025".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.audit.backend, AuditBackend::Memory);
    }

    #[test]
    fn test_invalid_addr() {
        let err = ServerConfig::from_lookup(lookup(&[("GATEHOUSE_ADDR", "not-an-addr")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "GATEHOUSE_ADDR",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_log_format() {
        let err = ServerConfig::from_lookup(lookup(&[("GATEHOUSE_LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(err.to_string().contains("GATEHOUSE_LOG_FORMAT"));
    }

    #[test]
    fn test_invalid_shutdown_timeout() {
        let err =
            ServerConfig::from_lookup(lookup(&[("GATEHOUSE_SHUTDOWN_TIMEOUT_SECS", "-1")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_audit_errors_propagate() {
        let err = ServerConfig::from_lookup(lookup(&[("AUDIT_LOG_BACKEND", "bolt")])).unwrap_err();
        assert!(matches!(err, ConfigError::AuditLog(_)));
    }
}
