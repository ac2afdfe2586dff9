//! Общие типы ошибок крейта

use std::io;
use std::time::Duration;

/// Ошибка одного NTP-обмена.
///
/// Клиент времени считает любой вариант мягкой ошибкой и переходит
/// к другому серверу.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("failed to resolve {server}: {source}")]
    Resolve {
        server: String,
        #[source]
        source: io::Error,
    },
    #[error("no IPv4 address found for {0}")]
    NoAddress(String),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("failed to start query runtime: {0}")]
    Runtime(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TimezoneError {
    #[error("failed to read timezone file: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("line {line}: {field} = {value} is out of range ({expected})")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: i32,
        expected: &'static str,
    },
    #[error("no timezone information for \"{0}\"")]
    Unknown(String),
    #[error("local timezone mismatch: adjusted local time {adjusted_local} vs reference {reference}")]
    LocalMismatch { adjusted_local: i64, reference: i64 },
    #[error("broker timezone mismatch: adjusted broker time {adjusted_broker} vs reference {reference}")]
    BrokerMismatch { adjusted_broker: i64, reference: i64 },
    #[error("invalid date for {0}")]
    InvalidDate(i64),
}
