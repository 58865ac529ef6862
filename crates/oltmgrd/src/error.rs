//! Error types for oltmgrd.
//!
//! # Error taxonomy
//! - Configuration and addressing errors are caller mistakes and never retried.
//! - SNMP errors wrap the transport failure with the operation and target OID.
//! - Cache errors are reported to callers only by the cache store itself; the
//!   poller logs them and falls back to SNMP.
//! - Telnet errors carry a wire code and a `recoverable` flag that drives the
//!   retry policy.

use crate::model::TelnetBatchResponse;
use olt_types::OidError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for oltmgrd operations.
pub type Result<T> = std::result::Result<T, OltError>;

/// Telnet failure categories, rendered as their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TelnetErrorCode {
    #[serde(rename = "TELNET_CONNECTION_FAILED")]
    ConnectionFailed,
    #[serde(rename = "TELNET_AUTH_FAILED")]
    AuthFailed,
    #[serde(rename = "TELNET_TIMEOUT")]
    Timeout,
    #[serde(rename = "TELNET_SESSION_BUSY")]
    SessionBusy,
    #[serde(rename = "TELNET_COMMAND_FAILED")]
    CommandFailed,
    #[serde(rename = "TELNET_INVALID_PROMPT")]
    InvalidPrompt,
    #[serde(rename = "TELNET_DISCONNECTED")]
    Disconnected,
    #[serde(rename = "CONFIG_SAVE_FAILED")]
    ConfigSaveFailed,
}

impl TelnetErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelnetErrorCode::ConnectionFailed => "TELNET_CONNECTION_FAILED",
            TelnetErrorCode::AuthFailed => "TELNET_AUTH_FAILED",
            TelnetErrorCode::Timeout => "TELNET_TIMEOUT",
            TelnetErrorCode::SessionBusy => "TELNET_SESSION_BUSY",
            TelnetErrorCode::CommandFailed => "TELNET_COMMAND_FAILED",
            TelnetErrorCode::InvalidPrompt => "TELNET_INVALID_PROMPT",
            TelnetErrorCode::Disconnected => "TELNET_DISCONNECTED",
            TelnetErrorCode::ConfigSaveFailed => "CONFIG_SAVE_FAILED",
        }
    }
}

impl fmt::Display for TelnetErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed interaction with the OLT command line.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("[{code}] {message}")]
pub struct TelnetError {
    pub code: TelnetErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Whether the failure may succeed on a fresh attempt.
    pub recoverable: bool,
}

impl TelnetError {
    pub fn new(code: TelnetErrorCode, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            command: None,
            raw_output: None,
            recoverable,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_raw_output(mut self, output: impl Into<String>) -> Self {
        self.raw_output = Some(output.into());
        self
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::ConnectionFailed, message, true)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::AuthFailed, message, false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::Timeout, message, true)
    }

    pub fn session_busy(message: impl Into<String>, recoverable: bool) -> Self {
        Self::new(TelnetErrorCode::SessionBusy, message, recoverable)
    }

    pub fn command_failed(message: impl Into<String>, recoverable: bool) -> Self {
        Self::new(TelnetErrorCode::CommandFailed, message, recoverable)
    }

    pub fn invalid_prompt(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::InvalidPrompt, message, false)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::Disconnected, message, true)
    }

    pub fn config_save_failed(message: impl Into<String>) -> Self {
        Self::new(TelnetErrorCode::ConfigSaveFailed, message, true)
    }
}

/// Errors that can occur in oltmgrd.
#[derive(Debug, Error)]
pub enum OltError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Board/PON addressing or value decoding failed.
    #[error("OID error: {0}")]
    Oid(#[from] OidError),

    /// SNMP transport or protocol failure.
    #[error("SNMP {operation} failed for {target}: {source}")]
    Snmp {
        /// "get" or "walk".
        operation: &'static str,
        /// OID(s) being polled.
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The walked PON has no ONU with this ID.
    #[error("ONU {onu} not found on board {board} pon {pon}")]
    OnuNotFound { board: u8, pon: u8, onu: u32 },

    /// Redis connection could not be established.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A cache operation failed.
    #[error("Cache {operation} failed for key {key}: {message}")]
    Cache {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telnet error: {0}")]
    Telnet(#[from] TelnetError),

    /// Every attempt of a retried operation failed.
    #[error("operation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<OltError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// A command batch was cancelled part way. `partial` holds the
    /// responses of the commands that already ran on the OLT.
    #[error("command batch cancelled after {} of {total} commands", .partial.responses.len())]
    BatchCancelled {
        total: usize,
        partial: TelnetBatchResponse,
    },

    /// One failure handed to every waiter of a coalesced request.
    #[error(transparent)]
    Shared(Arc<OltError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OltError {
    pub fn config(message: impl Into<String>) -> Self {
        OltError::Config(message.into())
    }

    pub fn snmp<E>(operation: &'static str, target: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        OltError::Snmp {
            operation,
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn cache(operation: &'static str, key: impl Into<String>, message: impl fmt::Display) -> Self {
        OltError::Cache {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// The Telnet error at the root of this error, if any.
    pub fn telnet(&self) -> Option<&TelnetError> {
        match self {
            OltError::Telnet(e) => Some(e),
            OltError::Shared(inner) => inner.telnet(),
            OltError::RetriesExhausted { source, .. } => source.telnet(),
            _ => None,
        }
    }

    pub fn telnet_code(&self) -> Option<TelnetErrorCode> {
        self.telnet().map(|e| e.code)
    }

    /// Check if this error may clear up on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            OltError::Telnet(e) => e.recoverable,
            OltError::Shared(inner) => inner.is_retryable(),
            OltError::Config(_)
            | OltError::Oid(_)
            | OltError::OnuNotFound { .. }
            | OltError::Serialization(_)
            | OltError::Cancelled
            | OltError::BatchCancelled { .. }
            | OltError::RetriesExhausted { .. } => false,
            OltError::Snmp { .. } | OltError::Redis(_) | OltError::Cache { .. } | OltError::Io(_) => {
                true
            }
        }
    }
}
