//! src/error.rs
//! ============================================================================
//! # `CoreError`: Unified Error Type for the Share Core
//!
//! • One enum for listing, transfer, preview and wake failures
//! • Stack-friendly payloads (`CompactString`, boxed `io::Error`)
//! • First-class `tracing` integration via [`CoreError::trace`]
//! • Every variant renders a single human-readable message for the shell

use std::io::{self, ErrorKind};

use compact_str::CompactString;
use smallvec::{SmallVec, smallvec};
use thiserror::Error;
use tracing::{Level, event};

/// Convenient alias carrying our unified error type
pub type CoreResult<T> = Result<T, CoreError>;

/// Primary error enumeration (grouped by concern)
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CoreError {
    // ────────────────────────────────────────────────────────────
    // Remote paths
    // ────────────────────────────────────────────────────────────
    #[error("Invalid share path '{path}': {reason}")]
    InvalidPath {
        path:   CompactString,
        reason: CompactString,
    },

    // ────────────────────────────────────────────────────────────
    // Remote share transport / auth / permission
    // ────────────────────────────────────────────────────────────
    #[error("Remote I/O error on {path}: {kind:?}")]
    RemoteIo {
        path: CompactString,
        kind: ErrorKind,
        #[source]
        source: Box<io::Error>,
    },

    // ────────────────────────────────────────────────────────────
    // Stream copy
    // ────────────────────────────────────────────────────────────
    #[error("Transfer of {path} failed: {reason}")]
    Transfer {
        path:   CompactString,
        reason: CompactString,
        #[source]
        source: Box<io::Error>,
    },

    // ────────────────────────────────────────────────────────────
    // Wake-on-LAN
    // ────────────────────────────────────────────────────────────
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(CompactString),

    #[error("No broadcast address found on any non-loopback interface")]
    NoBroadcastAddress,

    #[error("Network send to {target} failed: {kind:?}")]
    Network {
        target: CompactString,
        kind:   ErrorKind,
        #[source]
        source: Box<io::Error>,
    },

    // ────────────────────────────────────────────────────────────
    // Preview decoding (never surfaced to the shell)
    // ────────────────────────────────────────────────────────────
    #[error("Decode of {key} failed: {reason}")]
    Decode {
        key:    CompactString,
        reason: CompactString,
    },

    // ────────────────────────────────────────────────────────────
    // Task management
    // ────────────────────────────────────────────────────────────
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Task {task} failed: {reason}")]
    TaskFailed {
        task:   CompactString,
        reason: CompactString,
    },

    // ────────────────────────────────────────────────────────────
    // Input validation
    // ────────────────────────────────────────────────────────────
    #[error("Invalid input: {field} - {message}")]
    InvalidInput {
        field:   CompactString,
        message: CompactString,
    },

    #[error("Undefined method:{0}")]
    UndefinedMethod(CompactString),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(CompactString),
}

// ────────────────────────────────────────────────────────────────────────────
// Fast classification helpers
// ────────────────────────────────────────────────────────────────────────────
impl CoreError {
    /// Preview failures resolve to "no image" instead of reaching the caller
    #[inline]
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    // ────────────────────────────────────────────────────────────
    // Attribute helpers – used for JSON log grouping
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. }                        => "path_validation",

            Self::RemoteIo { .. }                           => "remote_share",

            Self::Transfer { .. }                           => "transfer",

            Self::InvalidMacAddress(_) |
                    Self::NoBroadcastAddress |
                    Self::Network { .. }                    => "wake_on_lan",

            Self::Decode { .. }                             => "preview_decode",

            Self::Cancelled |
                    Self::TaskFailed { .. }                 => "task_management",

            Self::InvalidInput { .. } |
                    Self::UndefinedMethod(_)                => "input_validation",

            Self::Other(_)                                  => "unknown_error",
        }
    }

    // ────────────────────────────────────────────────────────────
    // Structured-field extraction (SmallVec avoids heap ≤4 items)
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn extract_trace_fields(&self) -> SmallVec<[(&'static str, CompactString); 4]> {
        match self {
            Self::InvalidPath { path, reason } => smallvec![
                ("path",   path.clone()),
                ("reason", reason.clone()),
            ],

            Self::RemoteIo { path, kind, .. } => smallvec![
                ("path",       path.clone()),
                ("error_kind", CompactString::from(format!("{kind:?}"))),
            ],

            Self::Transfer { path, reason, .. } => smallvec![
                ("path",   path.clone()),
                ("reason", reason.clone()),
            ],

            Self::InvalidMacAddress(mac) => smallvec![
                ("mac", mac.clone()),
            ],

            Self::Network { target, kind, .. } => smallvec![
                ("target",     target.clone()),
                ("error_kind", CompactString::from(format!("{kind:?}"))),
            ],

            _ => smallvec![],
        }
    }

    // ────────────────────────────────────────────────────────────
    // Single-call JSON-layer emission
    // ────────────────────────────────────────────────────────────
    #[must_use]
    pub fn trace(self) -> Self {
        let extra: SmallVec<[(&'static str, CompactString); 4]> = self.extract_trace_fields();

        event!(
            Level::ERROR,
            marker    = self.error_marker(),
            op_type   = self.operation_type(),
            error     = %self,
            silent    = self.is_silent(),
            extra_len = extra.len(),
            extra     = ?extra,
        );

        self
    }

    // ────────────────────────────────────────────────────────────
    // Lightweight smart-constructors
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    pub fn invalid_path(path: &str, reason: &str) -> Self {
        Self::InvalidPath {
            path:   CompactString::new(path),
            reason: CompactString::new(reason),
        }
    }

    #[inline]
    #[must_use]
    pub fn remote_io(path: &str, err: io::Error) -> Self {
        Self::RemoteIo {
            path:   CompactString::new(path),
            kind:   err.kind(),
            source: Box::new(err),
        }
    }

    #[inline]
    #[must_use]
    pub fn transfer(path: &str, reason: &str, err: io::Error) -> Self {
        Self::Transfer {
            path:   CompactString::new(path),
            reason: CompactString::new(reason),
            source: Box::new(err),
        }
    }

    #[inline]
    #[must_use]
    pub fn network(target: &str, err: io::Error) -> Self {
        Self::Network {
            target: CompactString::new(target),
            kind:   err.kind(),
            source: Box::new(err),
        }
    }

    #[inline]
    #[must_use]
    pub fn decode(key: &str, reason: &str) -> Self {
        Self::Decode {
            key:    CompactString::new(key),
            reason: CompactString::new(reason),
        }
    }

    #[inline]
    #[must_use]
    pub fn task_failed(task: &str, reason: &str) -> Self {
        Self::TaskFailed {
            task:   CompactString::new(task),
            reason: CompactString::new(reason),
        }
    }

    #[inline]
    #[must_use]
    pub fn invalid_input(field: &str, message: &str) -> Self {
        Self::InvalidInput {
            field:   CompactString::new(field),
            message: CompactString::new(message),
        }
    }

    // ────────────────────────────────────────────────────────────
    // Internal marker generator – keeps log keys stable
    // ────────────────────────────────────────────────────────────
    #[inline]
    #[must_use]
    const fn error_marker(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. }        => "ERROR_INVALID_PATH",

            Self::RemoteIo { .. }           => "ERROR_REMOTE_IO",

            Self::Transfer { .. }           => "ERROR_TRANSFER",

            Self::InvalidMacAddress(_)      => "ERROR_INVALID_MAC",

            Self::NoBroadcastAddress        => "ERROR_NO_BROADCAST",

            Self::Network { .. }            => "ERROR_NETWORK_SEND",

            Self::Decode { .. }             => "ERROR_DECODE",

            Self::Cancelled                 => "ERROR_CANCELLED",

            Self::TaskFailed { .. }         => "ERROR_TASK_FAILED",

            Self::InvalidInput { .. }       => "ERROR_INPUT_VALIDATION",

            Self::UndefinedMethod(_)        => "ERROR_UNDEFINED_METHOD",

            Self::Other(_)                  => "ERROR_UNKNOWN",
        }
    }
}

// Join failures mean the worker panicked or the runtime is shutting down.
impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::task_failed("worker", &err.to_string())
    }
}

impl From<std::sync::Arc<Self>> for CoreError {
    fn from(value: std::sync::Arc<Self>) -> Self {
        Self::Other(CompactString::new(value.to_string()))
    }
}
