//! src/controller/operation.rs
//! ============================================================================
//! # Operation: named requests from the shell
//!
//! The shell addresses the core by method name plus positional JSON
//! arguments. Parsing validates argument count and shape up front, so the
//! service only ever sees well-typed requests.

use std::{net::Ipv4Addr, path::PathBuf};

use compact_str::CompactString;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::share::path::SharePath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Replace the share principal; empty fields clear it.
    Auth { username: String, password: String },

    ListEntries { path: SharePath },

    ReadAsText { path: SharePath },

    ReadAsByteArray { path: SharePath },

    CreateFile { path: SharePath },

    CreateDirectory { path: SharePath },

    Delete { path: SharePath },

    /// Copy `local` into `remote_dir` under the local file name.
    Upload { local: PathBuf, remote_dir: SharePath },

    Download { remote: SharePath },

    OpenImage { path: SharePath },

    OpenMedia { path: SharePath },

    /// Port 0 selects the configured default.
    WakeOnLan {
        mac: String,
        port: u16,
        broadcast: Option<Ipv4Addr>,
    },
}

impl Operation {
    /// Method names understood by [`Operation::parse`].
    pub const METHODS: [&'static str; 12] = [
        "auth",
        "listEntries",
        "readAsText",
        "readAsByteArray",
        "createFile",
        "createDirectory",
        "delete",
        "upload",
        "download",
        "openImage",
        "openMedia",
        "wakeOnLan",
    ];

    pub fn parse(name: &str, args: &[Value]) -> CoreResult<Self> {
        let op: Self = match name {
            "auth" => Self::Auth {
                username: optional_str(args, 0, "username")?.unwrap_or_default().to_owned(),
                password: optional_str(args, 1, "password")?.unwrap_or_default().to_owned(),
            },

            "listEntries" => Self::ListEntries {
                path: share_path(args, 0, "path")?,
            },

            "readAsText" => Self::ReadAsText {
                path: share_path(args, 0, "path")?,
            },

            "readAsByteArray" => Self::ReadAsByteArray {
                path: share_path(args, 0, "path")?,
            },

            "createFile" => Self::CreateFile {
                path: share_path(args, 0, "path")?,
            },

            "createDirectory" => Self::CreateDirectory {
                path: share_path(args, 0, "path")?,
            },

            "delete" => Self::Delete {
                path: share_path(args, 0, "path")?,
            },

            "upload" => Self::Upload {
                local: PathBuf::from(required_str(args, 0, "localPath")?),
                remote_dir: share_path(args, 1, "remotePath")?,
            },

            "download" => Self::Download {
                remote: share_path(args, 0, "remotePath")?,
            },

            "openImage" => Self::OpenImage {
                path: share_path(args, 0, "path")?,
            },

            "openMedia" => Self::OpenMedia {
                path: share_path(args, 0, "path")?,
            },

            "wakeOnLan" => Self::WakeOnLan {
                mac: required_str(args, 0, "mac")?.to_owned(),
                port: port(args, 1)?,
                broadcast: broadcast(args, 2)?,
            },

            other => return Err(CoreError::UndefinedMethod(CompactString::new(other))),
        };

        Ok(op)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::ListEntries { .. } => "listEntries",
            Self::ReadAsText { .. } => "readAsText",
            Self::ReadAsByteArray { .. } => "readAsByteArray",
            Self::CreateFile { .. } => "createFile",
            Self::CreateDirectory { .. } => "createDirectory",
            Self::Delete { .. } => "delete",
            Self::Upload { .. } => "upload",
            Self::Download { .. } => "download",
            Self::OpenImage { .. } => "openImage",
            Self::OpenMedia { .. } => "openMedia",
            Self::WakeOnLan { .. } => "wakeOnLan",
        }
    }

    /// Only transfers emit progress before resolving.
    #[must_use]
    pub const fn streams_progress(&self) -> bool {
        matches!(self, Self::Upload { .. } | Self::Download { .. })
    }
}

// ------------------------------------------------------------
// Argument extraction
// ------------------------------------------------------------

fn optional_str<'a>(args: &'a [Value], index: usize, field: &str) -> CoreResult<Option<&'a str>> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(CoreError::invalid_input(field, "expected a string")),
    }
}

fn required_str<'a>(args: &'a [Value], index: usize, field: &str) -> CoreResult<&'a str> {
    optional_str(args, index, field)?
        .ok_or_else(|| CoreError::invalid_input(field, "missing argument"))
}

fn share_path(args: &[Value], index: usize, field: &str) -> CoreResult<SharePath> {
    SharePath::parse(required_str(args, index, field)?)
}

/// Absent, null, or a number / numeric string in `0..=65535`.
fn port(args: &[Value], index: usize) -> CoreResult<u16> {
    let out_of_range = || CoreError::invalid_input("port", "must be between 0 and 65535");

    let value: u64 = match args.get(index) {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(0),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(out_of_range)?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_e: std::num::ParseIntError| out_of_range())?,
        Some(_) => return Err(CoreError::invalid_input("port", "expected a number")),
    };

    u16::try_from(value).map_err(|_e: std::num::TryFromIntError| out_of_range())
}

fn broadcast(args: &[Value], index: usize) -> CoreResult<Option<Ipv4Addr>> {
    optional_str(args, index, "broadcast")?
        .map(|s: &str| {
            s.trim().parse::<Ipv4Addr>().map_err(|_e: std::net::AddrParseError| {
                CoreError::invalid_input("broadcast", "expected an IPv4 address")
            })
        })
        .transpose()
}
