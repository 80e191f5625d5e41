// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the scan head client.
//!
//! The variants mirror the behavioral taxonomy of the host-facing API:
//! argument errors, state errors, version incompatibility, timeouts, and
//! everything else that bubbles up from the OS or the wire. Background
//! tasks never surface errors through this type; they log and continue.

use crate::protocol::ParseError;
use crate::version::VersionInformation;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level client error.
#[derive(Debug)]
pub enum Error {
    /// An argument was out of range or otherwise unusable.
    InvalidArgument(String),

    /// Operation requires the system to be connected.
    NotConnected,

    /// Operation requires the system to be disconnected.
    Connected,

    /// Operation requires the system to be scanning.
    NotScanning,

    /// Operation is illegal while the system is scanning.
    Scanning,

    /// A scan head reported a firmware version with a different major
    /// number than the client.
    VersionMismatch {
        client: VersionInformation,
        server: VersionInformation,
    },

    /// A blocking operation ran out of time.
    Timeout,

    /// Socket or OS failure.
    Io(io::Error),

    /// Malformed data on the wire during a handshake.
    Protocol(ParseError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(s) => write!(f, "invalid argument: {}", s),
            Self::NotConnected => write!(f, "state not connected"),
            Self::Connected => write!(f, "state connected"),
            Self::NotScanning => write!(f, "state not scanning"),
            Self::Scanning => write!(f, "state scanning"),
            Self::VersionMismatch { client, server } => {
                write!(f, "versions not compatible: client {} vs scan head {}", client, server)
            }
            Self::Timeout => write!(f, "operation timed out"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Protocol(e)
    }
}
