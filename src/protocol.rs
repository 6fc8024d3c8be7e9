// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Protocol kinds served by simulated servers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// File-transfer protocol spoken by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Sftp,
    S3,
    Http,
    Smb,
    Nfs,
}

impl Protocol {
    /// Every protocol, in blueprint table order
    pub const ALL: [Protocol; 6] = [
        Protocol::Ftp,
        Protocol::Sftp,
        Protocol::S3,
        Protocol::Http,
        Protocol::Smb,
        Protocol::Nfs,
    ];

    /// Lowercase identifier used in labels and resource names
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
            Protocol::S3 => "s3",
            Protocol::Http => "http",
            Protocol::Smb => "smb",
            Protocol::Nfs => "nfs",
        }
    }

    /// Uppercase prefix used for service discovery document keys
    #[must_use]
    pub fn key_prefix(self) -> &'static str {
        match self {
            Protocol::Ftp => "FTP",
            Protocol::Sftp => "SFTP",
            Protocol::S3 => "S3",
            Protocol::Http => "HTTP",
            Protocol::Smb => "SMB",
            Protocol::Nfs => "NFS",
        }
    }

    /// NAS servers keep their data in an isolated subpath of the shared NAS volume.
    #[must_use]
    pub fn is_nas(self) -> bool {
        matches!(self, Protocol::Smb | Protocol::Nfs)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a supported protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported protocol '{0}' (expected one of ftp, sftp, s3, http, smb, nfs)")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            "s3" => Ok(Protocol::S3),
            // WebDAV servers are exposed over plain HTTP
            "http" | "webdav" => Ok(Protocol::Http),
            "smb" | "cifs" => Ok(Protocol::Smb),
            "nfs" => Ok(Protocol::Nfs),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod protocol_tests;
