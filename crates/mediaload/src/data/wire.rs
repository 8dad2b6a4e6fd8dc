//! Request and response shapes exchanged with the remote read channel.

use std::fmt;

use bytes::Bytes;

use super::key::{DcId, StorageLocation};

/// Identifier the channel assigns to an issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Where a request is sent: a data center, one of its sub-connections, and
/// optionally the CDN data center that overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub dc_id:   DcId,
    pub session: usize,
    pub cdn_dc:  Option<DcId>,
}

impl Endpoint {
    /// Data center the request physically goes to.
    pub fn target_dc(&self) -> DcId { self.cdn_dc.unwrap_or(self.dc_id) }
}

/// Key and IV the transport layer uses to decrypt CDN payloads before
/// delivering them.
#[derive(Clone, PartialEq, Eq)]
pub struct CdnCipher {
    pub key: Bytes,
    pub iv:  Bytes,
}

impl fmt::Debug for CdnCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnCipher")
            .field("key", &"{ ... }")
            .field("iv", &"{ ... }")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// Read `limit` bytes at `offset` from the origin.
    File {
        location: StorageLocation,
        offset:   u64,
        limit:    u32,
    },
    /// Read `limit` bytes at `offset` from a CDN.
    CdnFile {
        token:  Bytes,
        cipher: CdnCipher,
        offset: u64,
        limit:  u32,
    },
    /// Ask the origin for the hash catalog starting at `offset`.
    CdnHashes { token: Bytes, offset: u64 },
    /// Ask the origin to push the file to the CDN again.
    ReuploadCdnFile { token: Bytes, request_token: Bytes },
}

/// Digest of the CDN bytes at `offset..offset + limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHash {
    pub offset: u64,
    pub limit:  u32,
    pub hash:   Bytes,
}

/// Instruction to fetch the rest of a file from a CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnRedirect {
    pub dc_id:          DcId,
    pub token:          Bytes,
    pub encryption_key: Bytes,
    pub encryption_iv:  Bytes,
    pub hashes:         Vec<FileHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorKind {
    /// Worth reissuing.
    Transient,
    /// The CDN no longer accepts the file or request token.
    TokenInvalid,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    pub kind:    ReadErrorKind,
    pub message: String,
}

impl ReadError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind:    ReadErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self {
            kind:    ReadErrorKind::TokenInvalid,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind:    ReadErrorKind::Fatal,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message) }
}

/// Completion of an issued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResponse {
    /// Payload of a `File` or `CdnFile` read.
    Bytes(Bytes),
    /// The origin redirects the file to a CDN.
    CdnRedirect(CdnRedirect),
    /// The CDN lost the file; the origin must re-upload it.
    CdnReuploadNeeded { request_token: Bytes },
    /// Hash catalog entries, answering `CdnHashes` or `ReuploadCdnFile`.
    Hashes(Vec<FileHash>),
    Error(ReadError),
}
