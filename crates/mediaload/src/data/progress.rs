use std::fmt;

use crate::LoaderId;

/// Outcome of consulting the local cache for a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalStatus {
    #[default]
    NotTried,
    NotFound,
    Loading,
    Loaded,
    Failed,
}

/// Phases of a loader.
///
/// Loaders move through these phases in order:
/// Idle → LocalLookup → Requesting → Finalizing → Finished
///
/// A cache hit jumps from LocalLookup straight to Finished. A remote-storage
/// loader passes through CdnRedirected when the origin sends it elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    /// Created, never started.
    #[default]
    Idle,

    /// Consulting the local cache.
    LocalLookup,

    /// Queued or fetching chunks.
    Requesting,

    /// Fetching chunks from a content-delivery endpoint.
    CdnRedirected,

    /// All bytes received, persisting to file and cache.
    Finalizing,

    /// Content complete.
    Finished,

    /// Cancelled or failed. Terminal.
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Idle => write!(f, "Idle"),
            LoadPhase::LocalLookup => write!(f, "LocalLookup"),
            LoadPhase::Requesting => write!(f, "Requesting"),
            LoadPhase::CdnRedirected => write!(f, "CdnRedirected"),
            LoadPhase::Finalizing => write!(f, "Finalizing"),
            LoadPhase::Finished => write!(f, "Finished"),
            LoadPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of a loader's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub phase:  LoadPhase,
    /// Bytes received so far.
    pub offset: u64,
    /// Total size, if known.
    pub total:  Option<u64>,
}

impl Progress {
    /// Fraction complete in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.phase == LoadPhase::Finished {
            return 1.0;
        }
        match self.total {
            Some(total) if total > 0 => (self.offset as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Why a loader stopped without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// Cancelled by the caller.
    Cancelled,
    /// The remote read channel reported an unrecoverable error.
    RemoteRead(String),
    /// CDN bytes did not match the hash catalog after a refresh.
    HashMismatch { offset: u64 },
    /// The hash catalog never covered bytes fetched from the CDN.
    MissingCdnHash { offset: u64 },
    /// A CDN redirect carried a malformed key or IV.
    BadCdnParams,
    /// The response shape did not match the request.
    Protocol(String),
    TooManyRedirects,
    Http(String),
    FileWrite(String),
    /// Local-only loader missed the cache.
    NotFoundLocally,
    /// Web loader started on a downloader without a web manager.
    NoWebManager,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Cancelled => write!(f, "cancelled"),
            FailReason::RemoteRead(message) => write!(f, "remote read failed: {message}"),
            FailReason::HashMismatch { offset } => write!(f, "CDN hash mismatch at offset {offset}"),
            FailReason::MissingCdnHash { offset } => {
                write!(f, "no CDN hash available for offset {offset}")
            }
            FailReason::BadCdnParams => write!(f, "malformed CDN redirect parameters"),
            FailReason::Protocol(message) => write!(f, "protocol error: {message}"),
            FailReason::TooManyRedirects => write!(f, "too many HTTP redirects"),
            FailReason::Http(message) => write!(f, "HTTP error: {message}"),
            FailReason::FileWrite(message) => write!(f, "file write failed: {message}"),
            FailReason::NotFoundLocally => write!(f, "not found in local cache"),
            FailReason::NoWebManager => write!(f, "no web load manager configured"),
        }
    }
}

/// Notification emitted by the downloader for one loader.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderEvent {
    pub id:   LoaderId,
    pub kind: LoaderEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEventKind {
    Progress(Progress),
    /// Terminal failure, reported once. `started` is true when some bytes
    /// had already been fetched.
    Failed { started: bool, reason: FailReason },
}
