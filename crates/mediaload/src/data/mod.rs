//! Immutable data types shared by the scheduler and its collaborators.
//!
//! Content keys, configuration, progress and event types, and the request
//! and response shapes exchanged with the remote read channel.

pub mod key;
pub mod options;
pub mod progress;
pub mod wire;

pub use key::{CacheKey, ContentKey, DcId, QueueKey, StorageLocation};
pub use options::{DownloaderConfig, LoadFromCloud, LoaderOptions, RetryConfig};
pub use progress::{FailReason, LoadPhase, LoaderEvent, LoaderEventKind, LocalStatus, Progress};
pub use wire::{
    CdnCipher, CdnRedirect, ChunkResponse, Endpoint, FileHash, ReadError, ReadErrorKind,
    ReadRequest, RequestId,
};
