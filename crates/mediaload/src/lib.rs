//! Prioritized, resumable media downloads.
//!
//! A [`Downloader`] schedules loaders for two kinds of content: items on a
//! remote storage service addressed by data center, fetched in fixed-size
//! chunks through a caller-supplied [`RemoteReadChannel`], and plain web
//! URLs, fetched by range requests on a background [`WebLoadManager`].
//!
//! # Architecture
//!
//! - `data` - Immutable keys, configuration, progress and wire types
//! - `core` - Pure scheduling logic: arena-backed queues, sub-connection
//!   balancing, CDN hash checks, retry delays, HTTP range helpers
//! - `effects` - Trait seams for the remote channel, local cache and HTTP
//! - [`Loader`] - Per-item state, read through [`Downloader::loader`]
//!
//! # Key Features
//!
//! - **Priority generations**: [`Downloader::clear_priorities`] lets newly
//!   visible content overtake everything queued before it
//! - **Bounded concurrency**: per-endpoint request limits and least-loaded
//!   sub-connection choice
//! - **CDN redirection**: chunks fetched from a CDN are verified against the
//!   origin's hash catalog before they are accepted
//! - **Local cache**: hits complete without network access, finished
//!   downloads are mirrored back
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use mediaload::{
//!     ChunkResponse, Downloader, DownloaderConfig, Endpoint, LoaderOptions, MemoryCache,
//!     ReadRequest, RemoteReadChannel, RequestId, StorageLocation,
//! };
//!
//! #[derive(Default)]
//! struct Recorder(Vec<(RequestId, ReadRequest)>);
//!
//! impl RemoteReadChannel for Recorder {
//!     fn issue(&mut self, _endpoint: &Endpoint, request: &ReadRequest) -> RequestId {
//!         let id = RequestId(self.0.len() as u64);
//!         self.0.push((id, request.clone()));
//!         id
//!     }
//!
//!     fn cancel(&mut self, _id: RequestId) {}
//! }
//!
//! let config = DownloaderConfig::default().part_size(4);
//! let mut downloader = Downloader::new(config, Recorder::default(), Arc::new(MemoryCache::new()));
//!
//! let location = StorageLocation::new(2, 42, 7);
//! let id = downloader.add_storage_loader(location, LoaderOptions::default().size(6));
//! downloader.start(id, true, true).unwrap();
//!
//! let issued: Vec<RequestId> = downloader.channel().0.iter().map(|(id, _)| *id).collect();
//! downloader.on_chunk(issued[0], ChunkResponse::Bytes(b"medi".to_vec().into()));
//! downloader.on_chunk(issued[1], ChunkResponse::Bytes(b"a!".to_vec().into()));
//!
//! let loader = downloader.loader(id).unwrap();
//! assert!(loader.finished());
//! assert_eq!(loader.bytes(), b"media!");
//! ```

mod core;
mod data;
mod downloader;
mod effects;
mod error;
mod loader;

pub use self::core::{ContentRange, LoaderId, is_redirect, parse_content_range, range_header, resolve_location, retry_delay};
pub use self::data::{
    CacheKey, CdnCipher, CdnRedirect, ChunkResponse, ContentKey, DcId, DownloaderConfig, Endpoint,
    FailReason, FileHash, LoadFromCloud, LoadPhase, LoaderEvent, LoaderEventKind, LoaderOptions,
    LocalStatus, Progress, QueueKey, ReadError, ReadErrorKind, ReadRequest, RequestId, RetryConfig,
    StorageLocation,
};
pub use self::downloader::Downloader;
pub use self::effects::{
    BoxStream, HttpClient, HttpResponse, LocalCache, MemoryCache, RemoteReadChannel, WebDelivery,
    WebEvent, WebLoadManager, WebTaskId,
};
#[cfg(feature = "sled")]
pub use self::effects::SledCache;
#[cfg(feature = "reqwest")]
pub use self::effects::ReqwestClient;
pub use self::error::{Error, Result};
pub use self::loader::Loader;
