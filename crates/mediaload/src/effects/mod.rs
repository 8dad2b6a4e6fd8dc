//! Seams where the downloader touches the outside world.
//!
//! The remote read channel and local cache are traits the embedding layer
//! implements; the web worker owns a thread and an HTTP client.

mod cache;
mod channel;
mod http;
mod web;

pub use cache::{LocalCache, MemoryCache};
#[cfg(feature = "sled")]
pub use cache::SledCache;
pub use channel::RemoteReadChannel;
pub use http::{BoxStream, HttpClient, HttpResponse};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use web::{WebDelivery, WebEvent, WebLoadManager, WebTaskId};
