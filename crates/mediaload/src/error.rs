//! Error types for mediaload.
//!
//! Only setup and handle misuse surface as [`Error`]. A loader that fails
//! while running reports a [`FailReason`](crate::FailReason) through its
//! event stream instead.

use thiserror::Error;

use crate::LoaderId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("unknown or released loader {0}")]
    UnknownLoader(LoaderId),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url:    String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Fs(#[from] mediaload_fs::Error),

    #[cfg(feature = "sled")]
    #[error("cache database error: {0}")]
    Database(#[from] sled::Error),

    #[cfg(feature = "sled")]
    #[error("cache key serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[cfg(feature = "reqwest")]
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to start web worker: {0}")]
    WebWorker(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
