//! Content hashing primitives for verifying downloaded chunks.
//!
//! Digests are computed incrementally so a chunk can be checked while it is
//! being copied, and compared against a digest published by the origin.
//!
//! # Example
//!
//! ```
//! use mediaload_verify::{Sha256Hasher, verify_digest};
//!
//! let expected = Sha256Hasher::digest(b"hello world");
//! verify_digest::<Sha256Hasher>(&expected, b"hello world").unwrap();
//! ```

pub use self::error::{Result, VerifyError};
pub use self::hasher::{Hasher, verify_digest};

#[cfg(feature = "sha256")]
pub use self::hasher::Sha256Hasher;

mod error;
mod hasher;
