//! Filesystem primitives for partial and finalized downloads.
//!
//! - [`PartialFile`] accepts offset-addressed writes while chunks stream in
//!   and removes itself on [`PartialFile::discard`].
//! - [`atomic_write`] places a fully buffered payload at its destination in
//!   a single rename.

mod atomic;
mod error;
mod partial;

pub use atomic::{AtomicWriteOptions, atomic_write};
pub use error::{Error, Result};
pub use partial::PartialFile;
