//! Pure scheduling logic.
//!
//! Nothing here performs I/O: the arena and intrusive queue, per data-center
//! sub-connection accounting, CDN hash catalog checks, retry delays and
//! HTTP range helpers.

mod arena;
mod balance;
mod cdn;
mod queue;
mod range;
mod retry;

pub use arena::LoaderId;
pub use range::{ContentRange, is_redirect, parse_content_range, range_header, resolve_location};
pub use retry::retry_delay;

pub(crate) use arena::Arena;
pub(crate) use balance::DcBalance;
pub(crate) use cdn::{CdnHashCheck, CdnState};
pub(crate) use queue::{LoaderQueue, Placement, QueueLinks, Queued};
