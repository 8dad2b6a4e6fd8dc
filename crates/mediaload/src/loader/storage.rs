use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use bytes::Bytes;

use crate::core::CdnState;
use crate::data::{RequestId, StorageLocation};

/// What an outstanding request of a remote-storage loader is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SentKind {
    Part { offset: u64 },
    /// Hash catalog starting at `offset`.
    Hashes { offset: u64 },
    Reupload,
}

/// CDN bytes waiting for a hash catalog entry.
#[derive(Debug, Clone)]
pub(crate) struct UncheckedPart {
    pub bytes: Bytes,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy)]
struct Redo {
    offset: u64,
    due:    Instant,
}

/// Chunk bookkeeping of a remote-storage loader.
#[derive(Debug)]
pub(crate) struct StorageTask {
    pub location:      StorageLocation,
    pub next_offset:   u64,
    /// A short response was received; no chunk past it exists.
    pub last_complete: bool,
    pub sent:          HashMap<RequestId, SentKind>,
    pub cdn:           Option<CdnState>,
    pub unchecked:     BTreeMap<u64, UncheckedPart>,
    /// Offsets that already failed hash verification once.
    pub hash_retried:  HashSet<u64>,
    /// Offsets parked until the origin re-uploads the file to the CDN.
    pub awaiting_reupload: Vec<u64>,
    redo:              VecDeque<Redo>,
    attempts:          HashMap<u64, u32>,
}

impl StorageTask {
    pub fn new(location: StorageLocation) -> Self {
        Self {
            location,
            next_offset: 0,
            last_complete: false,
            sent: HashMap::new(),
            cdn: None,
            unchecked: BTreeMap::new(),
            hash_retried: HashSet::new(),
            awaiting_reupload: Vec::new(),
            redo: VecDeque::new(),
            attempts: HashMap::new(),
        }
    }

    pub fn parts_in_flight(&self) -> usize {
        self.sent
            .values()
            .filter(|kind| matches!(kind, SentKind::Part { .. }))
            .count()
    }

    pub fn has_sent(&self, kind: SentKind) -> bool { self.sent.values().any(|sent| *sent == kind) }

    pub fn hashes_in_flight(&self) -> bool {
        self.sent.values().any(|sent| matches!(sent, SentKind::Hashes { .. }))
    }

    /// Queue `offset` to be requested again once `due` has passed.
    pub fn redo(&mut self, offset: u64, due: Instant) {
        if !self.redo.iter().any(|redo| redo.offset == offset) {
            self.redo.push_back(Redo { offset, due });
        }
    }

    pub fn take_due(&mut self, now: Instant) -> Option<u64> {
        let index = self.redo.iter().position(|redo| redo.due <= now)?;
        self.redo.remove(index).map(|redo| redo.offset)
    }

    pub fn has_redo(&self) -> bool { !self.redo.is_empty() }

    /// Count a failed attempt at `offset` and return how many came before.
    pub fn bump_attempt(&mut self, offset: u64) -> u32 {
        let attempts = self.attempts.entry(offset).or_default();
        let previous = *attempts;
        *attempts += 1;
        previous
    }

    pub fn clear_attempts(&mut self, offset: u64) { self.attempts.remove(&offset); }

    /// Nothing left to receive or verify.
    pub fn drained(&self) -> bool {
        self.parts_in_flight() == 0
            && self.unchecked.is_empty()
            && !self.has_redo()
            && self.awaiting_reupload.is_empty()
    }

    /// Every chunk up to `size` was requested, or the end was seen.
    pub fn all_requested(&self, size: Option<u64>) -> bool {
        self.last_complete || size.is_some_and(|size| self.next_offset >= size)
    }

    pub fn reset(&mut self) {
        self.sent.clear();
        self.unchecked.clear();
        self.awaiting_reupload.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_redo_respects_due_time() {
        let mut task = StorageTask::new(StorageLocation::new(1, 1, 1));
        let now = Instant::now();
        task.redo(3000, now + Duration::from_secs(60));
        task.redo(1000, now);
        task.redo(1000, now);
        assert_eq!(task.take_due(now), Some(1000));
        assert_eq!(task.take_due(now), None);
        assert!(task.has_redo());
        assert_eq!(task.take_due(now + Duration::from_secs(61)), Some(3000));
    }

    #[test]
    fn test_attempts_count_per_offset() {
        let mut task = StorageTask::new(StorageLocation::new(1, 1, 1));
        assert_eq!(task.bump_attempt(0), 0);
        assert_eq!(task.bump_attempt(0), 1);
        assert_eq!(task.bump_attempt(1000), 0);
        task.clear_attempts(0);
        assert_eq!(task.bump_attempt(0), 0);
    }

    #[test]
    fn test_all_requested() {
        let mut task = StorageTask::new(StorageLocation::new(1, 1, 1));
        assert!(!task.all_requested(None));
        task.next_offset = 5000;
        assert!(task.all_requested(Some(5000)));
        assert!(!task.all_requested(Some(5001)));
        task.last_complete = true;
        assert!(task.all_requested(None));
    }
}
