//! Per-item download state.
//!
//! A [`Loader`] is owned by the [`Downloader`](crate::Downloader) and only
//! read from outside. All transitions happen on the control path.

mod storage;
mod web;

use std::path::{Path, PathBuf};

use bytes::Bytes;
use mediaload_fs::{AtomicWriteOptions, PartialFile};

pub(crate) use storage::{SentKind, StorageTask, UncheckedPart};
pub(crate) use web::WebTask;

use crate::core::{QueueLinks, Queued};
use crate::data::{ContentKey, LoadPhase, LoaderOptions, LocalStatus, Progress, StorageLocation};

#[derive(Debug)]
pub(crate) enum LoaderKind {
    Storage(StorageTask),
    Web(WebTask),
}

/// One download task for one content item.
#[derive(Debug)]
pub struct Loader {
    key:                     ContentKey,
    pub(crate) options:      LoaderOptions,
    pub(crate) size:         Option<u64>,
    /// Bytes accepted so far.
    pub(crate) loaded:       u64,
    pub(crate) phase:        LoadPhase,
    pub(crate) finished:     bool,
    pub(crate) cancelled:    bool,
    pub(crate) paused:       bool,
    pub(crate) local_status: LocalStatus,
    pub(crate) buffer:       Vec<u8>,
    pub(crate) file:         Option<PartialFile>,
    pub(crate) links:        QueueLinks,
    pub(crate) kind:         LoaderKind,
}

impl Queued for Loader {
    fn links(&self) -> &QueueLinks { &self.links }
    fn links_mut(&mut self) -> &mut QueueLinks { &mut self.links }
}

impl Loader {
    pub(crate) fn storage(location: StorageLocation, options: LoaderOptions) -> Self {
        let key = ContentKey::Storage(location.clone());
        Self::new(key, options, LoaderKind::Storage(StorageTask::new(location)))
    }

    pub(crate) fn web(url: String, options: LoaderOptions) -> Self {
        let key = ContentKey::Web(url.clone());
        Self::new(key, options, LoaderKind::Web(WebTask::new(url)))
    }

    fn new(key: ContentKey, options: LoaderOptions, kind: LoaderKind) -> Self {
        Self {
            key,
            size: options.size,
            options,
            loaded: 0,
            phase: LoadPhase::Idle,
            finished: false,
            cancelled: false,
            paused: false,
            local_status: LocalStatus::NotTried,
            buffer: Vec::new(),
            file: None,
            links: QueueLinks::default(),
            kind,
        }
    }

    pub fn key(&self) -> &ContentKey { &self.key }

    pub fn finished(&self) -> bool { self.finished }

    pub fn cancelled(&self) -> bool { self.cancelled }

    pub fn paused(&self) -> bool { self.paused }

    pub fn local_status(&self) -> LocalStatus { self.local_status }

    pub fn phase(&self) -> LoadPhase { self.phase }

    pub fn auto_loading(&self) -> bool { self.options.auto_loading }

    /// Priority generation the loader was last queued with.
    pub fn priority(&self) -> u64 { self.links.priority() }

    /// Bytes received so far.
    pub fn current_offset(&self) -> u64 { self.loaded }

    pub fn current_progress(&self) -> f64 { self.progress().fraction() }

    pub fn progress(&self) -> Progress {
        Progress {
            phase:  self.phase,
            offset: self.loaded,
            total:  self.size,
        }
    }

    /// Declared size, or the real one once the end was seen.
    pub fn full_size(&self) -> Option<u64> { self.size }

    pub fn file_name(&self) -> Option<&Path> { self.options.destination.as_deref() }

    /// Buffered content. Empty when the content went to a file only.
    pub fn bytes(&self) -> &[u8] { &self.buffer }

    pub(crate) fn writes_to_file(&self) -> bool {
        self.options.destination.is_some() && !self.options.to_cache
    }

    /// Store `bytes` at `offset`, in the destination file or the buffer.
    pub(crate) fn write_part(&mut self, offset: u64, bytes: &[u8]) -> mediaload_fs::Result<()> {
        if let Some(destination) = self.options.destination.as_ref().filter(|_| self.writes_to_file()) {
            if self.file.is_none() {
                self.file = Some(PartialFile::create(destination)?);
            }
            if let Some(file) = self.file.as_mut() {
                return file.write_at(offset, bytes);
            }
        }
        let start = offset as usize;
        let end = start + bytes.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Continue from a destination file an earlier attempt left behind.
    ///
    /// Keeps the leading bytes of the file, rounded down to a multiple of
    /// `align`, and returns the offset to resume from. A loader that already
    /// received something, or whose destination does not exist, resumes
    /// from its own state.
    pub(crate) fn resume_from_disk(&mut self, align: u64) -> mediaload_fs::Result<u64> {
        if self.loaded > 0 || self.file.is_some() || !self.writes_to_file() {
            return Ok(self.loaded);
        }
        let Some(destination) = self.options.destination.as_ref().filter(|path| path.is_file()) else {
            return Ok(0);
        };
        let mut file = PartialFile::open_existing(destination)?;
        let align = align.max(1);
        let mut resume = file.len() - file.len() % align;
        if let Some(size) = self.size.filter(|size| resume >= *size) {
            resume = size.saturating_sub(1) / align * align;
        }
        file.set_len(resume)?;
        self.file = Some(file);
        self.loaded = resume;
        if let LoaderKind::Storage(task) = &mut self.kind {
            task.next_offset = resume;
        }
        Ok(resume)
    }

    /// Drop everything received so far; the content is coming again from
    /// offset zero.
    pub(crate) fn restart(&mut self) -> mediaload_fs::Result<()> {
        self.buffer.clear();
        self.loaded = 0;
        match self.file.as_mut() {
            Some(file) => file.set_len(0),
            None => Ok(()),
        }
    }

    /// Forget everything received, deleting a partial destination file.
    pub(crate) fn discard_content(&mut self) -> mediaload_fs::Result<()> {
        self.buffer = Vec::new();
        match self.file.take() {
            Some(file) => file.discard(),
            None => Ok(()),
        }
    }

    /// Move the content to its destination. Returns the payload to mirror
    /// into the local cache, if the loader keeps one.
    pub(crate) fn persist(&mut self) -> mediaload_fs::Result<Option<Bytes>> {
        if let Some(file) = self.file.take() {
            let path = file.finish()?;
            self.options.destination = Some(path);
            self.buffer = Vec::new();
            return Ok(None);
        }
        if let Some(destination) = &self.options.destination {
            mediaload_fs::atomic_write(destination, &self.buffer, AtomicWriteOptions::new().sync(true))?;
        }
        if self.options.to_cache {
            return Ok(Some(Bytes::copy_from_slice(&self.buffer)));
        }
        if self.options.destination.is_some() {
            self.buffer = Vec::new();
        }
        Ok(None)
    }

    /// Point a cache-bound loader at a file.
    ///
    /// Only a loader created with `to_cache` and no destination accepts a
    /// new path; any other loader answers whether `path` is already its
    /// destination.
    pub(crate) fn set_file_name(&mut self, path: PathBuf) -> mediaload_fs::Result<bool> {
        if !self.options.to_cache || self.options.destination.is_some() {
            return Ok(self.options.destination.as_deref() == Some(path.as_path()));
        }
        if self.finished && !self.cancelled {
            mediaload_fs::atomic_write(&path, &self.buffer, AtomicWriteOptions::new().sync(true))?;
        }
        self.options.destination = Some(path);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffered() -> Loader {
        Loader::storage(StorageLocation::new(1, 10, 0), LoaderOptions::default().to_cache(true))
    }

    #[test]
    fn test_out_of_order_buffer_writes() {
        let mut loader = buffered();
        loader.write_part(4, b"world").unwrap();
        loader.write_part(0, b"hell").unwrap();
        assert_eq!(loader.bytes(), b"hellworld");
    }

    #[test]
    fn test_file_writes_and_discard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut loader =
            Loader::storage(StorageLocation::new(1, 10, 0), LoaderOptions::default().destination(&path));
        assert!(loader.writes_to_file());
        loader.write_part(3, b"def").unwrap();
        loader.write_part(0, b"abc").unwrap();
        assert!(loader.bytes().is_empty());
        assert!(path.exists());

        loader.discard_content().unwrap();
        assert_eq!(dir.path().read_dir().unwrap().count(), 0);
    }

    #[test]
    fn test_resume_from_disk_rounds_to_whole_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mkv");
        std::fs::write(&path, vec![7u8; 2500]).unwrap();

        let mut loader = Loader::storage(
            StorageLocation::new(1, 10, 0),
            LoaderOptions::default().destination(&path).size(5000),
        );
        assert_eq!(loader.resume_from_disk(1000).unwrap(), 2000);
        assert_eq!(loader.current_offset(), 2000);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2000);
        let LoaderKind::Storage(task) = &loader.kind else {
            panic!("storage loader expected");
        };
        assert_eq!(task.next_offset, 2000);

        // Already resumed.
        assert_eq!(loader.resume_from_disk(1000).unwrap(), 2000);
    }

    #[test]
    fn test_resume_from_complete_file_refetches_last_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.bin");
        std::fs::write(&path, vec![1u8; 3000]).unwrap();

        let mut loader = Loader::storage(
            StorageLocation::new(1, 11, 0),
            LoaderOptions::default().destination(&path).size(3000),
        );
        assert_eq!(loader.resume_from_disk(1000).unwrap(), 2000);
    }

    #[test]
    fn test_resume_without_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let mut loader = Loader::web("https://example.com/z".into(), LoaderOptions::default().destination(&path));
        assert_eq!(loader.resume_from_disk(1).unwrap(), 0);
        assert!(!path.exists());

        let mut buffered = buffered();
        assert_eq!(buffered.resume_from_disk(1).unwrap(), 0);
    }

    #[test]
    fn test_restart_truncates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restart.bin");
        let mut loader = Loader::web("https://example.com/r".into(), LoaderOptions::default().destination(&path));
        loader.write_part(0, b"stale tail").unwrap();
        loader.loaded = 10;

        loader.restart().unwrap();
        loader.write_part(0, b"new").unwrap();
        loader.persist().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_persist_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut loader =
            Loader::storage(StorageLocation::new(1, 10, 0), LoaderOptions::default().destination(&path));
        loader.write_part(0, b"abc").unwrap();
        assert_eq!(loader.persist().unwrap(), None);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        assert_eq!(loader.file_name(), Some(path.as_path()));
    }

    #[test]
    fn test_persist_cache_target_writes_destination_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cached.bin");
        let mut loader = Loader::web(
            "https://example.com/x".into(),
            LoaderOptions::default().to_cache(true).destination(&path),
        );
        loader.write_part(0, b"xyz").unwrap();
        assert_eq!(loader.persist().unwrap().as_deref(), Some(&b"xyz"[..]));
        assert_eq!(std::fs::read(&path).unwrap(), b"xyz");
        assert_eq!(loader.bytes(), b"xyz");
    }

    #[test]
    fn test_set_file_name_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.bin");

        let mut loader = buffered();
        loader.write_part(0, b"data").unwrap();
        loader.finished = true;
        assert!(loader.set_file_name(path.clone()).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(loader.set_file_name(path.clone()).unwrap());
        assert!(!loader.set_file_name(dir.path().join("other.bin")).unwrap());

        let mut plain = Loader::web("https://example.com/y".into(), LoaderOptions::default());
        assert!(!plain.set_file_name(path).unwrap());
    }
}
