//! Root scheduler owning every loader, queue and request record.
//!
//! The downloader runs on a single control path. Network completions are
//! fed in through [`Downloader::on_chunk`] and [`Downloader::tick`]; neither
//! blocks. Observers are invoked synchronously and cannot reach back into
//! the downloader, so a loader is never freed from inside its own
//! notification. Released loaders are collected on the next tick.

mod storage;
mod web;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use url::Url;

use crate::core::{Arena, DcBalance, LoaderId, LoaderQueue, Placement};
use crate::data::{
    DcId, DownloaderConfig, FailReason, LoadFromCloud, LoadPhase, LoaderEvent,
    LoaderEventKind, LoaderOptions, LocalStatus, QueueKey, RequestId, StorageLocation,
};
use crate::effects::{LocalCache, RemoteReadChannel, WebLoadManager};
use crate::error::{Error, Result};
use crate::loader::{Loader, LoaderKind, SentKind};

type EventObserver = Box<dyn FnMut(&LoaderEvent)>;
type FinishObserver = Box<dyn FnMut()>;

/// Correlates an issued request with its loader and the load it put on a
/// sub-connection.
#[derive(Debug, Clone, Copy)]
struct RequestRecord {
    loader:  LoaderId,
    kind:    SentKind,
    /// Data center whose sub-connection carries the request.
    dc_id:   DcId,
    session: usize,
    limit:   u32,
    via_cdn: bool,
}

/// Scheduler for remote-storage and web loaders.
pub struct Downloader<C> {
    config:           DownloaderConfig,
    channel:          C,
    cache:            Arc<dyn LocalCache>,
    web:              Option<WebLoadManager>,
    loaders:          Arena<Loader>,
    queues:           HashMap<QueueKey, LoaderQueue>,
    balance:          DcBalance,
    requests:         HashMap<RequestId, RequestRecord>,
    priority:         u64,
    local_hits:       Vec<LoaderId>,
    garbage:          Vec<LoaderId>,
    observers:        Vec<EventObserver>,
    finish_observers: Vec<FinishObserver>,
}

impl<C: RemoteReadChannel> Downloader<C> {
    pub fn new(config: DownloaderConfig, channel: C, cache: Arc<dyn LocalCache>) -> Self {
        let balance = DcBalance::new(config.sessions_per_dc);
        Self {
            config,
            channel,
            cache,
            web: None,
            loaders: Arena::default(),
            queues: HashMap::new(),
            balance,
            requests: HashMap::new(),
            priority: 1,
            local_hits: Vec::new(),
            garbage: Vec::new(),
            observers: Vec::new(),
            finish_observers: Vec::new(),
        }
    }

    /// Route web loaders through `manager`.
    #[must_use]
    pub fn with_web_manager(mut self, manager: WebLoadManager) -> Self {
        self.web = Some(manager);
        self
    }

    pub fn config(&self) -> &DownloaderConfig { &self.config }

    pub fn channel(&self) -> &C { &self.channel }

    pub fn channel_mut(&mut self) -> &mut C { &mut self.channel }

    pub fn add_storage_loader(&mut self, location: StorageLocation, options: LoaderOptions) -> LoaderId {
        let id = self.loaders.insert(Loader::storage(location, options));
        trace!(target: "mediaload::downloader", %id, "storage loader created");
        id
    }

    pub fn add_web_loader(&mut self, url: &str, options: LoaderOptions) -> Result<LoaderId> {
        Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;
        let id = self.loaders.insert(Loader::web(url.to_owned(), options));
        trace!(target: "mediaload::downloader", %id, url, "web loader created");
        Ok(id)
    }

    /// Live (or released but not yet collected) loader behind `id`.
    pub fn loader(&self, id: LoaderId) -> Option<&Loader> { self.loaders.get(id) }

    pub fn loader_count(&self) -> usize { self.loaders.len() }

    pub fn current_priority(&self) -> u64 { self.priority }

    /// Start a new priority generation: loaders started with `prior` from
    /// now on outrank everything already queued.
    pub fn clear_priorities(&mut self) {
        self.priority += 1;
        debug!(target: "mediaload::downloader", priority = self.priority, "priorities cleared");
    }

    /// Receive every progress and failure event.
    pub fn subscribe(&mut self, observer: impl FnMut(&LoaderEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Called once for every loader that finishes, successfully or not.
    pub fn on_task_finished(&mut self, observer: impl FnMut() + 'static) {
        self.finish_observers.push(Box::new(observer));
    }

    /// Requests outstanding against `queue`.
    pub fn in_flight(&self, queue: QueueKey) -> usize {
        self.queues.get(&queue).map_or(0, LoaderQueue::in_flight)
    }

    /// Loaders waiting in `queue`, front first.
    pub fn queued(&self, queue: QueueKey) -> Vec<LoaderId> {
        self.queues
            .get(&queue)
            .map(|queue| queue.iter(&self.loaders).collect())
            .unwrap_or_default()
    }

    /// Requested-but-unanswered bytes per sub-connection of `dc_id`.
    pub fn session_loads(&self, dc_id: DcId) -> Vec<u64> { self.balance.loads(dc_id) }

    /// Begin or reposition loading.
    ///
    /// The first call consults the local cache; a hit completes on the next
    /// [`tick`](Self::tick) without touching the network. Later calls only
    /// move the loader within its queue.
    pub fn start(&mut self, id: LoaderId, load_first: bool, prior: bool) -> Result<()> {
        let loader = self.loaders.get_mut(id).ok_or(Error::UnknownLoader(id))?;
        if loader.finished {
            return Ok(());
        }
        loader.paused = false;

        if loader.local_status == LocalStatus::NotTried {
            loader.phase = LoadPhase::LocalLookup;
            match self.cache.get(&loader.key().cache_key()) {
                Some(bytes) => {
                    debug!(target: "mediaload::cache", %id, len = bytes.len(), "local hit");
                    loader.local_status = LocalStatus::Loading;
                    loader.size = Some(bytes.len() as u64);
                    loader.buffer = bytes.to_vec();
                    self.local_hits.push(id);
                    return Ok(());
                }
                None => loader.local_status = LocalStatus::NotFound,
            }
        }
        match loader.local_status {
            LocalStatus::Loading | LocalStatus::Loaded => return Ok(()),
            _ if loader.options.from_cloud == LoadFromCloud::LocalOnly => {
                self.fail(id, FailReason::NotFoundLocally);
                return Ok(());
            }
            _ => {}
        }
        if matches!(loader.kind, LoaderKind::Web(_)) && self.web.is_none() {
            self.fail(id, FailReason::NoWebManager);
            return Ok(());
        }
        let align = match loader.kind {
            LoaderKind::Storage(_) => u64::from(self.config.part_size),
            LoaderKind::Web(_) => 1,
        };
        let fresh = loader.loaded == 0 && loader.file.is_none();
        match loader.resume_from_disk(align) {
            Ok(offset) if fresh && offset > 0 => {
                debug!(target: "mediaload::downloader", %id, offset, "resuming from partial file");
            }
            Ok(_) => {}
            Err(error) => {
                warn!(target: "mediaload::downloader", %id, %error, "failed to reopen partial file");
                self.fail(id, FailReason::FileWrite(error.to_string()));
                return Ok(());
            }
        }
        if loader.phase != LoadPhase::CdnRedirected {
            loader.phase = LoadPhase::Requesting;
        }

        let queue_key = loader.key().queue_key();
        let limit = match queue_key {
            QueueKey::Storage(_) => self.config.storage_queue_limit,
            QueueKey::Web => self.config.web_queue_limit,
        };
        let queue = self.queues.entry(queue_key).or_insert_with(|| LoaderQueue::new(limit));
        queue.place(&mut self.loaders, id, Placement { load_first, prior }, self.priority);
        trace!(target: "mediaload::downloader", %id, queue = %queue_key, queued = queue.len(), load_first, prior, "queued");

        self.pump(queue_key);
        Ok(())
    }

    /// Stop issuing requests for `id`. Remote-storage chunks in flight still
    /// land; a running web request is abandoned and resumed by range later.
    pub fn pause(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        if loader.finished {
            return;
        }
        loader.paused = true;
        let queue_key = loader.key().queue_key();
        self.stop_web_request(id);
        self.unqueue(id);
        debug!(target: "mediaload::downloader", %id, "paused");
        self.pump(queue_key);
    }

    /// Cancel `id`, removing any partial destination file. Reports
    /// [`FailReason::Cancelled`] once; a finished loader is left untouched.
    pub fn cancel(&mut self, id: LoaderId) { self.fail(id, FailReason::Cancelled); }

    /// Cancel `id` without notifying anyone and free it on the next tick.
    pub fn release(&mut self, id: LoaderId) {
        if self.loaders.get(id).is_none() || self.garbage.contains(&id) {
            return;
        }
        let queue_key = self.loaders.get(id).map(|loader| loader.key().queue_key());
        self.terminate(id);
        self.garbage.push(id);
        trace!(target: "mediaload::downloader", %id, "released");
        if let Some(queue_key) = queue_key {
            self.pump(queue_key);
        }
    }

    /// Same as [`release`](Self::release).
    pub fn delayed_destroy_loader(&mut self, id: LoaderId) { self.release(id); }

    /// Save the content of a cache-bound loader to `path` as well.
    ///
    /// Returns `false` if the loader already targets a different file or
    /// keeps no in-memory copy to save.
    pub fn set_file_name(&mut self, id: LoaderId, path: impl Into<PathBuf>) -> Result<bool> {
        let loader = self.loaders.get_mut(id).ok_or(Error::UnknownLoader(id))?;
        Ok(loader.set_file_name(path.into())?)
    }

    /// Run deferred work: free released loaders, complete local hits,
    /// collect web results and issue retries that came due.
    pub fn tick(&mut self) {
        for id in std::mem::take(&mut self.garbage) {
            self.loaders.remove(id);
        }
        for id in std::mem::take(&mut self.local_hits) {
            self.complete_local(id);
        }
        self.drain_web();

        let keys: Vec<QueueKey> = self.queues.keys().copied().collect();
        for key in keys {
            self.pump(key);
        }
    }

    fn complete_local(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        if loader.finished || loader.local_status != LocalStatus::Loading {
            return;
        }
        loader.local_status = LocalStatus::Loaded;
        loader.loaded = loader.buffer.len() as u64;
        self.finalize(id);
    }

    /// Issue requests from the head of `queue_key` until its limit is hit or
    /// no queued loader has anything left to request.
    pub(crate) fn pump(&mut self, queue_key: QueueKey) {
        loop {
            let Some(queue) = self.queues.get(&queue_key) else {
                return;
            };
            if !queue.has_capacity() {
                return;
            }
            let mut cursor = queue.head();
            let mut issued = false;
            while let Some(id) = cursor {
                cursor = LoaderQueue::next_of(&self.loaders, id);
                if self.load_part(id) {
                    issued = true;
                    break;
                }
            }
            if !issued {
                return;
            }
        }
    }

    /// Issue at most one request for `id`.
    fn load_part(&mut self, id: LoaderId) -> bool {
        let Some(loader) = self.loaders.get(id) else {
            return false;
        };
        if loader.finished || loader.paused {
            return false;
        }
        match loader.kind {
            LoaderKind::Storage(_) => self.load_storage_part(id),
            LoaderKind::Web(_) => self.load_web_part(id),
        }
    }

    fn unqueue(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get(id).filter(|loader| loader.links.is_queued()) else {
            return;
        };
        let queue_key = loader.key().queue_key();
        if let Some(queue) = self.queues.get_mut(&queue_key) {
            queue.remove(&mut self.loaders, id);
        }
    }

    /// Persist the content of `id` and mark it finished.
    pub(crate) fn finalize(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        loader.phase = LoadPhase::Finalizing;
        let cache_payload = match loader.persist() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(target: "mediaload::downloader", %id, %error, "failed to persist content");
                self.fail(id, FailReason::FileWrite(error.to_string()));
                return;
            }
        };
        if let Some(payload) = cache_payload {
            let from_cache = loader.local_status == LocalStatus::Loaded;
            if !from_cache && payload.len() as u64 <= self.config.max_cache_size {
                trace!(target: "mediaload::cache", %id, len = payload.len(), "mirroring into local cache");
                self.cache.put(loader.key().cache_key(), payload);
            }
        }
        loader.finished = true;
        loader.phase = LoadPhase::Finished;
        loader.size = Some(loader.size.unwrap_or(loader.loaded).max(loader.loaded));
        let progress = loader.progress();
        debug!(target: "mediaload::downloader", %id, size = loader.loaded, "finished");

        self.cancel_storage_requests(id);
        self.unqueue(id);
        self.emit(LoaderEvent {
            id,
            kind: LoaderEventKind::Progress(progress),
        });
        self.notify_finished();
    }

    /// Terminate `id` with `reason`, reporting the failure once.
    pub(crate) fn fail(&mut self, id: LoaderId, reason: FailReason) {
        let Some(loader) = self.loaders.get(id) else {
            return;
        };
        if loader.finished {
            return;
        }
        let started = loader.loaded > 0;
        let queue_key = loader.key().queue_key();
        self.terminate(id);
        if let Some(loader) = self.loaders.get_mut(id).filter(|_| reason != FailReason::NotFoundLocally) {
            loader.local_status = LocalStatus::Failed;
        }
        match reason {
            FailReason::Cancelled => debug!(target: "mediaload::downloader", %id, started, "cancelled"),
            ref reason => warn!(target: "mediaload::downloader", %id, started, %reason, "loader failed"),
        }
        self.emit(LoaderEvent {
            id,
            kind: LoaderEventKind::Failed { started, reason },
        });
        self.notify_finished();
        self.pump(queue_key);
    }

    /// Detach `id` from every queue and request and drop its content.
    fn terminate(&mut self, id: LoaderId) {
        if self.loaders.get(id).is_none_or(|loader| loader.finished) {
            return;
        }
        self.cancel_storage_requests(id);
        self.stop_web_request(id);
        self.unqueue(id);
        self.local_hits.retain(|hit| *hit != id);

        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        loader.cancelled = true;
        loader.finished = true;
        loader.phase = LoadPhase::Failed;
        if let Err(error) = loader.discard_content() {
            warn!(target: "mediaload::downloader", %id, %error, "failed to remove partial file");
        }
        if let LoaderKind::Storage(task) = &mut loader.kind {
            task.reset();
        }
    }

    pub(crate) fn emit_progress(&mut self, id: LoaderId) {
        if let Some(loader) = self.loaders.get(id) {
            let progress = loader.progress();
            self.emit(LoaderEvent {
                id,
                kind: LoaderEventKind::Progress(progress),
            });
        }
    }

    fn emit(&mut self, event: LoaderEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
    }

    fn notify_finished(&mut self) {
        for observer in &mut self.finish_observers {
            observer();
        }
    }
}

impl<C> std::fmt::Debug for Downloader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("loaders", &self.loaders.len())
            .field("requests", &self.requests.len())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
