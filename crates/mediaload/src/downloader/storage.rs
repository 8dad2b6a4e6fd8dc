//! Remote-storage loaders: chunk issuance, CDN redirection and hash checks.

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{Downloader, RequestRecord};
use crate::core::{CdnHashCheck, CdnState, LoaderId, retry_delay};
use crate::data::{
    CdnRedirect, ChunkResponse, Endpoint, FailReason, FileHash, LoadPhase, ReadError, ReadErrorKind,
    ReadRequest, RequestId,
};
use crate::effects::RemoteReadChannel;
use crate::loader::{LoaderKind, SentKind, StorageTask, UncheckedPart};

/// Outcome of checking one CDN chunk.
enum Verified {
    Accepted,
    Parked,
    Refetching,
    Failed,
}

impl<C: RemoteReadChannel> Downloader<C> {
    /// Deliver the completion of an issued request. Completions for
    /// cancelled requests or released loaders are ignored.
    pub fn on_chunk(&mut self, request_id: RequestId, response: ChunkResponse) {
        let Some(record) = self.requests.remove(&request_id) else {
            trace!(target: "mediaload::storage", request = %request_id, "ignoring late response");
            return;
        };
        self.balance.sub(record.dc_id, record.session, u64::from(record.limit));
        let id = record.loader;
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        let queue_key = loader.key().queue_key();
        if let LoaderKind::Storage(task) = &mut loader.kind {
            task.sent.remove(&request_id);
        }
        let finished = loader.finished;
        if matches!(record.kind, SentKind::Part { .. }) {
            if let Some(queue) = self.queues.get_mut(&queue_key) {
                queue.release();
            }
        }
        if finished {
            return;
        }

        match (record.kind, response) {
            (SentKind::Part { offset }, ChunkResponse::Bytes(bytes)) => {
                self.part_loaded(id, offset, record.limit, bytes, record.via_cdn);
            }
            (SentKind::Part { offset }, ChunkResponse::CdnRedirect(redirect)) if !record.via_cdn => {
                self.switch_to_cdn(id, offset, redirect);
            }
            (SentKind::Part { offset }, ChunkResponse::CdnReuploadNeeded { request_token })
                if record.via_cdn =>
            {
                self.request_reupload(id, offset, request_token);
            }
            (SentKind::Part { offset }, ChunkResponse::Error(error)) => {
                self.part_failed(id, offset, error, record.via_cdn);
            }
            (SentKind::Hashes { offset }, ChunkResponse::Hashes(hashes)) => {
                self.hashes_loaded(id, offset, hashes);
            }
            (SentKind::Reupload, ChunkResponse::Hashes(hashes)) => self.reuploaded(id, hashes),
            (SentKind::Hashes { .. } | SentKind::Reupload, ChunkResponse::Error(error))
                if error.kind == ReadErrorKind::TokenInvalid =>
            {
                self.drop_cdn(id);
            }
            (SentKind::Hashes { .. } | SentKind::Reupload, ChunkResponse::Error(error)) => {
                self.fail(id, FailReason::RemoteRead(error.message));
            }
            (kind, response) => {
                warn!(target: "mediaload::storage", %id, ?kind, ?response, "unexpected response");
                self.fail(id, FailReason::Protocol(format!("unexpected response to {kind:?}")));
            }
        }

        self.check_finished(id);
        self.pump(queue_key);
    }

    pub(super) fn load_storage_part(&mut self, id: LoaderId) -> bool {
        let part_size = self.config.part_size;
        let Some(loader) = self.loaders.get_mut(id) else {
            return false;
        };
        let size = loader.size;
        let LoaderKind::Storage(task) = &mut loader.kind else {
            return false;
        };
        if size.is_none() && task.parts_in_flight() > 0 {
            return false;
        }
        let offset = match task.take_due(Instant::now()) {
            Some(offset) => offset,
            None if task.all_requested(size) => return false,
            None => {
                let offset = task.next_offset;
                task.next_offset += u64::from(part_size);
                offset
            }
        };
        let limit = match size {
            Some(size) => u64::from(part_size).min(size.saturating_sub(offset)).max(1) as u32,
            None => part_size,
        };
        self.issue_part(id, offset, limit);
        true
    }

    fn issue_part(&mut self, id: LoaderId, offset: u64, limit: u32) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        let queue_key = loader.key().queue_key();
        let LoaderKind::Storage(task) = &mut loader.kind else {
            return;
        };
        let origin = task.location.dc_id;
        let (balance_dc, cdn_dc, request) = match &task.cdn {
            Some(cdn) => (cdn.dc_id, Some(cdn.dc_id), ReadRequest::CdnFile {
                token: cdn.token.clone(),
                cipher: cdn.cipher().clone(),
                offset,
                limit,
            }),
            None => (origin, None, ReadRequest::File {
                location: task.location.clone(),
                offset,
                limit,
            }),
        };
        let session = self.balance.choose(balance_dc);
        let endpoint = Endpoint {
            dc_id: origin,
            session,
            cdn_dc,
        };
        let request_id = self.channel.issue(&endpoint, &request);
        task.sent.insert(request_id, SentKind::Part { offset });
        loader.phase = if cdn_dc.is_some() {
            LoadPhase::CdnRedirected
        } else {
            LoadPhase::Requesting
        };

        self.balance.add(balance_dc, session, u64::from(limit));
        self.requests.insert(request_id, RequestRecord {
            loader: id,
            kind: SentKind::Part { offset },
            dc_id: balance_dc,
            session,
            limit,
            via_cdn: cdn_dc.is_some(),
        });
        if let Some(queue) = self.queues.get_mut(&queue_key) {
            queue.acquire();
        }
        trace!(target: "mediaload::storage", %id, offset, limit, dc_id = endpoint.target_dc(), session, request = %request_id, "chunk requested");
    }

    /// Issue a control request (hash catalog, re-upload) to the origin data
    /// center. These bypass the queue limit and session balancing.
    fn issue_control(&mut self, id: LoaderId, kind: SentKind, request: ReadRequest) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        let LoaderKind::Storage(task) = &mut loader.kind else {
            return;
        };
        let origin = task.location.dc_id;
        let endpoint = Endpoint {
            dc_id:   origin,
            session: 0,
            cdn_dc:  None,
        };
        let request_id = self.channel.issue(&endpoint, &request);
        task.sent.insert(request_id, kind);
        self.requests.insert(request_id, RequestRecord {
            loader: id,
            kind,
            dc_id: origin,
            session: 0,
            limit: 0,
            via_cdn: false,
        });
        trace!(target: "mediaload::storage", %id, ?kind, request = %request_id, "control request");
    }

    fn part_loaded(&mut self, id: LoaderId, offset: u64, limit: u32, bytes: Bytes, via_cdn: bool) {
        if via_cdn {
            match self.verify_cdn_part(id, offset, limit, bytes.clone()) {
                Verified::Accepted => {}
                Verified::Parked => {
                    self.request_hashes(id, offset);
                    return;
                }
                Verified::Refetching | Verified::Failed => return,
            }
        }
        self.accept_part(id, offset, limit, &bytes);
    }

    fn verify_cdn_part(&mut self, id: LoaderId, offset: u64, limit: u32, bytes: Bytes) -> Verified {
        let Some(task) = self.storage_task(id) else {
            return Verified::Failed;
        };
        let Some(cdn) = task.cdn.as_mut() else {
            return Verified::Failed;
        };
        match cdn.check(offset, &bytes) {
            CdnHashCheck::Good => Verified::Accepted,
            CdnHashCheck::NoHash => {
                trace!(target: "mediaload::storage", %id, offset, "parking unchecked CDN chunk");
                task.unchecked.insert(offset, UncheckedPart { bytes, limit });
                Verified::Parked
            }
            CdnHashCheck::Invalid if task.hash_retried.insert(offset) => {
                warn!(target: "mediaload::storage", %id, offset, "CDN hash mismatch, refreshing catalog");
                cdn.forget(offset, bytes.len() as u64);
                task.redo(offset, Instant::now());
                self.request_hashes(id, offset);
                Verified::Refetching
            }
            CdnHashCheck::Invalid => {
                self.fail(id, FailReason::HashMismatch { offset });
                Verified::Failed
            }
        }
    }

    fn accept_part(&mut self, id: LoaderId, offset: u64, limit: u32, bytes: &[u8]) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        if let Err(error) = loader.write_part(offset, bytes) {
            warn!(target: "mediaload::storage", %id, offset, %error, "chunk write failed");
            self.fail(id, FailReason::FileWrite(error.to_string()));
            return;
        }
        let end = offset + bytes.len() as u64;
        loader.loaded += bytes.len() as u64;
        let short = (bytes.len() as u64) < u64::from(limit);
        let LoaderKind::Storage(task) = &mut loader.kind else {
            return;
        };
        task.clear_attempts(offset);
        if short && loader.size.is_none_or(|size| end < size) {
            trace!(target: "mediaload::storage", %id, size = end, "short chunk marks the end");
            task.last_complete = true;
            loader.size = Some(end);
        }
        self.emit_progress(id);
    }

    fn part_failed(&mut self, id: LoaderId, offset: u64, error: ReadError, via_cdn: bool) {
        let retry = self.config.retry;
        match error.kind {
            ReadErrorKind::TokenInvalid if via_cdn => {
                if let Some(task) = self.storage_task(id) {
                    task.redo(offset, Instant::now());
                }
                self.drop_cdn(id);
            }
            ReadErrorKind::Transient => {
                let Some(task) = self.storage_task(id) else {
                    return;
                };
                let attempt = task.bump_attempt(offset);
                if attempt < retry.max_retries {
                    let delay = retry_delay(attempt, retry.backoff());
                    debug!(target: "mediaload::storage", %id, offset, attempt, ?delay, %error, "retrying chunk");
                    task.redo(offset, Instant::now() + delay);
                } else {
                    self.fail(id, FailReason::RemoteRead(error.message));
                }
            }
            _ => self.fail(id, FailReason::RemoteRead(error.message)),
        }
    }

    fn switch_to_cdn(&mut self, id: LoaderId, offset: u64, redirect: CdnRedirect) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        if let Some(cdn) = task.cdn.as_mut().filter(|cdn| cdn.same_params(&redirect)) {
            cdn.add_hashes(redirect.hashes);
            task.redo(offset, Instant::now());
            return;
        }
        let dc_id = redirect.dc_id;
        let Some(state) = CdnState::from_redirect(redirect) else {
            self.fail(id, FailReason::BadCdnParams);
            return;
        };
        task.redo(offset, Instant::now());
        task.cdn = Some(state);
        debug!(target: "mediaload::storage", %id, offset, cdn_dc = dc_id, "switching to CDN");
        self.reissue_in_flight(id);
        if let Some(loader) = self.loaders.get_mut(id) {
            loader.phase = LoadPhase::CdnRedirected;
        }
    }

    /// Forget the CDN and fetch the rest from the origin again.
    fn drop_cdn(&mut self, id: LoaderId) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        if task.cdn.take().is_none() {
            return;
        }
        debug!(target: "mediaload::storage", %id, "CDN token invalid, back to origin");
        self.reissue_in_flight(id);
        if let Some(loader) = self.loaders.get_mut(id) {
            loader.phase = LoadPhase::Requesting;
        }
    }

    /// Cancel every request of `id` and queue its chunk offsets, including
    /// parked ones, to be requested against the current endpoint.
    fn reissue_in_flight(&mut self, id: LoaderId) {
        let offsets = self.cancel_storage_requests(id);
        let Some(task) = self.storage_task(id) else {
            return;
        };
        let now = Instant::now();
        let parked = std::mem::take(&mut task.unchecked).into_keys();
        let waiting = std::mem::take(&mut task.awaiting_reupload);
        let mut offsets: Vec<u64> = offsets.into_iter().chain(parked).chain(waiting).collect();
        offsets.sort_unstable();
        for offset in offsets {
            task.redo(offset, now);
        }
    }

    /// Ask the origin for the hash catalog starting at the first parked
    /// chunk, or at `offset` when nothing is parked.
    fn request_hashes(&mut self, id: LoaderId, offset: u64) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        if task.hashes_in_flight() {
            return;
        }
        let Some(cdn) = &task.cdn else {
            return;
        };
        let offset = task.unchecked.first_key_value().map_or(offset, |(parked, _)| *parked);
        let request = ReadRequest::CdnHashes {
            token: cdn.token.clone(),
            offset,
        };
        self.issue_control(id, SentKind::Hashes { offset }, request);
    }

    /// Merge a catalog reply and re-check parked chunks. A parked chunk the
    /// reply should have covered but did not is fatal; others get their own
    /// catalog request.
    fn hashes_loaded(&mut self, id: LoaderId, requested: u64, hashes: Vec<FileHash>) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        let Some(cdn) = task.cdn.as_mut() else {
            return;
        };
        cdn.add_hashes(hashes);
        let parked = std::mem::take(&mut task.unchecked);
        let mut resolved = false;
        let mut missing = None;
        for (offset, part) in parked {
            match self.verify_cdn_part(id, offset, part.limit, part.bytes.clone()) {
                Verified::Accepted => {
                    resolved = true;
                    self.accept_part(id, offset, part.limit, &part.bytes);
                }
                Verified::Parked => {
                    missing.get_or_insert(offset);
                }
                Verified::Refetching => resolved = true,
                Verified::Failed => return,
            }
        }
        if let Some(offset) = missing {
            if resolved || offset != requested {
                self.request_hashes(id, offset);
            } else {
                self.fail(id, FailReason::MissingCdnHash { offset });
            }
        }
    }

    fn request_reupload(&mut self, id: LoaderId, offset: u64, request_token: Bytes) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        task.awaiting_reupload.push(offset);
        if task.has_sent(SentKind::Reupload) {
            return;
        }
        let Some(cdn) = &task.cdn else {
            return;
        };
        debug!(target: "mediaload::storage", %id, offset, "CDN asks for re-upload");
        let request = ReadRequest::ReuploadCdnFile {
            token: cdn.token.clone(),
            request_token,
        };
        self.issue_control(id, SentKind::Reupload, request);
    }

    fn reuploaded(&mut self, id: LoaderId, hashes: Vec<FileHash>) {
        let Some(task) = self.storage_task(id) else {
            return;
        };
        if let Some(cdn) = task.cdn.as_mut() {
            cdn.add_hashes(hashes);
        }
        let now = Instant::now();
        for offset in std::mem::take(&mut task.awaiting_reupload) {
            task.redo(offset, now);
        }
    }

    /// Cancel all requests of `id`, returning the chunk offsets they asked for.
    pub(super) fn cancel_storage_requests(&mut self, id: LoaderId) -> Vec<u64> {
        let Some(loader) = self.loaders.get_mut(id) else {
            return Vec::new();
        };
        let queue_key = loader.key().queue_key();
        let LoaderKind::Storage(task) = &mut loader.kind else {
            return Vec::new();
        };
        let mut sent: Vec<(RequestId, SentKind)> = task.sent.drain().collect();
        sent.sort_unstable_by_key(|(request_id, _)| *request_id);
        let mut offsets = Vec::new();
        for (request_id, kind) in sent {
            self.channel.cancel(request_id);
            let Some(record) = self.requests.remove(&request_id) else {
                continue;
            };
            self.balance.sub(record.dc_id, record.session, u64::from(record.limit));
            if let SentKind::Part { offset } = kind {
                offsets.push(offset);
                if let Some(queue) = self.queues.get_mut(&queue_key) {
                    queue.release();
                }
            }
        }
        offsets
    }

    fn check_finished(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get(id) else {
            return;
        };
        if loader.finished {
            return;
        }
        let LoaderKind::Storage(task) = &loader.kind else {
            return;
        };
        if task.drained() && task.all_requested(loader.size) {
            self.finalize(id);
        }
    }

    fn storage_task(&mut self, id: LoaderId) -> Option<&mut StorageTask> {
        match &mut self.loaders.get_mut(id)?.kind {
            LoaderKind::Storage(task) => Some(task),
            LoaderKind::Web(_) => None,
        }
    }
}
