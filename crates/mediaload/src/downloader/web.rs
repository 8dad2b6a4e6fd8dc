//! Web loaders: one request at a time on the web worker, resumed by range.

use tracing::{debug, trace, warn};

use super::Downloader;
use crate::core::LoaderId;
use crate::data::{FailReason, QueueKey};
use crate::effects::{RemoteReadChannel, WebEvent, WebTaskId};
use crate::loader::LoaderKind;

impl<C: RemoteReadChannel> Downloader<C> {
    pub(super) fn load_web_part(&mut self, id: LoaderId) -> bool {
        let Some(web) = self.web.as_ref() else {
            return false;
        };
        let Some(loader) = self.loaders.get_mut(id) else {
            return false;
        };
        let offset = loader.loaded;
        let LoaderKind::Web(task) = &mut loader.kind else {
            return false;
        };
        if task.current.is_some() {
            return false;
        }
        task.attempts += 1;
        let web_task = WebTaskId {
            loader:  id,
            attempt: task.attempts,
        };
        task.current = Some(web_task);
        web.append(web_task, &task.url, offset);
        if let Some(queue) = self.queues.get_mut(&QueueKey::Web) {
            queue.acquire();
        }
        trace!(target: "mediaload::web", %id, url = %task.url, offset, "web request queued");
        true
    }

    /// Abandon the running web request of `id`, if any.
    pub(super) fn stop_web_request(&mut self, id: LoaderId) {
        let Some(loader) = self.loaders.get_mut(id) else {
            return;
        };
        let LoaderKind::Web(task) = &mut loader.kind else {
            return;
        };
        let Some(current) = task.current.take() else {
            return;
        };
        if let Some(web) = &self.web {
            web.stop(current);
        }
        if let Some(queue) = self.queues.get_mut(&QueueKey::Web) {
            queue.release();
        }
    }

    /// Apply everything the web worker delivered since the last tick.
    pub(super) fn drain_web(&mut self) {
        let mut delivered = false;
        while let Some(delivery) = self.web.as_ref().and_then(|web| web.try_recv()) {
            delivered = true;
            let id = delivery.task.loader;
            let Some(loader) = self.loaders.get_mut(id) else {
                continue;
            };
            let LoaderKind::Web(task) = &mut loader.kind else {
                continue;
            };
            if loader.finished || task.current != Some(delivery.task) {
                trace!(target: "mediaload::web", %id, attempt = delivery.task.attempt, "ignoring stale delivery");
                continue;
            }
            match delivery.event {
                WebEvent::Progress { offset, bytes, total } => {
                    if offset == 0 && loader.loaded > 0 {
                        debug!(target: "mediaload::web", %id, "content restarted from the beginning");
                        if let Err(error) = loader.restart() {
                            warn!(target: "mediaload::web", %id, %error, "failed to truncate partial file");
                            self.fail(id, FailReason::FileWrite(error.to_string()));
                            continue;
                        }
                    }
                    if let Err(error) = loader.write_part(offset, &bytes) {
                        warn!(target: "mediaload::web", %id, offset, %error, "web write failed");
                        self.fail(id, FailReason::FileWrite(error.to_string()));
                        continue;
                    }
                    loader.loaded = offset + bytes.len() as u64;
                    if total.is_some() {
                        loader.size = total;
                    }
                    self.emit_progress(id);
                }
                WebEvent::Finished { size } => {
                    task.current = None;
                    loader.size = Some(size);
                    loader.loaded = size;
                    if let Some(queue) = self.queues.get_mut(&QueueKey::Web) {
                        queue.release();
                    }
                    self.finalize(id);
                }
                WebEvent::Failed(reason) => {
                    task.current = None;
                    if let Some(queue) = self.queues.get_mut(&QueueKey::Web) {
                        queue.release();
                    }
                    self.fail(id, reason);
                }
            }
        }
        if delivered {
            self.pump(QueueKey::Web);
        }
    }
}
