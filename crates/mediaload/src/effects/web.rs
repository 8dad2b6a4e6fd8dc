//! Background worker that runs web fetches off the control path.
//!
//! The control side registers a request in the shared active set and then
//! pokes the worker. The worker only starts requests still present in the
//! set, and checks the set again before every delivery, so a loader that was
//! paused or cancelled after enqueueing never receives bytes.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc as command;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use super::http::HttpClient;
use crate::core::{LoaderId, is_redirect, parse_content_range, range_header, resolve_location};
use crate::data::FailReason;
use crate::error::{Error, Result};

/// Identifies one request issued for a web loader. Every start of the loader
/// gets a fresh attempt number, so deliveries of an abandoned request can be
/// told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebTaskId {
    pub loader:  LoaderId,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
struct WebRequest {
    url:    String,
    offset: u64,
}

type ActiveSet = Arc<Mutex<HashMap<WebTaskId, WebRequest>>>;

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashMap<WebTaskId, WebRequest>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result handed back from the worker to the control path.
#[derive(Debug, Clone, PartialEq)]
pub struct WebDelivery {
    pub task:  WebTaskId,
    pub event: WebEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebEvent {
    /// `bytes` belong at `offset` of the content; `total` is the full size
    /// when the server reported it.
    Progress {
        offset: u64,
        bytes:  Bytes,
        total:  Option<u64>,
    },
    /// The body ended; `size` is the number of bytes the content holds.
    Finished { size: u64 },
    Failed(FailReason),
}

enum Command {
    Start(WebTaskId),
    Stop(WebTaskId),
    Shutdown,
}

/// Owner of the web worker thread.
pub struct WebLoadManager {
    active:     ActiveSet,
    commands:   command::UnboundedSender<Command>,
    deliveries: mpsc::Receiver<WebDelivery>,
    worker:     Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WebLoadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebLoadManager")
            .field("active", &lock(&self.active).len())
            .finish_non_exhaustive()
    }
}

impl WebLoadManager {
    /// Start the worker thread with its own runtime, sharing `client`
    /// between all fetches.
    pub fn spawn<C: HttpClient>(client: C, max_redirects: u32) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::WebWorker)?;
        let active = ActiveSet::default();
        let (commands, receiver) = command::unbounded_channel();
        let (sender, deliveries) = mpsc::channel();

        let worker_active = Arc::clone(&active);
        let worker = std::thread::Builder::new()
            .name("mediaload-web".into())
            .spawn(move || {
                runtime.block_on(run(
                    Arc::new(client),
                    max_redirects,
                    worker_active,
                    receiver,
                    sender,
                ))
            })
            .map_err(Error::WebWorker)?;

        Ok(Self {
            active,
            commands,
            deliveries,
            worker: Some(worker),
        })
    }

    /// Fetch `url` from byte `offset` on behalf of `task`.
    pub fn append(&self, task: WebTaskId, url: &str, offset: u64) {
        lock(&self.active).insert(task, WebRequest {
            url: url.to_owned(),
            offset,
        });
        if self.commands.send(Command::Start(task)).is_err() {
            warn!(target: "mediaload::web", loader = %task.loader, "web worker is gone");
        }
    }

    /// Abandon `task`. Deliveries already queued for it are left for the
    /// caller to discard.
    pub fn stop(&self, task: WebTaskId) {
        if lock(&self.active).remove(&task).is_some() {
            let _ = self.commands.send(Command::Stop(task));
        }
    }

    pub fn try_recv(&self) -> Option<WebDelivery> { self.deliveries.try_recv().ok() }

    pub fn active(&self) -> usize { lock(&self.active).len() }
}

impl Drop for WebLoadManager {
    fn drop(&mut self) {
        lock(&self.active).clear();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

async fn run<C: HttpClient>(
    client: Arc<C>,
    max_redirects: u32,
    active: ActiveSet,
    mut commands: command::UnboundedReceiver<Command>,
    deliveries: mpsc::Sender<WebDelivery>,
) {
    let mut running: HashMap<WebTaskId, AbortHandle> = HashMap::new();
    while let Some(next) = commands.recv().await {
        running.retain(|_, handle| !handle.is_finished());
        match next {
            Command::Start(task) => {
                let Some(request) = lock(&active).get(&task).cloned() else {
                    trace!(target: "mediaload::web", loader = %task.loader, "request withdrawn before start");
                    continue;
                };
                let handle = tokio::spawn(fetch_task(
                    Arc::clone(&client),
                    max_redirects,
                    task,
                    request,
                    Arc::clone(&active),
                    deliveries.clone(),
                ));
                running.insert(task, handle.abort_handle());
            }
            Command::Stop(task) => {
                if let Some(handle) = running.remove(&task) {
                    handle.abort();
                }
            }
            Command::Shutdown => break,
        }
    }
    for handle in running.values() {
        handle.abort();
    }
}

async fn fetch_task<C: HttpClient>(
    client: Arc<C>,
    max_redirects: u32,
    task: WebTaskId,
    request: WebRequest,
    active: ActiveSet,
    deliveries: mpsc::Sender<WebDelivery>,
) {
    let deliver = |event: WebEvent| {
        if !lock(&active).contains_key(&task) {
            return false;
        }
        deliveries.send(WebDelivery { task, event }).is_ok()
    };

    let outcome = fetch(client.as_ref(), max_redirects, &request, &deliver).await;
    let event = match outcome {
        Ok(Some(size)) => WebEvent::Finished { size },
        Ok(None) => return,
        Err(reason) => {
            debug!(target: "mediaload::web", loader = %task.loader, url = %request.url, %reason, "web fetch failed");
            WebEvent::Failed(reason)
        }
    };
    deliver(event);
    lock(&active).remove(&task);
}

/// Stream `request` through `deliver`. Returns the content size on
/// completion, or `None` once `deliver` reports the task is gone.
async fn fetch<C: HttpClient>(
    client: &C,
    max_redirects: u32,
    request: &WebRequest,
    deliver: &impl Fn(WebEvent) -> bool,
) -> std::result::Result<Option<u64>, FailReason> {
    let headers: Vec<(String, String)> = range_header(request.offset)
        .map(|range| vec![("Range".to_owned(), range)])
        .unwrap_or_default();

    let mut url = request.url.clone();
    let mut redirects = 0;
    let response = loop {
        let response = client
            .get(&url, &headers)
            .await
            .map_err(|error| FailReason::Http(error.to_string()))?;
        if !is_redirect(response.status) {
            break response;
        }
        redirects += 1;
        if redirects > max_redirects {
            return Err(FailReason::TooManyRedirects);
        }
        let location = response
            .location
            .ok_or_else(|| FailReason::Http(format!("redirect {} without location", response.status)))?;
        url = resolve_location(&url, &location)
            .map_err(|error| FailReason::Http(format!("bad redirect location {location}: {error}")))?;
        debug!(target: "mediaload::web", %url, redirects, "following redirect");
    };

    let (mut offset, total) = match response.status {
        206 => {
            let range = response
                .content_range
                .as_deref()
                .and_then(parse_content_range)
                .ok_or_else(|| FailReason::Http("partial response without content range".into()))?;
            (range.start, range.total)
        }
        // Range past the end: everything was already received.
        416 if request.offset > 0 => return Ok(Some(request.offset)),
        status if (200..300).contains(&status) => {
            if request.offset > 0 {
                debug!(target: "mediaload::web", %url, "server ignored range, restarting at 0");
            }
            (0, response.content_length)
        }
        status => return Err(FailReason::Http(format!("unexpected status {status}"))),
    };

    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|error| FailReason::Http(error.to_string()))?;
        if bytes.is_empty() {
            continue;
        }
        let len = bytes.len() as u64;
        if !deliver(WebEvent::Progress {
            offset,
            bytes,
            total,
        }) {
            return Ok(None);
        }
        offset += len;
    }
    Ok(Some(offset))
}
