use crate::effects::WebTaskId;

/// Request bookkeeping of a web loader.
#[derive(Debug)]
pub(crate) struct WebTask {
    pub url:      String,
    /// Request currently running on the web worker.
    pub current:  Option<WebTaskId>,
    pub attempts: u32,
}

impl WebTask {
    pub fn new(url: String) -> Self {
        Self {
            url,
            current: None,
            attempts: 0,
        }
    }
}
