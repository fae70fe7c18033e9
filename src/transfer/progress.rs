use std::time::Duration;

use crate::errors::UploadError;
use crate::types::ProgressEvent;

/// Receives what happens during an upload. Calls run inline on the upload
/// task and must not block.
pub trait UploadObserver {
    /// After every part the transport has taken.
    fn on_progress(&mut self, event: ProgressEvent);

    /// Before retry number `attempt` restarts the upload from byte 0, `wait`
    /// from now.
    fn on_retry(&mut self, _error: &UploadError, _attempt: u32, _wait: Duration) {}
}

impl<F: FnMut(ProgressEvent)> UploadObserver for F {
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event)
    }
}
