//! Slice request bookkeeping.
//!
//! Each widget has at most one outstanding request. A waiter is resolved
//! exactly once: with the slices when the worker finishes, or with
//! [`SlicerError::Cancelled`] when the request is abandoned first.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Result, SlicerError};
use crate::pipeline::CancelToken;
use crate::slice::Slice;

/// Callback resolving one request.
pub type Waiter = Box<dyn FnOnce(Result<Arc<Vec<Slice>>>) + Send>;

struct Job {
    cancel: CancelToken,
    waiter: Waiter,
}

/// Outstanding slice requests keyed by widget id.
#[derive(Default)]
pub struct SliceJobs {
    jobs: HashMap<u32, Job>,
}

impl SliceJobs {
    /// No outstanding requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request for `widget`. An older request for the same
    /// widget is cancelled and its waiter resolved.
    pub fn submit(&mut self, widget: u32, waiter: Waiter) -> CancelToken {
        self.cancel(widget);
        let cancel = CancelToken::new();
        self.jobs.insert(
            widget,
            Job {
                cancel: cancel.clone(),
                waiter,
            },
        );
        debug!(widget, "slice request queued");
        cancel
    }

    /// Is a request for `widget` outstanding?
    pub fn is_pending(&self, widget: u32) -> bool {
        self.jobs.contains_key(&widget)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// No outstanding requests.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Deliver a worker's result. Returns false when no request was
    /// waiting, e.g. because it was already cancelled.
    pub fn complete(&mut self, widget: u32, result: Result<Vec<Slice>>) -> bool {
        let Some(job) = self.jobs.remove(&widget) else {
            warn!(widget, "result for unknown slice request dropped");
            return false;
        };
        let result = if job.cancel.is_cancelled() {
            Err(SlicerError::Cancelled)
        } else {
            result.map(Arc::new)
        };
        (job.waiter)(result);
        true
    }

    /// Cancel the request for `widget`, resolving its waiter.
    pub fn cancel(&mut self, widget: u32) -> bool {
        let Some(job) = self.jobs.remove(&widget) else {
            return false;
        };
        job.cancel.cancel();
        debug!(widget, "slice request cancelled");
        (job.waiter)(Err(SlicerError::Cancelled));
        true
    }

    /// Cancel every outstanding request.
    pub fn cancel_all(&mut self) {
        let ids: Vec<u32> = self.jobs.keys().copied().collect();
        for id in ids {
            self.cancel(id);
        }
    }
}

impl std::fmt::Debug for SliceJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceJobs")
            .field("pending", &self.jobs.keys().collect::<Vec<_>>())
            .finish()
    }
}
