//! Pending still-capture requests

use super::request::CaptureRequest;
use crate::sync::lock;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Unbounded FIFO shared between callers (enqueue) and the camera worker
/// (dequeue, only while the machine sits in `Preview`).
#[derive(Default)]
pub struct RequestQueue {
    inner: Mutex<VecDeque<CaptureRequest>>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request; returns the queue length after the push.
    pub fn enqueue(&self, request: CaptureRequest) -> usize {
        let mut g = lock(&self.inner);
        g.push_back(request);
        g.len()
    }

    pub fn try_dequeue(&self) -> Option<CaptureRequest> {
        lock(&self.inner).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Drop every pending request, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut g = lock(&self.inner);
        let n = g.len();
        g.clear();
        n
    }

    /// Sequence numbers of pending requests, oldest first
    pub fn pending_sequences(&self) -> Vec<u64> {
        lock(&self.inner).iter().map(CaptureRequest::sequence).collect()
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.pending_sequences())
            .finish()
    }
}
