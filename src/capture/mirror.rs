//! Read-only view of the worker's state for callers

use super::state::CameraState;
use crate::sync::lock;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const HISTORY_LEN: usize = 256;

struct MirrorInner {
    state: CameraState,
    history: VecDeque<CameraState>,
}

/// Published by the worker on every transition; callers only read it.
pub(crate) struct StateMirror {
    inner: Mutex<MirrorInner>,
    cv: Condvar,
}

impl StateMirror {
    pub(crate) fn new() -> Self {
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(CameraState::WaitingDeviceOpen);
        Self {
            inner: Mutex::new(MirrorInner {
                state: CameraState::WaitingDeviceOpen,
                history,
            }),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> CameraState {
        lock(&self.inner).state
    }

    pub(crate) fn publish(&self, state: CameraState) {
        let mut g = lock(&self.inner);
        g.state = state;
        if g.history.len() == HISTORY_LEN {
            g.history.pop_front();
        }
        g.history.push_back(state);
        self.cv.notify_all();
    }

    /// Most recent transitions, oldest first
    pub(crate) fn history(&self) -> Vec<CameraState> {
        lock(&self.inner).history.iter().copied().collect()
    }

    /// Block until the published state equals `target` or `timeout` passes.
    pub(crate) fn wait_for(&self, target: CameraState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = lock(&self.inner);
        loop {
            if g.state == target {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            g = match self.cv.wait_timeout(g, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
