//! Exclusive device handle management

use crate::errors::CameraError;
use crate::platform::{
    CameraDevice, DeviceEvents, DeviceManager, NativeSession, OutputConfig, SessionToken,
};
use crate::sync::lock;
use crate::types::DeviceId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

const ACQUIRE_SLICE: Duration = Duration::from_millis(25);

struct LockInner {
    held: Mutex<bool>,
    cv: Condvar,
}

/// Binary semaphore serialising device open and close.
///
/// Share one instance between controllers that address the same exclusive
/// device so their open/close sequences never overlap.
#[derive(Clone)]
pub struct OpenCloseLock {
    inner: Arc<LockInner>,
}

impl OpenCloseLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                held: Mutex::new(false),
                cv: Condvar::new(),
            }),
        }
    }

    pub fn is_held(&self) -> bool {
        *lock(&self.inner.held)
    }

    /// Wait up to `timeout` for the lock.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<LockPermit> {
        self.acquire(timeout, None)
    }

    /// Like [`try_acquire_for`](Self::try_acquire_for) but gives up early once
    /// `cancel` is set.
    pub(crate) fn acquire_cancellable(
        &self,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Option<LockPermit> {
        self.acquire(timeout, Some(cancel))
    }

    fn acquire(&self, timeout: Duration, cancel: Option<&AtomicBool>) -> Option<LockPermit> {
        let deadline = Instant::now() + timeout;
        let mut held = lock(&self.inner.held);
        loop {
            if !*held {
                *held = true;
                return Some(LockPermit { lock: self.clone() });
            }
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait = (deadline - now).min(ACQUIRE_SLICE);
            held = match self.inner.cv.wait_timeout(held, wait) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn release(&self) {
        *lock(&self.inner.held) = false;
        self.inner.cv.notify_one();
    }
}

impl Default for OpenCloseLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OpenCloseLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCloseLock")
            .field("held", &self.is_held())
            .finish()
    }
}

/// Held open/close lock; released on drop.
pub struct LockPermit {
    lock: OpenCloseLock,
}

impl Drop for LockPermit {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl fmt::Debug for LockPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockPermit")
    }
}

/// Owns the device handle and native session on the camera worker.
pub(crate) struct DeviceLifecycle {
    manager: Option<Arc<dyn DeviceManager>>,
    lock: OpenCloseLock,
    lock_timeout: Duration,
    // Held from the open request until the open callback is processed.
    pending_open: Option<LockPermit>,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn NativeSession>>,
}

impl DeviceLifecycle {
    pub(crate) fn new(
        manager: Option<Arc<dyn DeviceManager>>,
        lock: OpenCloseLock,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            lock,
            lock_timeout,
            pending_open: None,
            device: None,
            session: None,
        }
    }

    pub(crate) fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Issue the open request under the open/close lock.
    pub(crate) fn open(
        &mut self,
        id: &DeviceId,
        events: DeviceEvents,
        cancel: &AtomicBool,
    ) -> Result<(), CameraError> {
        let manager = self
            .manager
            .clone()
            .ok_or_else(|| CameraError::DeviceUnavailable("no device manager installed".into()))?;

        let listed = manager.list_devices()?;
        if !listed.contains(id) {
            return Err(CameraError::DeviceUnavailable(format!(
                "device {} is not listed",
                id
            )));
        }

        let permit = self
            .lock
            .acquire_cancellable(self.lock_timeout, cancel)
            .ok_or(CameraError::LockTimeout {
                waited_ms: self.lock_timeout.as_millis() as u64,
            })?;

        log::debug!("opening camera {}", id);
        manager.open(id, events)?;
        self.pending_open = Some(permit);
        Ok(())
    }

    pub(crate) fn on_opened(&mut self, device: Box<dyn CameraDevice>) {
        if let Some(mut old) = self.device.replace(device) {
            log::warn!("replacing an open device handle for {}", old.id());
            old.close();
        }
        self.pending_open = None;
    }

    /// The open request ended without a handle (disconnect or error).
    pub(crate) fn on_open_aborted(&mut self) {
        self.pending_open = None;
    }

    /// Replace the native session with one feeding `outputs`.
    pub(crate) fn configure(
        &mut self,
        token: SessionToken,
        outputs: &[OutputConfig],
    ) -> Result<(), CameraError> {
        self.close_session();
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| CameraError::device("no open device handle"))?;
        self.session = Some(device.create_capture_session(token, outputs)?);
        Ok(())
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut (dyn NativeSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub(crate) fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    /// Close the session, then the device. Returns false when nothing was open.
    pub(crate) fn close(&mut self) -> bool {
        let had_anything =
            self.device.is_some() || self.session.is_some() || self.pending_open.is_some();
        if !had_anything {
            return false;
        }

        let _permit = match self.pending_open.take() {
            Some(p) => Some(p),
            None => {
                let p = self.lock.try_acquire_for(self.lock_timeout);
                if p.is_none() {
                    log::warn!("closing camera without the open/close lock");
                }
                p
            }
        };

        self.close_session();
        if let Some(mut device) = self.device.take() {
            log::debug!("closing camera {}", device.id());
            device.close();
        }
        true
    }
}

impl Drop for DeviceLifecycle {
    fn drop(&mut self) {
        self.close();
    }
}
