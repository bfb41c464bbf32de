//! Owned synchronization events used to pace the host's render loop.
//!
//! The host hands its event to a backend through `set_event_handle`. From then
//! on only the backend signals it; the host keeps an [`EventWaiter`] that can
//! wait on and reset the event but never raise it.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Native primitive behind an [`EventHandle`].
pub trait RawEvent: Send + Sync {
    /// Puts the event into the signaled state and wakes every waiter.
    fn set(&self) -> io::Result<()>;
    /// Returns the event to the non-signaled state.
    fn reset(&self) -> io::Result<()>;
    /// Blocks until the event is signaled. Returns `false` on timeout.
    fn wait(&self, timeout: Option<Duration>) -> io::Result<bool>;
}

/// Manual-reset event built on a mutex and condition variable.
#[derive(Default)]
pub struct ManualResetEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }
}

impl RawEvent for ManualResetEvent {
    fn set(&self) -> io::Result<()> {
        *self.signaled.lock() = true;
        self.cond.notify_all();
        Ok(())
    }

    fn reset(&self) -> io::Result<()> {
        *self.signaled.lock() = false;
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut signaled = self.signaled.lock();
        match timeout {
            None => {
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
                Ok(true)
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*signaled {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        return Ok(*signaled);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Process-unique identity of an event, stable across ownership transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(u64);

fn next_event_id() -> EventId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    EventId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// An owned event with signaling rights. Not `Clone`: transferring the
/// handle transfers the right to signal.
pub struct EventHandle {
    id: EventId,
    raw: Arc<dyn RawEvent>,
}

impl EventHandle {
    /// Creates a native manual-reset event in the non-signaled state.
    pub fn new() -> io::Result<Self> {
        #[cfg(windows)]
        {
            Ok(Self::from_raw(Arc::new(win32::Win32Event::create()?)))
        }
        #[cfg(not(windows))]
        {
            Ok(Self::from_raw(Arc::new(ManualResetEvent::new())))
        }
    }

    pub fn from_raw(raw: Arc<dyn RawEvent>) -> Self {
        Self {
            id: next_event_id(),
            raw,
        }
    }

    /// Adopts an event created by the host process. The handle is closed
    /// when the returned value and every waiter derived from it are dropped.
    ///
    /// # Safety
    /// `handle` must be a valid event handle that nothing else closes.
    #[cfg(windows)]
    pub unsafe fn from_raw_handle(handle: *mut std::ffi::c_void) -> Self {
        Self::from_raw(Arc::new(win32::Win32Event::from_raw(handle)))
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn signal(&self) -> io::Result<()> {
        self.raw.set()
    }

    pub fn reset(&self) -> io::Result<()> {
        self.raw.reset()
    }

    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        self.raw.wait(timeout)
    }

    /// A wait-only view of this event for the side that gave up ownership.
    pub fn waiter(&self) -> EventWaiter {
        EventWaiter {
            id: self.id,
            raw: self.raw.clone(),
        }
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle").field("id", &self.id).finish()
    }
}

/// Waits on an event without being able to signal it.
#[derive(Clone)]
pub struct EventWaiter {
    id: EventId,
    raw: Arc<dyn RawEvent>,
}

impl EventWaiter {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        self.raw.wait(timeout)
    }

    pub fn reset(&self) -> io::Result<()> {
        self.raw.reset()
    }
}

impl fmt::Debug for EventWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWaiter").field("id", &self.id).finish()
    }
}

#[cfg(windows)]
mod win32 {
    use std::ffi::c_void;
    use std::io;
    use std::time::Duration;

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
    use windows::Win32::System::Threading::{
        CreateEventW, ResetEvent, SetEvent, WaitForSingleObject, INFINITE,
    };

    use super::RawEvent;

    pub(super) struct Win32Event {
        handle: HANDLE,
    }

    // Event handles are process-wide kernel objects usable from any thread.
    unsafe impl Send for Win32Event {}
    unsafe impl Sync for Win32Event {}

    impl Win32Event {
        pub(super) fn create() -> io::Result<Self> {
            let handle =
                unsafe { CreateEventW(None, true, false, PCWSTR::null()) }.map_err(io::Error::other)?;
            Ok(Self { handle })
        }

        pub(super) unsafe fn from_raw(handle: *mut c_void) -> Self {
            Self {
                handle: HANDLE(handle),
            }
        }
    }

    impl RawEvent for Win32Event {
        fn set(&self) -> io::Result<()> {
            unsafe { SetEvent(self.handle) }.map_err(io::Error::other)
        }

        fn reset(&self) -> io::Result<()> {
            unsafe { ResetEvent(self.handle) }.map_err(io::Error::other)
        }

        fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
            let millis = timeout
                .map(|t| t.as_millis().min(u128::from(INFINITE - 1)) as u32)
                .unwrap_or(INFINITE);
            let status = unsafe { WaitForSingleObject(self.handle, millis) };
            if status == WAIT_OBJECT_0 {
                Ok(true)
            } else if status == WAIT_TIMEOUT {
                Ok(false)
            } else {
                Err(io::Error::last_os_error())
            }
        }
    }

    impl Drop for Win32Event {
        fn drop(&mut self) {
            if let Err(err) = unsafe { CloseHandle(self.handle) } {
                tracing::warn!(%err, "failed to close event handle");
            }
        }
    }
}
