//! ToxCore: per-handle state shared by the manager, deferred calls and the pump.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bridge::subscribers::EventBus;
use crate::bridge::trampoline::{self, Registry, SlotStats};
use crate::error::ToxError;
use crate::pump::PumpState;
use crate::surface::Surface;
use crate::surface::types::Tox;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Handles whose tick events this thread is publishing, innermost last.
    static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// A live engine instance and the callback context it points into.
pub(crate) struct Engine {
    ptr: NonNull<Tox>,
    registry: Arc<Registry>,
}

// Safety: the engine pointer is only dereferenced by native calls made while
// holding `ToxCore::engine`, so at most one thread uses it at a time.
unsafe impl Send for Engine {}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Events handed to subscribers during this tick.
    pub published: usize,
    /// Engine's suggested delay before the next tick.
    pub next_interval: Duration,
    /// The tick was requested from inside a dispatch and did nothing.
    pub skipped: bool,
}

/// Per-handle state. One instance per successful `Tox::new`.
pub(crate) struct ToxCore {
    pub(crate) id: u64,
    surface: Arc<Surface>,
    /// `None` once released.
    engine: Mutex<Option<Engine>>,
    pub(crate) bus: EventBus,
    pub(crate) pump: Mutex<Option<PumpState>>,
}

impl ToxCore {
    /// Wrap a freshly created engine and install its trampolines.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `surface.tox_new` and not be owned by anything else.
    pub(crate) unsafe fn adopt(surface: Arc<Surface>, ptr: NonNull<Tox>) -> Self {
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::new(Registry::new(id));
        unsafe { trampoline::install(&surface, ptr.as_ptr(), &registry) };
        tracing::debug!(handle = id, origin = surface.origin(), "engine instance created");
        Self {
            id,
            surface,
            engine: Mutex::new(Some(Engine { ptr, registry })),
            bus: EventBus::new(id),
            pump: Mutex::new(None),
        }
    }

    pub(crate) fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Run `f` against the live engine under the handle lock.
    ///
    /// Every native call goes through here. A released handle fails with
    /// `HandleMissing` before `f` runs.
    pub(crate) fn with_engine<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Surface, *mut Tox) -> Result<R, ToxError>,
    ) -> Result<R, ToxError> {
        let guard = self.engine.lock();
        let engine = guard
            .as_ref()
            .ok_or_else(|| ToxError::handle_missing(operation))?;
        f(&self.surface, engine.ptr.as_ptr())
    }

    pub(crate) fn is_released(&self) -> bool {
        self.engine.lock().is_none()
    }

    /// Events decoded by trampolines but not yet published.
    pub(crate) fn pending_events(&self) -> usize {
        self.engine
            .lock()
            .as_ref()
            .map_or(0, |e| e.registry.pending_len())
    }

    pub(crate) fn trampoline_stats(&self) -> Result<Vec<SlotStats>, ToxError> {
        let guard = self.engine.lock();
        let engine = guard
            .as_ref()
            .ok_or_else(|| ToxError::handle_missing("trampoline_stats"))?;
        Ok(engine.registry.stats())
    }

    /// One tick: run the engine, then publish what its callbacks produced.
    ///
    /// The engine lock is released before publishing, so subscribers may
    /// call back into the handle. A tick requested while this thread is
    /// already publishing this handle's events is skipped and its work
    /// picked up next time. Other handles tick normally.
    pub(crate) fn iterate(&self) -> Result<Tick, ToxError> {
        if DISPATCHING.with(|d| d.borrow().contains(&self.id)) {
            let next_interval = self.iteration_interval()?;
            tracing::debug!(handle = self.id, "nested tick skipped");
            return Ok(Tick {
                published: 0,
                next_interval,
                skipped: true,
            });
        }

        let (events, interval_ms) = {
            let guard = self.engine.lock();
            let engine = guard
                .as_ref()
                .ok_or_else(|| ToxError::handle_missing("iterate"))?;
            let tox = engine.ptr.as_ptr();
            // SAFETY: tox is live while the guard is held; the registry
            // pointer outlives the call.
            unsafe {
                (self.surface.tox_iterate)(tox, engine.registry.user_data());
                let interval = (self.surface.tox_iteration_interval)(tox);
                (engine.registry.drain(), interval)
            }
        };

        let published = events.len();
        if published > 0 {
            let _dispatch = DispatchGuard::enter(self.id);
            for event in &events {
                self.bus.publish(event);
            }
        }
        Ok(Tick {
            published,
            next_interval: Duration::from_millis(u64::from(interval_ms)),
            skipped: false,
        })
    }

    /// Kill the engine. Returns `false` if it was already released.
    ///
    /// The registry is dropped only after `tox_kill` returns, since the
    /// engine holds pointers into it until then.
    pub(crate) fn release(&self) -> bool {
        crate::pump::stop(self);
        let Some(engine) = self.engine.lock().take() else {
            return false;
        };
        let dropped = engine.registry.pending_len();
        // SAFETY: the engine was taken out of the mutex, so nobody else can reach it.
        unsafe { (self.surface.tox_kill)(engine.ptr.as_ptr()) };
        drop(engine.registry);
        self.bus.clear();
        tracing::debug!(handle = self.id, dropped_events = dropped, "engine instance released");
        true
    }
}

impl Drop for ToxCore {
    fn drop(&mut self) {
        self.release();
    }
}

struct DispatchGuard(u64);

impl DispatchGuard {
    fn enter(handle: u64) -> Self {
        DISPATCHING.with(|d| d.borrow_mut().push(handle));
        DispatchGuard(handle)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|d| {
            let mut d = d.borrow_mut();
            if let Some(pos) = d.iter().rposition(|h| *h == self.0) {
                d.remove(pos);
            }
        });
    }
}
