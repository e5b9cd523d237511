//! Background iteration pump.
//!
//! One named thread per running handle. It ticks the core, then waits on a
//! stop channel for either the fixed interval or the engine's suggestion.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::core::ToxCore;

/// Present in `ToxCore::pump` only while the pump runs.
pub(crate) struct PumpState {
    interval: Option<Duration>,
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl PumpState {
    fn thread_id(&self) -> ThreadId {
        self.thread.thread().id()
    }
}

/// Start pumping `core`. Returns `false` if a pump is already running or
/// the thread could not be spawned.
pub(crate) fn start(core: &Arc<ToxCore>, interval: Option<Duration>) -> bool {
    let mut slot = core.pump.lock();
    if slot.is_some() {
        return false;
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    let weak = Arc::downgrade(core);
    let id = core.id;
    let spawned = thread::Builder::new()
        .name(format!("toxbind-pump-{id}"))
        .spawn(move || run(weak, interval, stop_rx));
    let thread = match spawned {
        Ok(thread) => thread,
        Err(error) => {
            tracing::error!(handle = id, %error, "failed to spawn pump thread");
            return false;
        }
    };

    *slot = Some(PumpState {
        interval,
        stop_tx,
        thread,
    });
    tracing::debug!(handle = id, ?interval, "pump started");
    true
}

/// Stop the pump if it runs. Returns whether one was running.
///
/// Joins the thread unless called from the pump thread itself, in which case
/// the loop exits after the current tick.
pub(crate) fn stop(core: &ToxCore) -> bool {
    let Some(state) = core.pump.lock().take() else {
        return false;
    };
    let _ = state.stop_tx.send(());
    if state.thread_id() == thread::current().id() {
        tracing::debug!(handle = core.id, "pump stop requested from pump thread");
        return true;
    }
    if state.thread.join().is_err() {
        tracing::error!(handle = core.id, "pump thread panicked");
    }
    tracing::debug!(handle = core.id, "pump stopped");
    true
}

pub(crate) fn is_running(core: &ToxCore) -> bool {
    core.pump.lock().is_some()
}

/// Fixed interval of the running pump, if it was started with one.
pub(crate) fn fixed_interval(core: &ToxCore) -> Option<Duration> {
    core.pump.lock().as_ref().and_then(|s| s.interval)
}

fn run(core: Weak<ToxCore>, interval: Option<Duration>, stop_rx: mpsc::Receiver<()>) {
    loop {
        let wait = {
            let Some(core) = core.upgrade() else {
                return;
            };
            match core.iterate() {
                Ok(tick) => interval.unwrap_or(tick.next_interval),
                Err(error) => {
                    tracing::error!(handle = core.id, %error, "pump stopping after failed tick");
                    core.pump.lock().take();
                    return;
                }
            }
        };

        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
