//! Per-handle subscriber registry.
//!
//! Handlers are plain Rust closures. Each is called once per event on the
//! channel it subscribed to, in registration order, on whichever thread
//! drove the tick (the pump thread or a caller of `iterate`).

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::event::{Channel, Event};

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub(crate) type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Handler(Handler),
    /// Stream receiver; pruned once the receiving end is gone.
    Forward(mpsc::UnboundedSender<Event>),
}

impl Sink {
    fn is_closed(&self) -> bool {
        match self {
            Sink::Handler(_) => false,
            Sink::Forward(tx) => tx.is_closed(),
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every channel.
    channel: Option<Channel>,
    sink: Sink,
}

pub(crate) struct EventBus {
    handle_id: u64,
    next_id: AtomicU64,
    /// Set by `clear`; no subscription is accepted afterwards.
    closed: AtomicBool,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub(crate) fn new(handle_id: u64) -> Self {
        Self {
            handle_id,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Returns `None` once the bus has been cleared.
    fn add(&self, channel: Option<Channel>, sink: Sink) -> Option<SubscriptionId> {
        let mut subs = self.subscriptions.write();
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        subs.retain(|s| !s.sink.is_closed());
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscription { id, channel, sink });
        tracing::debug!(handle = self.handle_id, ?channel, "subscriber added");
        Some(id)
    }

    pub(crate) fn subscribe(&self, channel: Option<Channel>, handler: Handler) -> Option<SubscriptionId> {
        self.add(channel, Sink::Handler(handler))
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Forward a channel into a tokio receiver. The forwarder goes away
    /// with the receiver. On a cleared bus the receiver is already closed.
    pub(crate) fn channel_receiver(&self, channel: Option<Channel>) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        // On a cleared bus `tx` is dropped here, which closes `rx`.
        self.add(channel, Sink::Forward(tx));
        rx
    }

    /// Live subscriptions. Forwarders whose receiver was dropped don't count.
    pub(crate) fn len(&self) -> usize {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| !s.sink.is_closed())
            .count()
    }

    /// Drop every subscription and refuse new ones. Stream receivers end.
    pub(crate) fn clear(&self) {
        let mut subs = self.subscriptions.write();
        self.closed.store(true, Ordering::Release);
        subs.clear();
    }

    /// Deliver one event to every matching handler.
    ///
    /// The list is snapshotted first, so handlers may subscribe or
    /// unsubscribe without deadlocking. A panicking handler is logged and
    /// skipped; the rest still run. Forwarders that fail to send are removed.
    pub(crate) fn publish(&self, event: &Event) {
        let channel = event.channel();
        let sinks: Vec<(SubscriptionId, Sink)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.channel.is_none_or(|c| c == channel))
            .map(|s| (s.id, s.sink.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Handler(handler) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                        tracing::warn!(
                            handle = self.handle_id,
                            subscription = id.0,
                            channel = channel.name(),
                            "event handler panicked"
                        );
                    }
                }
                Sink::Forward(tx) => {
                    if tx.send(event.clone()).is_err() {
                        dead.push(id);
                    }
                }
            }
        }

        if !dead.is_empty() {
            self.subscriptions.write().retain(|s| !dead.contains(&s.id));
            tracing::debug!(handle = self.handle_id, removed = dead.len(), "dropped closed receivers");
        }
    }
}
