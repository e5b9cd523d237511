//! Shared fixtures: every handle runs on the in-process loopback engine.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use toxbind_core::{Event, Options, PublicKey, Surface, SymbolTable, Tox};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn loopback_table() -> SymbolTable {
    SymbolTable::from_iter(toxbind_loopback::symbols())
}

pub fn surface() -> Arc<Surface> {
    init_tracing();
    Surface::from_source(&loopback_table()).unwrap()
}

pub fn tox() -> Tox {
    Tox::new(surface(), &Options::default()).unwrap()
}

/// Bring a handle online. The loopback accepts any well-formed node.
pub fn online(tox: &Tox) {
    tox.bootstrap_sync("127.0.0.1".to_string(), 33445, PublicKey([0x11; 32]))
        .unwrap();
}

/// Run one tick and return everything it published, in order.
pub fn tick(tox: &Tox, rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    tox.iterate_sync().unwrap();
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Two online handles that are friends with each other, friend number 0 on
/// both sides, with their event streams already drained.
pub struct Pair {
    pub alice: Tox,
    pub bob: Tox,
    pub alice_rx: UnboundedReceiver<Event>,
    pub bob_rx: UnboundedReceiver<Event>,
}

impl Pair {
    pub fn new() -> Self {
        let alice = tox();
        let bob = tox();
        let mut alice_rx = alice.all_events();
        let mut bob_rx = bob.all_events();
        online(&alice);
        online(&bob);

        let address = bob.address_sync().unwrap();
        assert_eq!(alice.friend_add_sync(address, "hi bob".to_string()).unwrap(), 0);
        let alice_key = alice.public_key_sync().unwrap();
        assert_eq!(bob.friend_add_norequest_sync(alice_key).unwrap(), 0);

        tick(&alice, &mut alice_rx);
        tick(&bob, &mut bob_rx);
        Self {
            alice,
            bob,
            alice_rx,
            bob_rx,
        }
    }

    pub fn alice_tick(&mut self) -> Vec<Event> {
        tick(&self.alice, &mut self.alice_rx)
    }

    pub fn bob_tick(&mut self) -> Vec<Event> {
        tick(&self.bob, &mut self.bob_rx)
    }
}
