//! Event adaptation tests: callbacks injected into the loopback engine and
//! observed through subscribers.
//!
//! Tests cover:
//! - Ordering of events within one tick
//! - Rejected callbacks counted per slot and never published
//! - Channel filtering, unsubscribe, stream receivers
//! - Subscriber panics contained
//! - Ticks requested from inside a subscriber skipped, for the same handle only
//! - Subscriptions refused after release
//! - JSON form of events

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use toxbind_core::event::{FriendMessage, GroupInvite};
use toxbind_core::surface::types::{ConnectionStatus, GroupType, MessageType};
use toxbind_core::{Channel, Event, Slot};
use toxbind_loopback::{Callback, inject};

use common::{tick, tox};

fn key(tox: &toxbind_core::Tox) -> [u8; 32] {
    tox.public_key_sync().unwrap().0
}

#[test]
fn injected_events_arrive_in_order() {
    let tox = tox();
    let mut rx = tox.all_events();
    for id in 0..50 {
        assert!(inject(&key(&tox), Callback::FriendReadReceipt { friend: 3, message_id: id }));
    }

    let events = tick(&tox, &mut rx);
    let ids: Vec<u32> = events
        .iter()
        .map(|e| match e {
            Event::FriendReadReceipt { message_id, .. } => *message_id,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(ids, (0..50).collect::<Vec<_>>());
    assert_eq!(tox.pending_events(), 0);
}

#[test]
fn tick_reports_published_count() {
    let tox = tox();
    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: true });
    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: false });
    let tick = tox.iterate_sync().unwrap();
    assert_eq!(tick.published, 2);
    assert_eq!(tox.iterate_sync().unwrap().published, 0);
}

#[test]
fn unknown_discriminant_is_rejected_and_counted() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::SelfConnectionStatus { status: 9 });
    inject(&key(&tox), Callback::SelfConnectionStatus { status: 1 });
    inject(&key(&tox), Callback::FriendMessage { friend: 0, kind: 7, message: b"?".to_vec() });

    let events = tick(&tox, &mut rx);
    assert_eq!(
        events,
        vec![Event::SelfConnectionStatus {
            status: ConnectionStatus::Tcp
        }]
    );

    let stats = tox.trampoline_stats().unwrap();
    assert_eq!(stats.len(), Slot::COUNT);
    let connection = stats.iter().find(|s| s.slot == Slot::SelfConnectionStatus).unwrap();
    assert_eq!((connection.delivered, connection.rejected), (1, 1));
    let message = stats.iter().find(|s| s.slot == Slot::FriendMessage).unwrap();
    assert_eq!((message.delivered, message.rejected), (0, 1));
}

#[test]
fn packet_on_the_wrong_family_is_rejected() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::LossyPacket { friend: 0, data: vec![170, 1] });
    inject(&key(&tox), Callback::LosslessPacket { friend: 0, data: vec![] });
    inject(&key(&tox), Callback::LossyPacket { friend: 0, data: vec![210, 1] });

    let events = tick(&tox, &mut rx);
    assert_eq!(events.len(), 1);
    let Event::CustomPacket(packet) = &events[0] else {
        panic!("expected a packet, got {:?}", events[0]);
    };
    assert!(packet.is_lossy());
    assert_eq!(packet.packet_id(), Some(210));

    let stats = tox.trampoline_stats().unwrap();
    let rejected: u64 = stats.iter().map(|s| s.rejected).sum();
    assert_eq!(rejected, 2);
}

#[test]
fn negative_legacy_index_is_rejected() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::GroupMessage { group: -1, peer: 0, message: b"x".to_vec() });
    inject(&key(&tox), Callback::GroupTitle { group: 2, peer: 1, title: b"topic".to_vec() });

    let events = tick(&tox, &mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel(), Channel::GroupTitle);
}

#[test]
fn invalid_utf8_is_replaced_not_rejected() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::FriendName { friend: 1, name: vec![b'a', 0xFF, b'b'] });
    let events = tick(&tox, &mut rx);
    assert_eq!(
        events,
        vec![Event::FriendName {
            friend: 1,
            name: "a\u{FFFD}b".to_string()
        }]
    );
}

#[test]
fn subscribers_only_see_their_channel() {
    let tox = tox();
    let typing = Arc::new(AtomicUsize::new(0));
    let everything = Arc::new(AtomicUsize::new(0));
    {
        let typing = Arc::clone(&typing);
        tox.subscribe(Channel::FriendTyping, move |_| {
            typing.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let everything = Arc::clone(&everything);
        tox.subscribe_all(move |_| {
            everything.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: true });
    inject(&key(&tox), Callback::FriendStatus { friend: 0, status: 2 });
    tox.iterate_sync().unwrap();

    assert_eq!(typing.load(Ordering::SeqCst), 1);
    assert_eq!(everything.load(Ordering::SeqCst), 2);
}

#[test]
fn unsubscribed_handler_is_not_called() {
    let tox = tox();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let id = tox
        .subscribe(Channel::ReadReceipt, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(tox.unsubscribe(id));
    assert!(!tox.unsubscribe(id));

    inject(&key(&tox), Callback::FriendReadReceipt { friend: 0, message_id: 1 });
    tox.iterate_sync().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_subscriber_does_not_stop_the_others() {
    let tox = tox();
    let calls = Arc::new(AtomicUsize::new(0));
    tox.subscribe(Channel::ReadReceipt, |_| panic!("subscriber bug")).unwrap();
    let counted = Arc::clone(&calls);
    tox.subscribe(Channel::ReadReceipt, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    inject(&key(&tox), Callback::FriendReadReceipt { friend: 0, message_id: 1 });
    inject(&key(&tox), Callback::FriendReadReceipt { friend: 0, message_id: 2 });
    let tick = tox.iterate_sync().unwrap();
    assert_eq!(tick.published, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!tox.is_released());
}

#[test]
fn tick_from_inside_a_subscriber_is_skipped() {
    let tox = Arc::new(tox());
    let skipped = Arc::new(AtomicBool::new(false));
    {
        let weak = Arc::downgrade(&tox);
        let skipped = Arc::clone(&skipped);
        tox.subscribe(Channel::FriendTyping, move |_| {
            if let Some(tox) = weak.upgrade() {
                let nested = tox.iterate_sync().unwrap();
                skipped.store(nested.skipped, Ordering::SeqCst);
            }
        })
        .unwrap();
    }
    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: true });
    let outer = tox.iterate_sync().unwrap();
    assert!(!outer.skipped);
    assert!(skipped.load(Ordering::SeqCst));
}

#[test]
fn another_handle_ticks_normally_from_a_subscriber() {
    let a = tox();
    let b = Arc::new(tox());
    let published = Arc::new(AtomicUsize::new(usize::MAX));
    let skipped = Arc::new(AtomicBool::new(true));
    {
        let b = Arc::clone(&b);
        let published = Arc::clone(&published);
        let skipped = Arc::clone(&skipped);
        a.subscribe(Channel::FriendTyping, move |_| {
            let tick = b.iterate_sync().unwrap();
            published.store(tick.published, Ordering::SeqCst);
            skipped.store(tick.skipped, Ordering::SeqCst);
        })
        .unwrap();
    }
    let mut b_rx = b.events(Channel::ReadReceipt);
    inject(&key(&b), Callback::FriendReadReceipt { friend: 0, message_id: 5 });
    inject(&key(&a), Callback::FriendTyping { friend: 0, typing: true });
    a.iterate_sync().unwrap();

    assert!(!skipped.load(Ordering::SeqCst));
    assert_eq!(published.load(Ordering::SeqCst), 1);
    assert_eq!(
        b_rx.try_recv().unwrap(),
        Event::FriendReadReceipt {
            friend: 0,
            message_id: 5
        }
    );
}

#[test]
fn subscriber_may_call_back_into_the_handle() {
    let tox = Arc::new(tox());
    let seen = Arc::new(parking_lot::Mutex::new(None));
    {
        let weak = Arc::downgrade(&tox);
        let seen = Arc::clone(&seen);
        tox.subscribe(Channel::FriendName, move |_| {
            if let Some(tox) = weak.upgrade() {
                *seen.lock() = Some(tox.name_sync().unwrap());
            }
        })
        .unwrap();
    }
    tox.set_name_sync("self".to_string()).unwrap();
    inject(&key(&tox), Callback::FriendName { friend: 0, name: b"peer".to_vec() });
    tox.iterate_sync().unwrap();
    assert_eq!(seen.lock().as_deref(), Some("self"));
}

#[test]
fn channel_stream_ends_on_release() {
    let tox = tox();
    let mut rx = tox.events(Channel::FriendMessage);
    inject(
        &key(&tox),
        Callback::FriendMessage { friend: 4, kind: 1, message: b"waves".to_vec() },
    );
    inject(&key(&tox), Callback::FriendTyping { friend: 4, typing: true });
    tox.iterate_sync().unwrap();

    assert_eq!(
        rx.try_recv().unwrap(),
        Event::FriendMessage(FriendMessage {
            friend: 4,
            kind: MessageType::Action,
            text: "waves".to_string(),
        })
    );
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    tox.release();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    assert_eq!(tox.subscriber_count(), 0);
}

#[test]
fn subscribing_after_release_is_handle_missing() {
    let tox = tox();
    tox.release();

    let err = tox.subscribe(Channel::FriendMessage, |_| {}).unwrap_err();
    assert_eq!(err.operation, "subscribe");
    assert!(err.is_handle_missing());
    assert!(tox.subscribe_all(|_| {}).unwrap_err().is_handle_missing());

    let mut rx = tox.events(Channel::FriendMessage);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    let mut rx = tox.all_events();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    assert_eq!(tox.subscriber_count(), 0);
}

#[tokio::test]
async fn stream_after_release_ends_instead_of_hanging() {
    let tox = tox();
    tox.release();
    let mut rx = tox.all_events();
    assert_eq!(rx.recv().await, None);
}

#[test]
fn dropped_receivers_are_not_kept() {
    let tox = tox();
    for _ in 0..100 {
        drop(tox.events(Channel::FriendTyping));
    }
    assert_eq!(tox.subscriber_count(), 0);

    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: true });
    inject(&key(&tox), Callback::FriendTyping { friend: 0, typing: false });
    assert_eq!(tox.iterate_sync().unwrap().published, 2);
    assert_eq!(tox.subscriber_count(), 0);

    let mut live = tox.events(Channel::FriendTyping);
    assert_eq!(tox.subscriber_count(), 1);
    inject(&key(&tox), Callback::FriendTyping { friend: 1, typing: true });
    tox.iterate_sync().unwrap();
    assert!(live.try_recv().is_ok());
}

#[test]
fn unknown_group_type_is_rejected() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::GroupInvite { friend: 0, kind: 77, cookie: vec![1] });
    inject(&key(&tox), Callback::GroupInvite { friend: 0, kind: 1, cookie: vec![2] });

    let events = tick(&tox, &mut rx);
    assert_eq!(
        events,
        vec![Event::GroupInvite(GroupInvite {
            friend: 0,
            group_type: GroupType::Av,
            data: vec![2],
        })]
    );
    let stats = tox.trampoline_stats().unwrap();
    let invites = stats.iter().find(|s| s.slot == Slot::GroupInvite).unwrap();
    assert_eq!((invites.delivered, invites.rejected), (1, 1));
}

#[test]
fn events_serialise_with_type_tag() {
    let tox = tox();
    let mut rx = tox.all_events();
    inject(&key(&tox), Callback::FriendReadReceipt { friend: 2, message_id: 9 });
    let events = tick(&tox, &mut rx);
    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "type": "friend_read_receipt",
            "data": { "friend": 2, "message_id": 9 }
        })
    );
}

#[test]
fn inject_fails_for_released_handle() {
    let tox = tox();
    let public_key = key(&tox);
    tox.release();
    assert!(!inject(&public_key, Callback::SelfConnectionStatus { status: 1 }));
}
