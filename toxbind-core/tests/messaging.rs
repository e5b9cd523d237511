//! Two handles on the loopback network talking to each other.
//!
//! Tests cover:
//! - Friend requests, linking, profile propagation
//! - Messages and read receipts
//! - Custom packets
//! - A file transfer from offer to completion
//! - Legacy group chats

mod common;

use chrono::Utc;
use toxbind_core::error::ErrorKind;
use toxbind_core::event::{
    FileChunkRequest, FileRecv, FileRecvChunk, FileRecvControl, FriendMessage, FriendRequest, GroupInvite,
    GroupMessage, GroupNamelistChange, GroupTitle,
};
use toxbind_core::surface::types::{
    ConnectionStatus, FileControl, FileKind, GroupChange, GroupType, MessageType, PacketKind, UserStatus,
};
use toxbind_core::Event;

use common::{online, tick, tox, Pair};

#[test]
fn friend_request_then_accept_links_both_sides() {
    let alice = tox();
    let bob = tox();
    let mut alice_rx = alice.all_events();
    let mut bob_rx = bob.all_events();
    online(&alice);
    online(&bob);
    tick(&alice, &mut alice_rx);
    tick(&bob, &mut bob_rx);

    let number = alice
        .friend_add_sync(bob.address_sync().unwrap(), "hi bob".to_string())
        .unwrap();
    assert_eq!(number, 0);
    assert_eq!(alice.friend_connection_status_sync(0).unwrap(), ConnectionStatus::None);

    let alice_key = alice.public_key_sync().unwrap();
    assert_eq!(
        tick(&bob, &mut bob_rx),
        vec![Event::FriendRequest(FriendRequest {
            public_key: alice_key,
            message: "hi bob".to_string(),
        })]
    );

    assert_eq!(bob.friend_add_norequest_sync(alice_key).unwrap(), 0);
    assert_eq!(
        tick(&alice, &mut alice_rx),
        vec![Event::FriendConnectionStatus {
            friend: 0,
            status: ConnectionStatus::Udp,
        }]
    );
    let bob_events = tick(&bob, &mut bob_rx);
    assert_eq!(bob_events.len(), 1);
    assert_eq!(bob_events[0].is_connected(), Some(true));

    assert_eq!(bob.friend_by_public_key_sync(alice_key).unwrap(), 0);
    assert_eq!(alice.friend_public_key_sync(0).unwrap(), bob.public_key_sync().unwrap());
    assert_eq!(alice.friend_list_sync().unwrap(), vec![0]);
}

#[test]
fn request_with_stale_nospam_is_not_delivered() {
    let alice = tox();
    let bob = tox();
    let mut bob_rx = bob.all_events();
    online(&alice);
    online(&bob);

    let address = bob.address_sync().unwrap();
    bob.set_nospam_sync(address.nospam().wrapping_add(1)).unwrap();
    alice.friend_add_sync(address, "hello?".to_string()).unwrap();

    let events = tick(&bob, &mut bob_rx);
    assert!(events.iter().all(|e| !matches!(e, Event::FriendRequest(_))));
}

#[test]
fn friend_add_rejections_name_the_code() {
    let alice = tox();
    let err = alice
        .friend_add_sync(alice.address_sync().unwrap(), "me".to_string())
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_FRIEND_ADD",
            name: "OWN_KEY",
            ..
        }
    ));

    let bob = tox();
    let err = alice
        .friend_add_sync(bob.address_sync().unwrap(), String::new())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NativeErrorCode { name: "NO_MESSAGE", .. }));
}

#[test]
fn linked_friend_reports_state() {
    let pair = Pair::new();
    assert!(pair.alice.friend_exists_sync(0).unwrap());
    assert!(!pair.alice.friend_exists_sync(7).unwrap());
    assert_eq!(pair.alice.friend_connection_status_sync(0).unwrap(), ConnectionStatus::Udp);

    let last_online = pair.bob.friend_last_online_sync(0).unwrap();
    let age = Utc::now().signed_duration_since(last_online);
    assert!(age.num_seconds().abs() < 60, "last online {last_online}");
}

#[test]
fn message_is_delivered_then_acknowledged() {
    let mut pair = Pair::new();
    let id = pair
        .alice
        .send_message_sync(0, MessageType::Normal, "hello bob".to_string())
        .unwrap();

    assert_eq!(
        pair.bob_tick(),
        vec![Event::FriendMessage(FriendMessage {
            friend: 0,
            kind: MessageType::Normal,
            text: "hello bob".to_string(),
        })]
    );
    assert_eq!(
        pair.alice_tick(),
        vec![Event::FriendReadReceipt {
            friend: 0,
            message_id: id,
        }]
    );
}

#[tokio::test]
async fn deferred_action_message() {
    let mut pair = Pair::new();
    pair.bob
        .send_message(0, MessageType::Action, "waves".to_string())
        .await
        .unwrap();
    let events = pair.alice_tick();
    let Event::FriendMessage(message) = &events[0] else {
        panic!("expected a message, got {events:?}");
    };
    assert!(message.is_action());
    assert_eq!(message.text, "waves");
}

#[test]
fn message_to_unknown_friend_fails() {
    let pair = Pair::new();
    let err = pair
        .alice
        .send_message_sync(9, MessageType::Normal, "anyone?".to_string())
        .unwrap_err();
    assert_eq!(err.operation, "send_message");
    assert_eq!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_FRIEND_SEND_MESSAGE",
            name: "FRIEND_NOT_FOUND",
            code: 2,
        }
    );

    let err = pair
        .alice
        .send_message_sync(0, MessageType::Normal, String::new())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NativeErrorCode { name: "EMPTY", .. }));
}

#[test]
fn typing_and_profile_changes_reach_the_friend() {
    let mut pair = Pair::new();
    pair.alice.set_typing_sync(0, true).unwrap();
    pair.alice.set_name_sync("alice".to_string()).unwrap();
    pair.alice.set_status_message_sync("out to lunch".to_string()).unwrap();
    pair.alice.set_status_sync(UserStatus::Busy).unwrap();

    assert_eq!(
        pair.bob_tick(),
        vec![
            Event::FriendTyping {
                friend: 0,
                is_typing: true,
            },
            Event::FriendName {
                friend: 0,
                name: "alice".to_string(),
            },
            Event::FriendStatusMessage {
                friend: 0,
                message: "out to lunch".to_string(),
            },
            Event::FriendStatus {
                friend: 0,
                status: UserStatus::Busy,
            },
        ]
    );
    assert!(pair.bob.friend_typing_sync(0).unwrap());
    assert_eq!(pair.bob.friend_name_sync(0).unwrap(), "alice");
    assert_eq!(pair.bob.friend_status_message_sync(0).unwrap(), "out to lunch");
    assert_eq!(pair.bob.friend_status_sync(0).unwrap(), UserStatus::Busy);
}

#[test]
fn deleting_a_friend_disconnects_the_other_side() {
    let mut pair = Pair::new();
    pair.alice.friend_delete_sync(0).unwrap();
    assert!(pair.alice.friend_list_sync().unwrap().is_empty());
    assert_eq!(
        pair.bob_tick(),
        vec![Event::FriendConnectionStatus {
            friend: 0,
            status: ConnectionStatus::None,
        }]
    );
    let err = pair.alice.friend_delete_sync(0).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NativeErrorCode { name: "FRIEND_NOT_FOUND", .. }));
}

#[test]
fn custom_packets_keep_their_family() {
    let mut pair = Pair::new();
    pair.alice.send_lossless_packet_sync(0, vec![170, 1, 2, 3]).unwrap();
    pair.alice.send_lossy_packet_sync(0, vec![201, 9]).unwrap();

    let events = pair.bob_tick();
    let kinds: Vec<(PacketKind, Vec<u8>)> = events
        .into_iter()
        .map(|e| match e {
            Event::CustomPacket(p) => (p.kind, p.data),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            (PacketKind::Lossless, vec![170, 1, 2, 3]),
            (PacketKind::Lossy, vec![201, 9]),
        ]
    );

    let err = pair.alice.send_lossy_packet_sync(0, vec![170, 1]).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_FRIEND_CUSTOM_PACKET",
            name: "INVALID",
            code: 4,
        }
    );
}

#[test]
fn file_transfer_runs_to_completion() {
    let mut pair = Pair::new();
    let file = pair
        .alice
        .file_send_sync(0, FileKind::Data, 5, None, "note.txt".to_string())
        .unwrap();
    assert_eq!(file, 0);

    let events = pair.bob_tick();
    let incoming = 1 << 16;
    assert_eq!(
        events,
        vec![Event::FileRecv(FileRecv {
            friend: 0,
            file: incoming,
            kind: FileKind::Data,
            size: 5,
            filename: "note.txt".to_string(),
        })]
    );
    assert_eq!(
        pair.alice.file_id_sync(0, file).unwrap(),
        pair.bob.file_id_sync(0, incoming).unwrap()
    );

    // The sender cannot start the transfer on its own.
    let err = pair.alice.file_control_sync(0, file, FileControl::Resume).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NativeErrorCode { name: "DENIED", .. }));

    pair.bob.file_control_sync(0, incoming, FileControl::Resume).unwrap();
    assert_eq!(
        pair.alice_tick(),
        vec![
            Event::FileRecvControl(FileRecvControl {
                friend: 0,
                file,
                control: FileControl::Resume,
            }),
            Event::FileChunkRequest(FileChunkRequest {
                friend: 0,
                file,
                position: 0,
                length: 5,
            }),
        ]
    );

    pair.alice.file_send_chunk_sync(0, file, 0, b"hello".to_vec()).unwrap();
    let events = pair.bob_tick();
    assert_eq!(
        events,
        vec![
            Event::FileRecvChunk(FileRecvChunk {
                friend: 0,
                file: incoming,
                position: 0,
                data: b"hello".to_vec(),
            }),
            Event::FileRecvChunk(FileRecvChunk {
                friend: 0,
                file: incoming,
                position: 5,
                data: Vec::new(),
            }),
        ]
    );
    let Event::FileRecvChunk(last) = &events[1] else {
        unreachable!();
    };
    assert!(last.is_final_chunk());

    let events = pair.alice_tick();
    let Event::FileChunkRequest(request) = &events[0] else {
        panic!("expected a chunk request, got {events:?}");
    };
    assert!(request.is_complete());

    let err = pair.bob.file_id_sync(0, incoming).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_FILE_GET",
            name: "NOT_FOUND",
            ..
        }
    ));
}

#[test]
fn cancelled_transfer_notifies_the_sender() {
    let mut pair = Pair::new();
    let file = pair
        .alice
        .file_send_sync(0, FileKind::Avatar, 4096, None, "avatar.png".to_string())
        .unwrap();
    let events = pair.bob_tick();
    let Event::FileRecv(offer) = &events[0] else {
        panic!("expected an offer, got {events:?}");
    };
    assert!(offer.is_avatar());

    pair.bob.file_control_sync(0, offer.file, FileControl::Cancel).unwrap();
    let events = pair.alice_tick();
    let Event::FileRecvControl(control) = &events[0] else {
        panic!("expected a control event, got {events:?}");
    };
    assert!(control.is_cancel());
    assert_eq!(control.file, file);
}

#[test]
fn group_chat_round() {
    let mut pair = Pair::new();
    pair.alice.set_name_sync("alice".to_string()).unwrap();
    pair.bob.set_name_sync("bob".to_string()).unwrap();

    let group = pair.alice.group_new_sync().unwrap();
    assert_eq!(group, 0);
    pair.alice.group_invite_sync(0, group).unwrap();

    let invite = pair
        .bob_tick()
        .into_iter()
        .find_map(|e| match e {
            Event::GroupInvite(invite) => Some(invite),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        invite,
        GroupInvite {
            friend: 0,
            group_type: GroupType::Text,
            data: invite.data.clone(),
        }
    );

    let joined = pair.bob.group_join_sync(0, invite.data).unwrap();
    assert_eq!(joined, 0);
    let events = pair.alice_tick();
    assert!(events.contains(&Event::GroupNamelistChange(GroupNamelistChange {
        group,
        peer: 1,
        change: GroupChange::PeerAdd,
    })));
    pair.bob_tick();

    assert_eq!(pair.alice.group_peer_count_sync(group).unwrap(), 2);
    assert_eq!(pair.bob.group_peer_count_sync(joined).unwrap(), 2);
    assert_eq!(pair.bob.group_peer_names_sync(joined).unwrap(), vec!["alice", "bob"]);
    assert_eq!(pair.bob.group_peer_name_sync(joined, 0).unwrap(), "alice");
    assert!(pair.bob.group_peer_is_ours_sync(joined, 1).unwrap());
    assert!(!pair.bob.group_peer_is_ours_sync(joined, 0).unwrap());
    assert_eq!(
        pair.bob.group_peer_public_key_sync(joined, 0).unwrap(),
        pair.alice.public_key_sync().unwrap()
    );
    assert_eq!(pair.bob.group_type_sync(joined).unwrap(), GroupType::Text);
    assert_eq!(pair.bob.group_list_sync().unwrap(), vec![joined]);

    pair.bob.group_send_message_sync(joined, "hi all".to_string()).unwrap();
    pair.bob.group_send_action_sync(joined, "dances".to_string()).unwrap();
    assert_eq!(
        pair.alice_tick(),
        vec![
            Event::GroupMessage(GroupMessage {
                group,
                peer: 1,
                text: "hi all".to_string(),
            }),
            Event::GroupAction(GroupMessage {
                group,
                peer: 1,
                text: "dances".to_string(),
            }),
        ]
    );

    pair.alice.group_set_title_sync(group, "plans".to_string()).unwrap();
    assert_eq!(
        pair.bob_tick(),
        vec![Event::GroupTitle(GroupTitle {
            group: joined,
            peer: 0,
            title: "plans".to_string(),
        })]
    );
    assert_eq!(pair.bob.group_title_sync(joined).unwrap(), "plans");

    pair.bob.group_delete_sync(joined).unwrap();
    assert!(pair.bob.group_list_sync().unwrap().is_empty());
    assert_eq!(
        pair.alice_tick(),
        vec![Event::GroupNamelistChange(GroupNamelistChange {
            group,
            peer: 1,
            change: GroupChange::PeerDel,
        })]
    );
    assert_eq!(pair.alice.group_peer_count_sync(group).unwrap(), 1);
}

#[test]
fn legacy_group_failures_are_sentinels() {
    let pair = Pair::new();
    let err = pair.alice.group_delete_sync(3).unwrap_err();
    assert_eq!(err.operation, "group_delete");
    assert!(matches!(err.kind, ErrorKind::NonZeroReturn { .. }));

    let err = pair.alice.group_join_sync(0, vec![1, 2, 3]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NegativeReturn { code: -1 }));
}
