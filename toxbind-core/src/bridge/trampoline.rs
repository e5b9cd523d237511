//! Native callback trampolines.
//!
//! Each engine callback slot gets one `extern "C"` function. The trampoline
//! copies every buffer it was handed, decodes the arguments into an
//! [`Event`] and appends it to the owning handle's [`Registry`]. Nothing is
//! published from inside the engine call: the core drains the registry after
//! `tox_iterate` returns.
//!
//! A trampoline never unwinds into the engine. Decode failures and panics are
//! counted, logged and dropped.

use std::ffi::{c_int, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::event::{DecodeError, Event};
use crate::keys::PublicKey;
use crate::surface::Surface;
use crate::surface::types::{PUBLIC_KEY_SIZE, PacketKind, Tox};

// ─── Slots ───────────────────────────────────────────────────────────

/// One native callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    SelfConnectionStatus,
    FriendName,
    FriendStatusMessage,
    FriendStatus,
    FriendConnectionStatus,
    FriendTyping,
    FriendReadReceipt,
    FriendRequest,
    FriendMessage,
    FileRecvControl,
    FileChunkRequest,
    FileRecv,
    FileRecvChunk,
    FriendLossyPacket,
    FriendLosslessPacket,
    GroupInvite,
    GroupMessage,
    GroupAction,
    GroupTitle,
    GroupNamelistChange,
}

impl Slot {
    pub const COUNT: usize = 20;

    pub const ALL: [Slot; Self::COUNT] = [
        Slot::SelfConnectionStatus,
        Slot::FriendName,
        Slot::FriendStatusMessage,
        Slot::FriendStatus,
        Slot::FriendConnectionStatus,
        Slot::FriendTyping,
        Slot::FriendReadReceipt,
        Slot::FriendRequest,
        Slot::FriendMessage,
        Slot::FileRecvControl,
        Slot::FileChunkRequest,
        Slot::FileRecv,
        Slot::FileRecvChunk,
        Slot::FriendLossyPacket,
        Slot::FriendLosslessPacket,
        Slot::GroupInvite,
        Slot::GroupMessage,
        Slot::GroupAction,
        Slot::GroupTitle,
        Slot::GroupNamelistChange,
    ];

    /// Registration function for this slot.
    pub fn native_name(self) -> &'static str {
        match self {
            Slot::SelfConnectionStatus => "tox_callback_self_connection_status",
            Slot::FriendName => "tox_callback_friend_name",
            Slot::FriendStatusMessage => "tox_callback_friend_status_message",
            Slot::FriendStatus => "tox_callback_friend_status",
            Slot::FriendConnectionStatus => "tox_callback_friend_connection_status",
            Slot::FriendTyping => "tox_callback_friend_typing",
            Slot::FriendReadReceipt => "tox_callback_friend_read_receipt",
            Slot::FriendRequest => "tox_callback_friend_request",
            Slot::FriendMessage => "tox_callback_friend_message",
            Slot::FileRecvControl => "tox_callback_file_recv_control",
            Slot::FileChunkRequest => "tox_callback_file_chunk_request",
            Slot::FileRecv => "tox_callback_file_recv",
            Slot::FileRecvChunk => "tox_callback_file_recv_chunk",
            Slot::FriendLossyPacket => "tox_callback_friend_lossy_packet",
            Slot::FriendLosslessPacket => "tox_callback_friend_lossless_packet",
            Slot::GroupInvite => "tox_callback_group_invite",
            Slot::GroupMessage => "tox_callback_group_message",
            Slot::GroupAction => "tox_callback_group_action",
            Slot::GroupTitle => "tox_callback_group_title",
            Slot::GroupNamelistChange => "tox_callback_group_namelist_change",
        }
    }
}

/// Per-slot delivery counters, as reported by [`crate::Tox::trampoline_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub slot: Slot,
    pub delivered: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct SlotCounters {
    delivered: AtomicU64,
    rejected: AtomicU64,
}

// ─── Registry ────────────────────────────────────────────────────────

/// Per-handle sink that trampolines write into.
///
/// The engine holds a raw pointer to it (the `user_data` argument), so it
/// must outlive the engine instance. The core drops it only after `tox_kill`.
pub(crate) struct Registry {
    handle_id: u64,
    counters: [SlotCounters; Slot::COUNT],
    pending: Mutex<Vec<Event>>,
}

impl Registry {
    pub(crate) fn new(handle_id: u64) -> Self {
        Self {
            handle_id,
            counters: Default::default(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Pointer handed to the engine as callback user data.
    pub(crate) fn user_data(self: &Arc<Self>) -> *mut c_void {
        Arc::as_ptr(self) as *mut c_void
    }

    fn record(&self, slot: Slot, result: Result<Event, DecodeError>) {
        let counters = &self.counters[slot as usize];
        match result {
            Ok(event) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                self.pending.lock().push(event);
            }
            Err(error) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    handle = self.handle_id,
                    callback = slot.native_name(),
                    %error,
                    "dropping undecodable engine callback"
                );
            }
        }
    }

    /// Take everything queued so far, oldest first.
    pub(crate) fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub(crate) fn stats(&self) -> Vec<SlotStats> {
        Slot::ALL
            .iter()
            .map(|&slot| {
                let c = &self.counters[slot as usize];
                SlotStats {
                    slot,
                    delivered: c.delivered.load(Ordering::Relaxed),
                    rejected: c.rejected.load(Ordering::Relaxed),
                }
            })
            .collect()
    }
}

/// Register every trampoline on `tox`.
///
/// # Safety
///
/// `tox` must be a live instance created from `surface`, and `registry` must
/// stay alive until that instance has been killed.
pub(crate) unsafe fn install(surface: &Surface, tox: *mut Tox, registry: &Arc<Registry>) {
    let user_data = registry.user_data();
    unsafe {
        (surface.tox_callback_self_connection_status)(tox, Some(on_self_connection_status));
        (surface.tox_callback_friend_name)(tox, Some(on_friend_name));
        (surface.tox_callback_friend_status_message)(tox, Some(on_friend_status_message));
        (surface.tox_callback_friend_status)(tox, Some(on_friend_status));
        (surface.tox_callback_friend_connection_status)(tox, Some(on_friend_connection_status));
        (surface.tox_callback_friend_typing)(tox, Some(on_friend_typing));
        (surface.tox_callback_friend_read_receipt)(tox, Some(on_friend_read_receipt));
        (surface.tox_callback_friend_request)(tox, Some(on_friend_request));
        (surface.tox_callback_friend_message)(tox, Some(on_friend_message));
        (surface.tox_callback_file_recv_control)(tox, Some(on_file_recv_control));
        (surface.tox_callback_file_chunk_request)(tox, Some(on_file_chunk_request));
        (surface.tox_callback_file_recv)(tox, Some(on_file_recv));
        (surface.tox_callback_file_recv_chunk)(tox, Some(on_file_recv_chunk));
        (surface.tox_callback_friend_lossy_packet)(tox, Some(on_friend_lossy_packet));
        (surface.tox_callback_friend_lossless_packet)(tox, Some(on_friend_lossless_packet));

        // Legacy group API binds user data at registration time.
        (surface.tox_callback_group_invite)(tox, Some(on_group_invite), user_data);
        (surface.tox_callback_group_message)(tox, Some(on_group_message), user_data);
        (surface.tox_callback_group_action)(tox, Some(on_group_action), user_data);
        (surface.tox_callback_group_title)(tox, Some(on_group_title), user_data);
        (surface.tox_callback_group_namelist_change)(tox, Some(on_group_namelist_change), user_data);
    }
    tracing::debug!(handle = registry.handle_id, slots = Slot::COUNT, "callbacks installed");
}

// ─── Dispatch helpers ────────────────────────────────────────────────

fn dispatch(user_data: *mut c_void, slot: Slot, decode: impl FnOnce() -> Result<Event, DecodeError>) {
    if user_data.is_null() {
        tracing::error!(callback = slot.native_name(), "callback fired without user data");
        return;
    }
    // SAFETY: user_data is always `Registry::user_data` of a registry that
    // outlives the engine instance invoking us.
    let registry = unsafe { &*(user_data as *const Registry) };
    let result = panic::catch_unwind(AssertUnwindSafe(decode)).unwrap_or(Err(DecodeError::Panicked));
    registry.record(slot, result);
}

/// Copy a borrowed engine buffer. Zero length never dereferences.
fn copy_bytes(ptr: *const u8, len: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(DecodeError::NullBuffer { field, len });
    }
    // SAFETY: the engine guarantees `len` readable bytes for the duration of the callback.
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec())
}

// ─── Trampolines ─────────────────────────────────────────────────────

unsafe extern "C" fn on_self_connection_status(_tox: *mut Tox, status: c_uint, user_data: *mut c_void) {
    dispatch(user_data, Slot::SelfConnectionStatus, || Event::self_connection_status(status));
}

unsafe extern "C" fn on_friend_name(
    _tox: *mut Tox,
    friend: u32,
    name: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendName, || {
        Event::friend_name(friend, copy_bytes(name, len, "name")?)
    });
}

unsafe extern "C" fn on_friend_status_message(
    _tox: *mut Tox,
    friend: u32,
    message: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendStatusMessage, || {
        Event::friend_status_message(friend, copy_bytes(message, len, "status_message")?)
    });
}

unsafe extern "C" fn on_friend_status(_tox: *mut Tox, friend: u32, status: c_uint, user_data: *mut c_void) {
    dispatch(user_data, Slot::FriendStatus, || Event::friend_status(friend, status));
}

unsafe extern "C" fn on_friend_connection_status(
    _tox: *mut Tox,
    friend: u32,
    status: c_uint,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendConnectionStatus, || {
        Event::friend_connection_status(friend, status)
    });
}

unsafe extern "C" fn on_friend_typing(_tox: *mut Tox, friend: u32, is_typing: bool, user_data: *mut c_void) {
    dispatch(user_data, Slot::FriendTyping, || Event::friend_typing(friend, is_typing));
}

unsafe extern "C" fn on_friend_read_receipt(_tox: *mut Tox, friend: u32, message_id: u32, user_data: *mut c_void) {
    dispatch(user_data, Slot::FriendReadReceipt, || {
        Event::friend_read_receipt(friend, message_id)
    });
}

unsafe extern "C" fn on_friend_request(
    _tox: *mut Tox,
    public_key: *const u8,
    message: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendRequest, || {
        let key = copy_bytes(public_key, PUBLIC_KEY_SIZE, "public_key")?;
        let key = PublicKey::from_slice(&key).ok_or(DecodeError::NullBuffer {
            field: "public_key",
            len: PUBLIC_KEY_SIZE,
        })?;
        Event::friend_request(key, copy_bytes(message, len, "message")?)
    });
}

unsafe extern "C" fn on_friend_message(
    _tox: *mut Tox,
    friend: u32,
    kind: c_uint,
    message: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendMessage, || {
        Event::friend_message(friend, kind, copy_bytes(message, len, "message")?)
    });
}

unsafe extern "C" fn on_file_recv_control(
    _tox: *mut Tox,
    friend: u32,
    file: u32,
    control: c_uint,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FileRecvControl, || Event::file_recv_control(friend, file, control));
}

unsafe extern "C" fn on_file_chunk_request(
    _tox: *mut Tox,
    friend: u32,
    file: u32,
    position: u64,
    length: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FileChunkRequest, || {
        Event::file_chunk_request(friend, file, position, length)
    });
}

unsafe extern "C" fn on_file_recv(
    _tox: *mut Tox,
    friend: u32,
    file: u32,
    kind: u32,
    size: u64,
    filename: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FileRecv, || {
        Event::file_recv(friend, file, kind, size, copy_bytes(filename, len, "filename")?)
    });
}

unsafe extern "C" fn on_file_recv_chunk(
    _tox: *mut Tox,
    friend: u32,
    file: u32,
    position: u64,
    data: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FileRecvChunk, || {
        Event::file_recv_chunk(friend, file, position, copy_bytes(data, len, "data")?)
    });
}

unsafe extern "C" fn on_friend_lossy_packet(
    _tox: *mut Tox,
    friend: u32,
    data: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendLossyPacket, || {
        Event::custom_packet(friend, PacketKind::Lossy, copy_bytes(data, len, "data")?)
    });
}

unsafe extern "C" fn on_friend_lossless_packet(
    _tox: *mut Tox,
    friend: u32,
    data: *const u8,
    len: usize,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::FriendLosslessPacket, || {
        Event::custom_packet(friend, PacketKind::Lossless, copy_bytes(data, len, "data")?)
    });
}

unsafe extern "C" fn on_group_invite(
    _tox: *mut Tox,
    friend: i32,
    group_type: u8,
    data: *const u8,
    len: u16,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::GroupInvite, || {
        Event::group_invite(friend, group_type, copy_bytes(data, usize::from(len), "data")?)
    });
}

unsafe extern "C" fn on_group_message(
    _tox: *mut Tox,
    group: c_int,
    peer: c_int,
    message: *const u8,
    len: u16,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::GroupMessage, || {
        Event::group_message(group, peer, copy_bytes(message, usize::from(len), "message")?, false)
    });
}

unsafe extern "C" fn on_group_action(
    _tox: *mut Tox,
    group: c_int,
    peer: c_int,
    action: *const u8,
    len: u16,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::GroupAction, || {
        Event::group_message(group, peer, copy_bytes(action, usize::from(len), "action")?, true)
    });
}

unsafe extern "C" fn on_group_title(
    _tox: *mut Tox,
    group: c_int,
    peer: c_int,
    title: *const u8,
    len: u8,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::GroupTitle, || {
        Event::group_title(group, peer, copy_bytes(title, usize::from(len), "title")?)
    });
}

unsafe extern "C" fn on_group_namelist_change(
    _tox: *mut Tox,
    group: c_int,
    peer: c_int,
    change: u8,
    user_data: *mut c_void,
) {
    dispatch(user_data, Slot::GroupNamelistChange, || {
        Event::group_namelist_change(group, peer, change)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Channel;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new(1))
    }

    fn stats_for(registry: &Registry, slot: Slot) -> SlotStats {
        registry.stats().into_iter().find(|s| s.slot == slot).unwrap()
    }

    #[test]
    fn slot_order_matches_discriminants() {
        for (i, slot) in Slot::ALL.iter().enumerate() {
            assert_eq!(*slot as usize, i);
        }
    }

    #[test]
    fn trampoline_copies_and_queues() {
        let registry = registry();
        let text = b"hello".to_vec();
        unsafe {
            on_friend_message(std::ptr::null_mut(), 2, 0, text.as_ptr(), text.len(), registry.user_data());
        }
        drop(text);

        let events = registry.drain();
        assert_eq!(events.len(), 1);
        let Event::FriendMessage(msg) = &events[0] else {
            panic!("wrong variant: {:?}", events[0]);
        };
        assert_eq!(msg.friend, 2);
        assert_eq!(msg.text, "hello");
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(stats_for(&registry, Slot::FriendMessage).delivered, 1);
    }

    #[test]
    fn null_buffer_with_length_is_rejected() {
        let registry = registry();
        unsafe {
            on_friend_name(std::ptr::null_mut(), 0, std::ptr::null(), 4, registry.user_data());
        }
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(stats_for(&registry, Slot::FriendName).rejected, 1);
    }

    #[test]
    fn null_buffer_with_zero_length_is_empty() {
        let registry = registry();
        unsafe {
            on_friend_status_message(std::ptr::null_mut(), 0, std::ptr::null(), 0, registry.user_data());
        }
        let events = registry.drain();
        assert_eq!(
            events,
            vec![Event::FriendStatusMessage {
                friend: 0,
                message: String::new()
            }]
        );
    }

    #[test]
    fn unknown_discriminant_is_counted_not_queued() {
        let registry = registry();
        unsafe {
            on_friend_status(std::ptr::null_mut(), 0, 42, registry.user_data());
        }
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(stats_for(&registry, Slot::FriendStatus).rejected, 1);
    }

    #[test]
    fn null_user_data_is_ignored() {
        unsafe {
            on_self_connection_status(std::ptr::null_mut(), 1, std::ptr::null_mut());
        }
    }

    #[test]
    fn packet_on_wrong_slot_is_rejected() {
        let registry = registry();
        let lossy = [210u8, 1, 2];
        unsafe {
            on_friend_lossless_packet(std::ptr::null_mut(), 0, lossy.as_ptr(), lossy.len(), registry.user_data());
            on_friend_lossy_packet(std::ptr::null_mut(), 0, lossy.as_ptr(), lossy.len(), registry.user_data());
        }
        let events = registry.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel(), Channel::CustomPacket);
        assert_eq!(stats_for(&registry, Slot::FriendLosslessPacket).rejected, 1);
        assert_eq!(stats_for(&registry, Slot::FriendLossyPacket).delivered, 1);
    }

    #[test]
    fn panicking_decoder_is_contained() {
        let registry = registry();
        dispatch(registry.user_data(), Slot::FriendRequest, || panic!("decoder blew up"));
        assert_eq!(stats_for(&registry, Slot::FriendRequest).rejected, 1);
    }

    #[test]
    fn events_drain_in_arrival_order() {
        let registry = registry();
        for receipt in 0..5u32 {
            unsafe {
                on_friend_read_receipt(std::ptr::null_mut(), 0, receipt, registry.user_data());
            }
        }
        let ids: Vec<u32> = registry
            .drain()
            .into_iter()
            .map(|e| match e {
                Event::FriendReadReceipt { message_id, .. } => message_id,
                other => panic!("wrong variant: {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
