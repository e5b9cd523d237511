//! Exported `tox.h` / `tox_old.h` entry points.
//!
//! Every function resolves its instance, takes the network lock for the
//! duration of the call and reports failures exactly the way libtoxcore
//! does: an error out-parameter for the current API, sentinel returns for
//! the legacy group API.
#![allow(clippy::missing_safety_doc)]

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::ptr;

use sha2::{Digest, Sha256};

use crate::code::{self, OK};
use crate::network::{
    ADDRESS_SIZE, Callback, Code, Friend, ITERATION_INTERVAL_MS, Identity, MAX_NAME_LENGTH, NETWORK,
    Node, NodeConfig,
};
use crate::savedata::{self, LoadFailure};

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 11;

const PROXY_TYPE_NONE: c_uint = 0;
const PROXY_TYPE_SOCKS5: c_uint = 2;
const SAVEDATA_TYPE_NONE: c_uint = 0;
const SAVEDATA_TYPE_TOX_SAVE: c_uint = 1;
const SAVEDATA_TYPE_SECRET_KEY: c_uint = 2;

/// An instance as seen from C. Only the network id lives here.
pub struct Tox {
    id: u64,
}

/// Mirror of `struct Tox_Options`.
#[repr(C)]
pub struct ToxOptions {
    pub ipv6_enabled: bool,
    pub udp_enabled: bool,
    pub local_discovery_enabled: bool,
    pub proxy_type: c_uint,
    pub proxy_host: *const c_char,
    pub proxy_port: u16,
    pub start_port: u16,
    pub end_port: u16,
    pub tcp_port: u16,
    pub hole_punching_enabled: bool,
    pub savedata_type: c_uint,
    pub savedata_data: *const u8,
    pub savedata_length: usize,
}

// ─── Callback signatures ─────────────────────────────────────────────

pub type SelfConnectionStatusCb = unsafe extern "C" fn(*mut Tox, c_uint, *mut c_void);
pub type FriendBytesCb = unsafe extern "C" fn(*mut Tox, u32, *const u8, usize, *mut c_void);
pub type FriendEnumCb = unsafe extern "C" fn(*mut Tox, u32, c_uint, *mut c_void);
pub type FriendTypingCb = unsafe extern "C" fn(*mut Tox, u32, bool, *mut c_void);
pub type FriendReadReceiptCb = unsafe extern "C" fn(*mut Tox, u32, u32, *mut c_void);
pub type FriendRequestCb = unsafe extern "C" fn(*mut Tox, *const u8, *const u8, usize, *mut c_void);
pub type FriendMessageCb = unsafe extern "C" fn(*mut Tox, u32, c_uint, *const u8, usize, *mut c_void);
pub type FileRecvControlCb = unsafe extern "C" fn(*mut Tox, u32, u32, c_uint, *mut c_void);
pub type FileChunkRequestCb = unsafe extern "C" fn(*mut Tox, u32, u32, u64, usize, *mut c_void);
pub type FileRecvCb = unsafe extern "C" fn(*mut Tox, u32, u32, u32, u64, *const u8, usize, *mut c_void);
pub type FileRecvChunkCb = unsafe extern "C" fn(*mut Tox, u32, u32, u64, *const u8, usize, *mut c_void);
pub type GroupInviteCb = unsafe extern "C" fn(*mut Tox, i32, u8, *const u8, u16, *mut c_void);
pub type GroupMessageCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, *const u8, u16, *mut c_void);
pub type GroupTitleCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, *const u8, u8, *mut c_void);
pub type GroupNamelistChangeCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, u8, *mut c_void);

/// Registered callbacks of one instance. Legacy group callbacks carry the
/// user data given at registration, stored as an address.
#[derive(Default, Clone, Copy)]
pub(crate) struct Callbacks {
    self_connection_status: Option<SelfConnectionStatusCb>,
    friend_name: Option<FriendBytesCb>,
    friend_status_message: Option<FriendBytesCb>,
    friend_status: Option<FriendEnumCb>,
    friend_connection_status: Option<FriendEnumCb>,
    friend_typing: Option<FriendTypingCb>,
    friend_read_receipt: Option<FriendReadReceiptCb>,
    friend_request: Option<FriendRequestCb>,
    friend_message: Option<FriendMessageCb>,
    file_recv_control: Option<FileRecvControlCb>,
    file_chunk_request: Option<FileChunkRequestCb>,
    file_recv: Option<FileRecvCb>,
    file_recv_chunk: Option<FileRecvChunkCb>,
    friend_lossy_packet: Option<FriendBytesCb>,
    friend_lossless_packet: Option<FriendBytesCb>,
    group_invite: Option<(GroupInviteCb, usize)>,
    group_message: Option<(GroupMessageCb, usize)>,
    group_action: Option<(GroupMessageCb, usize)>,
    group_title: Option<(GroupTitleCb, usize)>,
    group_namelist_change: Option<(GroupNamelistChangeCb, usize)>,
}

// ─── Helpers ─────────────────────────────────────────────────────────

unsafe fn node_id(tox: *const Tox) -> Option<u64> {
    if tox.is_null() { None } else { Some((*tox).id) }
}

/// Borrow `len` bytes at `ptr`. A zero length never dereferences.
unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

unsafe fn key<'a>(ptr: *const u8) -> Option<&'a [u8; 32]> {
    bytes(ptr, 32)?.try_into().ok()
}

unsafe fn set_error(error: *mut c_uint, value: Code) {
    if !error.is_null() {
        *error = value;
    }
}

unsafe fn report<T>(error: *mut c_uint, result: Result<T, Code>, failed: T) -> T {
    match result {
        Ok(value) => {
            set_error(error, OK);
            value
        }
        Err(value) => {
            set_error(error, value);
            failed
        }
    }
}

unsafe fn write_out<T: Copy>(out: *mut T, data: &[T]) {
    if !out.is_null() && !data.is_empty() {
        ptr::copy_nonoverlapping(data.as_ptr(), out, data.len());
    }
}

unsafe fn read_node<T>(tox: *const Tox, read: impl FnOnce(&Node) -> T) -> Option<T> {
    let id = node_id(tox)?;
    NETWORK.lock().node(id).map(read)
}

unsafe fn update_node(tox: *const Tox, update: impl FnOnce(&mut Node)) {
    if let Some(id) = node_id(tox) {
        if let Some(node) = NETWORK.lock().node_mut(id) {
            update(node);
        }
    }
}

unsafe fn read_friend<T>(
    tox: *const Tox,
    friend: u32,
    error: *mut c_uint,
    not_found: Code,
    failed: T,
    read: impl FnOnce(&Friend) -> T,
) -> T {
    let found = read_node(tox, |node| node.friend(friend).map(read)).flatten();
    report(error, found.ok_or(not_found), failed)
}

// ─── Version ─────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn tox_version_major() -> u32 {
    VERSION_MAJOR
}

#[unsafe(no_mangle)]
pub extern "C" fn tox_version_minor() -> u32 {
    VERSION_MINOR
}

#[unsafe(no_mangle)]
pub extern "C" fn tox_version_patch() -> u32 {
    VERSION_PATCH
}

/// Same rule as `TOX_VERSION_IS_API_COMPATIBLE`.
#[unsafe(no_mangle)]
pub extern "C" fn tox_version_is_compatible(major: u32, minor: u32, patch: u32) -> bool {
    if VERSION_MAJOR > 0 {
        VERSION_MAJOR == major
            && (VERSION_MINOR > minor || (VERSION_MINOR == minor && VERSION_PATCH >= patch))
    } else if VERSION_MINOR > 0 {
        major == 0 && VERSION_MINOR == minor && VERSION_PATCH >= patch
    } else {
        major == 0 && minor == 0 && VERSION_PATCH == patch
    }
}

// ─── Lifecycle and persistence ───────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_options_default(options: *mut ToxOptions) {
    if options.is_null() {
        return;
    }
    *options = ToxOptions {
        ipv6_enabled: true,
        udp_enabled: true,
        local_discovery_enabled: true,
        proxy_type: PROXY_TYPE_NONE,
        proxy_host: ptr::null(),
        proxy_port: 0,
        start_port: 0,
        end_port: 0,
        tcp_port: 0,
        hole_punching_enabled: true,
        savedata_type: SAVEDATA_TYPE_NONE,
        savedata_data: ptr::null(),
        savedata_length: 0,
    };
}

unsafe fn node_config(options: &ToxOptions) -> Result<NodeConfig, Code> {
    if options.proxy_type > PROXY_TYPE_SOCKS5 {
        return Err(code::new::PROXY_BAD_TYPE);
    }
    if options.proxy_type != PROXY_TYPE_NONE {
        if options.proxy_host.is_null() || CStr::from_ptr(options.proxy_host).to_bytes().is_empty() {
            return Err(code::new::PROXY_BAD_HOST);
        }
        if options.proxy_port == 0 {
            return Err(code::new::PROXY_BAD_PORT);
        }
    }
    let identity = match options.savedata_type {
        SAVEDATA_TYPE_NONE => Identity::Fresh,
        SAVEDATA_TYPE_TOX_SAVE => {
            let data = bytes(options.savedata_data, options.savedata_length).ok_or(code::new::NULL)?;
            match savedata::decode(data) {
                Ok(profile) => Identity::Profile(profile),
                Err(LoadFailure::Encrypted) => return Err(code::new::LOAD_ENCRYPTED),
                Err(LoadFailure::BadFormat(e)) => {
                    tracing::debug!("rejecting savedata: {e:#}");
                    return Err(code::new::LOAD_BAD_FORMAT);
                }
            }
        }
        SAVEDATA_TYPE_SECRET_KEY => {
            let data = bytes(options.savedata_data, options.savedata_length).ok_or(code::new::NULL)?;
            let secret: [u8; 32] = data.try_into().map_err(|_| code::new::LOAD_BAD_FORMAT)?;
            Identity::SecretKey(secret)
        }
        _ => return Err(code::new::LOAD_BAD_FORMAT),
    };
    Ok(NodeConfig {
        udp_enabled: options.udp_enabled,
        start_port: options.start_port,
        end_port: options.end_port,
        tcp_port: options.tcp_port,
        identity,
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_new(options: *const ToxOptions, error: *mut c_uint) -> *mut Tox {
    let mut defaults: ToxOptions = std::mem::zeroed();
    let options = if options.is_null() {
        tox_options_default(&mut defaults);
        &defaults
    } else {
        &*options
    };
    let created = node_config(options).and_then(|config| NETWORK.lock().create(config));
    match created {
        Ok(id) => {
            set_error(error, OK);
            Box::into_raw(Box::new(Tox { id }))
        }
        Err(value) => {
            set_error(error, value);
            ptr::null_mut()
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_kill(tox: *mut Tox) {
    if tox.is_null() {
        return;
    }
    let instance = Box::from_raw(tox);
    NETWORK.lock().kill(instance.id);
}

unsafe fn encoded_profile(tox: *const Tox) -> Vec<u8> {
    let Some(profile) = read_node(tox, Node::profile) else {
        return Vec::new();
    };
    savedata::encode(&profile).unwrap_or_else(|e| {
        tracing::warn!("failed to encode savedata: {e:#}");
        Vec::new()
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_get_savedata_size(tox: *const Tox) -> usize {
    encoded_profile(tox).len()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_get_savedata(tox: *const Tox, out: *mut u8) {
    write_out(out, &encoded_profile(tox));
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_iteration_interval(_tox: *const Tox) -> u32 {
    ITERATION_INTERVAL_MS
}

/// Deliver everything queued for this instance. The network lock is
/// released before the first callback runs.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_iterate(tox: *mut Tox, user_data: *mut c_void) {
    let Some(id) = node_id(tox) else {
        return;
    };
    let drained = NETWORK.lock().drain(id);
    let Some((callbacks, queue)) = drained else {
        return;
    };
    for callback in queue {
        deliver(tox, &callbacks, callback, user_data);
    }
}

unsafe fn deliver(tox: *mut Tox, cbs: &Callbacks, callback: Callback, user_data: *mut c_void) {
    match callback {
        Callback::SelfConnectionStatus { status } => {
            if let Some(f) = cbs.self_connection_status {
                f(tox, status, user_data);
            }
        }
        Callback::FriendRequest { public_key, message } => {
            if let Some(f) = cbs.friend_request {
                f(tox, public_key.as_ptr(), message.as_ptr(), message.len(), user_data);
            }
        }
        Callback::FriendMessage { friend, kind, message } => {
            if let Some(f) = cbs.friend_message {
                f(tox, friend, kind, message.as_ptr(), message.len(), user_data);
            }
        }
        Callback::FriendName { friend, name } => {
            if let Some(f) = cbs.friend_name {
                f(tox, friend, name.as_ptr(), name.len(), user_data);
            }
        }
        Callback::FriendStatusMessage { friend, message } => {
            if let Some(f) = cbs.friend_status_message {
                f(tox, friend, message.as_ptr(), message.len(), user_data);
            }
        }
        Callback::FriendStatus { friend, status } => {
            if let Some(f) = cbs.friend_status {
                f(tox, friend, status, user_data);
            }
        }
        Callback::FriendConnectionStatus { friend, status } => {
            if let Some(f) = cbs.friend_connection_status {
                f(tox, friend, status, user_data);
            }
        }
        Callback::FriendTyping { friend, typing } => {
            if let Some(f) = cbs.friend_typing {
                f(tox, friend, typing, user_data);
            }
        }
        Callback::FriendReadReceipt { friend, message_id } => {
            if let Some(f) = cbs.friend_read_receipt {
                f(tox, friend, message_id, user_data);
            }
        }
        Callback::FileRecvControl { friend, file, control } => {
            if let Some(f) = cbs.file_recv_control {
                f(tox, friend, file, control, user_data);
            }
        }
        Callback::FileChunkRequest { friend, file, position, length } => {
            if let Some(f) = cbs.file_chunk_request {
                f(tox, friend, file, position, length, user_data);
            }
        }
        Callback::FileRecv { friend, file, kind, size, filename } => {
            if let Some(f) = cbs.file_recv {
                f(tox, friend, file, kind, size, filename.as_ptr(), filename.len(), user_data);
            }
        }
        Callback::FileRecvChunk { friend, file, position, data } => {
            if let Some(f) = cbs.file_recv_chunk {
                f(tox, friend, file, position, data.as_ptr(), data.len(), user_data);
            }
        }
        Callback::LossyPacket { friend, data } => {
            if let Some(f) = cbs.friend_lossy_packet {
                f(tox, friend, data.as_ptr(), data.len(), user_data);
            }
        }
        Callback::LosslessPacket { friend, data } => {
            if let Some(f) = cbs.friend_lossless_packet {
                f(tox, friend, data.as_ptr(), data.len(), user_data);
            }
        }
        Callback::GroupInvite { friend, kind, cookie } => {
            if let Some((f, bound)) = cbs.group_invite {
                let len = u16::try_from(cookie.len()).unwrap_or(u16::MAX);
                f(tox, friend, kind, cookie.as_ptr(), len, bound as *mut c_void);
            }
        }
        Callback::GroupMessage { group, peer, message } => {
            if let Some((f, bound)) = cbs.group_message {
                let len = u16::try_from(message.len()).unwrap_or(u16::MAX);
                f(tox, group, peer, message.as_ptr(), len, bound as *mut c_void);
            }
        }
        Callback::GroupAction { group, peer, action } => {
            if let Some((f, bound)) = cbs.group_action {
                let len = u16::try_from(action.len()).unwrap_or(u16::MAX);
                f(tox, group, peer, action.as_ptr(), len, bound as *mut c_void);
            }
        }
        Callback::GroupTitle { group, peer, title } => {
            if let Some((f, bound)) = cbs.group_title {
                let len = u8::try_from(title.len()).unwrap_or(u8::MAX);
                f(tox, group, peer, title.as_ptr(), len, bound as *mut c_void);
            }
        }
        Callback::GroupNamelistChange { group, peer, change } => {
            if let Some((f, bound)) = cbs.group_namelist_change {
                f(tox, group, peer, change, bound as *mut c_void);
            }
        }
    }
}

// ─── Network ─────────────────────────────────────────────────────────

unsafe fn connect(tox: *const Tox, host: *const c_char, port: u16, public_key: *const u8) -> Result<bool, Code> {
    let id = node_id(tox).ok_or(code::bootstrap::NULL)?;
    if host.is_null() || key(public_key).is_none() {
        return Err(code::bootstrap::NULL);
    }
    if CStr::from_ptr(host).to_bytes().is_empty() {
        return Err(code::bootstrap::BAD_HOST);
    }
    if port == 0 {
        return Err(code::bootstrap::BAD_PORT);
    }
    NETWORK.lock().bootstrap(id);
    Ok(true)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_bootstrap(
    tox: *mut Tox,
    host: *const c_char,
    port: u16,
    public_key: *const u8,
    error: *mut c_uint,
) -> bool {
    report(error, connect(tox, host, port, public_key), false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_add_tcp_relay(
    tox: *mut Tox,
    host: *const c_char,
    port: u16,
    public_key: *const u8,
    error: *mut c_uint,
) -> bool {
    report(error, connect(tox, host, port, public_key), false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_connection_status(tox: *const Tox) -> c_uint {
    read_node(tox, Node::connection_status).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_udp_port(tox: *const Tox, error: *mut c_uint) -> u16 {
    let port = read_node(tox, |n| n.udp_port).flatten();
    report(error, port.ok_or(code::get_port::NOT_BOUND), 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_tcp_port(tox: *const Tox, error: *mut c_uint) -> u16 {
    let port = read_node(tox, |n| n.tcp_port).flatten();
    report(error, port.ok_or(code::get_port::NOT_BOUND), 0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_dht_id(tox: *const Tox, out: *mut u8) {
    if let Some(id) = read_node(tox, Node::dht_id) {
        write_out(out, &id);
    }
}

// ─── Self ────────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_address(tox: *const Tox, out: *mut u8) {
    if let Some(address) = read_node(tox, Node::address) {
        write_out(out, &address);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_set_nospam(tox: *mut Tox, nospam: u32) {
    update_node(tox, |n| n.nospam = nospam);
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_nospam(tox: *const Tox) -> u32 {
    read_node(tox, |n| n.nospam).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_public_key(tox: *const Tox, out: *mut u8) {
    if let Some(key) = read_node(tox, Node::public_key) {
        write_out(out, &key);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_secret_key(tox: *const Tox, out: *mut u8) {
    if let Some(key) = read_node(tox, Node::secret_key) {
        write_out(out, &key);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_set_name(tox: *mut Tox, name: *const u8, length: usize, error: *mut c_uint) -> bool {
    let result = match (node_id(tox), bytes(name, length)) {
        (Some(id), Some(name)) => NETWORK.lock().set_name(id, name).map(|_| true),
        _ => Err(code::set_info::NULL),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_name_size(tox: *const Tox) -> usize {
    read_node(tox, |n| n.name.len()).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_name(tox: *const Tox, out: *mut u8) {
    if let Some(name) = read_node(tox, |n| n.name.clone()) {
        write_out(out, &name);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_set_status_message(
    tox: *mut Tox,
    message: *const u8,
    length: usize,
    error: *mut c_uint,
) -> bool {
    let result = match (node_id(tox), bytes(message, length)) {
        (Some(id), Some(message)) => NETWORK.lock().set_status_message(id, message).map(|_| true),
        _ => Err(code::set_info::NULL),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_status_message_size(tox: *const Tox) -> usize {
    read_node(tox, |n| n.status_message.len()).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_status_message(tox: *const Tox, out: *mut u8) {
    if let Some(message) = read_node(tox, |n| n.status_message.clone()) {
        write_out(out, &message);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_set_status(tox: *mut Tox, status: c_uint) {
    if let Some(id) = node_id(tox) {
        NETWORK.lock().set_status(id, status);
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_status(tox: *const Tox) -> c_uint {
    read_node(tox, |n| n.status).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_set_typing(tox: *mut Tox, friend: u32, typing: bool, error: *mut c_uint) -> bool {
    let result = match node_id(tox) {
        Some(id) => NETWORK.lock().set_typing(id, friend, typing).map(|_| true),
        None => Err(code::set_typing::FRIEND_NOT_FOUND),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_friend_list_size(tox: *const Tox) -> usize {
    read_node(tox, |n| n.friend_numbers().len()).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_self_get_friend_list(tox: *const Tox, out: *mut u32) {
    if let Some(list) = read_node(tox, Node::friend_numbers) {
        write_out(out, &list);
    }
}

// ─── Friends ─────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_add(
    tox: *mut Tox,
    address: *const u8,
    message: *const u8,
    length: usize,
    error: *mut c_uint,
) -> u32 {
    let address: Option<&[u8; ADDRESS_SIZE]> = bytes(address, ADDRESS_SIZE).and_then(|a| a.try_into().ok());
    let result = match (node_id(tox), address, bytes(message, length)) {
        (Some(id), Some(address), Some(message)) => NETWORK.lock().friend_add(id, address, message),
        _ => Err(code::friend_add::NULL),
    };
    report(error, result, u32::MAX)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_add_norequest(tox: *mut Tox, public_key: *const u8, error: *mut c_uint) -> u32 {
    let result = match (node_id(tox), key(public_key)) {
        (Some(id), Some(public_key)) => NETWORK.lock().friend_add_norequest(id, public_key),
        _ => Err(code::friend_add::NULL),
    };
    report(error, result, u32::MAX)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_delete(tox: *mut Tox, friend: u32, error: *mut c_uint) -> bool {
    let result = match node_id(tox) {
        Some(id) => NETWORK.lock().friend_delete(id, friend).map(|_| true),
        None => Err(code::friend_delete::FRIEND_NOT_FOUND),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_by_public_key(tox: *const Tox, public_key: *const u8, error: *mut c_uint) -> u32 {
    let result = match key(public_key) {
        Some(public_key) => read_node(tox, |n| n.friend_number(public_key))
            .flatten()
            .ok_or(code::by_public_key::NOT_FOUND),
        None => Err(code::by_public_key::NULL),
    };
    report(error, result, u32::MAX)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_exists(tox: *const Tox, friend: u32) -> bool {
    read_node(tox, |n| n.friend(friend).is_some()).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_public_key(
    tox: *const Tox,
    friend: u32,
    out: *mut u8,
    error: *mut c_uint,
) -> bool {
    let found = read_friend(tox, friend, error, code::friend_get::FRIEND_NOT_FOUND, None, |f| Some(f.public_key));
    match found {
        Some(public_key) => {
            write_out(out, &public_key);
            true
        }
        None => false,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_last_online(tox: *const Tox, friend: u32, error: *mut c_uint) -> u64 {
    read_friend(tox, friend, error, code::friend_get::FRIEND_NOT_FOUND, u64::MAX, |f| f.last_online)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_name_size(tox: *const Tox, friend: u32, error: *mut c_uint) -> usize {
    read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, usize::MAX, |f| f.name.len())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_name(tox: *const Tox, friend: u32, out: *mut u8, error: *mut c_uint) -> bool {
    if out.is_null() {
        set_error(error, code::query::NULL);
        return false;
    }
    let found = read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, None, |f| Some(f.name.clone()));
    match found {
        Some(name) => {
            write_out(out, &name);
            true
        }
        None => false,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_status_message_size(tox: *const Tox, friend: u32, error: *mut c_uint) -> usize {
    read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, usize::MAX, |f| f.status_message.len())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_status_message(
    tox: *const Tox,
    friend: u32,
    out: *mut u8,
    error: *mut c_uint,
) -> bool {
    if out.is_null() {
        set_error(error, code::query::NULL);
        return false;
    }
    let found = read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, None, |f| {
        Some(f.status_message.clone())
    });
    match found {
        Some(message) => {
            write_out(out, &message);
            true
        }
        None => false,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_status(tox: *const Tox, friend: u32, error: *mut c_uint) -> c_uint {
    read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, 0, |f| f.status)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_connection_status(tox: *const Tox, friend: u32, error: *mut c_uint) -> c_uint {
    read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, 0, |f| f.connection)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_get_typing(tox: *const Tox, friend: u32, error: *mut c_uint) -> bool {
    read_friend(tox, friend, error, code::query::FRIEND_NOT_FOUND, false, |f| f.typing)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_send_message(
    tox: *mut Tox,
    friend: u32,
    kind: c_uint,
    message: *const u8,
    length: usize,
    error: *mut c_uint,
) -> u32 {
    let result = match (node_id(tox), bytes(message, length)) {
        (Some(id), Some(message)) => NETWORK.lock().send_message(id, friend, kind, message),
        _ => Err(code::send_message::NULL),
    };
    report(error, result, 0)
}

// ─── Files ───────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_hash(hash: *mut u8, data: *const u8, length: usize) -> bool {
    let Some(data) = bytes(data, length) else {
        return false;
    };
    if hash.is_null() {
        return false;
    }
    write_out(hash, Sha256::digest(data).as_slice());
    true
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_file_control(
    tox: *mut Tox,
    friend: u32,
    file: u32,
    control: c_uint,
    error: *mut c_uint,
) -> bool {
    let result = match node_id(tox) {
        Some(id) => NETWORK.lock().file_control(id, friend, file, control).map(|_| true),
        None => Err(code::file_control::FRIEND_NOT_FOUND),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_file_seek(
    tox: *mut Tox,
    friend: u32,
    file: u32,
    position: u64,
    error: *mut c_uint,
) -> bool {
    let result = match node_id(tox) {
        Some(id) => NETWORK.lock().file_seek(id, friend, file, position).map(|_| true),
        None => Err(code::file_seek::FRIEND_NOT_FOUND),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_file_get_file_id(
    tox: *const Tox,
    friend: u32,
    file: u32,
    out: *mut u8,
    error: *mut c_uint,
) -> bool {
    let result = match node_id(tox) {
        Some(id) if !out.is_null() => NETWORK.lock().file_id(id, friend, file),
        _ => Err(code::file_get::NULL),
    };
    match report(error, result.map(Some), None) {
        Some(file_id) => {
            write_out(out, &file_id);
            true
        }
        None => false,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_file_send(
    tox: *mut Tox,
    friend: u32,
    kind: u32,
    size: u64,
    file_id: *const u8,
    filename: *const u8,
    filename_length: usize,
    error: *mut c_uint,
) -> u32 {
    let file_id = if file_id.is_null() { None } else { key(file_id).copied() };
    let result = match (node_id(tox), bytes(filename, filename_length)) {
        (Some(id), Some(filename)) => NETWORK.lock().file_send(id, friend, kind, size, file_id, filename),
        _ => Err(code::file_send::NULL),
    };
    report(error, result, u32::MAX)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_file_send_chunk(
    tox: *mut Tox,
    friend: u32,
    file: u32,
    position: u64,
    data: *const u8,
    length: usize,
    error: *mut c_uint,
) -> bool {
    let result = match (node_id(tox), bytes(data, length)) {
        (Some(id), Some(data)) => NETWORK
            .lock()
            .file_send_chunk(id, friend, file, position, data)
            .map(|_| true),
        _ => Err(code::file_send_chunk::NULL),
    };
    report(error, result, false)
}

// ─── Custom packets ──────────────────────────────────────────────────

unsafe fn send_packet(
    tox: *mut Tox,
    friend: u32,
    data: *const u8,
    length: usize,
    error: *mut c_uint,
    lossless: bool,
) -> bool {
    let result = match (node_id(tox), bytes(data, length)) {
        (Some(id), Some(data)) => NETWORK.lock().send_packet(id, friend, data, lossless).map(|_| true),
        _ => Err(code::custom_packet::NULL),
    };
    report(error, result, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_send_lossy_packet(
    tox: *mut Tox,
    friend: u32,
    data: *const u8,
    length: usize,
    error: *mut c_uint,
) -> bool {
    send_packet(tox, friend, data, length, error, false)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_friend_send_lossless_packet(
    tox: *mut Tox,
    friend: u32,
    data: *const u8,
    length: usize,
    error: *mut c_uint,
) -> bool {
    send_packet(tox, friend, data, length, error, true)
}

// ─── Legacy groups ───────────────────────────────────────────────────

fn status(ok: bool) -> c_int {
    if ok { 0 } else { -1 }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_add_groupchat(tox: *mut Tox) -> c_int {
    node_id(tox)
        .and_then(|id| NETWORK.lock().group_new(id))
        .unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_del_groupchat(tox: *mut Tox, group: c_int) -> c_int {
    status(node_id(tox).is_some_and(|id| NETWORK.lock().group_delete(id, group)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_invite_friend(tox: *mut Tox, friend: i32, group: c_int) -> c_int {
    status(node_id(tox).is_some_and(|id| NETWORK.lock().group_invite(id, friend, group)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_join_groupchat(tox: *mut Tox, friend: i32, data: *const u8, length: u16) -> c_int {
    match (node_id(tox), bytes(data, usize::from(length))) {
        (Some(id), Some(cookie)) => NETWORK.lock().group_join(id, friend, cookie).unwrap_or(-1),
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_message_send(tox: *mut Tox, group: c_int, message: *const u8, length: u16) -> c_int {
    match (node_id(tox), bytes(message, usize::from(length))) {
        (Some(id), Some(text)) => status(NETWORK.lock().group_send(id, group, text, false)),
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_action_send(tox: *mut Tox, group: c_int, action: *const u8, length: u16) -> c_int {
    match (node_id(tox), bytes(action, usize::from(length))) {
        (Some(id), Some(text)) => status(NETWORK.lock().group_send(id, group, text, true)),
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_set_title(tox: *mut Tox, group: c_int, title: *const u8, length: u8) -> c_int {
    match (node_id(tox), bytes(title, usize::from(length))) {
        (Some(id), Some(title)) => status(NETWORK.lock().group_set_title(id, group, title)),
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_get_title(tox: *mut Tox, group: c_int, out: *mut u8, max_length: u32) -> c_int {
    let Some(title) = node_id(tox).and_then(|id| NETWORK.lock().group_title(id, group)) else {
        return -1;
    };
    if out.is_null() || title.len() > max_length as usize {
        return -1;
    }
    write_out(out, &title);
    title.len() as c_int
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_number_peers(tox: *const Tox, group: c_int) -> c_int {
    node_id(tox)
        .and_then(|id| NETWORK.lock().group_members(id, group))
        .map_or(-1, |members| members.len() as c_int)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_peername(tox: *const Tox, group: c_int, peer: c_int, out: *mut u8) -> c_int {
    let Some(id) = node_id(tox) else {
        return -1;
    };
    let name = NETWORK.lock().group_peer(id, group, peer).map(|n| n.name.clone());
    match name {
        Some(name) if !out.is_null() => {
            write_out(out, &name[..name.len().min(MAX_NAME_LENGTH)]);
            name.len().min(MAX_NAME_LENGTH) as c_int
        }
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_peer_pubkey(tox: *const Tox, group: c_int, peer: c_int, out: *mut u8) -> c_int {
    let Some(id) = node_id(tox) else {
        return -1;
    };
    let public_key = NETWORK.lock().group_peer(id, group, peer).map(Node::public_key);
    match public_key {
        Some(public_key) if !out.is_null() => {
            write_out(out, &public_key);
            0
        }
        _ => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_peernumber_is_ours(tox: *const Tox, group: c_int, peer: c_int) -> c_uint {
    let Some(id) = node_id(tox) else {
        return 0;
    };
    let ours = NETWORK.lock().group_peer(id, group, peer).is_some_and(|n| n.id == id);
    c_uint::from(ours)
}

/// Names go into consecutive `MAX_NAME_LENGTH` slots of `names`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_get_names(
    tox: *const Tox,
    group: c_int,
    names: *mut u8,
    lengths: *mut u16,
    length: u16,
) -> c_int {
    let Some(id) = node_id(tox) else {
        return -1;
    };
    if names.is_null() || lengths.is_null() {
        return -1;
    }
    let net = NETWORK.lock();
    let Some(members) = net.group_members(id, group) else {
        return -1;
    };
    let count = members.len().min(usize::from(length));
    for (i, member) in members.iter().take(count).enumerate() {
        let name = net.node(*member).map(|n| n.name.clone()).unwrap_or_default();
        let name = &name[..name.len().min(MAX_NAME_LENGTH)];
        write_out(names.add(i * MAX_NAME_LENGTH), name);
        *lengths.add(i) = name.len() as u16;
    }
    count as c_int
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_group_get_type(tox: *const Tox, group: c_int) -> c_int {
    node_id(tox)
        .and_then(|id| NETWORK.lock().group_kind(id, group))
        .map_or(-1, c_int::from)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_count_chatlist(tox: *const Tox) -> u32 {
    read_node(tox, |n| n.group_numbers().len() as u32).unwrap_or(0)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tox_get_chatlist(tox: *const Tox, out: *mut i32, size: u32) -> u32 {
    let Some(groups) = read_node(tox, Node::group_numbers) else {
        return 0;
    };
    let count = groups.len().min(size as usize);
    write_out(out, &groups[..count]);
    count as u32
}

// ─── Callback registration ───────────────────────────────────────────

macro_rules! register {
    ($($symbol:ident => $field:ident : $cb:ty;)+) => {$(
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $symbol(tox: *mut Tox, callback: Option<$cb>) {
            update_node(tox, |n| n.callbacks.$field = callback);
        }
    )+};
}

macro_rules! register_bound {
    ($($symbol:ident => $field:ident : $cb:ty;)+) => {$(
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $symbol(tox: *mut Tox, callback: Option<$cb>, user_data: *mut c_void) {
            let bound = user_data as usize;
            update_node(tox, |n| n.callbacks.$field = callback.map(|cb| (cb, bound)));
        }
    )+};
}

register! {
    tox_callback_self_connection_status => self_connection_status: SelfConnectionStatusCb;
    tox_callback_friend_name => friend_name: FriendBytesCb;
    tox_callback_friend_status_message => friend_status_message: FriendBytesCb;
    tox_callback_friend_status => friend_status: FriendEnumCb;
    tox_callback_friend_connection_status => friend_connection_status: FriendEnumCb;
    tox_callback_friend_typing => friend_typing: FriendTypingCb;
    tox_callback_friend_read_receipt => friend_read_receipt: FriendReadReceiptCb;
    tox_callback_friend_request => friend_request: FriendRequestCb;
    tox_callback_friend_message => friend_message: FriendMessageCb;
    tox_callback_file_recv_control => file_recv_control: FileRecvControlCb;
    tox_callback_file_chunk_request => file_chunk_request: FileChunkRequestCb;
    tox_callback_file_recv => file_recv: FileRecvCb;
    tox_callback_file_recv_chunk => file_recv_chunk: FileRecvChunkCb;
    tox_callback_friend_lossy_packet => friend_lossy_packet: FriendBytesCb;
    tox_callback_friend_lossless_packet => friend_lossless_packet: FriendBytesCb;
}

register_bound! {
    tox_callback_group_invite => group_invite: GroupInviteCb;
    tox_callback_group_message => group_message: GroupMessageCb;
    tox_callback_group_action => group_action: GroupMessageCb;
    tox_callback_group_title => group_title: GroupTitleCb;
    tox_callback_group_namelist_change => group_namelist_change: GroupNamelistChangeCb;
}
