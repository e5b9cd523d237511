//! In-process engine exporting the libtoxcore C ABI.
//!
//! Instances created through [`abi::tox_new`] share one in-memory network,
//! so two handles in the same process can befriend each other, exchange
//! messages and files, and meet in legacy groups. Traffic is delivered on
//! the receiving instance's next `tox_iterate`.
//!
//! [`symbols`] lists every exported entry point for binding layers that
//! take an in-memory symbol table instead of a shared library path.

pub mod abi;
mod code;
mod network;
mod savedata;

use std::ffi::c_void;

pub use network::Callback;

/// Queue a raw callback on the instance whose public key is `public_key`.
///
/// Values are passed to the registered callback unchecked, which makes this
/// the way to exercise a binding with inputs no real engine would produce.
/// Returns `false` if no live instance has that key.
pub fn inject(public_key: &[u8; 32], callback: Callback) -> bool {
    network::NETWORK.lock().inject(public_key, callback)
}

macro_rules! symbol_table {
    ($($symbol:ident),+ $(,)?) => {
        vec![$((stringify!($symbol), abi::$symbol as *const c_void)),+]
    };
}

/// `(name, address)` of every exported entry point.
pub fn symbols() -> Vec<(&'static str, *const c_void)> {
    symbol_table![
        tox_version_major,
        tox_version_minor,
        tox_version_patch,
        tox_version_is_compatible,
        tox_options_default,
        tox_new,
        tox_kill,
        tox_get_savedata_size,
        tox_get_savedata,
        tox_iteration_interval,
        tox_iterate,
        tox_bootstrap,
        tox_add_tcp_relay,
        tox_self_get_connection_status,
        tox_self_get_udp_port,
        tox_self_get_tcp_port,
        tox_self_get_dht_id,
        tox_self_get_address,
        tox_self_set_nospam,
        tox_self_get_nospam,
        tox_self_get_public_key,
        tox_self_get_secret_key,
        tox_self_set_name,
        tox_self_get_name_size,
        tox_self_get_name,
        tox_self_set_status_message,
        tox_self_get_status_message_size,
        tox_self_get_status_message,
        tox_self_set_status,
        tox_self_get_status,
        tox_self_set_typing,
        tox_self_get_friend_list_size,
        tox_self_get_friend_list,
        tox_friend_add,
        tox_friend_add_norequest,
        tox_friend_delete,
        tox_friend_by_public_key,
        tox_friend_exists,
        tox_friend_get_public_key,
        tox_friend_get_last_online,
        tox_friend_get_name_size,
        tox_friend_get_name,
        tox_friend_get_status_message_size,
        tox_friend_get_status_message,
        tox_friend_get_status,
        tox_friend_get_connection_status,
        tox_friend_get_typing,
        tox_friend_send_message,
        tox_hash,
        tox_file_control,
        tox_file_seek,
        tox_file_get_file_id,
        tox_file_send,
        tox_file_send_chunk,
        tox_friend_send_lossy_packet,
        tox_friend_send_lossless_packet,
        tox_add_groupchat,
        tox_del_groupchat,
        tox_invite_friend,
        tox_join_groupchat,
        tox_group_message_send,
        tox_group_action_send,
        tox_group_set_title,
        tox_group_get_title,
        tox_group_number_peers,
        tox_group_peername,
        tox_group_peer_pubkey,
        tox_group_peernumber_is_ours,
        tox_group_get_names,
        tox_group_get_type,
        tox_count_chatlist,
        tox_get_chatlist,
        tox_callback_self_connection_status,
        tox_callback_friend_name,
        tox_callback_friend_status_message,
        tox_callback_friend_status,
        tox_callback_friend_connection_status,
        tox_callback_friend_typing,
        tox_callback_friend_read_receipt,
        tox_callback_friend_request,
        tox_callback_friend_message,
        tox_callback_file_recv_control,
        tox_callback_file_chunk_request,
        tox_callback_file_recv,
        tox_callback_file_recv_chunk,
        tox_callback_friend_lossy_packet,
        tox_callback_friend_lossless_packet,
        tox_callback_group_invite,
        tox_callback_group_message,
        tox_callback_group_action,
        tox_callback_group_title,
        tox_callback_group_namelist_change,
    ]
}
