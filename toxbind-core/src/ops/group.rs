//! Legacy (`tox_old.h`) group chats.
//!
//! These entry points report failure through sentinel return values rather
//! than error out-parameters: `-1` for index/length results, non-zero for
//! status results.

use std::ffi::c_int;

use super::{legacy_index, narrow_len};
use crate::core::ToxCore;
use crate::error::{ToxError, check_expected, check_negative, check_zero, decode_returned};
use crate::event::lossy_text;
use crate::invoke::dual;
use crate::keys::PublicKey;
use crate::surface::types::{GroupType, MAX_NAME_LENGTH, PUBLIC_KEY_SIZE};

impl ToxCore {
    pub(crate) fn group_new(&self) -> Result<u32, ToxError> {
        self.with_engine("group_new", |s, tox| {
            check_negative("group_new", unsafe { (s.tox_add_groupchat)(tox) })
        })
    }

    pub(crate) fn group_delete(&self, group: u32) -> Result<(), ToxError> {
        self.with_engine("group_delete", |s, tox| {
            let group = legacy_index("group_delete", "group", group)?;
            check_zero("group_delete", unsafe { (s.tox_del_groupchat)(tox, group) })
        })
    }

    pub(crate) fn group_invite(&self, friend: u32, group: u32) -> Result<(), ToxError> {
        self.with_engine("group_invite", |s, tox| {
            let friend = legacy_index("group_invite", "friend", friend)?;
            let group = legacy_index("group_invite", "group", group)?;
            check_zero("group_invite", unsafe { (s.tox_invite_friend)(tox, friend, group) })
        })
    }

    pub(crate) fn group_join(&self, friend: u32, data: Vec<u8>) -> Result<u32, ToxError> {
        self.with_engine("group_join", |s, tox| {
            let friend = legacy_index("group_join", "friend", friend)?;
            let len: u16 = narrow_len("group_join", "invite data", data.len())?;
            check_negative("group_join", unsafe { (s.tox_join_groupchat)(tox, friend, data.as_ptr(), len) })
        })
    }

    pub(crate) fn group_send_message(&self, group: u32, text: String) -> Result<(), ToxError> {
        self.with_engine("group_send_message", |s, tox| {
            let group = legacy_index("group_send_message", "group", group)?;
            let len: u16 = narrow_len("group_send_message", "message", text.len())?;
            check_zero("group_send_message", unsafe {
                (s.tox_group_message_send)(tox, group, text.as_ptr(), len)
            })
        })
    }

    pub(crate) fn group_send_action(&self, group: u32, text: String) -> Result<(), ToxError> {
        self.with_engine("group_send_action", |s, tox| {
            let group = legacy_index("group_send_action", "group", group)?;
            let len: u16 = narrow_len("group_send_action", "action", text.len())?;
            check_zero("group_send_action", unsafe {
                (s.tox_group_action_send)(tox, group, text.as_ptr(), len)
            })
        })
    }

    pub(crate) fn group_set_title(&self, group: u32, title: String) -> Result<(), ToxError> {
        self.with_engine("group_set_title", |s, tox| {
            let group = legacy_index("group_set_title", "group", group)?;
            let len: u8 = narrow_len("group_set_title", "title", title.len())?;
            check_zero("group_set_title", unsafe {
                (s.tox_group_set_title)(tox, group, title.as_ptr(), len)
            })
        })
    }

    pub(crate) fn group_title(&self, group: u32) -> Result<String, ToxError> {
        self.with_engine("group_title", |s, tox| {
            let group = legacy_index("group_title", "group", group)?;
            let mut out = vec![0u8; MAX_NAME_LENGTH];
            let len = check_negative("group_title", unsafe {
                (s.tox_group_get_title)(tox, group, out.as_mut_ptr(), MAX_NAME_LENGTH as u32)
            })?;
            out.truncate(len as usize);
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn group_peer_count(&self, group: u32) -> Result<u32, ToxError> {
        self.with_engine("group_peer_count", |s, tox| {
            let group = legacy_index("group_peer_count", "group", group)?;
            check_negative("group_peer_count", unsafe { (s.tox_group_number_peers)(tox, group) })
        })
    }

    pub(crate) fn group_peer_name(&self, group: u32, peer: u32) -> Result<String, ToxError> {
        self.with_engine("group_peer_name", |s, tox| {
            let group = legacy_index("group_peer_name", "group", group)?;
            let peer = legacy_index("group_peer_name", "peer", peer)?;
            let mut out = vec![0u8; MAX_NAME_LENGTH];
            let len = check_negative("group_peer_name", unsafe {
                (s.tox_group_peername)(tox, group, peer, out.as_mut_ptr())
            })?;
            out.truncate(len as usize);
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn group_peer_public_key(&self, group: u32, peer: u32) -> Result<PublicKey, ToxError> {
        self.with_engine("group_peer_public_key", |s, tox| {
            let group = legacy_index("group_peer_public_key", "group", group)?;
            let peer = legacy_index("group_peer_public_key", "peer", peer)?;
            let mut out = [0u8; PUBLIC_KEY_SIZE];
            check_zero("group_peer_public_key", unsafe {
                (s.tox_group_peer_pubkey)(tox, group, peer, out.as_mut_ptr())
            })?;
            Ok(PublicKey(out))
        })
    }

    /// The engine answers 0 both for "not ours" and for unknown peers.
    pub(crate) fn group_peer_is_ours(&self, group: u32, peer: u32) -> Result<bool, ToxError> {
        self.with_engine("group_peer_is_ours", |s, tox| {
            let group = legacy_index("group_peer_is_ours", "group", group)?;
            let peer = legacy_index("group_peer_is_ours", "peer", peer)?;
            Ok(unsafe { (s.tox_group_peernumber_is_ours)(tox, group, peer) } == 1)
        })
    }

    /// All peer names at once. The engine must fill exactly as many entries
    /// as it reports peers.
    pub(crate) fn group_peer_names(&self, group: u32) -> Result<Vec<String>, ToxError> {
        self.with_engine("group_peer_names", |s, tox| {
            let index = legacy_index("group_peer_names", "group", group)?;
            let count = check_negative("group_peer_names", unsafe { (s.tox_group_number_peers)(tox, index) })?;
            let capacity: u16 = narrow_len("group_peer_names", "peer list", count as usize)?;

            let mut names = vec![0u8; count as usize * MAX_NAME_LENGTH];
            let mut lengths = vec![0u16; count as usize];
            let filled = check_negative("group_peer_names", unsafe {
                (s.tox_group_get_names)(tox, index, names.as_mut_ptr(), lengths.as_mut_ptr(), capacity)
            })?;
            check_expected("group_peer_names", i64::from(count), i64::from(filled))?;

            Ok(names
                .chunks(MAX_NAME_LENGTH)
                .zip(&lengths)
                .map(|(slot, &len)| lossy_text(slot[..usize::from(len).min(MAX_NAME_LENGTH)].to_vec()))
                .collect())
        })
    }

    pub(crate) fn group_type(&self, group: u32) -> Result<GroupType, ToxError> {
        self.with_engine("group_type", |s, tox| {
            let group = legacy_index("group_type", "group", group)?;
            let raw = check_negative("group_type", unsafe { (s.tox_group_get_type)(tox, group) })?;
            decode_returned("group_type", raw, GroupType::Av.raw(), GroupType::from_raw)
        })
    }

    /// Group numbers currently in use.
    pub(crate) fn group_list(&self) -> Result<Vec<u32>, ToxError> {
        self.with_engine("group_list", |s, tox| {
            let count = unsafe { (s.tox_count_chatlist)(tox) };
            let mut out = vec![0i32; count as usize];
            let filled = unsafe { (s.tox_get_chatlist)(tox, out.as_mut_ptr(), count) };
            check_expected("group_list", i64::from(count), i64::from(filled))?;
            out.into_iter()
                .map(|group| check_negative("group_list", group as c_int))
                .collect()
        })
    }
}

dual! {
    /// Create a text group. Returns its group number.
    fn group_new / group_new_sync() -> u32;
    fn group_delete / group_delete_sync(group: u32) -> ();
    fn group_invite / group_invite_sync(friend: u32, group: u32) -> ();
    /// Join using the cookie from a `GroupInvite` event.
    fn group_join / group_join_sync(friend: u32, data: Vec<u8>) -> u32;
    fn group_send_message / group_send_message_sync(group: u32, text: String) -> ();
    fn group_send_action / group_send_action_sync(group: u32, text: String) -> ();
    fn group_set_title / group_set_title_sync(group: u32, title: String) -> ();
    fn group_title / group_title_sync(group: u32) -> String;
    fn group_peer_count / group_peer_count_sync(group: u32) -> u32;
    fn group_peer_name / group_peer_name_sync(group: u32, peer: u32) -> String;
    fn group_peer_public_key / group_peer_public_key_sync(group: u32, peer: u32) -> PublicKey;
    fn group_peer_is_ours / group_peer_is_ours_sync(group: u32, peer: u32) -> bool;
    fn group_peer_names / group_peer_names_sync(group: u32) -> Vec<String>;
    fn group_type / group_type_sync(group: u32) -> GroupType;
    fn group_list / group_list_sync() -> Vec<u32>;
}
