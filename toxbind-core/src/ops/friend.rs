//! Friend list management, friend queries and messaging.

use std::ffi::c_uint;

use chrono::{DateTime, Utc};

use crate::core::ToxCore;
use crate::error::{ErrorKind, ToxError, check_code, decode_returned};
use crate::event::lossy_text;
use crate::invoke::dual;
use crate::keys::{Address, PublicKey};
use crate::surface::errors::{
    ErrFriendAdd, ErrFriendByPublicKey, ErrFriendDelete, ErrFriendGetLastOnline, ErrFriendGetPublicKey,
    ErrFriendQuery, ErrFriendSendMessage,
};
use crate::surface::types::{ConnectionStatus, MessageType, PUBLIC_KEY_SIZE, UserStatus};

impl ToxCore {
    pub(crate) fn friend_add(&self, address: Address, message: String) -> Result<u32, ToxError> {
        self.with_engine("friend_add", |s, tox| {
            let mut error: c_uint = 0;
            let friend = unsafe {
                (s.tox_friend_add)(
                    tox,
                    address.as_bytes().as_ptr(),
                    message.as_ptr(),
                    message.len(),
                    &mut error,
                )
            };
            check_code::<ErrFriendAdd>("friend_add", error)?;
            Ok(friend)
        })
    }

    pub(crate) fn friend_add_norequest(&self, public_key: PublicKey) -> Result<u32, ToxError> {
        self.with_engine("friend_add_norequest", |s, tox| {
            let mut error: c_uint = 0;
            let friend = unsafe { (s.tox_friend_add_norequest)(tox, public_key.as_bytes().as_ptr(), &mut error) };
            check_code::<ErrFriendAdd>("friend_add_norequest", error)?;
            Ok(friend)
        })
    }

    pub(crate) fn friend_delete(&self, friend: u32) -> Result<(), ToxError> {
        self.with_engine("friend_delete", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_friend_delete)(tox, friend, &mut error) };
            check_code::<ErrFriendDelete>("friend_delete", error)
        })
    }

    pub(crate) fn friend_by_public_key(&self, public_key: PublicKey) -> Result<u32, ToxError> {
        self.with_engine("friend_by_public_key", |s, tox| {
            let mut error: c_uint = 0;
            let friend = unsafe { (s.tox_friend_by_public_key)(tox, public_key.as_bytes().as_ptr(), &mut error) };
            check_code::<ErrFriendByPublicKey>("friend_by_public_key", error)?;
            Ok(friend)
        })
    }

    pub(crate) fn friend_exists(&self, friend: u32) -> Result<bool, ToxError> {
        self.with_engine("friend_exists", |s, tox| Ok(unsafe { (s.tox_friend_exists)(tox, friend) }))
    }

    pub(crate) fn friend_public_key(&self, friend: u32) -> Result<PublicKey, ToxError> {
        self.with_engine("friend_public_key", |s, tox| {
            let mut out = [0u8; PUBLIC_KEY_SIZE];
            let mut error: c_uint = 0;
            unsafe { (s.tox_friend_get_public_key)(tox, friend, out.as_mut_ptr(), &mut error) };
            check_code::<ErrFriendGetPublicKey>("friend_public_key", error)?;
            Ok(PublicKey(out))
        })
    }

    pub(crate) fn friend_last_online(&self, friend: u32) -> Result<DateTime<Utc>, ToxError> {
        self.with_engine("friend_last_online", |s, tox| {
            let mut error: c_uint = 0;
            let secs = unsafe { (s.tox_friend_get_last_online)(tox, friend, &mut error) };
            check_code::<ErrFriendGetLastOnline>("friend_last_online", error)?;
            i64::try_from(secs)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| {
                    ToxError::new(
                        "friend_last_online",
                        ErrorKind::UnexpectedReturn {
                            expected: DateTime::<Utc>::MAX_UTC.timestamp(),
                            actual: i64::try_from(secs).unwrap_or(i64::MAX),
                        },
                    )
                })
        })
    }

    pub(crate) fn friend_name(&self, friend: u32) -> Result<String, ToxError> {
        self.with_engine("friend_name", |s, tox| {
            let mut error: c_uint = 0;
            let size = unsafe { (s.tox_friend_get_name_size)(tox, friend, &mut error) };
            check_code::<ErrFriendQuery>("friend_name", error)?;
            let mut out = vec![0u8; size];
            unsafe { (s.tox_friend_get_name)(tox, friend, out.as_mut_ptr(), &mut error) };
            check_code::<ErrFriendQuery>("friend_name", error)?;
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn friend_status_message(&self, friend: u32) -> Result<String, ToxError> {
        self.with_engine("friend_status_message", |s, tox| {
            let mut error: c_uint = 0;
            let size = unsafe { (s.tox_friend_get_status_message_size)(tox, friend, &mut error) };
            check_code::<ErrFriendQuery>("friend_status_message", error)?;
            let mut out = vec![0u8; size];
            unsafe { (s.tox_friend_get_status_message)(tox, friend, out.as_mut_ptr(), &mut error) };
            check_code::<ErrFriendQuery>("friend_status_message", error)?;
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn friend_status(&self, friend: u32) -> Result<UserStatus, ToxError> {
        self.with_engine("friend_status", |s, tox| {
            let mut error: c_uint = 0;
            let raw = unsafe { (s.tox_friend_get_status)(tox, friend, &mut error) };
            check_code::<ErrFriendQuery>("friend_status", error)?;
            decode_returned("friend_status", raw, UserStatus::Busy.raw(), UserStatus::from_raw)
        })
    }

    pub(crate) fn friend_connection_status(&self, friend: u32) -> Result<ConnectionStatus, ToxError> {
        self.with_engine("friend_connection_status", |s, tox| {
            let mut error: c_uint = 0;
            let raw = unsafe { (s.tox_friend_get_connection_status)(tox, friend, &mut error) };
            check_code::<ErrFriendQuery>("friend_connection_status", error)?;
            decode_returned(
                "friend_connection_status",
                raw,
                ConnectionStatus::Udp.raw(),
                ConnectionStatus::from_raw,
            )
        })
    }

    pub(crate) fn friend_typing(&self, friend: u32) -> Result<bool, ToxError> {
        self.with_engine("friend_typing", |s, tox| {
            let mut error: c_uint = 0;
            let typing = unsafe { (s.tox_friend_get_typing)(tox, friend, &mut error) };
            check_code::<ErrFriendQuery>("friend_typing", error)?;
            Ok(typing)
        })
    }

    pub(crate) fn send_message(&self, friend: u32, kind: MessageType, text: String) -> Result<u32, ToxError> {
        self.with_engine("send_message", |s, tox| {
            let mut error: c_uint = 0;
            let message_id = unsafe {
                (s.tox_friend_send_message)(tox, friend, kind.raw(), text.as_ptr(), text.len(), &mut error)
            };
            check_code::<ErrFriendSendMessage>("send_message", error)?;
            Ok(message_id)
        })
    }
}

dual! {
    /// Send a friend request. Returns the new friend number.
    fn friend_add / friend_add_sync(address: Address, message: String) -> u32;
    /// Add a friend without sending a request, e.g. to accept one.
    fn friend_add_norequest / friend_add_norequest_sync(public_key: PublicKey) -> u32;
    fn friend_delete / friend_delete_sync(friend: u32) -> ();
    fn friend_by_public_key / friend_by_public_key_sync(public_key: PublicKey) -> u32;
    fn friend_exists / friend_exists_sync(friend: u32) -> bool;
    fn friend_public_key / friend_public_key_sync(friend: u32) -> PublicKey;
    fn friend_last_online / friend_last_online_sync(friend: u32) -> DateTime<Utc>;
    fn friend_name / friend_name_sync(friend: u32) -> String;
    fn friend_status_message / friend_status_message_sync(friend: u32) -> String;
    fn friend_status / friend_status_sync(friend: u32) -> UserStatus;
    fn friend_connection_status / friend_connection_status_sync(friend: u32) -> ConnectionStatus;
    fn friend_typing / friend_typing_sync(friend: u32) -> bool;
    /// Returns the message id echoed by the matching read receipt.
    fn send_message / send_message_sync(friend: u32, kind: MessageType, text: String) -> u32;
}
