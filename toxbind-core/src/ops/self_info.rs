//! The local identity: address, keys, profile and friend list.

use std::ffi::c_uint;

use crate::core::ToxCore;
use crate::error::{ToxError, check_code, decode_returned};
use crate::event::lossy_text;
use crate::invoke::dual;
use crate::keys::{Address, PublicKey, SecretKey};
use crate::surface::errors::{ErrSetInfo, ErrSetTyping};
use crate::surface::types::{ADDRESS_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE, UserStatus};

impl ToxCore {
    pub(crate) fn address(&self) -> Result<Address, ToxError> {
        self.with_engine("address", |s, tox| {
            let mut out = [0u8; ADDRESS_SIZE];
            unsafe { (s.tox_self_get_address)(tox, out.as_mut_ptr()) };
            Ok(Address(out))
        })
    }

    pub(crate) fn nospam(&self) -> Result<u32, ToxError> {
        self.with_engine("nospam", |s, tox| Ok(unsafe { (s.tox_self_get_nospam)(tox) }))
    }

    pub(crate) fn set_nospam(&self, nospam: u32) -> Result<(), ToxError> {
        self.with_engine("set_nospam", |s, tox| {
            unsafe { (s.tox_self_set_nospam)(tox, nospam) };
            Ok(())
        })
    }

    pub(crate) fn public_key(&self) -> Result<PublicKey, ToxError> {
        self.with_engine("public_key", |s, tox| {
            let mut out = [0u8; PUBLIC_KEY_SIZE];
            unsafe { (s.tox_self_get_public_key)(tox, out.as_mut_ptr()) };
            Ok(PublicKey(out))
        })
    }

    pub(crate) fn secret_key(&self) -> Result<SecretKey, ToxError> {
        self.with_engine("secret_key", |s, tox| {
            let mut out = [0u8; SECRET_KEY_SIZE];
            unsafe { (s.tox_self_get_secret_key)(tox, out.as_mut_ptr()) };
            Ok(SecretKey(out))
        })
    }

    pub(crate) fn name(&self) -> Result<String, ToxError> {
        self.with_engine("name", |s, tox| {
            let size = unsafe { (s.tox_self_get_name_size)(tox) };
            let mut out = vec![0u8; size];
            unsafe { (s.tox_self_get_name)(tox, out.as_mut_ptr()) };
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn set_name(&self, name: String) -> Result<(), ToxError> {
        self.with_engine("set_name", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_self_set_name)(tox, name.as_ptr(), name.len(), &mut error) };
            check_code::<ErrSetInfo>("set_name", error)
        })
    }

    pub(crate) fn status_message(&self) -> Result<String, ToxError> {
        self.with_engine("status_message", |s, tox| {
            let size = unsafe { (s.tox_self_get_status_message_size)(tox) };
            let mut out = vec![0u8; size];
            unsafe { (s.tox_self_get_status_message)(tox, out.as_mut_ptr()) };
            Ok(lossy_text(out))
        })
    }

    pub(crate) fn set_status_message(&self, message: String) -> Result<(), ToxError> {
        self.with_engine("set_status_message", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_self_set_status_message)(tox, message.as_ptr(), message.len(), &mut error) };
            check_code::<ErrSetInfo>("set_status_message", error)
        })
    }

    pub(crate) fn status(&self) -> Result<UserStatus, ToxError> {
        self.with_engine("status", |s, tox| {
            let raw = unsafe { (s.tox_self_get_status)(tox) };
            decode_returned("status", raw, UserStatus::Busy.raw(), UserStatus::from_raw)
        })
    }

    pub(crate) fn set_status(&self, status: UserStatus) -> Result<(), ToxError> {
        self.with_engine("set_status", |s, tox| {
            unsafe { (s.tox_self_set_status)(tox, status.raw()) };
            Ok(())
        })
    }

    pub(crate) fn set_typing(&self, friend: u32, typing: bool) -> Result<(), ToxError> {
        self.with_engine("set_typing", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_self_set_typing)(tox, friend, typing, &mut error) };
            check_code::<ErrSetTyping>("set_typing", error)
        })
    }

    pub(crate) fn friend_list(&self) -> Result<Vec<u32>, ToxError> {
        self.with_engine("friend_list", |s, tox| {
            let size = unsafe { (s.tox_self_get_friend_list_size)(tox) };
            let mut out = vec![0u32; size];
            unsafe { (s.tox_self_get_friend_list)(tox, out.as_mut_ptr()) };
            Ok(out)
        })
    }
}

dual! {
    /// Address to hand out to people who should add us.
    fn address / address_sync() -> Address;
    fn nospam / nospam_sync() -> u32;
    /// Changing the nospam changes the address; old requests stop arriving.
    fn set_nospam / set_nospam_sync(nospam: u32) -> ();
    fn public_key / public_key_sync() -> PublicKey;
    fn secret_key / secret_key_sync() -> SecretKey;
    fn name / name_sync() -> String;
    fn set_name / set_name_sync(name: String) -> ();
    fn status_message / status_message_sync() -> String;
    fn set_status_message / set_status_message_sync(message: String) -> ();
    fn status / status_sync() -> UserStatus;
    fn set_status / set_status_sync(status: UserStatus) -> ();
    fn set_typing / set_typing_sync(friend: u32, typing: bool) -> ();
    /// Friend numbers currently in use.
    fn friend_list / friend_list_sync() -> Vec<u32>;
}
