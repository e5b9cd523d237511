//! Custom lossy and lossless packets.
//!
//! The first byte selects the family: 200–254 lossy, 160–191 lossless. The
//! engine enforces the ranges and reports violations as `INVALID`.

use std::ffi::c_uint;

use crate::core::ToxCore;
use crate::error::{ToxError, check_code};
use crate::invoke::dual;
use crate::surface::errors::ErrFriendCustomPacket;

impl ToxCore {
    pub(crate) fn send_lossy_packet(&self, friend: u32, data: Vec<u8>) -> Result<(), ToxError> {
        self.with_engine("send_lossy_packet", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_friend_send_lossy_packet)(tox, friend, data.as_ptr(), data.len(), &mut error) };
            check_code::<ErrFriendCustomPacket>("send_lossy_packet", error)
        })
    }

    pub(crate) fn send_lossless_packet(&self, friend: u32, data: Vec<u8>) -> Result<(), ToxError> {
        self.with_engine("send_lossless_packet", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_friend_send_lossless_packet)(tox, friend, data.as_ptr(), data.len(), &mut error) };
            check_code::<ErrFriendCustomPacket>("send_lossless_packet", error)
        })
    }
}

dual! {
    fn send_lossy_packet / send_lossy_packet_sync(friend: u32, data: Vec<u8>) -> ();
    fn send_lossless_packet / send_lossless_packet_sync(friend: u32, data: Vec<u8>) -> ();
}
