//! File transfers and the engine's hash function.

use std::ffi::c_uint;

use crate::core::ToxCore;
use crate::error::{ToxError, check_code, check_one};
use crate::invoke::dual;
use crate::keys::{FileId, Hash};
use crate::surface::errors::{ErrFileControl, ErrFileGet, ErrFileSeek, ErrFileSend, ErrFileSendChunk};
use crate::surface::types::{FILE_ID_LENGTH, FileControl, FileKind, HASH_LENGTH};

impl ToxCore {
    /// `tox_hash` needs no instance, but goes through the handle like every
    /// other operation so a released handle behaves uniformly.
    pub(crate) fn hash(&self, data: Vec<u8>) -> Result<Hash, ToxError> {
        self.with_engine("hash", |s, _tox| {
            let mut out = [0u8; HASH_LENGTH];
            let ok = unsafe { (s.tox_hash)(out.as_mut_ptr(), data.as_ptr(), data.len()) };
            check_one("hash", i64::from(ok))?;
            Ok(Hash(out))
        })
    }

    pub(crate) fn file_control(&self, friend: u32, file: u32, control: FileControl) -> Result<(), ToxError> {
        self.with_engine("file_control", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_file_control)(tox, friend, file, control.raw(), &mut error) };
            check_code::<ErrFileControl>("file_control", error)
        })
    }

    pub(crate) fn file_seek(&self, friend: u32, file: u32, position: u64) -> Result<(), ToxError> {
        self.with_engine("file_seek", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_file_seek)(tox, friend, file, position, &mut error) };
            check_code::<ErrFileSeek>("file_seek", error)
        })
    }

    pub(crate) fn file_id(&self, friend: u32, file: u32) -> Result<FileId, ToxError> {
        self.with_engine("file_id", |s, tox| {
            let mut out = [0u8; FILE_ID_LENGTH];
            let mut error: c_uint = 0;
            unsafe { (s.tox_file_get_file_id)(tox, friend, file, out.as_mut_ptr(), &mut error) };
            check_code::<ErrFileGet>("file_id", error)?;
            Ok(FileId(out))
        })
    }

    pub(crate) fn file_send(
        &self,
        friend: u32,
        kind: FileKind,
        size: u64,
        file_id: Option<FileId>,
        filename: String,
    ) -> Result<u32, ToxError> {
        self.with_engine("file_send", |s, tox| {
            let id_ptr = file_id.as_ref().map_or(std::ptr::null(), |id| id.as_bytes().as_ptr());
            let mut error: c_uint = 0;
            let file = unsafe {
                (s.tox_file_send)(
                    tox,
                    friend,
                    kind.raw(),
                    size,
                    id_ptr,
                    filename.as_ptr(),
                    filename.len(),
                    &mut error,
                )
            };
            check_code::<ErrFileSend>("file_send", error)?;
            Ok(file)
        })
    }

    pub(crate) fn file_send_chunk(&self, friend: u32, file: u32, position: u64, data: Vec<u8>) -> Result<(), ToxError> {
        self.with_engine("file_send_chunk", |s, tox| {
            let mut error: c_uint = 0;
            unsafe { (s.tox_file_send_chunk)(tox, friend, file, position, data.as_ptr(), data.len(), &mut error) };
            check_code::<ErrFileSendChunk>("file_send_chunk", error)
        })
    }
}

dual! {
    /// Hash `data` the way the engine hashes avatars.
    fn hash / hash_sync(data: Vec<u8>) -> Hash;
    fn file_control / file_control_sync(friend: u32, file: u32, control: FileControl) -> ();
    fn file_seek / file_seek_sync(friend: u32, file: u32, position: u64) -> ();
    fn file_id / file_id_sync(friend: u32, file: u32) -> FileId;
    /// Offer a file. With `file_id` unset the engine picks a random id.
    /// `size` of `u64::MAX` means unknown (streaming).
    fn file_send / file_send_sync(
        friend: u32,
        kind: FileKind,
        size: u64,
        file_id: Option<FileId>,
        filename: String,
    ) -> u32;
    /// Answer a chunk request. An empty chunk at the end finishes the transfer.
    fn file_send_chunk / file_send_chunk_sync(friend: u32, file: u32, position: u64, data: Vec<u8>) -> ();
}
