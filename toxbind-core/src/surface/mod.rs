//! Typed table of the engine's entry points.
//!
//! Each field of [`Surface`] is named after the C symbol it resolves and
//! carries the exact C signature. The table is resolved once per library
//! path and shared by every handle created from it.

pub mod errors;
pub mod loader;
pub mod types;

use std::any::Any;
use std::ffi::{c_char, c_int, c_uint, c_void};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

pub use loader::{LoadError, NativeLibrary, SymbolSource, SymbolTable};
use types::{NativeOptions, Tox, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};

/// Environment variable naming the engine library to load.
pub const LIBRARY_ENV: &str = "TOXBIND_LIBRARY";
/// Library name used when [`LIBRARY_ENV`] is unset.
pub const DEFAULT_LIBRARY: &str = "toxcore";

// ─── Callback signatures ─────────────────────────────────────────────

pub type SelfConnectionStatusCb = unsafe extern "C" fn(*mut Tox, c_uint, *mut c_void);
pub type FriendNameCb = unsafe extern "C" fn(*mut Tox, u32, *const u8, usize, *mut c_void);
pub type FriendStatusMessageCb = unsafe extern "C" fn(*mut Tox, u32, *const u8, usize, *mut c_void);
pub type FriendStatusCb = unsafe extern "C" fn(*mut Tox, u32, c_uint, *mut c_void);
pub type FriendConnectionStatusCb = unsafe extern "C" fn(*mut Tox, u32, c_uint, *mut c_void);
pub type FriendTypingCb = unsafe extern "C" fn(*mut Tox, u32, bool, *mut c_void);
pub type FriendReadReceiptCb = unsafe extern "C" fn(*mut Tox, u32, u32, *mut c_void);
pub type FriendRequestCb = unsafe extern "C" fn(*mut Tox, *const u8, *const u8, usize, *mut c_void);
pub type FriendMessageCb =
    unsafe extern "C" fn(*mut Tox, u32, c_uint, *const u8, usize, *mut c_void);
pub type FileRecvControlCb = unsafe extern "C" fn(*mut Tox, u32, u32, c_uint, *mut c_void);
pub type FileChunkRequestCb = unsafe extern "C" fn(*mut Tox, u32, u32, u64, usize, *mut c_void);
pub type FileRecvCb =
    unsafe extern "C" fn(*mut Tox, u32, u32, u32, u64, *const u8, usize, *mut c_void);
pub type FileRecvChunkCb =
    unsafe extern "C" fn(*mut Tox, u32, u32, u64, *const u8, usize, *mut c_void);
pub type FriendPacketCb = unsafe extern "C" fn(*mut Tox, u32, *const u8, usize, *mut c_void);

// Legacy group callbacks: user data is bound at registration, not per iterate.
pub type GroupInviteCb = unsafe extern "C" fn(*mut Tox, i32, u8, *const u8, u16, *mut c_void);
pub type GroupMessageCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, *const u8, u16, *mut c_void);
pub type GroupTitleCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, *const u8, u8, *mut c_void);
pub type GroupNamelistChangeCb = unsafe extern "C" fn(*mut Tox, c_int, c_int, u8, *mut c_void);

macro_rules! surface {
    ($(
        $symbol:ident : fn($($arg:ty),* $(,)?) $(-> $ret:ty)?;
    )+) => {
        /// Resolved engine entry points.
        pub struct Surface {
            origin: String,
            _owner: Option<Arc<dyn Any + Send + Sync>>,
            $(pub $symbol: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)+
        }

        impl Surface {
            /// Every symbol the binding requires, in declaration order.
            pub const SYMBOLS: &'static [&'static str] = &[$(stringify!($symbol)),+];

            /// Resolve every required entry point from `source`.
            ///
            /// Fails on the first absent symbol. Nothing is called.
            pub fn resolve(source: &dyn SymbolSource) -> Result<Self, LoadError> {
                Ok(Self {
                    origin: source.describe(),
                    _owner: None,
                    $($symbol: {
                        let address = loader::require(source, stringify!($symbol))?;
                        // SAFETY: the symbol was declared with this signature in tox.h.
                        unsafe {
                            std::mem::transmute::<
                                *const c_void,
                                unsafe extern "C" fn($($arg),*) $(-> $ret)?,
                            >(address)
                        }
                    },)+
                })
            }
        }
    };
}

surface! {
    // Version
    tox_version_major: fn() -> u32;
    tox_version_minor: fn() -> u32;
    tox_version_patch: fn() -> u32;
    tox_version_is_compatible: fn(u32, u32, u32) -> bool;

    // Lifecycle and persistence
    tox_options_default: fn(*mut NativeOptions);
    tox_new: fn(*const NativeOptions, *mut c_uint) -> *mut Tox;
    tox_kill: fn(*mut Tox);
    tox_get_savedata_size: fn(*const Tox) -> usize;
    tox_get_savedata: fn(*const Tox, *mut u8);
    tox_iteration_interval: fn(*const Tox) -> u32;
    tox_iterate: fn(*mut Tox, *mut c_void);

    // Network
    tox_bootstrap: fn(*mut Tox, *const c_char, u16, *const u8, *mut c_uint) -> bool;
    tox_add_tcp_relay: fn(*mut Tox, *const c_char, u16, *const u8, *mut c_uint) -> bool;
    tox_self_get_connection_status: fn(*const Tox) -> c_uint;
    tox_self_get_udp_port: fn(*const Tox, *mut c_uint) -> u16;
    tox_self_get_tcp_port: fn(*const Tox, *mut c_uint) -> u16;
    tox_self_get_dht_id: fn(*const Tox, *mut u8);

    // Self
    tox_self_get_address: fn(*const Tox, *mut u8);
    tox_self_set_nospam: fn(*mut Tox, u32);
    tox_self_get_nospam: fn(*const Tox) -> u32;
    tox_self_get_public_key: fn(*const Tox, *mut u8);
    tox_self_get_secret_key: fn(*const Tox, *mut u8);
    tox_self_set_name: fn(*mut Tox, *const u8, usize, *mut c_uint) -> bool;
    tox_self_get_name_size: fn(*const Tox) -> usize;
    tox_self_get_name: fn(*const Tox, *mut u8);
    tox_self_set_status_message: fn(*mut Tox, *const u8, usize, *mut c_uint) -> bool;
    tox_self_get_status_message_size: fn(*const Tox) -> usize;
    tox_self_get_status_message: fn(*const Tox, *mut u8);
    tox_self_set_status: fn(*mut Tox, c_uint);
    tox_self_get_status: fn(*const Tox) -> c_uint;
    tox_self_set_typing: fn(*mut Tox, u32, bool, *mut c_uint) -> bool;
    tox_self_get_friend_list_size: fn(*const Tox) -> usize;
    tox_self_get_friend_list: fn(*const Tox, *mut u32);

    // Friends
    tox_friend_add: fn(*mut Tox, *const u8, *const u8, usize, *mut c_uint) -> u32;
    tox_friend_add_norequest: fn(*mut Tox, *const u8, *mut c_uint) -> u32;
    tox_friend_delete: fn(*mut Tox, u32, *mut c_uint) -> bool;
    tox_friend_by_public_key: fn(*const Tox, *const u8, *mut c_uint) -> u32;
    tox_friend_exists: fn(*const Tox, u32) -> bool;
    tox_friend_get_public_key: fn(*const Tox, u32, *mut u8, *mut c_uint) -> bool;
    tox_friend_get_last_online: fn(*const Tox, u32, *mut c_uint) -> u64;
    tox_friend_get_name_size: fn(*const Tox, u32, *mut c_uint) -> usize;
    tox_friend_get_name: fn(*const Tox, u32, *mut u8, *mut c_uint) -> bool;
    tox_friend_get_status_message_size: fn(*const Tox, u32, *mut c_uint) -> usize;
    tox_friend_get_status_message: fn(*const Tox, u32, *mut u8, *mut c_uint) -> bool;
    tox_friend_get_status: fn(*const Tox, u32, *mut c_uint) -> c_uint;
    tox_friend_get_connection_status: fn(*const Tox, u32, *mut c_uint) -> c_uint;
    tox_friend_get_typing: fn(*const Tox, u32, *mut c_uint) -> bool;
    tox_friend_send_message: fn(*mut Tox, u32, c_uint, *const u8, usize, *mut c_uint) -> u32;

    // Files
    tox_hash: fn(*mut u8, *const u8, usize) -> bool;
    tox_file_control: fn(*mut Tox, u32, u32, c_uint, *mut c_uint) -> bool;
    tox_file_seek: fn(*mut Tox, u32, u32, u64, *mut c_uint) -> bool;
    tox_file_get_file_id: fn(*const Tox, u32, u32, *mut u8, *mut c_uint) -> bool;
    tox_file_send: fn(*mut Tox, u32, u32, u64, *const u8, *const u8, usize, *mut c_uint) -> u32;
    tox_file_send_chunk: fn(*mut Tox, u32, u32, u64, *const u8, usize, *mut c_uint) -> bool;

    // Custom packets
    tox_friend_send_lossy_packet: fn(*mut Tox, u32, *const u8, usize, *mut c_uint) -> bool;
    tox_friend_send_lossless_packet: fn(*mut Tox, u32, *const u8, usize, *mut c_uint) -> bool;

    // Legacy groups
    tox_add_groupchat: fn(*mut Tox) -> c_int;
    tox_del_groupchat: fn(*mut Tox, c_int) -> c_int;
    tox_invite_friend: fn(*mut Tox, i32, c_int) -> c_int;
    tox_join_groupchat: fn(*mut Tox, i32, *const u8, u16) -> c_int;
    tox_group_message_send: fn(*mut Tox, c_int, *const u8, u16) -> c_int;
    tox_group_action_send: fn(*mut Tox, c_int, *const u8, u16) -> c_int;
    tox_group_set_title: fn(*mut Tox, c_int, *const u8, u8) -> c_int;
    tox_group_get_title: fn(*mut Tox, c_int, *mut u8, u32) -> c_int;
    tox_group_number_peers: fn(*const Tox, c_int) -> c_int;
    tox_group_peername: fn(*const Tox, c_int, c_int, *mut u8) -> c_int;
    tox_group_peer_pubkey: fn(*const Tox, c_int, c_int, *mut u8) -> c_int;
    tox_group_peernumber_is_ours: fn(*const Tox, c_int, c_int) -> c_uint;
    tox_group_get_names: fn(*const Tox, c_int, *mut u8, *mut u16, u16) -> c_int;
    tox_group_get_type: fn(*const Tox, c_int) -> c_int;
    tox_count_chatlist: fn(*const Tox) -> u32;
    tox_get_chatlist: fn(*const Tox, *mut i32, u32) -> u32;

    // Callback registration
    tox_callback_self_connection_status: fn(*mut Tox, Option<SelfConnectionStatusCb>);
    tox_callback_friend_name: fn(*mut Tox, Option<FriendNameCb>);
    tox_callback_friend_status_message: fn(*mut Tox, Option<FriendStatusMessageCb>);
    tox_callback_friend_status: fn(*mut Tox, Option<FriendStatusCb>);
    tox_callback_friend_connection_status: fn(*mut Tox, Option<FriendConnectionStatusCb>);
    tox_callback_friend_typing: fn(*mut Tox, Option<FriendTypingCb>);
    tox_callback_friend_read_receipt: fn(*mut Tox, Option<FriendReadReceiptCb>);
    tox_callback_friend_request: fn(*mut Tox, Option<FriendRequestCb>);
    tox_callback_friend_message: fn(*mut Tox, Option<FriendMessageCb>);
    tox_callback_file_recv_control: fn(*mut Tox, Option<FileRecvControlCb>);
    tox_callback_file_chunk_request: fn(*mut Tox, Option<FileChunkRequestCb>);
    tox_callback_file_recv: fn(*mut Tox, Option<FileRecvCb>);
    tox_callback_file_recv_chunk: fn(*mut Tox, Option<FileRecvChunkCb>);
    tox_callback_friend_lossy_packet: fn(*mut Tox, Option<FriendPacketCb>);
    tox_callback_friend_lossless_packet: fn(*mut Tox, Option<FriendPacketCb>);
    tox_callback_group_invite: fn(*mut Tox, Option<GroupInviteCb>, *mut c_void);
    tox_callback_group_message: fn(*mut Tox, Option<GroupMessageCb>, *mut c_void);
    tox_callback_group_action: fn(*mut Tox, Option<GroupMessageCb>, *mut c_void);
    tox_callback_group_title: fn(*mut Tox, Option<GroupTitleCb>, *mut c_void);
    tox_callback_group_namelist_change: fn(*mut Tox, Option<GroupNamelistChangeCb>, *mut c_void);
}

/// Resolved surfaces, keyed by canonical library path.
///
/// An entry is written once, by the first successful resolution of that
/// path, and never replaced.
static SURFACES: Lazy<DashMap<PathBuf, Arc<Surface>>> = Lazy::new(DashMap::new);

impl Surface {
    /// Resolve from an in-process source and check the engine version.
    pub fn from_source(source: &dyn SymbolSource) -> Result<Arc<Self>, LoadError> {
        let surface = Self::resolve(source)?;
        surface.check_version()?;
        Ok(Arc::new(surface))
    }

    /// Load the library named or located by `name`, reusing a cached table.
    pub fn load(name: &str) -> Result<Arc<Self>, LoadError> {
        let path = loader::resolve_library_path(name)?;
        if let Some(cached) = SURFACES.get(&path) {
            return Ok(Arc::clone(cached.value()));
        }

        // Racing loaders may both resolve; the first insert wins.
        let library = Arc::new(unsafe { NativeLibrary::open(&path)? });
        let mut surface = Self::resolve(library.as_ref())?;
        surface.check_version()?;
        surface._owner = Some(library as Arc<dyn Any + Send + Sync>);
        let surface = Arc::new(surface);

        let entry = SURFACES.entry(path.clone()).or_insert(surface);
        tracing::debug!(path = %path.display(), "engine surface resolved");
        Ok(Arc::clone(entry.value()))
    }

    /// Load the library named by `TOXBIND_LIBRARY`, or `toxcore`.
    pub fn from_env() -> Result<Arc<Self>, LoadError> {
        let name = std::env::var(LIBRARY_ENV).unwrap_or_else(|_| DEFAULT_LIBRARY.to_string());
        Self::load(&name)
    }

    /// Where the symbols came from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Engine version as `(major, minor, patch)`.
    pub fn version(&self) -> (u32, u32, u32) {
        unsafe {
            (
                (self.tox_version_major)(),
                (self.tox_version_minor)(),
                (self.tox_version_patch)(),
            )
        }
    }

    fn check_version(&self) -> Result<(), LoadError> {
        let (major, minor, patch) = self.version();
        let compatible =
            unsafe { (self.tox_version_is_compatible)(VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH) };
        if !compatible {
            return Err(LoadError::IncompatibleVersion {
                found: format!("{major}.{minor}.{patch}"),
                required: format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}"),
            });
        }
        tracing::info!(origin = %self.origin, "engine version {major}.{minor}.{patch}");
        Ok(())
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("origin", &self.origin)
            .field("symbols", &Self::SYMBOLS.len())
            .finish()
    }
}
