//! Struct layouts, size constants and small enums from `tox.h` / `tox_old.h`.

use std::ffi::{c_char, c_uint};

use serde::{Deserialize, Serialize};

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SECRET_KEY_SIZE: usize = 32;
pub const NOSPAM_SIZE: usize = 4;
pub const ADDRESS_SIZE: usize = PUBLIC_KEY_SIZE + NOSPAM_SIZE + 2;
pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;
pub const MAX_FRIEND_REQUEST_LENGTH: usize = 1016;
pub const MAX_MESSAGE_LENGTH: usize = 1372;
pub const MAX_CUSTOM_PACKET_SIZE: usize = 1373;
pub const HASH_LENGTH: usize = 32;
pub const FILE_ID_LENGTH: usize = 32;
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Engine API version this binding was written against.
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Opaque engine instance. Only ever handled through a pointer.
#[repr(C)]
pub struct Tox {
    _private: [u8; 0],
}

/// Mirror of `struct Tox_Options`.
///
/// Filled by `tox_options_default` and then overridden field by field, so
/// the pointers only need to outlive the `tox_new` call.
#[repr(C)]
#[derive(Debug)]
pub struct NativeOptions {
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

impl NativeOptions {
    /// All-zero layout, to be passed to `tox_options_default`.
    pub fn zeroed() -> Self {
        Self {
            ipv6_enabled: false,
            udp_enabled: false,
            local_discovery_enabled: false,
            proxy_type: 0,
            proxy_host: std::ptr::null(),
            proxy_port: 0,
            start_port: 0,
            end_port: 0,
            tcp_port: 0,
            hole_punching_enabled: false,
            savedata_type: 0,
            savedata_data: std::ptr::null(),
            savedata_length: 0,
        }
    }
}

/// Small C enums passed by value. Unknown values decode to `None`.
macro_rules! native_enum {
    ($(
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    )+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub fn from_raw(raw: c_uint) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn raw(self) -> c_uint {
                self as c_uint
            }
        }
    )+};
}

native_enum! {
    /// `TOX_CONNECTION`.
    pub enum ConnectionStatus {
        None = 0,
        Tcp = 1,
        Udp = 2,
    }

    /// `TOX_USER_STATUS`.
    pub enum UserStatus {
        None = 0,
        Away = 1,
        Busy = 2,
    }

    /// `TOX_MESSAGE_TYPE`.
    pub enum MessageType {
        Normal = 0,
        Action = 1,
    }

    /// `TOX_FILE_KIND`.
    pub enum FileKind {
        Data = 0,
        Avatar = 1,
    }

    /// `TOX_FILE_CONTROL`.
    pub enum FileControl {
        Resume = 0,
        Pause = 1,
        Cancel = 2,
    }

    /// `TOX_PROXY_TYPE`.
    pub enum ProxyType {
        None = 0,
        Http = 1,
        Socks5 = 2,
    }

    /// `TOX_SAVEDATA_TYPE`.
    pub enum SavedataType {
        None = 0,
        ToxSave = 1,
        SecretKey = 2,
    }

    /// `TOX_CHAT_CHANGE` from the legacy group API.
    pub enum GroupChange {
        PeerAdd = 0,
        PeerDel = 1,
        PeerName = 2,
    }

    /// `TOX_GROUPCHAT_TYPE` from the legacy group API.
    pub enum GroupType {
        Text = 0,
        Av = 1,
    }
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self != ConnectionStatus::None
    }
}

/// Custom packet family, decided by the packet's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    Lossless,
    Lossy,
}

impl PacketKind {
    pub const LOSSLESS_IDS: std::ops::RangeInclusive<u8> = 160..=191;
    pub const LOSSY_IDS: std::ops::RangeInclusive<u8> = 200..=254;

    pub fn classify(first_byte: u8) -> Option<Self> {
        if Self::LOSSLESS_IDS.contains(&first_byte) {
            Some(PacketKind::Lossless)
        } else if Self::LOSSY_IDS.contains(&first_byte) {
            Some(PacketKind::Lossy)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_enum_round_trip() {
        for raw in 0..3 {
            assert_eq!(FileControl::from_raw(raw).unwrap().raw(), raw);
        }
        assert_eq!(FileControl::from_raw(3), None);
    }

    #[test]
    fn packet_classification_ranges() {
        assert_eq!(PacketKind::classify(160), Some(PacketKind::Lossless));
        assert_eq!(PacketKind::classify(191), Some(PacketKind::Lossless));
        assert_eq!(PacketKind::classify(192), None);
        assert_eq!(PacketKind::classify(200), Some(PacketKind::Lossy));
        assert_eq!(PacketKind::classify(254), Some(PacketKind::Lossy));
        assert_eq!(PacketKind::classify(255), None);
        assert_eq!(PacketKind::classify(0), None);
    }

    #[test]
    fn connection_status_is_connected() {
        assert!(!ConnectionStatus::None.is_connected());
        assert!(ConnectionStatus::Tcp.is_connected());
        assert!(ConnectionStatus::Udp.is_connected());
    }

    #[test]
    fn address_size_matches_header() {
        assert_eq!(ADDRESS_SIZE, 38);
    }
}
