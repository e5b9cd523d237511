//! `TOX_ERR_*` out-parameter enums.
//!
//! The engine writes these through a `*mut c_uint`. Value 0 is always `OK`.

use std::ffi::c_uint;

/// One `TOX_ERR_*` family.
pub trait NativeError: Copy + std::fmt::Debug {
    /// C enum name, e.g. `TOX_ERR_BOOTSTRAP`.
    const FAMILY: &'static str;

    fn from_raw(raw: c_uint) -> Option<Self>;

    /// Constant name without the family prefix, e.g. `BAD_HOST`.
    fn name(self) -> &'static str;
}

macro_rules! native_errors {
    ($(
        $(#[$meta:meta])*
        $name:ident => $family:literal {
            $($variant:ident = $value:literal => $text:literal),+ $(,)?
        }
    )+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),+
        }

        impl NativeError for $name {
            const FAMILY: &'static str = $family;

            fn from_raw(raw: c_uint) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }
    )+};
}

native_errors! {
    ErrNew => "TOX_ERR_NEW" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        Malloc = 2 => "MALLOC",
        PortAlloc = 3 => "PORT_ALLOC",
        ProxyBadType = 4 => "PROXY_BAD_TYPE",
        ProxyBadHost = 5 => "PROXY_BAD_HOST",
        ProxyBadPort = 6 => "PROXY_BAD_PORT",
        ProxyNotFound = 7 => "PROXY_NOT_FOUND",
        LoadEncrypted = 8 => "LOAD_ENCRYPTED",
        LoadBadFormat = 9 => "LOAD_BAD_FORMAT",
    }

    ErrBootstrap => "TOX_ERR_BOOTSTRAP" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        BadHost = 2 => "BAD_HOST",
        BadPort = 3 => "BAD_PORT",
    }

    ErrGetPort => "TOX_ERR_GET_PORT" {
        Ok = 0 => "OK",
        NotBound = 1 => "NOT_BOUND",
    }

    ErrSetInfo => "TOX_ERR_SET_INFO" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        TooLong = 2 => "TOO_LONG",
    }

    ErrSetTyping => "TOX_ERR_SET_TYPING" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
    }

    ErrFriendAdd => "TOX_ERR_FRIEND_ADD" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        TooLong = 2 => "TOO_LONG",
        NoMessage = 3 => "NO_MESSAGE",
        OwnKey = 4 => "OWN_KEY",
        AlreadySent = 5 => "ALREADY_SENT",
        BadChecksum = 6 => "BAD_CHECKSUM",
        SetNewNospam = 7 => "SET_NEW_NOSPAM",
        Malloc = 8 => "MALLOC",
    }

    ErrFriendDelete => "TOX_ERR_FRIEND_DELETE" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
    }

    ErrFriendByPublicKey => "TOX_ERR_FRIEND_BY_PUBLIC_KEY" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        NotFound = 2 => "NOT_FOUND",
    }

    ErrFriendGetPublicKey => "TOX_ERR_FRIEND_GET_PUBLIC_KEY" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
    }

    ErrFriendGetLastOnline => "TOX_ERR_FRIEND_GET_LAST_ONLINE" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
    }

    ErrFriendQuery => "TOX_ERR_FRIEND_QUERY" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
    }

    ErrFriendSendMessage => "TOX_ERR_FRIEND_SEND_MESSAGE" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 3 => "FRIEND_NOT_CONNECTED",
        Sendq = 4 => "SENDQ",
        TooLong = 5 => "TOO_LONG",
        Empty = 6 => "EMPTY",
    }

    ErrFileControl => "TOX_ERR_FILE_CONTROL" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 2 => "FRIEND_NOT_CONNECTED",
        NotFound = 3 => "NOT_FOUND",
        NotPaused = 4 => "NOT_PAUSED",
        Denied = 5 => "DENIED",
        AlreadyPaused = 6 => "ALREADY_PAUSED",
        Sendq = 7 => "SENDQ",
    }

    ErrFileSeek => "TOX_ERR_FILE_SEEK" {
        Ok = 0 => "OK",
        FriendNotFound = 1 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 2 => "FRIEND_NOT_CONNECTED",
        NotFound = 3 => "NOT_FOUND",
        Denied = 4 => "DENIED",
        InvalidPosition = 5 => "INVALID_POSITION",
        Sendq = 6 => "SENDQ",
    }

    ErrFileGet => "TOX_ERR_FILE_GET" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
        NotFound = 3 => "NOT_FOUND",
    }

    ErrFileSend => "TOX_ERR_FILE_SEND" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 3 => "FRIEND_NOT_CONNECTED",
        NameTooLong = 4 => "NAME_TOO_LONG",
        TooMany = 5 => "TOO_MANY",
    }

    ErrFileSendChunk => "TOX_ERR_FILE_SEND_CHUNK" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 3 => "FRIEND_NOT_CONNECTED",
        NotFound = 4 => "NOT_FOUND",
        NotTransferring = 5 => "NOT_TRANSFERRING",
        InvalidLength = 6 => "INVALID_LENGTH",
        Sendq = 7 => "SENDQ",
        WrongPosition = 8 => "WRONG_POSITION",
    }

    ErrFriendCustomPacket => "TOX_ERR_FRIEND_CUSTOM_PACKET" {
        Ok = 0 => "OK",
        Null = 1 => "NULL",
        FriendNotFound = 2 => "FRIEND_NOT_FOUND",
        FriendNotConnected = 3 => "FRIEND_NOT_CONNECTED",
        Invalid = 4 => "INVALID",
        Empty = 5 => "EMPTY",
        TooLong = 6 => "TOO_LONG",
        Sendq = 7 => "SENDQ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_maps_known_values() {
        assert_eq!(ErrBootstrap::from_raw(2), Some(ErrBootstrap::BadHost));
        assert_eq!(ErrBootstrap::BadHost.name(), "BAD_HOST");
        assert_eq!(ErrBootstrap::FAMILY, "TOX_ERR_BOOTSTRAP");
    }

    #[test]
    fn unknown_values_are_none() {
        assert_eq!(ErrGetPort::from_raw(2), None);
        assert_eq!(ErrNew::from_raw(u32::MAX), None);
    }
}
