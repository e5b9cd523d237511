//! `TOX_ERR_*` values written back through error out-parameters.
//!
//! Only the codes the loopback can actually produce are listed.

pub const OK: u32 = 0;

pub mod new {
    pub const NULL: u32 = 1;
    pub const PORT_ALLOC: u32 = 3;
    pub const PROXY_BAD_TYPE: u32 = 4;
    pub const PROXY_BAD_HOST: u32 = 5;
    pub const PROXY_BAD_PORT: u32 = 6;
    pub const LOAD_ENCRYPTED: u32 = 8;
    pub const LOAD_BAD_FORMAT: u32 = 9;
}

pub mod bootstrap {
    pub const NULL: u32 = 1;
    pub const BAD_HOST: u32 = 2;
    pub const BAD_PORT: u32 = 3;
}

pub mod get_port {
    pub const NOT_BOUND: u32 = 1;
}

pub mod set_info {
    pub const NULL: u32 = 1;
    pub const TOO_LONG: u32 = 2;
}

pub mod set_typing {
    pub const FRIEND_NOT_FOUND: u32 = 1;
}

pub mod friend_add {
    pub const NULL: u32 = 1;
    pub const TOO_LONG: u32 = 2;
    pub const NO_MESSAGE: u32 = 3;
    pub const OWN_KEY: u32 = 4;
    pub const ALREADY_SENT: u32 = 5;
    pub const BAD_CHECKSUM: u32 = 6;
}

pub mod friend_delete {
    pub const FRIEND_NOT_FOUND: u32 = 1;
}

pub mod by_public_key {
    pub const NULL: u32 = 1;
    pub const NOT_FOUND: u32 = 2;
}

/// Shared by `TOX_ERR_FRIEND_GET_PUBLIC_KEY` and `TOX_ERR_FRIEND_GET_LAST_ONLINE`.
pub mod friend_get {
    pub const FRIEND_NOT_FOUND: u32 = 1;
}

pub mod query {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
}

pub mod send_message {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
    pub const FRIEND_NOT_CONNECTED: u32 = 3;
    pub const TOO_LONG: u32 = 5;
    pub const EMPTY: u32 = 6;
}

pub mod file_control {
    pub const FRIEND_NOT_FOUND: u32 = 1;
    pub const FRIEND_NOT_CONNECTED: u32 = 2;
    pub const NOT_FOUND: u32 = 3;
    pub const NOT_PAUSED: u32 = 4;
    pub const DENIED: u32 = 5;
    pub const ALREADY_PAUSED: u32 = 6;
}

pub mod file_seek {
    pub const FRIEND_NOT_FOUND: u32 = 1;
    pub const FRIEND_NOT_CONNECTED: u32 = 2;
    pub const NOT_FOUND: u32 = 3;
    pub const DENIED: u32 = 4;
    pub const INVALID_POSITION: u32 = 5;
}

pub mod file_get {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
    pub const NOT_FOUND: u32 = 3;
}

pub mod file_send {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
    pub const FRIEND_NOT_CONNECTED: u32 = 3;
    pub const NAME_TOO_LONG: u32 = 4;
}

pub mod file_send_chunk {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
    pub const FRIEND_NOT_CONNECTED: u32 = 3;
    pub const NOT_FOUND: u32 = 4;
    pub const NOT_TRANSFERRING: u32 = 5;
    pub const INVALID_LENGTH: u32 = 6;
    pub const WRONG_POSITION: u32 = 8;
}

pub mod custom_packet {
    pub const NULL: u32 = 1;
    pub const FRIEND_NOT_FOUND: u32 = 2;
    pub const FRIEND_NOT_CONNECTED: u32 = 3;
    pub const INVALID: u32 = 4;
    pub const EMPTY: u32 = 5;
    pub const TOO_LONG: u32 = 6;
}
