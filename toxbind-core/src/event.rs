//! Decoded engine events.
//!
//! Every payload is an owned copy. The constructors take raw discriminants
//! and classify them once, so consumers never see native codes.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::keys::PublicKey;
use crate::surface::types::{
    ConnectionStatus, FileControl, FileKind, GroupChange, GroupType, MessageType, PacketKind, UserStatus,
};

/// Why a trampoline could not turn native arguments into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("`{field}` is null but has length {len}")]
    NullBuffer { field: &'static str, len: usize },
    #[error("`{field}` has unknown value {raw}")]
    UnknownDiscriminant { field: &'static str, raw: i64 },
    #[error("`{field}` is negative ({raw})")]
    NegativeIndex { field: &'static str, raw: i64 },
    #[error("packet id {id} does not belong on the {slot} channel")]
    PacketKindMismatch { id: u8, slot: &'static str },
    #[error("empty custom packet")]
    EmptyPacket,
    #[error("trampoline panicked while decoding")]
    Panicked,
}

fn decode<T>(field: &'static str, raw: u32, f: impl FnOnce(u32) -> Option<T>) -> Result<T, DecodeError> {
    f(raw).ok_or(DecodeError::UnknownDiscriminant {
        field,
        raw: i64::from(raw),
    })
}

fn index(field: &'static str, raw: i32) -> Result<u32, DecodeError> {
    u32::try_from(raw).map_err(|_| DecodeError::NegativeIndex {
        field,
        raw: i64::from(raw),
    })
}

/// Engine text is meant to be UTF-8; invalid sequences become U+FFFD.
pub(crate) fn lossy_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendRequest {
    pub public_key: PublicKey,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendMessage {
    pub friend: u32,
    pub kind: MessageType,
    pub text: String,
}

impl FriendMessage {
    pub fn is_action(&self) -> bool {
        self.kind == MessageType::Action
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecvControl {
    pub friend: u32,
    pub file: u32,
    pub control: FileControl,
}

impl FileRecvControl {
    pub fn is_resume(&self) -> bool {
        self.control == FileControl::Resume
    }

    pub fn is_pause(&self) -> bool {
        self.control == FileControl::Pause
    }

    pub fn is_cancel(&self) -> bool {
        self.control == FileControl::Cancel
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChunkRequest {
    pub friend: u32,
    pub file: u32,
    pub position: u64,
    pub length: usize,
}

impl FileChunkRequest {
    /// A zero-length request means the transfer is complete.
    pub fn is_complete(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecv {
    pub friend: u32,
    pub file: u32,
    pub kind: FileKind,
    pub size: u64,
    pub filename: String,
}

impl FileRecv {
    pub fn is_avatar(&self) -> bool {
        self.kind == FileKind::Avatar
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecvChunk {
    pub friend: u32,
    pub file: u32,
    pub position: u64,
    pub data: Vec<u8>,
}

impl FileRecvChunk {
    /// An empty chunk marks the end of the file.
    pub fn is_final_chunk(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomPacket {
    pub friend: u32,
    pub kind: PacketKind,
    pub data: Vec<u8>,
}

impl CustomPacket {
    pub fn is_lossless(&self) -> bool {
        self.kind == PacketKind::Lossless
    }

    pub fn is_lossy(&self) -> bool {
        self.kind == PacketKind::Lossy
    }

    /// First byte of the packet, which selects the application protocol.
    pub fn packet_id(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInvite {
    pub friend: u32,
    pub group_type: GroupType,
    /// Opaque cookie to pass back to `group_join`.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMessage {
    pub group: u32,
    pub peer: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNamelistChange {
    pub group: u32,
    pub peer: u32,
    pub change: GroupChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTitle {
    pub group: u32,
    pub peer: u32,
    pub title: String,
}

/// One decoded engine callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    SelfConnectionStatus { status: ConnectionStatus },
    FriendRequest(FriendRequest),
    FriendMessage(FriendMessage),
    FriendName { friend: u32, name: String },
    FriendStatusMessage { friend: u32, message: String },
    FriendStatus { friend: u32, status: UserStatus },
    FriendConnectionStatus { friend: u32, status: ConnectionStatus },
    FriendTyping { friend: u32, is_typing: bool },
    FriendReadReceipt { friend: u32, message_id: u32 },
    FileRecvControl(FileRecvControl),
    FileChunkRequest(FileChunkRequest),
    FileRecv(FileRecv),
    FileRecvChunk(FileRecvChunk),
    CustomPacket(CustomPacket),
    GroupInvite(GroupInvite),
    GroupMessage(GroupMessage),
    GroupAction(GroupMessage),
    GroupNamelistChange(GroupNamelistChange),
    GroupTitle(GroupTitle),
}

impl Event {
    pub fn self_connection_status(raw: u32) -> Result<Self, DecodeError> {
        Ok(Event::SelfConnectionStatus {
            status: decode("connection_status", raw, ConnectionStatus::from_raw)?,
        })
    }

    pub fn friend_request(public_key: PublicKey, message: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::FriendRequest(FriendRequest {
            public_key,
            message: lossy_text(message),
        }))
    }

    pub fn friend_message(friend: u32, raw_kind: u32, message: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::FriendMessage(FriendMessage {
            friend,
            kind: decode("message_type", raw_kind, MessageType::from_raw)?,
            text: lossy_text(message),
        }))
    }

    pub fn friend_name(friend: u32, name: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::FriendName {
            friend,
            name: lossy_text(name),
        })
    }

    pub fn friend_status_message(friend: u32, message: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::FriendStatusMessage {
            friend,
            message: lossy_text(message),
        })
    }

    pub fn friend_status(friend: u32, raw: u32) -> Result<Self, DecodeError> {
        Ok(Event::FriendStatus {
            friend,
            status: decode("user_status", raw, UserStatus::from_raw)?,
        })
    }

    pub fn friend_connection_status(friend: u32, raw: u32) -> Result<Self, DecodeError> {
        Ok(Event::FriendConnectionStatus {
            friend,
            status: decode("connection_status", raw, ConnectionStatus::from_raw)?,
        })
    }

    pub fn friend_typing(friend: u32, is_typing: bool) -> Result<Self, DecodeError> {
        Ok(Event::FriendTyping { friend, is_typing })
    }

    pub fn friend_read_receipt(friend: u32, message_id: u32) -> Result<Self, DecodeError> {
        Ok(Event::FriendReadReceipt { friend, message_id })
    }

    pub fn file_chunk_request(friend: u32, file: u32, position: u64, length: usize) -> Result<Self, DecodeError> {
        Ok(Event::FileChunkRequest(FileChunkRequest {
            friend,
            file,
            position,
            length,
        }))
    }

    pub fn file_recv_chunk(friend: u32, file: u32, position: u64, data: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::FileRecvChunk(FileRecvChunk {
            friend,
            file,
            position,
            data,
        }))
    }

    pub fn file_recv_control(friend: u32, file: u32, raw: u32) -> Result<Self, DecodeError> {
        Ok(Event::FileRecvControl(FileRecvControl {
            friend,
            file,
            control: decode("file_control", raw, FileControl::from_raw)?,
        }))
    }

    pub fn file_recv(
        friend: u32,
        file: u32,
        raw_kind: u32,
        size: u64,
        filename: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        Ok(Event::FileRecv(FileRecv {
            friend,
            file,
            kind: decode("file_kind", raw_kind, FileKind::from_raw)?,
            size,
            filename: lossy_text(filename),
        }))
    }

    /// `expected` is the family implied by the callback slot the packet came through.
    pub fn custom_packet(friend: u32, expected: PacketKind, data: Vec<u8>) -> Result<Self, DecodeError> {
        let id = *data.first().ok_or(DecodeError::EmptyPacket)?;
        let slot = match expected {
            PacketKind::Lossless => "lossless",
            PacketKind::Lossy => "lossy",
        };
        match PacketKind::classify(id) {
            Some(kind) if kind == expected => Ok(Event::CustomPacket(CustomPacket { friend, kind, data })),
            _ => Err(DecodeError::PacketKindMismatch { id, slot }),
        }
    }

    pub fn group_invite(friend: i32, group_type: u8, data: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::GroupInvite(GroupInvite {
            friend: index("friend", friend)?,
            group_type: decode("group_type", u32::from(group_type), GroupType::from_raw)?,
            data,
        }))
    }

    pub fn group_message(group: i32, peer: i32, message: Vec<u8>, is_action: bool) -> Result<Self, DecodeError> {
        let message = GroupMessage {
            group: index("group", group)?,
            peer: index("peer", peer)?,
            text: lossy_text(message),
        };
        Ok(if is_action {
            Event::GroupAction(message)
        } else {
            Event::GroupMessage(message)
        })
    }

    pub fn group_namelist_change(group: i32, peer: i32, raw_change: u8) -> Result<Self, DecodeError> {
        Ok(Event::GroupNamelistChange(GroupNamelistChange {
            group: index("group", group)?,
            peer: index("peer", peer)?,
            change: decode("group_change", u32::from(raw_change), GroupChange::from_raw)?,
        }))
    }

    pub fn group_title(group: i32, peer: i32, title: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(Event::GroupTitle(GroupTitle {
            group: index("group", group)?,
            peer: index("peer", peer)?,
            title: lossy_text(title),
        }))
    }

    /// The subscription channel this event is published on.
    pub fn channel(&self) -> Channel {
        match self {
            Event::SelfConnectionStatus { .. } => Channel::SelfConnectionStatus,
            Event::FriendRequest(_) => Channel::FriendRequest,
            Event::FriendMessage(_) => Channel::FriendMessage,
            Event::FriendName { .. } => Channel::FriendName,
            Event::FriendStatusMessage { .. } => Channel::FriendStatusMessage,
            Event::FriendStatus { .. } => Channel::FriendStatus,
            Event::FriendConnectionStatus { .. } => Channel::ConnectionStatus,
            Event::FriendTyping { .. } => Channel::FriendTyping,
            Event::FriendReadReceipt { .. } => Channel::ReadReceipt,
            Event::FileRecvControl(_) => Channel::FileControl,
            Event::FileChunkRequest(_) => Channel::FileChunkRequest,
            Event::FileRecv(_) => Channel::FileRecv,
            Event::FileRecvChunk(_) => Channel::FileRecvChunk,
            Event::CustomPacket(_) => Channel::CustomPacket,
            Event::GroupInvite(_) => Channel::GroupInvite,
            Event::GroupMessage(_) => Channel::GroupMessage,
            Event::GroupAction(_) => Channel::GroupAction,
            Event::GroupNamelistChange(_) => Channel::GroupNamelistChange,
            Event::GroupTitle(_) => Channel::GroupTitle,
        }
    }

    /// Whether a connection-status event reports a live connection.
    pub fn is_connected(&self) -> Option<bool> {
        match self {
            Event::SelfConnectionStatus { status } | Event::FriendConnectionStatus { status, .. } => {
                Some(status.is_connected())
            }
            _ => None,
        }
    }
}

/// Named subscription channels, one per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    SelfConnectionStatus,
    FriendRequest,
    FriendMessage,
    FriendName,
    FriendStatusMessage,
    FriendStatus,
    ConnectionStatus,
    FriendTyping,
    ReadReceipt,
    FileControl,
    FileChunkRequest,
    FileRecv,
    FileRecvChunk,
    CustomPacket,
    GroupInvite,
    GroupMessage,
    GroupAction,
    GroupNamelistChange,
    GroupTitle,
}

impl Channel {
    pub const ALL: [Channel; 19] = [
        Channel::SelfConnectionStatus,
        Channel::FriendRequest,
        Channel::FriendMessage,
        Channel::FriendName,
        Channel::FriendStatusMessage,
        Channel::FriendStatus,
        Channel::ConnectionStatus,
        Channel::FriendTyping,
        Channel::ReadReceipt,
        Channel::FileControl,
        Channel::FileChunkRequest,
        Channel::FileRecv,
        Channel::FileRecvChunk,
        Channel::CustomPacket,
        Channel::GroupInvite,
        Channel::GroupMessage,
        Channel::GroupAction,
        Channel::GroupNamelistChange,
        Channel::GroupTitle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::SelfConnectionStatus => "self-connection-status",
            Channel::FriendRequest => "friend-request",
            Channel::FriendMessage => "friend-message",
            Channel::FriendName => "friend-name",
            Channel::FriendStatusMessage => "friend-status-message",
            Channel::FriendStatus => "friend-status",
            Channel::ConnectionStatus => "connection-status",
            Channel::FriendTyping => "friend-typing",
            Channel::ReadReceipt => "read-receipt",
            Channel::FileControl => "file-control",
            Channel::FileChunkRequest => "file-chunk-request",
            Channel::FileRecv => "file-recv",
            Channel::FileRecvChunk => "file-recv-chunk",
            Channel::CustomPacket => "custom-packet",
            Channel::GroupInvite => "group-invite",
            Channel::GroupMessage => "group-message",
            Channel::GroupAction => "group-action",
            Channel::GroupNamelistChange => "group-namelist-change",
            Channel::GroupTitle => "group-title",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event channel `{0}`")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}
