//! The in-memory network shared by every loopback instance in the process.
//!
//! All state lives behind one lock. Operations mutate it and queue the
//! callbacks they cause on the affected nodes. Callbacks only fire when the
//! owning instance calls `tox_iterate`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::abi::Callbacks;
use crate::code;
use crate::savedata::{self, Profile, SavedFriend};

pub(crate) static NETWORK: Lazy<Mutex<Network>> = Lazy::new(|| Mutex::new(Network::default()));

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const ADDRESS_SIZE: usize = 38;
pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;
pub const MAX_FRIEND_REQUEST_LENGTH: usize = 1016;
pub const MAX_MESSAGE_LENGTH: usize = 1372;
pub const MAX_CUSTOM_PACKET_SIZE: usize = 1373;
pub const MAX_FILENAME_LENGTH: usize = 255;
/// Largest chunk requested from a sender at once.
pub const MAX_CHUNK_SIZE: usize = 1371;
/// Ports tried when the options leave both ends of the range at 0.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (33445, 33545);
/// Suggested delay between iterations, in milliseconds.
pub const ITERATION_INTERVAL_MS: u32 = 20;

pub(crate) const CONNECTION_NONE: u32 = 0;
pub(crate) const CONNECTION_TCP: u32 = 1;
pub(crate) const CONNECTION_UDP: u32 = 2;

pub(crate) const CONTROL_RESUME: u32 = 0;
pub(crate) const CONTROL_PAUSE: u32 = 1;
pub(crate) const CONTROL_CANCEL: u32 = 2;

const CHANGE_PEER_ADD: u8 = 0;
const CHANGE_PEER_DEL: u8 = 1;
const GROUP_TYPE_TEXT: u8 = 0;

/// Error value for an out-parameter.
pub type Code = u32;

/// A callback invocation waiting for the owner's next `tox_iterate`.
///
/// Fields carry raw wire values so tests can inject values a real engine
/// would never produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    SelfConnectionStatus { status: u32 },
    FriendRequest { public_key: [u8; PUBLIC_KEY_SIZE], message: Vec<u8> },
    FriendMessage { friend: u32, kind: u32, message: Vec<u8> },
    FriendName { friend: u32, name: Vec<u8> },
    FriendStatusMessage { friend: u32, message: Vec<u8> },
    FriendStatus { friend: u32, status: u32 },
    FriendConnectionStatus { friend: u32, status: u32 },
    FriendTyping { friend: u32, typing: bool },
    FriendReadReceipt { friend: u32, message_id: u32 },
    FileRecvControl { friend: u32, file: u32, control: u32 },
    FileChunkRequest { friend: u32, file: u32, position: u64, length: usize },
    FileRecv { friend: u32, file: u32, kind: u32, size: u64, filename: Vec<u8> },
    FileRecvChunk { friend: u32, file: u32, position: u64, data: Vec<u8> },
    LossyPacket { friend: u32, data: Vec<u8> },
    LosslessPacket { friend: u32, data: Vec<u8> },
    GroupInvite { friend: i32, kind: u8, cookie: Vec<u8> },
    GroupMessage { group: i32, peer: i32, message: Vec<u8> },
    GroupAction { group: i32, peer: i32, action: Vec<u8> },
    GroupTitle { group: i32, peer: i32, title: Vec<u8> },
    GroupNamelistChange { group: i32, peer: i32, change: u8 },
}

#[derive(Debug, Clone, Copy)]
struct Receipt {
    node: u64,
    friend: u32,
    message_id: u32,
}

#[derive(Debug)]
struct Queued {
    callback: Callback,
    /// Read receipt to send back once the recipient has processed this.
    receipt: Option<Receipt>,
}

/// How a new instance obtains its identity.
pub(crate) enum Identity {
    Fresh,
    SecretKey([u8; 32]),
    Profile(Profile),
}

pub(crate) struct NodeConfig {
    pub udp_enabled: bool,
    pub start_port: u16,
    pub end_port: u16,
    pub tcp_port: u16,
    pub identity: Identity,
}

#[derive(Debug, Clone)]
struct KeyPair {
    secret: [u8; 32],
    public: [u8; 32],
}

impl KeyPair {
    fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    fn from_secret(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self {
            secret: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Friend {
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Undelivered request message and the nospam it was addressed to.
    request: Option<(Vec<u8>, u32)>,
    pub name: Vec<u8>,
    pub status_message: Vec<u8>,
    pub status: u32,
    pub connection: u32,
    pub typing: bool,
    pub last_online: u64,
}

impl Friend {
    fn new(public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            public_key,
            request: None,
            name: Vec::new(),
            status_message: Vec::new(),
            status: 0,
            connection: CONNECTION_NONE,
            typing: false,
            last_online: 0,
        }
    }
}

/// One side of a file transfer. Both sides hold a copy that is kept in step.
#[derive(Debug, Clone)]
struct Transfer {
    outgoing: bool,
    peer: u64,
    peer_friend: u32,
    peer_file: u32,
    size: u64,
    position: u64,
    file_id: [u8; 32],
    transferring: bool,
    paused: bool,
}

impl Transfer {
    fn streaming(&self) -> bool {
        self.size == u64::MAX
    }

    fn next_chunk_len(&self) -> usize {
        if self.streaming() {
            MAX_CHUNK_SIZE
        } else {
            let left = self.size.saturating_sub(self.position);
            usize::try_from(left).map_or(MAX_CHUNK_SIZE, |left| left.min(MAX_CHUNK_SIZE))
        }
    }

    fn is_complete(&self) -> bool {
        !self.streaming() && self.position >= self.size
    }
}

#[derive(Debug)]
struct Conference {
    kind: u8,
    title: Vec<u8>,
    members: Vec<u64>,
}

pub(crate) struct Node {
    pub id: u64,
    keys: KeyPair,
    dht_key: [u8; 32],
    pub nospam: u32,
    pub name: Vec<u8>,
    pub status_message: Vec<u8>,
    pub status: u32,
    online: bool,
    pub udp_port: Option<u16>,
    pub tcp_port: Option<u16>,
    friends: BTreeMap<u32, Friend>,
    next_message_id: u32,
    next_file: HashMap<u32, u32>,
    transfers: HashMap<(u32, u32), Transfer>,
    groups: BTreeMap<i32, u64>,
    queue: VecDeque<Queued>,
    pub callbacks: Callbacks,
}

impl Node {
    pub fn public_key(&self) -> [u8; 32] {
        self.keys.public
    }

    pub fn secret_key(&self) -> [u8; 32] {
        self.keys.secret
    }

    pub fn dht_id(&self) -> [u8; 32] {
        self.dht_key
    }

    pub fn address(&self) -> [u8; ADDRESS_SIZE] {
        let mut out = [0u8; ADDRESS_SIZE];
        out[..32].copy_from_slice(&self.keys.public);
        out[32..36].copy_from_slice(&self.nospam.to_be_bytes());
        let sum = address_checksum(&out[..36]);
        out[36..].copy_from_slice(&sum);
        out
    }

    pub fn connection_status(&self) -> u32 {
        match (self.online, self.udp_port.is_some()) {
            (false, _) => CONNECTION_NONE,
            (true, true) => CONNECTION_UDP,
            (true, false) => CONNECTION_TCP,
        }
    }

    pub fn friend(&self, friend: u32) -> Option<&Friend> {
        self.friends.get(&friend)
    }

    pub fn friend_numbers(&self) -> Vec<u32> {
        self.friends.keys().copied().collect()
    }

    pub fn friend_number(&self, public_key: &[u8; 32]) -> Option<u32> {
        self.friends
            .iter()
            .find(|(_, f)| f.public_key == *public_key)
            .map(|(n, _)| *n)
    }

    pub fn file_id(&self, friend: u32, file: u32) -> Option<[u8; 32]> {
        self.transfers.get(&(friend, file)).map(|t| t.file_id)
    }

    pub fn group_numbers(&self) -> Vec<i32> {
        self.groups.keys().copied().collect()
    }

    fn next_friend_number(&self) -> u32 {
        (0u32..).find(|n| !self.friends.contains_key(n)).unwrap_or(u32::MAX)
    }

    fn next_group_number(&self) -> i32 {
        (0i32..).find(|n| !self.groups.contains_key(n)).unwrap_or(i32::MAX)
    }

    fn group_number(&self, conference: u64) -> Option<i32> {
        self.groups
            .iter()
            .find(|(_, gid)| **gid == conference)
            .map(|(n, _)| *n)
    }

    fn push(&mut self, callback: Callback) {
        self.queue.push_back(Queued {
            callback,
            receipt: None,
        });
    }

    pub fn profile(&self) -> Profile {
        Profile {
            secret_key: hex::encode(self.keys.secret),
            nospam: self.nospam,
            name: self.name.clone(),
            status_message: self.status_message.clone(),
            status: self.status,
            friends: self
                .friends
                .values()
                .map(|f| SavedFriend {
                    public_key: hex::encode(f.public_key),
                    name: f.name.clone(),
                    status_message: f.status_message.clone(),
                    last_online: f.last_online,
                })
                .collect(),
        }
    }
}

/// Two-byte XOR checksum over public key and nospam.
pub fn address_checksum(payload: &[u8]) -> [u8; 2] {
    let mut sum = [0u8; 2];
    for (i, byte) in payload.iter().enumerate() {
        sum[i % 2] ^= byte;
    }
    sum
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct PublicProfile {
    name: Vec<u8>,
    status_message: Vec<u8>,
    status: u32,
}

#[derive(Default)]
pub(crate) struct Network {
    nodes: HashMap<u64, Node>,
    next_node: u64,
    conferences: HashMap<u64, Conference>,
    next_conference: u64,
}

impl Network {
    pub fn node(&self, id: u64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: u64) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    fn node_by_key(&self, public_key: &[u8; 32]) -> Option<u64> {
        self.nodes
            .values()
            .find(|n| n.keys.public == *public_key)
            .map(|n| n.id)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    fn allocate_port(&self, start: u16, end: u16) -> Option<u16> {
        let (lo, hi) = match (start, end) {
            (0, 0) => DEFAULT_PORT_RANGE,
            (0, p) | (p, 0) => (p, p),
            (a, b) => (a.min(b), a.max(b)),
        };
        (lo..=hi).find(|port| !self.nodes.values().any(|n| n.udp_port == Some(*port)))
    }

    pub fn create(&mut self, config: NodeConfig) -> Result<u64, Code> {
        let (keys, nospam, profile) = match config.identity {
            Identity::Fresh => (KeyPair::generate(), OsRng.next_u32(), None),
            Identity::SecretKey(secret) => (KeyPair::from_secret(secret), OsRng.next_u32(), None),
            Identity::Profile(profile) => {
                let secret =
                    savedata::parse_key(&profile.secret_key).map_err(|_| code::new::LOAD_BAD_FORMAT)?;
                (KeyPair::from_secret(secret), profile.nospam, Some(profile))
            }
        };
        let udp_port = if config.udp_enabled {
            Some(
                self.allocate_port(config.start_port, config.end_port)
                    .ok_or(code::new::PORT_ALLOC)?,
            )
        } else {
            None
        };

        self.next_node += 1;
        let id = self.next_node;
        let mut node = Node {
            id,
            dht_key: KeyPair::generate().public,
            keys,
            nospam,
            name: Vec::new(),
            status_message: Vec::new(),
            status: 0,
            online: false,
            udp_port,
            tcp_port: (config.tcp_port != 0).then_some(config.tcp_port),
            friends: BTreeMap::new(),
            next_message_id: 0,
            next_file: HashMap::new(),
            transfers: HashMap::new(),
            groups: BTreeMap::new(),
            queue: VecDeque::new(),
            callbacks: Callbacks::default(),
        };
        if let Some(profile) = profile {
            node.name = profile.name;
            node.status_message = profile.status_message;
            node.status = profile.status;
            for saved in profile.friends {
                let Ok(public_key) = savedata::parse_key(&saved.public_key) else {
                    continue;
                };
                let number = node.next_friend_number();
                let mut friend = Friend::new(public_key);
                friend.name = saved.name;
                friend.status_message = saved.status_message;
                friend.last_online = saved.last_online;
                node.friends.insert(number, friend);
            }
        }
        self.nodes.insert(id, node);
        tracing::debug!(node = id, ?udp_port, "loopback instance created");
        Ok(id)
    }

    pub fn kill(&mut self, id: u64) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for conference in node.groups.values() {
            self.leave_conference(id, *conference);
        }
        let now = unix_now();
        for friend in node.friends.values() {
            if friend.connection == CONNECTION_NONE {
                continue;
            }
            if let Some(peer) = self.node_by_key(&friend.public_key) {
                self.drop_link(peer, &node.keys.public, now);
            }
        }
        for peer in self.nodes.values_mut() {
            peer.transfers.retain(|_, t| t.peer != id);
        }
        tracing::debug!(node = id, "loopback instance killed");
    }

    /// Mark the node online and let pending requests and links settle.
    pub fn bootstrap(&mut self, id: u64) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.online {
            return;
        }
        node.online = true;
        let status = node.connection_status();
        node.push(Callback::SelfConnectionStatus { status });
        self.settle(id);
    }

    /// Deliver requests and (re)establish friend links involving `id`.
    fn settle(&mut self, id: u64) {
        let others: Vec<u64> = self.nodes.keys().copied().filter(|o| *o != id).collect();
        for other in others {
            self.deliver_request(id, other);
            self.deliver_request(other, id);
            self.sync_pair(id, other);
        }
    }

    fn deliver_request(&mut self, from: u64, to: u64) {
        let (Some(src), Some(dst)) = (self.nodes.get(&from), self.nodes.get(&to)) else {
            return;
        };
        if !(src.online && dst.online) || dst.friend_number(&src.keys.public).is_some() {
            return;
        }
        let Some(number) = src.friend_number(&dst.keys.public) else {
            return;
        };
        let Some((message, nospam)) = src.friends.get(&number).and_then(|f| f.request.clone()) else {
            return;
        };
        if nospam != dst.nospam {
            return;
        }
        let public_key = src.keys.public;
        if let Some(friend) = self.nodes.get_mut(&from).and_then(|n| n.friends.get_mut(&number)) {
            friend.request = None;
        }
        if let Some(dst) = self.nodes.get_mut(&to) {
            dst.push(Callback::FriendRequest {
                public_key,
                message,
            });
        }
    }

    fn sync_pair(&mut self, a: u64, b: u64) {
        let (Some(na), Some(nb)) = (self.nodes.get(&a), self.nodes.get(&b)) else {
            return;
        };
        let (Some(fa), Some(fb)) = (
            na.friend_number(&nb.keys.public),
            nb.friend_number(&na.keys.public),
        ) else {
            return;
        };
        let status = match (na.online && nb.online, na.udp_port.is_some() && nb.udp_port.is_some()) {
            (false, _) => CONNECTION_NONE,
            (true, true) => CONNECTION_UDP,
            (true, false) => CONNECTION_TCP,
        };
        if na.friends.get(&fa).map(|f| f.connection) == Some(status) {
            return;
        }
        let pa = PublicProfile {
            name: na.name.clone(),
            status_message: na.status_message.clone(),
            status: na.status,
        };
        let pb = PublicProfile {
            name: nb.name.clone(),
            status_message: nb.status_message.clone(),
            status: nb.status,
        };
        let now = unix_now();
        self.apply_link(a, fa, status, now, &pb);
        self.apply_link(b, fb, status, now, &pa);
    }

    fn apply_link(&mut self, id: u64, friend: u32, status: u32, now: u64, other: &PublicProfile) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if let Some(f) = node.friends.get_mut(&friend) {
            f.connection = status;
            f.last_online = now;
            if status == CONNECTION_NONE {
                f.typing = false;
            } else {
                f.request = None;
                f.name = other.name.clone();
                f.status_message = other.status_message.clone();
                f.status = other.status;
            }
        }
        node.push(Callback::FriendConnectionStatus { friend, status });
        if status == CONNECTION_NONE {
            return;
        }
        if !other.name.is_empty() {
            node.push(Callback::FriendName {
                friend,
                name: other.name.clone(),
            });
        }
        if !other.status_message.is_empty() {
            node.push(Callback::FriendStatusMessage {
                friend,
                message: other.status_message.clone(),
            });
        }
        if other.status != 0 {
            node.push(Callback::FriendStatus {
                friend,
                status: other.status,
            });
        }
    }

    fn drop_link(&mut self, id: u64, friend_key: &[u8; 32], now: u64) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let Some(friend) = node.friend_number(friend_key) else {
            return;
        };
        if let Some(f) = node.friends.get_mut(&friend) {
            if f.connection == CONNECTION_NONE {
                return;
            }
            f.connection = CONNECTION_NONE;
            f.typing = false;
            f.last_online = now;
        }
        node.transfers.retain(|(fr, _), _| *fr != friend);
        node.push(Callback::FriendConnectionStatus {
            friend,
            status: CONNECTION_NONE,
        });
    }

    /// Peer node and the peer's friend number for `id`, if the link is up.
    fn peer_of(&self, id: u64, friend: u32) -> Option<(u64, u32)> {
        let node = self.nodes.get(&id)?;
        let f = node.friends.get(&friend)?;
        if f.connection == CONNECTION_NONE {
            return None;
        }
        let peer = self.node_by_key(&f.public_key)?;
        let peer_friend = self.nodes.get(&peer)?.friend_number(&node.keys.public)?;
        Some((peer, peer_friend))
    }

    fn connected_peers(&self, id: u64) -> Vec<(u64, u32)> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.friends
            .keys()
            .filter_map(|f| self.peer_of(id, *f))
            .collect()
    }

    /// Take everything queued for `id`, scheduling read receipts for
    /// delivered messages.
    pub fn drain(&mut self, id: u64) -> Option<(Callbacks, Vec<Callback>)> {
        let node = self.nodes.get_mut(&id)?;
        let queued: Vec<Queued> = node.queue.drain(..).collect();
        let callbacks = node.callbacks;
        let mut out = Vec::with_capacity(queued.len());
        for item in queued {
            if let Some(receipt) = item.receipt {
                if let Some(sender) = self.nodes.get_mut(&receipt.node) {
                    if sender.friends.contains_key(&receipt.friend) {
                        sender.push(Callback::FriendReadReceipt {
                            friend: receipt.friend,
                            message_id: receipt.message_id,
                        });
                    }
                }
            }
            out.push(item.callback);
        }
        Some((callbacks, out))
    }

    /// Queue a raw callback on the instance owning `public_key`.
    pub fn inject(&mut self, public_key: &[u8; 32], callback: Callback) -> bool {
        let Some(id) = self.node_by_key(public_key) else {
            return false;
        };
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.push(callback);
                true
            }
            None => false,
        }
    }

    // ─── Self ────────────────────────────────────────────────────────

    pub fn set_name(&mut self, id: u64, name: &[u8]) -> Result<(), Code> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(code::set_info::TOO_LONG);
        }
        let node = self.nodes.get_mut(&id).ok_or(code::set_info::NULL)?;
        node.name = name.to_vec();
        for (peer, friend) in self.connected_peers(id) {
            if let Some(peer) = self.nodes.get_mut(&peer) {
                if let Some(f) = peer.friends.get_mut(&friend) {
                    f.name = name.to_vec();
                }
                peer.push(Callback::FriendName {
                    friend,
                    name: name.to_vec(),
                });
            }
        }
        Ok(())
    }

    pub fn set_status_message(&mut self, id: u64, message: &[u8]) -> Result<(), Code> {
        if message.len() > MAX_STATUS_MESSAGE_LENGTH {
            return Err(code::set_info::TOO_LONG);
        }
        let node = self.nodes.get_mut(&id).ok_or(code::set_info::NULL)?;
        node.status_message = message.to_vec();
        for (peer, friend) in self.connected_peers(id) {
            if let Some(peer) = self.nodes.get_mut(&peer) {
                if let Some(f) = peer.friends.get_mut(&friend) {
                    f.status_message = message.to_vec();
                }
                peer.push(Callback::FriendStatusMessage {
                    friend,
                    message: message.to_vec(),
                });
            }
        }
        Ok(())
    }

    pub fn set_status(&mut self, id: u64, status: u32) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.status = status;
        for (peer, friend) in self.connected_peers(id) {
            if let Some(peer) = self.nodes.get_mut(&peer) {
                if let Some(f) = peer.friends.get_mut(&friend) {
                    f.status = status;
                }
                peer.push(Callback::FriendStatus { friend, status });
            }
        }
    }

    pub fn set_typing(&mut self, id: u64, friend: u32, typing: bool) -> Result<(), Code> {
        let node = self.nodes.get(&id).ok_or(code::set_typing::FRIEND_NOT_FOUND)?;
        if !node.friends.contains_key(&friend) {
            return Err(code::set_typing::FRIEND_NOT_FOUND);
        }
        if let Some((peer, peer_friend)) = self.peer_of(id, friend) {
            if let Some(peer) = self.nodes.get_mut(&peer) {
                if let Some(f) = peer.friends.get_mut(&peer_friend) {
                    f.typing = typing;
                }
                peer.push(Callback::FriendTyping {
                    friend: peer_friend,
                    typing,
                });
            }
        }
        Ok(())
    }

    // ─── Friends ─────────────────────────────────────────────────────

    pub fn friend_add(&mut self, id: u64, address: &[u8; ADDRESS_SIZE], message: &[u8]) -> Result<u32, Code> {
        if message.len() > MAX_FRIEND_REQUEST_LENGTH {
            return Err(code::friend_add::TOO_LONG);
        }
        if message.is_empty() {
            return Err(code::friend_add::NO_MESSAGE);
        }
        if address_checksum(&address[..36]) != address[36..] {
            return Err(code::friend_add::BAD_CHECKSUM);
        }
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&address[..32]);
        let nospam = u32::from_be_bytes([address[32], address[33], address[34], address[35]]);

        let number = self.add_friend_entry(id, public_key, Some((message.to_vec(), nospam)))?;
        self.settle(id);
        Ok(number)
    }

    pub fn friend_add_norequest(&mut self, id: u64, public_key: &[u8; 32]) -> Result<u32, Code> {
        let number = self.add_friend_entry(id, *public_key, None)?;
        self.settle(id);
        Ok(number)
    }

    fn add_friend_entry(
        &mut self,
        id: u64,
        public_key: [u8; 32],
        request: Option<(Vec<u8>, u32)>,
    ) -> Result<u32, Code> {
        let node = self.nodes.get_mut(&id).ok_or(code::friend_add::NULL)?;
        if public_key == node.keys.public {
            return Err(code::friend_add::OWN_KEY);
        }
        if node.friend_number(&public_key).is_some() {
            return Err(code::friend_add::ALREADY_SENT);
        }
        let number = node.next_friend_number();
        let mut friend = Friend::new(public_key);
        friend.request = request;
        node.friends.insert(number, friend);
        Ok(number)
    }

    pub fn friend_delete(&mut self, id: u64, friend: u32) -> Result<(), Code> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(code::friend_delete::FRIEND_NOT_FOUND)?;
        let removed = node
            .friends
            .remove(&friend)
            .ok_or(code::friend_delete::FRIEND_NOT_FOUND)?;
        node.transfers.retain(|(fr, _), _| *fr != friend);
        let own_key = node.keys.public;
        if removed.connection != CONNECTION_NONE {
            if let Some(peer) = self.node_by_key(&removed.public_key) {
                self.drop_link(peer, &own_key, unix_now());
            }
        }
        Ok(())
    }

    pub fn send_message(&mut self, id: u64, friend: u32, kind: u32, message: &[u8]) -> Result<u32, Code> {
        let node = self.nodes.get(&id).ok_or(code::send_message::NULL)?;
        let f = node
            .friends
            .get(&friend)
            .ok_or(code::send_message::FRIEND_NOT_FOUND)?;
        if f.connection == CONNECTION_NONE {
            return Err(code::send_message::FRIEND_NOT_CONNECTED);
        }
        if message.is_empty() {
            return Err(code::send_message::EMPTY);
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(code::send_message::TOO_LONG);
        }
        let (peer, peer_friend) = self
            .peer_of(id, friend)
            .ok_or(code::send_message::FRIEND_NOT_CONNECTED)?;

        let node = self.nodes.get_mut(&id).ok_or(code::send_message::NULL)?;
        node.next_message_id = node.next_message_id.wrapping_add(1);
        let message_id = node.next_message_id;
        if let Some(peer) = self.nodes.get_mut(&peer) {
            peer.queue.push_back(Queued {
                callback: Callback::FriendMessage {
                    friend: peer_friend,
                    kind,
                    message: message.to_vec(),
                },
                receipt: Some(Receipt {
                    node: id,
                    friend,
                    message_id,
                }),
            });
        }
        Ok(message_id)
    }

    // ─── Files ───────────────────────────────────────────────────────

    pub fn file_send(
        &mut self,
        id: u64,
        friend: u32,
        kind: u32,
        size: u64,
        file_id: Option<[u8; 32]>,
        filename: &[u8],
    ) -> Result<u32, Code> {
        let node = self.nodes.get(&id).ok_or(code::file_send::NULL)?;
        if !node.friends.contains_key(&friend) {
            return Err(code::file_send::FRIEND_NOT_FOUND);
        }
        if filename.len() > MAX_FILENAME_LENGTH {
            return Err(code::file_send::NAME_TOO_LONG);
        }
        let (peer, peer_friend) = self
            .peer_of(id, friend)
            .ok_or(code::file_send::FRIEND_NOT_CONNECTED)?;
        let file_id = file_id.unwrap_or_else(|| {
            let mut id = [0u8; 32];
            OsRng.fill_bytes(&mut id);
            id
        });

        let node = self.nodes.get_mut(&id).ok_or(code::file_send::NULL)?;
        let counter = node.next_file.entry(friend).or_insert(0);
        let file = *counter;
        *counter += 1;
        let peer_file = (file + 1) << 16;
        node.transfers.insert(
            (friend, file),
            Transfer {
                outgoing: true,
                peer,
                peer_friend,
                peer_file,
                size,
                position: 0,
                file_id,
                transferring: false,
                paused: false,
            },
        );
        if let Some(receiver) = self.nodes.get_mut(&peer) {
            receiver.transfers.insert(
                (peer_friend, peer_file),
                Transfer {
                    outgoing: false,
                    peer: id,
                    peer_friend: friend,
                    peer_file: file,
                    size,
                    position: 0,
                    file_id,
                    transferring: false,
                    paused: false,
                },
            );
            receiver.push(Callback::FileRecv {
                friend: peer_friend,
                file: peer_file,
                kind,
                size,
                filename: filename.to_vec(),
            });
        }
        Ok(file)
    }

    /// Apply `f` to both sides of a transfer.
    fn update_transfer(&mut self, id: u64, key: (u32, u32), f: impl Fn(&mut Transfer)) {
        let Some(t) = self.nodes.get_mut(&id).and_then(|n| n.transfers.get_mut(&key)) else {
            return;
        };
        f(t);
        let (peer, peer_key) = (t.peer, (t.peer_friend, t.peer_file));
        if let Some(t) = self.nodes.get_mut(&peer).and_then(|n| n.transfers.get_mut(&peer_key)) {
            f(t);
        }
    }

    fn remove_transfer(&mut self, id: u64, key: (u32, u32)) -> Option<Transfer> {
        let t = self.nodes.get_mut(&id)?.transfers.remove(&key)?;
        if let Some(peer) = self.nodes.get_mut(&t.peer) {
            peer.transfers.remove(&(t.peer_friend, t.peer_file));
        }
        Some(t)
    }

    /// Ask the sending side for its next chunk, or finish the transfer.
    fn request_next_chunk(&mut self, sender: u64, key: (u32, u32)) {
        let Some(t) = self.nodes.get(&sender).and_then(|n| n.transfers.get(&key)).cloned() else {
            return;
        };
        if t.is_complete() {
            self.finish_transfer(sender, key);
            return;
        }
        if let Some(node) = self.nodes.get_mut(&sender) {
            node.push(Callback::FileChunkRequest {
                friend: key.0,
                file: key.1,
                position: t.position,
                length: t.next_chunk_len(),
            });
        }
    }

    fn finish_transfer(&mut self, sender: u64, key: (u32, u32)) {
        let Some(t) = self.remove_transfer(sender, key) else {
            return;
        };
        if let Some(receiver) = self.nodes.get_mut(&t.peer) {
            receiver.push(Callback::FileRecvChunk {
                friend: t.peer_friend,
                file: t.peer_file,
                position: t.position,
                data: Vec::new(),
            });
        }
        if let Some(node) = self.nodes.get_mut(&sender) {
            node.push(Callback::FileChunkRequest {
                friend: key.0,
                file: key.1,
                position: t.position,
                length: 0,
            });
        }
    }

    fn connected_transfer(
        &self,
        id: u64,
        friend: u32,
        file: u32,
        not_found: Code,
        not_connected: Code,
        missing: Code,
    ) -> Result<Transfer, Code> {
        let node = self.nodes.get(&id).ok_or(not_found)?;
        let f = node.friends.get(&friend).ok_or(not_found)?;
        if f.connection == CONNECTION_NONE {
            return Err(not_connected);
        }
        node.transfers.get(&(friend, file)).cloned().ok_or(missing)
    }

    pub fn file_control(&mut self, id: u64, friend: u32, file: u32, control: u32) -> Result<(), Code> {
        use code::file_control::*;

        let t = self.connected_transfer(id, friend, file, FRIEND_NOT_FOUND, FRIEND_NOT_CONNECTED, NOT_FOUND)?;
        let key = (friend, file);
        let peer_key = (t.peer_friend, t.peer_file);
        match control {
            CONTROL_RESUME => {
                if !t.transferring {
                    if t.outgoing {
                        return Err(DENIED);
                    }
                    self.update_transfer(id, key, |t| t.transferring = true);
                } else if t.paused {
                    self.update_transfer(id, key, |t| t.paused = false);
                } else {
                    return Err(NOT_PAUSED);
                }
                if let Some(peer) = self.nodes.get_mut(&t.peer) {
                    peer.push(Callback::FileRecvControl {
                        friend: t.peer_friend,
                        file: t.peer_file,
                        control,
                    });
                }
                let (sender, sender_key) = if t.outgoing { (id, key) } else { (t.peer, peer_key) };
                self.request_next_chunk(sender, sender_key);
            }
            CONTROL_PAUSE => {
                if t.paused {
                    return Err(ALREADY_PAUSED);
                }
                self.update_transfer(id, key, |t| t.paused = true);
                if let Some(peer) = self.nodes.get_mut(&t.peer) {
                    peer.push(Callback::FileRecvControl {
                        friend: t.peer_friend,
                        file: t.peer_file,
                        control,
                    });
                }
            }
            CONTROL_CANCEL => {
                self.remove_transfer(id, key);
                if let Some(peer) = self.nodes.get_mut(&t.peer) {
                    peer.push(Callback::FileRecvControl {
                        friend: t.peer_friend,
                        file: t.peer_file,
                        control,
                    });
                }
            }
            _ => return Err(DENIED),
        }
        Ok(())
    }

    pub fn file_seek(&mut self, id: u64, friend: u32, file: u32, position: u64) -> Result<(), Code> {
        use code::file_seek::*;

        let t = self.connected_transfer(id, friend, file, FRIEND_NOT_FOUND, FRIEND_NOT_CONNECTED, NOT_FOUND)?;
        if t.outgoing || t.transferring {
            return Err(DENIED);
        }
        if !t.streaming() && position >= t.size {
            return Err(INVALID_POSITION);
        }
        self.update_transfer(id, (friend, file), |t| t.position = position);
        Ok(())
    }

    pub fn file_id(&self, id: u64, friend: u32, file: u32) -> Result<[u8; 32], Code> {
        let node = self.nodes.get(&id).ok_or(code::file_get::NULL)?;
        if !node.friends.contains_key(&friend) {
            return Err(code::file_get::FRIEND_NOT_FOUND);
        }
        node.file_id(friend, file).ok_or(code::file_get::NOT_FOUND)
    }

    pub fn file_send_chunk(
        &mut self,
        id: u64,
        friend: u32,
        file: u32,
        position: u64,
        data: &[u8],
    ) -> Result<(), Code> {
        use code::file_send_chunk::*;

        let t = self.connected_transfer(id, friend, file, FRIEND_NOT_FOUND, FRIEND_NOT_CONNECTED, NOT_FOUND)?;
        if !t.outgoing {
            return Err(NOT_FOUND);
        }
        if !t.transferring || t.paused {
            return Err(NOT_TRANSFERRING);
        }
        if position != t.position {
            return Err(WRONG_POSITION);
        }
        let valid_length = if t.streaming() {
            data.len() <= MAX_CHUNK_SIZE
        } else {
            data.len() == t.next_chunk_len()
        };
        if !valid_length {
            return Err(INVALID_LENGTH);
        }

        let key = (friend, file);
        if t.streaming() && data.is_empty() {
            self.finish_transfer(id, key);
            return Ok(());
        }
        if let Some(receiver) = self.nodes.get_mut(&t.peer) {
            receiver.push(Callback::FileRecvChunk {
                friend: t.peer_friend,
                file: t.peer_file,
                position,
                data: data.to_vec(),
            });
        }
        let advanced = position + data.len() as u64;
        self.update_transfer(id, key, |t| t.position = advanced);
        self.request_next_chunk(id, key);
        Ok(())
    }

    // ─── Custom packets ──────────────────────────────────────────────

    pub fn send_packet(&mut self, id: u64, friend: u32, data: &[u8], lossless: bool) -> Result<(), Code> {
        use code::custom_packet::*;

        let node = self.nodes.get(&id).ok_or(NULL)?;
        if !node.friends.contains_key(&friend) {
            return Err(FRIEND_NOT_FOUND);
        }
        let Some(first) = data.first() else {
            return Err(EMPTY);
        };
        let in_range = if lossless {
            (160..=191).contains(first)
        } else {
            (200..=254).contains(first)
        };
        if !in_range {
            return Err(INVALID);
        }
        if data.len() > MAX_CUSTOM_PACKET_SIZE {
            return Err(TOO_LONG);
        }
        let (peer, peer_friend) = self.peer_of(id, friend).ok_or(FRIEND_NOT_CONNECTED)?;
        if let Some(peer) = self.nodes.get_mut(&peer) {
            let data = data.to_vec();
            peer.push(if lossless {
                Callback::LosslessPacket {
                    friend: peer_friend,
                    data,
                }
            } else {
                Callback::LossyPacket {
                    friend: peer_friend,
                    data,
                }
            });
        }
        Ok(())
    }

    // ─── Legacy groups ───────────────────────────────────────────────

    fn conference_of(&self, id: u64, group: i32) -> Option<(u64, &Conference)> {
        let gid = *self.nodes.get(&id)?.groups.get(&group)?;
        Some((gid, self.conferences.get(&gid)?))
    }

    /// Queue `make(local_group, ..)` on every member except `except`.
    fn broadcast(&mut self, gid: u64, except: Option<u64>, make: impl Fn(i32) -> Callback) {
        let Some(members) = self.conferences.get(&gid).map(|c| c.members.clone()) else {
            return;
        };
        for member in members.into_iter().filter(|m| Some(*m) != except) {
            if let Some(node) = self.nodes.get_mut(&member) {
                if let Some(group) = node.group_number(gid) {
                    node.push(make(group));
                }
            }
        }
    }

    pub fn group_new(&mut self, id: u64) -> Option<i32> {
        let node = self.nodes.get_mut(&id)?;
        self.next_conference += 1;
        let gid = self.next_conference;
        let group = node.next_group_number();
        node.groups.insert(group, gid);
        node.push(Callback::GroupNamelistChange {
            group,
            peer: 0,
            change: CHANGE_PEER_ADD,
        });
        self.conferences.insert(
            gid,
            Conference {
                kind: GROUP_TYPE_TEXT,
                title: Vec::new(),
                members: vec![id],
            },
        );
        Some(group)
    }

    pub fn group_delete(&mut self, id: u64, group: i32) -> bool {
        let Some(gid) = self.nodes.get_mut(&id).and_then(|n| n.groups.remove(&group)) else {
            return false;
        };
        self.leave_conference(id, gid);
        true
    }

    fn leave_conference(&mut self, id: u64, gid: u64) {
        let Some(conference) = self.conferences.get_mut(&gid) else {
            return;
        };
        let Some(index) = conference.members.iter().position(|m| *m == id) else {
            return;
        };
        conference.members.remove(index);
        if conference.members.is_empty() {
            self.conferences.remove(&gid);
            return;
        }
        let peer = index as i32;
        self.broadcast(gid, None, |group| Callback::GroupNamelistChange {
            group,
            peer,
            change: CHANGE_PEER_DEL,
        });
    }

    pub fn group_invite(&mut self, id: u64, friend: i32, group: i32) -> bool {
        let Ok(friend) = u32::try_from(friend) else {
            return false;
        };
        let Some((gid, conference)) = self.conference_of(id, group) else {
            return false;
        };
        let kind = conference.kind;
        let Some((peer, peer_friend)) = self.peer_of(id, friend) else {
            return false;
        };
        let Ok(peer_friend) = i32::try_from(peer_friend) else {
            return false;
        };
        if let Some(peer) = self.nodes.get_mut(&peer) {
            peer.push(Callback::GroupInvite {
                friend: peer_friend,
                kind,
                cookie: gid.to_be_bytes().to_vec(),
            });
        }
        true
    }

    pub fn group_join(&mut self, id: u64, friend: i32, cookie: &[u8]) -> Option<i32> {
        let friend = u32::try_from(friend).ok()?;
        if !self.nodes.get(&id)?.friends.contains_key(&friend) {
            return None;
        }
        let gid = u64::from_be_bytes(cookie.try_into().ok()?);
        let conference = self.conferences.get_mut(&gid)?;
        if conference.members.contains(&id) {
            return None;
        }
        let index = conference.members.len() as i32;
        conference.members.push(id);

        self.broadcast(gid, Some(id), |group| Callback::GroupNamelistChange {
            group,
            peer: index,
            change: CHANGE_PEER_ADD,
        });
        let node = self.nodes.get_mut(&id)?;
        let group = node.next_group_number();
        node.groups.insert(group, gid);
        for peer in 0..=index {
            node.push(Callback::GroupNamelistChange {
                group,
                peer,
                change: CHANGE_PEER_ADD,
            });
        }
        Some(group)
    }

    pub fn group_send(&mut self, id: u64, group: i32, text: &[u8], action: bool) -> bool {
        if text.is_empty() {
            return false;
        }
        let Some((gid, conference)) = self.conference_of(id, group) else {
            return false;
        };
        let Some(peer) = conference.members.iter().position(|m| *m == id) else {
            return false;
        };
        let peer = peer as i32;
        self.broadcast(gid, Some(id), |group| {
            if action {
                Callback::GroupAction {
                    group,
                    peer,
                    action: text.to_vec(),
                }
            } else {
                Callback::GroupMessage {
                    group,
                    peer,
                    message: text.to_vec(),
                }
            }
        });
        true
    }

    pub fn group_set_title(&mut self, id: u64, group: i32, title: &[u8]) -> bool {
        if title.len() > MAX_NAME_LENGTH {
            return false;
        }
        let Some((gid, conference)) = self.conference_of(id, group) else {
            return false;
        };
        let Some(peer) = conference.members.iter().position(|m| *m == id) else {
            return false;
        };
        let peer = peer as i32;
        if let Some(conference) = self.conferences.get_mut(&gid) {
            conference.title = title.to_vec();
        }
        self.broadcast(gid, Some(id), |group| Callback::GroupTitle {
            group,
            peer,
            title: title.to_vec(),
        });
        true
    }

    pub fn group_title(&self, id: u64, group: i32) -> Option<Vec<u8>> {
        Some(self.conference_of(id, group)?.1.title.clone())
    }

    pub fn group_kind(&self, id: u64, group: i32) -> Option<u8> {
        Some(self.conference_of(id, group)?.1.kind)
    }

    pub fn group_members(&self, id: u64, group: i32) -> Option<Vec<u64>> {
        Some(self.conference_of(id, group)?.1.members.clone())
    }

    /// The node behind peer `peer` of `group`, as seen from `id`.
    pub fn group_peer(&self, id: u64, group: i32, peer: i32) -> Option<&Node> {
        let members = &self.conference_of(id, group)?.1.members;
        let member = members.get(usize::try_from(peer).ok()?)?;
        self.nodes.get(member)
    }
}
