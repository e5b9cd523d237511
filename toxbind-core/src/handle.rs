//! The public handle manager and its creation options.

use std::ffi::{CString, c_uint};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bridge::subscribers::SubscriptionId;
use crate::bridge::trampoline::SlotStats;
use crate::core::ToxCore;
use crate::error::{CreateError, ErrorKind, ToxError, check_code};
use crate::event::{Channel, Event};
use crate::keys::SecretKey;
use crate::pump;
use crate::surface::Surface;
use crate::surface::errors::ErrNew;
use crate::surface::types::{NativeOptions, ProxyType, SavedataType};

// ─── Options ─────────────────────────────────────────────────────────

/// Proxy settings. `host` must not contain NUL bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(rename = "type")]
    pub kind: ProxyType,
    /// Hostname or IP address.
    pub host: String,
    /// Must be non-zero.
    pub port: u16,
}

/// State to restore into a new instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Savedata {
    /// A blob previously returned by `savedata()`.
    ToxSave(Vec<u8>),
    /// Identity only: friends and settings start empty.
    SecretKey(SecretKey),
}

impl fmt::Debug for Savedata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Savedata::ToxSave(bytes) => write!(f, "ToxSave({} bytes)", bytes.len()),
            Savedata::SecretKey(_) => f.write_str("SecretKey(..)"),
        }
    }
}

/// Creation options. Unset fields keep the engine's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Use IPv6 sockets where available.
    pub ipv6_enabled: Option<bool>,
    /// Bind a UDP socket. Without it the instance is TCP-only.
    pub udp_enabled: Option<bool>,
    /// Discover peers on the local network.
    pub local_discovery_enabled: Option<bool>,
    /// Route connections through an HTTP or SOCKS5 proxy.
    pub proxy: Option<Proxy>,
    /// First port tried for the UDP socket.
    pub start_port: Option<u16>,
    /// Last port tried for the UDP socket.
    pub end_port: Option<u16>,
    /// Port for the local TCP relay server; 0 disables it.
    pub tcp_port: Option<u16>,
    /// Attempt UDP hole punching.
    pub hole_punching_enabled: Option<bool>,
    /// Identity or profile to restore.
    pub savedata: Option<Savedata>,
}

impl Options {
    /// Parse options from TOML, e.g. a `[tox]` table of a host config file.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_savedata(mut self, savedata: Savedata) -> Self {
        self.savedata = Some(savedata);
        self
    }

    /// Fill `native` (already defaulted by the engine) from the set fields.
    ///
    /// Pointers written into `native` borrow from `self` and `proxy_host`.
    fn apply<'a>(&'a self, native: &mut NativeOptions, proxy_host: Option<&'a CString>) {
        if let Some(v) = self.ipv6_enabled {
            native.ipv6_enabled = v;
        }
        if let Some(v) = self.udp_enabled {
            native.udp_enabled = v;
        }
        if let Some(v) = self.local_discovery_enabled {
            native.local_discovery_enabled = v;
        }
        if let (Some(proxy), Some(host)) = (&self.proxy, proxy_host) {
            native.proxy_type = proxy.kind.raw();
            native.proxy_host = host.as_ptr();
            native.proxy_port = proxy.port;
        }
        if let Some(v) = self.start_port {
            native.start_port = v;
        }
        if let Some(v) = self.end_port {
            native.end_port = v;
        }
        if let Some(v) = self.tcp_port {
            native.tcp_port = v;
        }
        if let Some(v) = self.hole_punching_enabled {
            native.hole_punching_enabled = v;
        }
        match &self.savedata {
            Some(Savedata::ToxSave(bytes)) => {
                native.savedata_type = SavedataType::ToxSave.raw();
                native.savedata_data = bytes.as_ptr();
                native.savedata_length = bytes.len();
            }
            Some(Savedata::SecretKey(key)) => {
                native.savedata_type = SavedataType::SecretKey.raw();
                native.savedata_data = key.as_bytes().as_ptr();
                native.savedata_length = key.as_bytes().len();
            }
            None => {}
        }
    }
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Owner of one engine instance.
///
/// Not `Clone`: exactly one manager exists per instance. Dropping it
/// releases the instance.
pub struct Tox {
    pub(crate) core: Arc<ToxCore>,
}

impl Tox {
    /// Create an instance on an already resolved surface.
    ///
    /// The handle starts stopped, with no pending events.
    pub fn new(surface: Arc<Surface>, options: &Options) -> Result<Self, ToxError> {
        let proxy_host = options
            .proxy
            .as_ref()
            .map(|p| CString::new(p.host.as_str()))
            .transpose()
            .map_err(|_| ToxError::invalid_argument("new", "proxy host contains a NUL byte"))?;

        let mut native = NativeOptions::zeroed();
        // SAFETY: `native` is a valid, writable Tox_Options.
        unsafe { (surface.tox_options_default)(&mut native) };
        options.apply(&mut native, proxy_host.as_ref());

        let mut error: c_uint = 0;
        // SAFETY: every pointer in `native` borrows from `options` or
        // `proxy_host`, both alive for the duration of the call.
        let ptr = unsafe { (surface.tox_new)(&native, &mut error) };
        check_code::<ErrNew>("new", error)?;
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            ToxError::new(
                "new",
                ErrorKind::UnexpectedReturn {
                    expected: 1,
                    actual: 0,
                },
            )
        })?;

        // SAFETY: `ptr` is a fresh instance owned by nobody else.
        let core = unsafe { ToxCore::adopt(surface, ptr) };
        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// Load the engine named by `TOXBIND_LIBRARY` and create an instance.
    pub fn open(options: &Options) -> Result<Self, CreateError> {
        let surface = Surface::from_env()?;
        Ok(Self::new(surface, options)?)
    }

    /// Process-unique id, as used in log fields.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Engine version as `(major, minor, patch)`.
    pub fn version(&self) -> (u32, u32, u32) {
        self.core.surface().version()
    }

    /// Stop the pump and destroy the engine instance. Idempotent.
    ///
    /// Returns `false` if the handle was already released.
    pub fn release(&self) -> bool {
        self.core.release()
    }

    pub fn is_released(&self) -> bool {
        self.core.is_released()
    }

    // ─── Pump ────────────────────────────────────────────────────────

    /// Start ticking on a background thread.
    ///
    /// With `None` the engine's suggested interval is used after each tick.
    /// Returns `Ok(false)` if the pump was already running.
    pub fn start(&self, interval: Option<Duration>) -> Result<bool, ToxError> {
        if self.core.is_released() {
            return Err(ToxError::handle_missing("start"));
        }
        Ok(pump::start(&self.core, interval))
    }

    /// Stop the pump, waiting for the current tick. Returns whether it ran.
    pub fn stop(&self) -> bool {
        pump::stop(&self.core)
    }

    pub fn is_running(&self) -> bool {
        pump::is_running(&self.core)
    }

    /// Interval the pump was started with, if fixed.
    pub fn pump_interval(&self) -> Option<Duration> {
        pump::fixed_interval(&self.core)
    }

    /// Events decoded but not yet published. Zero outside a tick.
    pub fn pending_events(&self) -> usize {
        self.core.pending_events()
    }

    /// Delivered and rejected counts per callback slot.
    pub fn trampoline_stats(&self) -> Result<Vec<SlotStats>, ToxError> {
        self.core.trampoline_stats()
    }

    // ─── Subscriptions ───────────────────────────────────────────────

    /// Call `handler` for every event on `channel`. Fails with
    /// `HandleMissing` once the handle is released.
    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Result<SubscriptionId, ToxError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.core
            .bus
            .subscribe(Some(channel), Arc::new(handler))
            .ok_or_else(|| ToxError::handle_missing("subscribe"))
    }

    pub fn subscribe_all<F>(&self, handler: F) -> Result<SubscriptionId, ToxError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.core
            .bus
            .subscribe(None, Arc::new(handler))
            .ok_or_else(|| ToxError::handle_missing("subscribe_all"))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.bus.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.core.bus.len()
    }

    /// Receive one channel's events as a stream. Ends when the handle is
    /// released; on a released handle it is already ended.
    pub fn events(&self, channel: Channel) -> mpsc::UnboundedReceiver<Event> {
        self.core.bus.channel_receiver(Some(channel))
    }

    /// Receive every event as a stream. Same lifetime as [`Tox::events`].
    pub fn all_events(&self) -> mpsc::UnboundedReceiver<Event> {
        self.core.bus.channel_receiver(None)
    }
}

impl Drop for Tox {
    fn drop(&mut self) {
        self.core.release();
    }
}

impl fmt::Debug for Tox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tox")
            .field("id", &self.core.id)
            .field("released", &self.is_released())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let options = Options::from_toml("").unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let options = Options::from_toml(
            r#"
            udp_enabled = false
            start_port = 33445
            end_port = 33455

            [proxy]
            type = "socks5"
            host = "127.0.0.1"
            port = 9050
            "#,
        )
        .unwrap();
        assert_eq!(options.udp_enabled, Some(false));
        assert_eq!(options.ipv6_enabled, None);
        assert_eq!(options.start_port, Some(33445));
        let proxy = options.proxy.unwrap();
        assert_eq!(proxy.kind, ProxyType::Socks5);
        assert_eq!(proxy.port, 9050);
    }

    #[test]
    fn unknown_proxy_type_is_rejected() {
        let err = Options::from_toml("[proxy]\ntype = \"carrier-pigeon\"\nhost = \"x\"\nport = 1\n");
        assert!(err.is_err());
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut native = NativeOptions::zeroed();
        native.ipv6_enabled = true;
        native.udp_enabled = true;
        native.start_port = 1000;

        let options = Options {
            udp_enabled: Some(false),
            tcp_port: Some(443),
            ..Options::default()
        };
        options.apply(&mut native, None);
        assert!(native.ipv6_enabled);
        assert!(!native.udp_enabled);
        assert_eq!(native.start_port, 1000);
        assert_eq!(native.tcp_port, 443);
        assert!(native.savedata_data.is_null());
    }

    #[test]
    fn savedata_is_pointed_at_not_copied() {
        let options = Options::default().with_savedata(Savedata::ToxSave(vec![1, 2, 3]));
        let mut native = NativeOptions::zeroed();
        options.apply(&mut native, None);
        assert_eq!(native.savedata_type, SavedataType::ToxSave.raw());
        assert_eq!(native.savedata_length, 3);
        let Some(Savedata::ToxSave(bytes)) = &options.savedata else {
            unreachable!()
        };
        assert_eq!(native.savedata_data, bytes.as_ptr());
    }

    #[test]
    fn savedata_debug_hides_contents() {
        let key = SecretKey([7; 32]);
        assert_eq!(format!("{:?}", Savedata::SecretKey(key)), "SecretKey(..)");
        assert_eq!(format!("{:?}", Savedata::ToxSave(vec![0; 10])), "ToxSave(10 bytes)");
    }
}
