//! Bootstrap, connectivity and persistence.

use std::ffi::c_uint;
use std::time::Duration;

use super::c_string;
use crate::core::{Tick, ToxCore};
use crate::error::{ToxError, check_code, decode_returned};
use crate::invoke::dual;
use crate::keys::{DhtId, PublicKey};
use crate::surface::errors::{ErrBootstrap, ErrGetPort};
use crate::surface::types::{ConnectionStatus, PUBLIC_KEY_SIZE};

impl ToxCore {
    pub(crate) fn bootstrap(&self, host: String, port: u16, public_key: PublicKey) -> Result<(), ToxError> {
        self.with_engine("bootstrap", |s, tox| {
            let host = c_string("bootstrap", "host", &host)?;
            let mut error: c_uint = 0;
            unsafe { (s.tox_bootstrap)(tox, host.as_ptr(), port, public_key.as_bytes().as_ptr(), &mut error) };
            check_code::<ErrBootstrap>("bootstrap", error)
        })
    }

    pub(crate) fn add_tcp_relay(&self, host: String, port: u16, public_key: PublicKey) -> Result<(), ToxError> {
        self.with_engine("add_tcp_relay", |s, tox| {
            let host = c_string("add_tcp_relay", "host", &host)?;
            let mut error: c_uint = 0;
            unsafe { (s.tox_add_tcp_relay)(tox, host.as_ptr(), port, public_key.as_bytes().as_ptr(), &mut error) };
            check_code::<ErrBootstrap>("add_tcp_relay", error)
        })
    }

    pub(crate) fn connection_status(&self) -> Result<ConnectionStatus, ToxError> {
        self.with_engine("connection_status", |s, tox| {
            let raw = unsafe { (s.tox_self_get_connection_status)(tox) };
            decode_returned("connection_status", raw, ConnectionStatus::Udp.raw(), ConnectionStatus::from_raw)
        })
    }

    pub(crate) fn udp_port(&self) -> Result<u16, ToxError> {
        self.with_engine("udp_port", |s, tox| {
            let mut error: c_uint = 0;
            let port = unsafe { (s.tox_self_get_udp_port)(tox, &mut error) };
            check_code::<ErrGetPort>("udp_port", error)?;
            Ok(port)
        })
    }

    pub(crate) fn tcp_port(&self) -> Result<u16, ToxError> {
        self.with_engine("tcp_port", |s, tox| {
            let mut error: c_uint = 0;
            let port = unsafe { (s.tox_self_get_tcp_port)(tox, &mut error) };
            check_code::<ErrGetPort>("tcp_port", error)?;
            Ok(port)
        })
    }

    pub(crate) fn dht_id(&self) -> Result<DhtId, ToxError> {
        self.with_engine("dht_id", |s, tox| {
            let mut out = [0u8; PUBLIC_KEY_SIZE];
            unsafe { (s.tox_self_get_dht_id)(tox, out.as_mut_ptr()) };
            Ok(PublicKey(out))
        })
    }

    pub(crate) fn iteration_interval(&self) -> Result<Duration, ToxError> {
        self.with_engine("iteration_interval", |s, tox| {
            let ms = unsafe { (s.tox_iteration_interval)(tox) };
            Ok(Duration::from_millis(u64::from(ms)))
        })
    }

    pub(crate) fn savedata(&self) -> Result<Vec<u8>, ToxError> {
        self.with_engine("savedata", |s, tox| {
            let size = unsafe { (s.tox_get_savedata_size)(tox) };
            let mut out = vec![0u8; size];
            unsafe { (s.tox_get_savedata)(tox, out.as_mut_ptr()) };
            Ok(out)
        })
    }
}

dual! {
    /// Connect to a DHT node. The host may be a name or an address.
    fn bootstrap / bootstrap_sync(host: String, port: u16, public_key: PublicKey) -> ();
    /// Use a TCP relay for connections the DHT cannot make directly.
    fn add_tcp_relay / add_tcp_relay_sync(host: String, port: u16, public_key: PublicKey) -> ();
    fn connection_status / connection_status_sync() -> ConnectionStatus;
    fn udp_port / udp_port_sync() -> u16;
    fn tcp_port / tcp_port_sync() -> u16;
    fn dht_id / dht_id_sync() -> DhtId;
    /// Delay the engine would like before the next iteration.
    fn iteration_interval / iteration_interval_sync() -> Duration;
    /// Run one tick by hand and publish its events on the calling thread.
    fn iterate / iterate_sync() -> Tick;
    /// Opaque blob for `Savedata::ToxSave`.
    fn savedata / savedata_sync() -> Vec<u8>;
}
