//! Handle lifecycle tests against the loopback engine.
//!
//! Tests cover:
//! - Surface resolution: missing symbols, incompatible engine versions
//! - Creation options: ports, proxies, savedata restore
//! - Release: idempotence, `HandleMissing` for blocking and deferred calls
//! - Blocking and deferred forms returning the same results
//! - Native error codes surfacing with family and name
//! - The background pump

mod common;

use std::ffi::c_void;
use std::sync::mpsc;
use std::time::Duration;

use toxbind_core::error::ErrorKind;
use toxbind_core::surface::types::{ConnectionStatus, ProxyType, UserStatus};
use toxbind_core::{CreateError, LoadError, Options, Proxy, PublicKey, Savedata, Surface, Tox};

use common::{loopback_table, online, surface, tox};

#[test]
fn new_handle_is_stopped_and_quiet() {
    let tox = tox();
    assert!(!tox.is_running());
    assert!(!tox.is_released());
    assert_eq!(tox.pending_events(), 0);
    assert_eq!(tox.subscriber_count(), 0);
    assert_eq!(tox.connection_status_sync().unwrap(), ConnectionStatus::None);
    assert_eq!(tox.version(), (0, 1, 11));
}

#[test]
fn missing_symbol_is_named() {
    let mut table = loopback_table();
    assert!(table.remove("tox_file_seek"));
    let err = Surface::from_source(&table).unwrap_err();
    assert_eq!(
        err,
        LoadError::MissingSymbol {
            library: "in-process engine".to_string(),
            symbol: "tox_file_seek".to_string(),
        }
    );
}

extern "C" fn never_compatible(_major: u32, _minor: u32, _patch: u32) -> bool {
    false
}

#[test]
fn incompatible_engine_is_refused() {
    let mut table = loopback_table();
    table.insert("tox_version_is_compatible", never_compatible as *const c_void);
    let err = Surface::from_source(&table).unwrap_err();
    assert_eq!(
        err,
        LoadError::IncompatibleVersion {
            found: "0.1.11".to_string(),
            required: "0.1.0".to_string(),
        }
    );
}

#[test]
fn open_reports_missing_library() {
    // Only this test touches the variable.
    std::env::set_var("TOXBIND_LIBRARY", "/nonexistent/libtoxcore.so");
    let err = Tox::open(&Options::default()).unwrap_err();
    assert!(matches!(err, CreateError::Load(LoadError::LibraryNotFound(_))));
}

#[test]
fn release_is_idempotent() {
    let tox = tox();
    assert!(tox.release());
    assert!(tox.is_released());
    assert!(!tox.release());
}

#[test]
fn released_handle_fails_before_native_call() {
    let tox = tox();
    tox.release();

    let err = tox.name_sync().unwrap_err();
    assert_eq!(err.operation, "name");
    assert_eq!(err.kind, ErrorKind::HandleMissing);

    // Argument checks come after the handle check.
    let err = tox.set_name_sync("nul\0inside".to_string()).unwrap_err();
    assert!(err.is_handle_missing());

    let err = tox.iterate_sync().unwrap_err();
    assert!(err.is_handle_missing());
    assert!(tox.trampoline_stats().unwrap_err().is_handle_missing());
    assert!(tox.start(None).unwrap_err().is_handle_missing());
}

#[tokio::test]
async fn released_handle_fails_deferred_too() {
    let tox = tox();
    tox.release();
    let err = tox.public_key().await.unwrap_err();
    assert_eq!(err.operation, "public_key");
    assert!(err.is_handle_missing());
}

#[tokio::test]
async fn deferred_matches_blocking() {
    let tox = tox();
    tox.set_name_sync("alice".to_string()).unwrap();
    tox.set_status_sync(UserStatus::Away).unwrap();

    assert_eq!(tox.name().await.unwrap(), tox.name_sync().unwrap());
    assert_eq!(tox.address().await.unwrap(), tox.address_sync().unwrap());
    assert_eq!(tox.status().await.unwrap(), UserStatus::Away);
    assert_eq!(tox.friend_list().await.unwrap(), tox.friend_list_sync().unwrap());
    assert_eq!(
        tox.bootstrap(String::new(), 1, PublicKey([0; 32])).await,
        tox.bootstrap_sync(String::new(), 1, PublicKey([0; 32]))
    );
}

#[test]
fn on_complete_receives_result() {
    let tox = tox();
    tox.set_status_message_sync("busy busy".to_string()).unwrap();
    let (tx, rx) = mpsc::channel();
    tox.status_message().on_complete(move |result| {
        let _ = tx.send(result);
    });
    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.unwrap(), "busy busy");
}

#[test]
fn bootstrap_with_empty_host_names_the_code() {
    let tox = tox();
    let err = tox
        .bootstrap_sync(String::new(), 33445, PublicKey([0; 32]))
        .unwrap_err();
    assert_eq!(err.operation, "bootstrap");
    assert_eq!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_BOOTSTRAP",
            name: "BAD_HOST",
            code: 2,
        }
    );
}

#[test]
fn host_with_nul_is_rejected_locally() {
    let tox = tox();
    let err = tox
        .bootstrap_sync("local\0host".to_string(), 33445, PublicKey([0; 32]))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn bootstrap_goes_online() {
    let tox = tox();
    online(&tox);
    assert_eq!(tox.connection_status_sync().unwrap(), ConnectionStatus::Udp);
}

#[test]
fn exhausted_port_range_is_port_alloc() {
    let options = Options {
        start_port: Some(40001),
        end_port: Some(40001),
        ..Options::default()
    };
    let first = Tox::new(surface(), &options).unwrap();
    assert_eq!(first.udp_port_sync().unwrap(), 40001);

    let err = Tox::new(surface(), &options).unwrap_err();
    assert_eq!(err.operation, "new");
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            name: "PORT_ALLOC",
            ..
        }
    ));

    // Released ports are reusable.
    first.release();
    Tox::new(surface(), &options).unwrap();
}

#[test]
fn udp_disabled_has_no_udp_port() {
    let options = Options {
        udp_enabled: Some(false),
        ..Options::default()
    };
    let tox = Tox::new(surface(), &options).unwrap();
    let err = tox.udp_port_sync().unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_GET_PORT",
            name: "NOT_BOUND",
            ..
        }
    ));
    online(&tox);
    assert_eq!(tox.connection_status_sync().unwrap(), ConnectionStatus::Tcp);
}

#[test]
fn proxy_without_port_is_refused() {
    let options = Options {
        proxy: Some(Proxy {
            kind: ProxyType::Socks5,
            host: "127.0.0.1".to_string(),
            port: 0,
        }),
        ..Options::default()
    };
    let err = Tox::new(surface(), &options).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            name: "PROXY_BAD_PORT",
            ..
        }
    ));
}

#[test]
fn savedata_restores_identity_and_profile() {
    let original = tox();
    original.set_name_sync("alice".to_string()).unwrap();
    original.set_nospam_sync(0x1234_5678).unwrap();
    let key = original.public_key_sync().unwrap();
    let address = original.address_sync().unwrap();
    let blob = original.savedata_sync().unwrap();
    original.release();

    let options = Options::default().with_savedata(Savedata::ToxSave(blob));
    let restored = Tox::new(surface(), &options).unwrap();
    assert_eq!(restored.public_key_sync().unwrap(), key);
    assert_eq!(restored.address_sync().unwrap(), address);
    assert_eq!(restored.name_sync().unwrap(), "alice");
    assert_eq!(restored.nospam_sync().unwrap(), 0x1234_5678);
}

#[test]
fn secret_key_savedata_fixes_public_key() {
    let original = tox();
    let secret = original.secret_key_sync().unwrap();
    let key = original.public_key_sync().unwrap();
    original.release();

    let restored = Tox::new(surface(), &Options::default().with_savedata(Savedata::SecretKey(secret))).unwrap();
    assert_eq!(restored.public_key_sync().unwrap(), key);
    assert_eq!(restored.name_sync().unwrap(), "");
}

#[test]
fn garbage_savedata_is_bad_format() {
    let options = Options::default().with_savedata(Savedata::ToxSave(b"not a profile".to_vec()));
    let err = Tox::new(surface(), &options).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::NativeErrorCode {
            name: "LOAD_BAD_FORMAT",
            ..
        }
    ));
}

#[test]
fn address_checksum_and_parts() {
    let tox = tox();
    let address = tox.address_sync().unwrap();
    assert!(address.checksum_is_valid());
    assert_eq!(address.public_key(), tox.public_key_sync().unwrap());
    assert_eq!(address.nospam(), tox.nospam_sync().unwrap());
}

#[test]
fn name_too_long_is_set_info_error() {
    let tox = tox();
    let err = tox.set_name_sync("x".repeat(200)).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::NativeErrorCode {
            family: "TOX_ERR_SET_INFO",
            name: "TOO_LONG",
            code: 2,
        }
    );
}

#[test]
fn hash_is_stable_and_released_handle_refuses() {
    let tox = tox();
    let a = tox.hash_sync(b"avatar".to_vec()).unwrap();
    let b = tox.hash_sync(b"avatar".to_vec()).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, tox.hash_sync(b"other".to_vec()).unwrap());
    tox.release();
    assert!(tox.hash_sync(b"avatar".to_vec()).unwrap_err().is_handle_missing());
}

#[test]
fn iteration_interval_is_reported() {
    let tox = tox();
    let tick = tox.iterate_sync().unwrap();
    assert!(!tick.skipped);
    assert_eq!(tick.published, 0);
    assert_eq!(tick.next_interval, tox.iteration_interval_sync().unwrap());
}

#[test]
fn pump_starts_and_stops() {
    let tox = tox();
    let (tx, rx) = mpsc::channel();
    tox.subscribe(toxbind_core::Channel::SelfConnectionStatus, move |event| {
        let _ = tx.send(event.clone());
    })
    .unwrap();

    assert!(tox.start(Some(Duration::from_millis(5))).unwrap());
    assert!(!tox.start(None).unwrap());
    assert!(tox.is_running());
    assert_eq!(tox.pump_interval(), Some(Duration::from_millis(5)));

    online(&tox);
    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.is_connected(), Some(true));

    assert!(tox.stop());
    assert!(!tox.is_running());
    assert!(!tox.stop());
    assert_eq!(tox.pump_interval(), None);
}

#[test]
fn release_stops_the_pump() {
    let tox = tox();
    tox.start(None).unwrap();
    assert!(tox.is_running());
    tox.release();
    assert!(!tox.is_running());
}
