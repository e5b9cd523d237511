//! Binding and event-adaptation layer over the libtoxcore C ABI.
//!
//! Resolves the engine's entry points into a typed [`Surface`], owns engine
//! instances through [`Tox`], turns native callbacks into [`Event`]s for
//! subscribers, and exposes every operation both as a blocking `*_sync`
//! call and as a [`Deferred`] one.

pub mod bridge;
pub mod core;
pub mod error;
pub mod event;
pub mod handle;
pub mod invoke;
pub mod keys;
mod ops;
mod pump;
pub mod surface;

use once_cell::sync::Lazy;

pub use crate::bridge::subscribers::SubscriptionId;
pub use crate::bridge::trampoline::{Slot, SlotStats};
pub use crate::core::Tick;
pub use crate::error::{CreateError, ErrorKind, ToxError};
pub use crate::event::{Channel, Event};
pub use crate::handle::{Options, Proxy, Savedata, Tox};
pub use crate::invoke::Deferred;
pub use crate::keys::{Address, DhtId, FileId, Hash, PublicKey, SecretKey};
pub use crate::surface::{LoadError, Surface, SymbolSource, SymbolTable};

/// Shared tokio runtime for deferred calls and their continuations.
/// Two worker threads; blocking native calls go to its blocking pool.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("toxbind-rt")
        .build()
        .expect("failed to create tokio runtime")
});
