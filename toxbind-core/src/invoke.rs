//! Dual-mode invocation: every operation is callable blocking or deferred.
//!
//! Both forms are generated by [`dual!`] from a single declaration and run
//! the same `ToxCore` method, so decoding and error mapping exist once.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::RUNTIME;
use crate::error::ToxError;

type Outcome<R> = Result<Result<R, ToxError>, Box<dyn Any + Send>>;

/// Result of an operation scheduled on the shared runtime.
///
/// Await it, or hand it a continuation with [`Deferred::on_complete`]. The
/// call runs to completion whether or not anyone observes it; an error
/// nobody observes is logged.
#[must_use = "a dropped Deferred still runs, but its result is lost"]
pub struct Deferred<R> {
    operation: &'static str,
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R: Send + 'static> Deferred<R> {
    pub(crate) fn spawn<F>(operation: &'static str, job: F) -> Self
    where
        F: FnOnce() -> Result<R, ToxError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        RUNTIME.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            match tx.send(outcome) {
                Ok(()) | Err(Ok(Ok(_))) => {}
                Err(Ok(Err(error))) => {
                    tracing::warn!(operation, %error, "deferred call failed with nobody waiting");
                }
                Err(Err(payload)) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(operation, payload = message, "deferred call panicked with nobody waiting");
                }
            }
        });
        Self { operation, rx }
    }

    /// Deliver the result to `handler` on the shared runtime.
    ///
    /// If the call panicked there is no result: the panic is logged and
    /// `handler` is dropped uncalled.
    pub fn on_complete<F>(self, handler: F)
    where
        F: FnOnce(Result<R, ToxError>) + Send + 'static,
    {
        let operation = self.operation;
        RUNTIME.spawn(async move {
            match self.rx.await {
                Ok(Ok(result)) => handler(result),
                Ok(Err(payload)) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(operation, payload = message, "deferred call panicked before completion");
                }
                Err(_) => tracing::error!(operation, "deferred call was abandoned by the runtime"),
            }
        });
    }
}

/// Text of a panic payload, for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<R> Deferred<R> {
    /// Name of the scheduled operation.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl<R> Future for Deferred<R> {
    type Output = Result<R, ToxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(result))) => Poll::Ready(result),
            // The job panicked; re-raise in the awaiting task.
            Poll::Ready(Ok(Err(payload))) => panic::resume_unwind(payload),
            // The sender is dropped only if the runtime shut down mid-call.
            Poll::Ready(Err(_)) => panic!("deferred `{}` was abandoned by the runtime", self.operation),
        }
    }
}

impl<R> std::fmt::Debug for Deferred<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("operation", &self.operation).finish()
    }
}

/// Generate `name_sync` (blocking) and `name` (deferred) on `Tox` for a
/// `ToxCore::name` method taking the same owned arguments.
macro_rules! dual {
    ($(
        $(#[$meta:meta])*
        fn $name:ident / $sync:ident ( $($arg:ident : $ty:ty),* $(,)? ) -> $ret:ty;
    )+) => {
        impl $crate::handle::Tox {$(
            $(#[$meta])*
            pub fn $sync(&self, $($arg: $ty),*) -> Result<$ret, $crate::error::ToxError> {
                self.core.$name($($arg),*)
            }

            $(#[$meta])*
            pub fn $name(&self, $($arg: $ty),*) -> $crate::invoke::Deferred<$ret> {
                let core = ::std::sync::Arc::clone(&self.core);
                $crate::invoke::Deferred::spawn(stringify!($name), move || core.$name($($arg),*))
            }
        )+}
    };
}

pub(crate) use dual;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn deferred_delivers_value() {
        let value = Deferred::spawn("answer", || Ok(42)).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn deferred_delivers_error() {
        let err = Deferred::<()>::spawn("iterate", || Err(ToxError::handle_missing("iterate")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::HandleMissing);
    }

    #[test]
    fn on_complete_runs_exactly_once() {
        let (tx, rx) = mpsc::channel();
        Deferred::spawn("answer", || Ok(7)).on_complete(move |r| {
            tx.send(r).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(7));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn dropped_deferred_still_runs() {
        let (tx, rx) = mpsc::channel();
        drop(Deferred::spawn("side_effect", move || {
            tx.send(()).unwrap();
            Ok(())
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    #[should_panic(expected = "job failure")]
    async fn panicking_job_resurfaces_in_awaiter() {
        let _ = Deferred::<()>::spawn("boom", || panic!("job failure")).await;
    }

    #[test]
    fn panic_payload_text() {
        let payload = panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");
        let payload = panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
        let payload = panic::catch_unwind(|| panic::panic_any(3u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn on_complete_skips_handler_when_job_panics() {
        let (tx, rx) = mpsc::channel();
        let failing = tx.clone();
        Deferred::<()>::spawn("boom", || panic!("job failure")).on_complete(move |r| {
            failing.send(format!("{r:?}")).unwrap();
        });
        // The runtime keeps serving continuations afterwards.
        Deferred::spawn("answer", || Ok(1)).on_complete(move |r| {
            tx.send(format!("{r:?}")).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "Ok(1)");
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn dropped_panicking_deferred_does_not_poison_the_pool() {
        drop(Deferred::<()>::spawn("boom", || panic!("unobserved failure")));
        let (tx, rx) = mpsc::channel();
        Deferred::spawn("answer", || Ok(2)).on_complete(move |r| {
            tx.send(r).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(2));
    }

    #[test]
    fn operation_name_is_kept() {
        let d = Deferred::spawn("friend_add", || Ok(()));
        assert_eq!(d.operation(), "friend_add");
    }
}
