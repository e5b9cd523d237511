//! Structured errors and the translator from native return conventions.
//!
//! Every failure carries the name of the operation that produced it and the
//! raw value the engine returned, so a log line is enough to diagnose it.

use std::ffi::{c_int, c_uint};

use crate::surface::errors::NativeError;
use crate::surface::LoadError;

/// Classification of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// The handle was released before the call.
    #[error("handle has been released")]
    HandleMissing,
    /// A legacy entry point returned a negative sentinel.
    #[error("negative return value {code}")]
    NegativeReturn { code: i64 },
    /// A legacy entry point whose success value is 0 returned something else.
    #[error("expected 0, engine returned {code}")]
    NonZeroReturn { code: i64 },
    /// An entry point whose success value is 1 (true) returned something else.
    #[error("expected 1, engine returned {code}")]
    NonOneReturn { code: i64 },
    /// A count, length or discriminant differs from the value it must equal.
    #[error("expected {expected}, engine returned {actual}")]
    UnexpectedReturn { expected: i64, actual: i64 },
    /// The `TOX_ERR_*` out-parameter was set to something other than `OK`.
    #[error("{family}_{name} ({code})")]
    NativeErrorCode {
        family: &'static str,
        name: &'static str,
        code: u32,
    },
    /// Arguments the engine cannot represent, rejected before the native call.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// A failed operation, as thrown by blocking calls and delivered by deferred ones.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {kind}")]
pub struct ToxError {
    pub operation: &'static str,
    pub kind: ErrorKind,
}

impl ToxError {
    pub fn new(operation: &'static str, kind: ErrorKind) -> Self {
        Self { operation, kind }
    }

    pub fn handle_missing(operation: &'static str) -> Self {
        Self::new(operation, ErrorKind::HandleMissing)
    }

    pub fn invalid_argument(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::new(
            operation,
            ErrorKind::InvalidArgument {
                reason: reason.into(),
            },
        )
    }

    pub fn is_handle_missing(&self) -> bool {
        matches!(self.kind, ErrorKind::HandleMissing)
    }

    /// Raw numeric value the engine produced, if one was involved.
    pub fn raw_code(&self) -> Option<i64> {
        match &self.kind {
            ErrorKind::NegativeReturn { code }
            | ErrorKind::NonZeroReturn { code }
            | ErrorKind::NonOneReturn { code } => Some(*code),
            ErrorKind::UnexpectedReturn { actual, .. } => Some(*actual),
            ErrorKind::NativeErrorCode { code, .. } => Some(i64::from(*code)),
            ErrorKind::HandleMissing | ErrorKind::InvalidArgument { .. } => None,
        }
    }

    /// The value the engine should have returned, for `UnexpectedReturn`.
    pub fn expected(&self) -> Option<i64> {
        match &self.kind {
            ErrorKind::UnexpectedReturn { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}

/// Failure of [`crate::Tox::open`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Engine(#[from] ToxError),
}

/// Check a `TOX_ERR_*` out-parameter.
pub(crate) fn check_code<E: NativeError>(operation: &'static str, raw: c_uint) -> Result<(), ToxError> {
    if raw == 0 {
        return Ok(());
    }
    let name = E::from_raw(raw).map(E::name).unwrap_or("UNKNOWN");
    Err(ToxError::new(
        operation,
        ErrorKind::NativeErrorCode {
            family: E::FAMILY,
            name,
            code: raw,
        },
    ))
}

/// Legacy convention: a non-negative index/count/length, or −1.
pub(crate) fn check_negative(operation: &'static str, ret: c_int) -> Result<u32, ToxError> {
    u32::try_from(ret).map_err(|_| {
        ToxError::new(
            operation,
            ErrorKind::NegativeReturn {
                code: i64::from(ret),
            },
        )
    })
}

/// Legacy convention: 0 on success.
pub(crate) fn check_zero(operation: &'static str, ret: c_int) -> Result<(), ToxError> {
    if ret == 0 {
        Ok(())
    } else {
        Err(ToxError::new(
            operation,
            ErrorKind::NonZeroReturn {
                code: i64::from(ret),
            },
        ))
    }
}

/// Boolean success without an error out-parameter.
pub(crate) fn check_one(operation: &'static str, ret: i64) -> Result<(), ToxError> {
    if ret == 1 {
        Ok(())
    } else {
        Err(ToxError::new(operation, ErrorKind::NonOneReturn { code: ret }))
    }
}

/// A returned count or length must equal one obtained earlier.
pub(crate) fn check_expected(operation: &'static str, expected: i64, actual: i64) -> Result<(), ToxError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ToxError::new(
            operation,
            ErrorKind::UnexpectedReturn { expected, actual },
        ))
    }
}

/// Decode a by-value enum the engine returned.
///
/// Out-of-range values are reported against the largest known discriminant.
pub(crate) fn decode_returned<T>(
    operation: &'static str,
    raw: c_uint,
    max_known: c_uint,
    decode: impl FnOnce(c_uint) -> Option<T>,
) -> Result<T, ToxError> {
    decode(raw).ok_or_else(|| {
        ToxError::new(
            operation,
            ErrorKind::UnexpectedReturn {
                expected: i64::from(max_known),
                actual: i64::from(raw),
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::errors::{ErrBootstrap, ErrFriendAdd};

    #[test]
    fn ok_code_passes() {
        assert!(check_code::<ErrBootstrap>("bootstrap", 0).is_ok());
    }

    #[test]
    fn native_code_is_named() {
        let err = check_code::<ErrBootstrap>("bootstrap", 2).unwrap_err();
        assert_eq!(err.operation, "bootstrap");
        assert_eq!(
            err.kind,
            ErrorKind::NativeErrorCode {
                family: "TOX_ERR_BOOTSTRAP",
                name: "BAD_HOST",
                code: 2,
            }
        );
        assert_eq!(err.raw_code(), Some(2));
        assert_eq!(err.to_string(), "bootstrap: TOX_ERR_BOOTSTRAP_BAD_HOST (2)");
    }

    #[test]
    fn unknown_native_code_is_still_reported() {
        let err = check_code::<ErrFriendAdd>("friend_add", 99).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::NativeErrorCode {
                name: "UNKNOWN",
                code: 99,
                ..
            }
        ));
    }

    #[test]
    fn negative_sentinel() {
        assert_eq!(check_negative("group_new", 3).unwrap(), 3);
        let err = check_negative("group_new", -1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NegativeReturn { code: -1 });
        assert_eq!(err.raw_code(), Some(-1));
    }

    #[test]
    fn zero_convention() {
        assert!(check_zero("group_delete", 0).is_ok());
        let err = check_zero("group_delete", -1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonZeroReturn { code: -1 });
    }

    #[test]
    fn one_convention() {
        assert!(check_one("hash", 1).is_ok());
        let err = check_one("hash", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonOneReturn { code: 0 });
    }

    #[test]
    fn expected_value_is_recorded() {
        let err = check_expected("group_peer_names", 4, 3).unwrap_err();
        assert_eq!(err.expected(), Some(4));
        assert_eq!(err.raw_code(), Some(3));
    }

    #[test]
    fn handle_missing_has_no_code() {
        let err = ToxError::handle_missing("iterate");
        assert!(err.is_handle_missing());
        assert_eq!(err.raw_code(), None);
        assert_eq!(err.to_string(), "iterate: handle has been released");
    }

    #[test]
    fn unknown_returned_enum_is_unexpected() {
        let err = decode_returned("connection_status", 7, 2, |_| None::<u8>).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnexpectedReturn {
                expected: 2,
                actual: 7
            }
        );
    }
}
