//! Engine operations.
//!
//! Each submodule adds `ToxCore` methods that make the native call under
//! the handle lock and decode the result, then declares the public
//! blocking and deferred forms with `dual!`.

mod file;
mod friend;
mod group;
mod network;
mod packet;
mod self_info;

use std::ffi::{CString, c_int};

use crate::error::ToxError;

/// Copy `text` into a C string for entry points that take `const char *`.
pub(crate) fn c_string(operation: &'static str, field: &str, text: &str) -> Result<CString, ToxError> {
    CString::new(text)
        .map_err(|_| ToxError::invalid_argument(operation, format!("{field} contains a NUL byte")))
}

/// Legacy entry points take `int` indices.
pub(crate) fn legacy_index(operation: &'static str, field: &str, value: u32) -> Result<c_int, ToxError> {
    c_int::try_from(value)
        .map_err(|_| ToxError::invalid_argument(operation, format!("{field} {value} is out of range")))
}

/// Length of a buffer passed to a legacy entry point with a narrow length type.
pub(crate) fn narrow_len<T: TryFrom<usize>>(
    operation: &'static str,
    field: &str,
    len: usize,
) -> Result<T, ToxError> {
    T::try_from(len).map_err(|_| ToxError::invalid_argument(operation, format!("{field} is too long ({len} bytes)")))
}
