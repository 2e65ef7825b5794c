//! Python↔Rust conversion helpers.
//!
//! Maps compiler errors onto Python exception types by category, and converts the plain
//! integers Python passes for enumerations into their Rust types.

use std::sync::{Mutex, MutexGuard};

use pyo3::exceptions::{PyLookupError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use sdfgen_core::sdf::Arch;
use sdfgen_core::{ErrorKind, SdfError};

/// Converts a compiler error into the Python exception for its category.
///
/// | Category | Exception |
/// |---|---|
/// | `MalformedInput`, `Collision` | `ValueError` |
/// | `NotFound` | `LookupError` |
/// | `ResourceExhausted`, `ProtocolViolation` | `RuntimeError` |
pub fn to_py_err(err: SdfError) -> PyErr {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::MalformedInput | ErrorKind::Collision => PyValueError::new_err(message),
        ErrorKind::NotFound => PyLookupError::new_err(message),
        ErrorKind::ResourceExhausted | ErrorKind::ProtocolViolation => {
            PyRuntimeError::new_err(message)
        }
    }
}

/// Converts the integer architecture code used by Python callers.
///
/// # Returns
///
/// The architecture, or `ValueError` for a code outside `0..=5`.
pub fn arch_from_int(raw: u8) -> PyResult<Arch> {
    Arch::from_raw(raw).ok_or_else(|| PyValueError::new_err(format!("unknown architecture {raw}")))
}

/// Locks a mutex shared with Python objects.
///
/// A poisoned lock means an earlier call panicked while holding it; the state behind it is
/// no longer trusted and every later call fails.
pub fn lock<T>(mutex: &Mutex<T>) -> PyResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PyRuntimeError::new_err("internal state poisoned by an earlier panic"))
}
