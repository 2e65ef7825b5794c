//! Utility functions exposed to Python.
//!
//! Provides version and architecture helpers for the `sdfgen` module.

use pyo3::prelude::*;
use sdfgen_core::sdf::Arch;

/// Returns the compiler version string (e.g., for scripting or diagnostics).
///
/// # Returns
///
/// The crate version, such as `"0.2.0"`.
#[pyfunction]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Lists the architectures `SystemDescription` accepts.
///
/// # Returns
///
/// `(code, name)` pairs, e.g. `(1, "aarch64")`, in code order.
#[pyfunction]
pub fn architectures() -> Vec<(u8, &'static str)> {
    Arch::ALL
        .iter()
        .map(|&arch| (arch as u8, arch.as_str()))
        .collect()
}
