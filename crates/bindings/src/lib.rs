//! Python bindings for the sdfgen system description compiler.
//!
//! This crate exposes the compiler to Python via PyO3 as the `sdfgen` module. It provides:
//! 1. **Topology:** `SystemDescription`, `ProtectionDomain`, and `Channel`.
//! 2. **Device tree:** `DeviceTree` and the `DeviceTreeNode` records its lookups return.
//! 3. **Subsystems:** `Sddf(path)` and its builders `Sddf.Serial`, `Sddf.I2c`, `Sddf.Block`,
//!    `Sddf.Network`, `Sddf.Gpu`, `Sddf.Timer`.
//! 4. **Utilities:** Version string and conversion helpers for Python↔Rust types.
//!
//! Importing the module installs a `tracing` subscriber writing to stderr, filtered by the
//! `SDFGEN_LOG` environment variable (default `warn`).

use pyo3::prelude::*;
use tracing_subscriber::EnvFilter;

/// Error and enumeration conversion.
pub mod conversion;
/// Device-tree bindings (`PyDeviceTree`, `PyDeviceTreeNode`).
pub mod dtb;
/// Subsystem bindings (`PySddf`, `PySerial`, `PyI2c`, `PyBlock`, `PyNetwork`, `PyGpu`,
/// `PyTimer`).
pub mod sddf;
/// Topology bindings (`PySystemDescription`, `PyProtectionDomain`, `PyChannel`).
pub mod system;
/// Utility functions (e.g., version).
pub mod utils;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "SDFGEN_LOG";

/// Installs the stderr log subscriber unless the host already installed one.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Registers all compiler classes and functions onto the given Python module.
///
/// Called from the `#[pymodule]` entry point.
///
/// # Arguments
///
/// * `m` - The Python module to register types and functions on.
///
/// # Returns
///
/// `Ok(())` on success, or a `PyErr` if registration fails.
pub fn register_sdfgen_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<system::PySystemDescription>()?;
    m.add_class::<system::PyProtectionDomain>()?;
    m.add_class::<system::PyChannel>()?;

    m.add_class::<dtb::PyDeviceTree>()?;
    m.add_class::<dtb::PyDeviceTreeNode>()?;

    m.add_class::<sddf::PySddf>()?;
    m.add_class::<sddf::PySerial>()?;
    m.add_class::<sddf::PyI2c>()?;
    m.add_class::<sddf::PyBlock>()?;
    m.add_class::<sddf::PyNetwork>()?;
    m.add_class::<sddf::PyGpu>()?;
    m.add_class::<sddf::PyTimer>()?;

    m.add_function(wrap_pyfunction!(utils::version, m)?)?;
    m.add_function(wrap_pyfunction!(utils::architectures, m)?)?;

    Ok(())
}

#[pymodule]
fn sdfgen(m: &Bound<'_, PyModule>) -> PyResult<()> {
    init_logging();
    register_sdfgen_module(m)?;
    Ok(())
}
