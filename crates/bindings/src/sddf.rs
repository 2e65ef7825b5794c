//! sDDF subsystem Python bindings.
//!
//! Each builder binds to one `SystemDescription` at construction and resolves domain handles
//! against it, moving staged domains in on first use. `Sddf` holds the path of the sDDF
//! source tree the system is built against and groups the builder classes (`Sddf.Serial`,
//! `Sddf.I2c`, ...).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use pyo3::exceptions::PyFileNotFoundError;
use pyo3::prelude::*;
use pyo3::types::PyType;
use sdfgen_core::dtb::Device;
use sdfgen_core::sddf::{Block, Gpu, I2c, Network, Serial, Subsystem, Timer};
use sdfgen_core::{SdfError, SystemDescription};

use crate::conversion::{lock, to_py_err};
use crate::dtb::PyDeviceTreeNode;
use crate::system::{PyProtectionDomain, PySystemDescription, SharedSystem};

/// sDDF source tree handle and namespace for the subsystem builders.
#[pyclass(name = "Sddf", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PySddf {
    path: PathBuf,
}

/// Python-exposed serial subsystem.
#[pyclass(name = "Serial", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PySerial {
    sdf: SharedSystem,
    inner: Mutex<Serial>,
}

/// Python-exposed I2C subsystem.
#[pyclass(name = "I2c", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyI2c {
    sdf: SharedSystem,
    inner: Mutex<I2c>,
}

/// Python-exposed block subsystem.
#[pyclass(name = "Block", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyBlock {
    sdf: SharedSystem,
    inner: Mutex<Block>,
}

/// Python-exposed network subsystem.
#[pyclass(name = "Network", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyNetwork {
    sdf: SharedSystem,
    inner: Mutex<Network>,
}

/// Python-exposed GPU subsystem.
#[pyclass(name = "Gpu", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyGpu {
    sdf: SharedSystem,
    inner: Mutex<Gpu>,
}

/// Python-exposed timer subsystem.
#[pyclass(name = "Timer", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyTimer {
    sdf: SharedSystem,
    inner: Mutex<Timer>,
}

#[pymethods]
impl PySddf {
    /// Opens an sDDF source tree.
    ///
    /// # Errors
    ///
    /// `FileNotFoundError` if `path` is not a directory.
    #[new]
    fn new(path: PathBuf) -> PyResult<Self> {
        if !path.is_dir() {
            return Err(PyFileNotFoundError::new_err(format!(
                "sDDF source tree '{}' is not a directory",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "opened sDDF source tree");
        Ok(Self { path })
    }

    /// Root of the sDDF source tree.
    #[getter]
    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn __repr__(&self) -> String {
        format!("Sddf({:?})", self.path.display().to_string())
    }

    #[classattr]
    #[pyo3(name = "Serial")]
    fn serial(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PySerial>().unbind()
    }

    #[classattr]
    #[pyo3(name = "I2c")]
    fn i2c(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PyI2c>().unbind()
    }

    #[classattr]
    #[pyo3(name = "Block")]
    fn block(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PyBlock>().unbind()
    }

    #[classattr]
    #[pyo3(name = "Network")]
    fn network(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PyNetwork>().unbind()
    }

    #[classattr]
    #[pyo3(name = "Gpu")]
    fn gpu(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PyGpu>().unbind()
    }

    #[classattr]
    #[pyo3(name = "Timer")]
    fn timer(py: Python<'_>) -> Py<PyType> {
        py.get_type::<PyTimer>().unbind()
    }
}

fn device_of(device: Option<&Bound<'_, PyDeviceTreeNode>>) -> Option<Device> {
    device.map(|node| node.get().device.clone())
}

/// Runs `connect` with the builder and its system locked.
fn connect<S: Subsystem>(sdf: &SharedSystem, inner: &Mutex<S>) -> PyResult<bool> {
    let mut builder = lock(inner)?;
    let mut sdf = lock(sdf)?;
    builder.connect(&mut *sdf).map_err(to_py_err)
}

/// Runs `serialise_config` with the builder and its system locked.
fn serialise<S: Subsystem>(sdf: &SharedSystem, inner: &Mutex<S>, dir: PathBuf) -> PyResult<bool> {
    let mut builder = lock(inner)?;
    let sdf = lock(sdf)?;
    builder.serialise_config(&sdf, &dir).map_err(to_py_err)
}

/// Runs a client mutation with the builder and its system locked.
fn add_client<S>(
    sdf: &SharedSystem,
    inner: &Mutex<S>,
    f: impl FnOnce(&mut S, &SystemDescription) -> Result<(), SdfError>,
) -> PyResult<()> {
    let mut builder = lock(inner)?;
    let sdf = lock(sdf)?;
    f(&mut *builder, &*sdf).map_err(to_py_err)
}

#[pymethods]
impl PySerial {
    /// Binds a serial driver and its virtualizers.
    ///
    /// # Arguments
    ///
    /// * `device` - The UART node, or `None` for an emulated one.
    /// * `virt_rx` - The receive virtualizer, or `None` for output-only consoles.
    #[new]
    #[pyo3(signature = (sdf, device, driver, virt_tx, virt_rx=None, enable_color=true))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
        virt_tx: &Bound<'_, PyProtectionDomain>,
        virt_rx: Option<&Bound<'_, PyProtectionDomain>>,
        enable_color: bool,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let virt_tx = PyProtectionDomain::handle_in(virt_tx, &shared)?;
        let virt_rx = virt_rx
            .map(|pd| PyProtectionDomain::handle_in(pd, &shared))
            .transpose()?;
        let serial = Serial::new(
            &*lock(&shared)?,
            device_of(device),
            driver,
            virt_tx,
            virt_rx,
            enable_color,
        )
        .map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(serial),
        })
    }

    /// Adds a client.
    fn add_client(&self, client: &Bound<'_, PyProtectionDomain>) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |serial, sdf| serial.add_client(sdf, client))
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}

#[pymethods]
impl PyI2c {
    /// Binds an I2C driver and its virtualizer.
    #[new]
    #[pyo3(signature = (sdf, device, driver, virt))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
        virt: &Bound<'_, PyProtectionDomain>,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let virt = PyProtectionDomain::handle_in(virt, &shared)?;
        let i2c = I2c::new(&*lock(&shared)?, device_of(device), driver, virt).map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(i2c),
        })
    }

    /// Adds a client.
    fn add_client(&self, client: &Bound<'_, PyProtectionDomain>) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |i2c, sdf| i2c.add_client(sdf, client))
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}

#[pymethods]
impl PyBlock {
    /// Binds a block driver and its virtualizer.
    #[new]
    #[pyo3(signature = (sdf, device, driver, virt))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
        virt: &Bound<'_, PyProtectionDomain>,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let virt = PyProtectionDomain::handle_in(virt, &shared)?;
        let blk = Block::new(&*lock(&shared)?, device_of(device), driver, virt).map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(blk),
        })
    }

    /// Adds a client restricted to one partition of the device.
    #[pyo3(signature = (client, partition=0))]
    fn add_client(&self, client: &Bound<'_, PyProtectionDomain>, partition: u32) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |blk, sdf| {
            blk.add_client(sdf, client, partition)
        })
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}

#[pymethods]
impl PyNetwork {
    /// Binds a network driver and its virtualizers.
    #[new]
    #[pyo3(signature = (sdf, device, driver, virt_tx, virt_rx))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
        virt_tx: &Bound<'_, PyProtectionDomain>,
        virt_rx: &Bound<'_, PyProtectionDomain>,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let virt_tx = PyProtectionDomain::handle_in(virt_tx, &shared)?;
        let virt_rx = PyProtectionDomain::handle_in(virt_rx, &shared)?;
        let net = Network::new(&*lock(&shared)?, device_of(device), driver, virt_rx, virt_tx)
            .map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(net),
        })
    }

    /// Adds a client with its dedicated copier.
    ///
    /// # Arguments
    ///
    /// * `mac_addr` - `"xx:xx:xx:xx:xx:xx"`, or `None` to generate one at connect.
    #[pyo3(signature = (client, copier, mac_addr=None))]
    fn add_client_with_copier(
        &self,
        client: &Bound<'_, PyProtectionDomain>,
        copier: &Bound<'_, PyProtectionDomain>,
        mac_addr: Option<&str>,
    ) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        let copier = PyProtectionDomain::handle_in(copier, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |net, sdf| {
            net.add_client_with_copier(sdf, client, copier, mac_addr)
        })
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}

#[pymethods]
impl PyGpu {
    /// Binds a GPU driver and its virtualizer.
    #[new]
    #[pyo3(signature = (sdf, device, driver, virt))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
        virt: &Bound<'_, PyProtectionDomain>,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let virt = PyProtectionDomain::handle_in(virt, &shared)?;
        let gpu = Gpu::new(&*lock(&shared)?, device_of(device), driver, virt).map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(gpu),
        })
    }

    /// Adds a client.
    fn add_client(&self, client: &Bound<'_, PyProtectionDomain>) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |gpu, sdf| gpu.add_client(sdf, client))
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}

#[pymethods]
impl PyTimer {
    /// Binds a timer driver.
    #[new]
    #[pyo3(signature = (sdf, device, driver))]
    fn new(
        sdf: &Bound<'_, PySystemDescription>,
        device: Option<&Bound<'_, PyDeviceTreeNode>>,
        driver: &Bound<'_, PyProtectionDomain>,
    ) -> PyResult<Self> {
        let shared = Arc::clone(&sdf.get().inner);
        let driver = PyProtectionDomain::handle_in(driver, &shared)?;
        let timer = Timer::new(&*lock(&shared)?, device_of(device), driver).map_err(to_py_err)?;
        Ok(Self {
            sdf: shared,
            inner: Mutex::new(timer),
        })
    }

    /// Adds a client.
    fn add_client(&self, client: &Bound<'_, PyProtectionDomain>) -> PyResult<()> {
        let client = PyProtectionDomain::handle_in(client, &self.sdf)?;
        add_client(&self.sdf, &self.inner, |timer, sdf| timer.add_client(sdf, client))
    }

    /// Commits the subsystem into the system.
    fn connect(&self) -> PyResult<bool> {
        connect(&self.sdf, &self.inner)
    }

    /// Writes the configuration blobs into `output_dir`.
    fn serialise_config(&self, output_dir: PathBuf) -> PyResult<bool> {
        serialise(&self.sdf, &self.inner, output_dir)
    }
}
