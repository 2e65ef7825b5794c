//! Device-tree Python bindings.
//!
//! The core reader borrows its input, so `DeviceTree` keeps its own copy of the blob and
//! re-parses it per lookup. A node lookup resolves straight into an owned `Device`, which is
//! what subsystem builders take.

use std::path::PathBuf;

use pyo3::prelude::*;
use sdfgen_core::DeviceTree;
use sdfgen_core::dtb::Device;

use crate::conversion::to_py_err;

/// Python-exposed flattened device tree.
#[pyclass(name = "DeviceTree", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyDeviceTree {
    blob: Vec<u8>,
}

/// Python-exposed device node: the node's path plus its resolved resources.
#[pyclass(name = "DeviceTreeNode", module = "sdfgen", frozen)]
#[derive(Debug)]
pub struct PyDeviceTreeNode {
    path: String,
    pub(crate) device: Device,
}

#[pymethods]
impl PyDeviceTree {
    /// Parses a device-tree blob.
    ///
    /// # Errors
    ///
    /// `ValueError` if the blob is malformed.
    #[new]
    fn new(data: &[u8]) -> PyResult<Self> {
        let _ = DeviceTree::parse(data).map_err(to_py_err)?;
        Ok(Self {
            blob: data.to_vec(),
        })
    }

    /// Reads and parses a device-tree blob file.
    ///
    /// # Errors
    ///
    /// `OSError` if the file cannot be read, `ValueError` if the blob is malformed.
    #[staticmethod]
    fn from_path(path: PathBuf) -> PyResult<Self> {
        let data = std::fs::read(&path)?;
        tracing::debug!(path = %path.display(), len = data.len(), "read device tree");
        Self::new(&data)
    }

    /// Looks up a node by path (e.g. `"soc/serial@9000000"`).
    ///
    /// # Errors
    ///
    /// `LookupError` if no node matches, `ValueError` if its `reg` or `interrupts` cannot be
    /// decoded.
    fn node(&self, path: &str) -> PyResult<PyDeviceTreeNode> {
        let tree = DeviceTree::parse(&self.blob).map_err(to_py_err)?;
        let node = tree.node(path).map_err(to_py_err)?;
        Ok(PyDeviceTreeNode {
            path: node.path(),
            device: Device::from_node(node).map_err(to_py_err)?,
        })
    }

    /// Blob format version.
    #[getter]
    fn version(&self) -> PyResult<u32> {
        Ok(DeviceTree::parse(&self.blob).map_err(to_py_err)?.version())
    }

    fn __len__(&self) -> PyResult<usize> {
        Ok(DeviceTree::parse(&self.blob).map_err(to_py_err)?.len())
    }
}

#[pymethods]
impl PyDeviceTreeNode {
    /// Node name, unit address included.
    #[getter]
    fn name(&self) -> &str {
        &self.device.name
    }

    /// Absolute path of the node.
    #[getter]
    fn path(&self) -> &str {
        &self.path
    }

    /// Entries of the `compatible` list.
    #[getter]
    fn compatible(&self) -> Vec<String> {
        self.device.compatible.clone()
    }

    /// Register windows as `(address, size)` pairs.
    #[getter]
    fn reg(&self) -> Vec<(u64, u64)> {
        self.device.regs.iter().map(|r| (r.addr, r.size)).collect()
    }

    /// Interrupts as `(number, trigger)` pairs, trigger being `"edge"` or `"level"`.
    #[getter]
    fn interrupts(&self) -> Vec<(u32, &'static str)> {
        self.device
            .irqs
            .iter()
            .map(|irq| (irq.number, irq.trigger.as_str()))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!("DeviceTreeNode({:?})", self.path)
    }
}
