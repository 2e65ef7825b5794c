//! Owned device resources.
//!
//! A subsystem builder does not hold on to the device tree. It resolves the node it is bound
//! to into a `Device` once, at construction, and keeps only the resources it needs to wire the
//! driver: MMIO register windows and interrupts.

use super::Node;
use crate::common::Result;
use crate::sdf::IrqTrigger;

/// One `reg` entry: an MMIO window in the parent bus's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegEntry {
    /// Base address.
    pub addr: u64,
    /// Window size in bytes.
    pub size: u64,
}

/// One decoded interrupt specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqSpec {
    /// Kernel IRQ number.
    pub number: u32,
    /// Trigger mode.
    pub trigger: IrqTrigger,
}

/// Hardware resources of a memory-mapped device, resolved from its device-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Node name, unit address included.
    pub name: String,
    /// Entries of the `compatible` list.
    pub compatible: Vec<String>,
    /// Register windows from `reg`.
    pub regs: Vec<RegEntry>,
    /// Interrupts from `interrupts`.
    pub irqs: Vec<IrqSpec>,
}

impl Device {
    /// Resolves a node into owned device resources.
    ///
    /// # Arguments
    ///
    /// * `node` - The device node (e.g. from `DeviceTree::node`).
    ///
    /// # Returns
    ///
    /// The device, or `SdfError::MalformedProperty` if `reg` or `interrupts` cannot be decoded.
    pub fn from_node(node: Node<'_>) -> Result<Self> {
        Ok(Self {
            name: node.name().to_string(),
            compatible: node.compatible().into_iter().map(str::to_string).collect(),
            regs: node.reg()?,
            irqs: node.interrupts()?,
        })
    }

    /// Returns the node name without its unit address.
    pub fn base_name(&self) -> &str {
        self.name.split('@').next().unwrap_or(&self.name)
    }
}
