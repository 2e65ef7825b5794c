//! Node handles and property decoding.

use std::fmt;

use super::DeviceTree;
use super::device::{IrqSpec, RegEntry};
use crate::common::{Result, SdfError};
use crate::sdf::IrqTrigger;

/// Default `#address-cells` when the parent does not specify one.
const DEFAULT_ADDRESS_CELLS: u32 = 2;
/// Default `#size-cells` when the parent does not specify one.
const DEFAULT_SIZE_CELLS: u32 = 1;

/// GIC interrupt specifier type for shared peripheral interrupts.
const GIC_SPI: u32 = 0;
/// GIC interrupt specifier type for private peripheral interrupts.
const GIC_PPI: u32 = 1;
/// First GIC interrupt number of the SPI range.
const GIC_SPI_BASE: u32 = 32;
/// First GIC interrupt number of the PPI range.
const GIC_PPI_BASE: u32 = 16;

/// A named property value, borrowed from the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    /// Property name from the strings block.
    pub name: &'a str,
    /// Raw big-endian value bytes.
    pub value: &'a [u8],
}

/// A lookup result: a cheap shared reference to one node of a parsed tree.
///
/// Two handles are equal when they point at the same node of the same tree.
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t DeviceTree<'t>,
    index: usize,
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("path", &self.path()).finish()
    }
}

impl<'t> Node<'t> {
    pub(crate) const fn new(tree: &'t DeviceTree<'t>, index: usize) -> Self {
        Self { tree, index }
    }

    /// Returns the node's full name, unit address included (`""` for the root).
    pub fn name(&self) -> &'t str {
        let tree = self.tree;
        tree.record(self.index).name
    }

    /// Returns the absolute path of this node (`"/"` for the root).
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(*self);
        while let Some(node) = current {
            if node.parent().is_some() {
                segments.push(node.name());
            }
            current = node.parent();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Returns the parent node, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let tree = self.tree;
        tree.record(self.index)
            .parent
            .map(|index| Self::new(tree, index))
    }

    /// Iterates over the node's direct children in blob order.
    pub fn children(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let tree = self.tree;
        tree.record(self.index)
            .children
            .iter()
            .map(move |&index| Node::new(tree, index))
    }

    /// Iterates over the node's properties in blob order.
    pub fn properties(&self) -> impl Iterator<Item = Property<'t>> + 't {
        let tree = self.tree;
        tree.record(self.index).properties.iter().copied()
    }

    /// Returns the raw value of the named property.
    pub fn property(&self, name: &str) -> Option<&'t [u8]> {
        self.properties().find(|p| p.name == name).map(|p| p.value)
    }

    /// Returns the named property decoded as a single big-endian `u32` cell.
    pub fn property_u32(&self, name: &str) -> Option<u32> {
        let value = self.property(name)?;
        let cell: [u8; 4] = value.try_into().ok()?;
        Some(u32::from_be_bytes(cell))
    }

    /// Returns the entries of the `compatible` string list.
    pub fn compatible(&self) -> Vec<&'t str> {
        self.property("compatible")
            .map(|value| {
                value
                    .split(|&b| b == 0)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| std::str::from_utf8(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Decodes the `reg` property using the parent's `#address-cells` and `#size-cells`.
    ///
    /// # Returns
    ///
    /// One entry per address/size pair (empty when the node has no `reg`), or
    /// `SdfError::MalformedProperty` when the length does not match the cell counts.
    pub fn reg(&self) -> Result<Vec<RegEntry>> {
        let Some(value) = self.property("reg") else {
            return Ok(Vec::new());
        };
        let parent = self.parent();
        let address_cells = parent
            .and_then(|p| p.property_u32("#address-cells"))
            .unwrap_or(DEFAULT_ADDRESS_CELLS) as usize;
        let size_cells = parent
            .and_then(|p| p.property_u32("#size-cells"))
            .unwrap_or(DEFAULT_SIZE_CELLS) as usize;

        if address_cells > 2 || size_cells > 2 {
            return Err(self.malformed("reg"));
        }
        let cells = self.cells("reg", value)?;
        let stride = address_cells
            .checked_add(size_cells)
            .filter(|&stride| stride > 0)
            .ok_or_else(|| self.malformed("reg"))?;
        if cells.len() % stride != 0 {
            return Err(self.malformed("reg"));
        }

        Ok(cells
            .chunks_exact(stride)
            .map(|entry| RegEntry {
                addr: join_cells(&entry[..address_cells]),
                size: join_cells(&entry[address_cells..]),
            })
            .collect())
    }

    /// Decodes the `interrupts` property into kernel IRQ numbers.
    ///
    /// The specifier width comes from the interrupt parent's `#interrupt-cells`. Three-cell
    /// specifiers follow the GIC convention (type, number, flags); one- and two-cell
    /// specifiers carry the raw number (and flags).
    pub fn interrupts(&self) -> Result<Vec<IrqSpec>> {
        let Some(value) = self.property("interrupts") else {
            return Ok(Vec::new());
        };
        let cells = self.cells("interrupts", value)?;
        let width = match self.interrupt_cells() {
            Some(width) => width as usize,
            None if cells.len() % 3 == 0 => 3,
            None => 1,
        };
        if width == 0 || width > 3 || cells.len() % width != 0 {
            return Err(self.malformed("interrupts"));
        }

        cells
            .chunks_exact(width)
            .map(|spec| match *spec {
                [number] => Ok(IrqSpec {
                    number,
                    trigger: IrqTrigger::Level,
                }),
                [number, flags] => Ok(IrqSpec {
                    number,
                    trigger: trigger_from_flags(flags),
                }),
                [kind, number, flags] => {
                    let base = match kind {
                        GIC_SPI => GIC_SPI_BASE,
                        GIC_PPI => GIC_PPI_BASE,
                        _ => return Err(self.malformed("interrupts")),
                    };
                    let number = number
                        .checked_add(base)
                        .ok_or_else(|| self.malformed("interrupts"))?;
                    Ok(IrqSpec {
                        number,
                        trigger: trigger_from_flags(flags),
                    })
                }
                _ => Err(self.malformed("interrupts")),
            })
            .collect()
    }

    /// Finds `#interrupt-cells` of this node's interrupt parent.
    ///
    /// The interrupt parent is named by the nearest `interrupt-parent` phandle on this node or
    /// an ancestor; without one, the nearest ancestor declaring `#interrupt-cells` is used.
    fn interrupt_cells(&self) -> Option<u32> {
        let mut current = Some(*self);
        while let Some(node) = current {
            if let Some(phandle) = node.property_u32("interrupt-parent") {
                return self
                    .tree
                    .node_by_phandle(phandle)
                    .and_then(|controller| controller.property_u32("#interrupt-cells"));
            }
            current = node.parent();
        }

        let mut current = self.parent();
        while let Some(node) = current {
            if let Some(cells) = node.property_u32("#interrupt-cells") {
                return Some(cells);
            }
            current = node.parent();
        }
        None
    }

    fn cells(&self, property: &str, value: &[u8]) -> Result<Vec<u32>> {
        if value.len() % 4 != 0 {
            return Err(self.malformed(property));
        }
        Ok(value
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn malformed(&self, property: &str) -> SdfError {
        SdfError::MalformedProperty {
            node: self.path(),
            property: property.to_string(),
        }
    }
}

/// Joins up to two big-endian cells into one value.
fn join_cells(cells: &[u32]) -> u64 {
    cells
        .iter()
        .fold(0u64, |acc, &cell| (acc << 32) | u64::from(cell))
}

/// Maps interrupt specifier flags to a trigger mode (bits 0-1 edge, 2-3 level).
const fn trigger_from_flags(flags: u32) -> IrqTrigger {
    if flags & 0x3 != 0 {
        IrqTrigger::Edge
    } else {
        IrqTrigger::Level
    }
}
