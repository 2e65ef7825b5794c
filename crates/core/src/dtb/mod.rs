//! Flattened device-tree reader.
//!
//! This module parses a flattened device-tree blob (FDT) into a navigable node structure.
//! It provides:
//! 1. **Parsing:** `DeviceTree::parse` validates the header and walks the structure block,
//!    bounds-checking every read so truncated or garbage input fails cleanly.
//! 2. **Lookup:** `DeviceTree::node` resolves slash-separated paths, matching each segment
//!    exactly (including any `@unit-address`).
//! 3. **Properties:** `Node` exposes raw properties plus decoded `reg`, `interrupts`, and
//!    `compatible` values.
//! 4. **Devices:** `Device` is the owned hardware binding a subsystem builder keeps.
//!
//! The parsed tree borrows the caller's buffer; names and property values are slices into it.

/// Owned device resources resolved from a node.
pub mod device;
/// Node handle and property decoding.
pub mod node;
/// Header and structure-block parsing.
mod reader;

pub use device::{Device, IrqSpec, RegEntry};
pub use node::{Node, Property};

use crate::common::{Result, SdfError};

/// Structure-block token opening a node.
pub const FDT_BEGIN_NODE: u32 = 0x1;
/// Structure-block token closing a node.
pub const FDT_END_NODE: u32 = 0x2;
/// Structure-block token introducing a property.
pub const FDT_PROP: u32 = 0x3;
/// Structure-block padding token.
pub const FDT_NOP: u32 = 0x4;
/// Structure-block terminator.
pub const FDT_END: u32 = 0x9;
/// Header magic.
pub const FDT_MAGIC: u32 = 0xd00d_feed;
/// Newest `last_comp_version` this reader understands.
pub const FDT_SUPPORTED_VERSION: u32 = 17;
/// Size of the fixed header in bytes.
pub const FDT_HEADER_SIZE: usize = 40;

/// One node of the parsed tree, stored in the tree's arena.
#[derive(Debug, Clone)]
pub(crate) struct NodeRecord<'a> {
    pub(crate) name: &'a str,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) properties: Vec<Property<'a>>,
}

/// Immutable parsed view over a flattened device-tree blob.
///
/// The backing bytes are borrowed for `'a`, so the buffer outlives the tree and every
/// `Node` derived from it.
#[derive(Debug, Clone)]
pub struct DeviceTree<'a> {
    bytes: &'a [u8],
    version: u32,
    boot_cpuid: u32,
    nodes: Vec<NodeRecord<'a>>,
}

impl<'a> DeviceTree<'a> {
    /// Parses a flattened device-tree blob.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The complete blob. It is neither copied nor modified.
    ///
    /// # Returns
    ///
    /// The parsed tree, or `SdfError::MalformedBlob` describing the first defect found.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let parsed = reader::parse(bytes)?;
        tracing::debug!(nodes = parsed.nodes.len(), "parsed device tree blob");
        Ok(Self {
            bytes,
            version: parsed.version,
            boot_cpuid: parsed.boot_cpuid,
            nodes: parsed.nodes,
        })
    }

    /// Returns the blob this tree was parsed from.
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Returns the header's format version.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the header's boot CPU ID.
    pub const fn boot_cpuid(&self) -> u32 {
        self.boot_cpuid
    }

    /// Returns the number of nodes in the tree, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes (never the case for a parsed tree).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the root node.
    pub const fn root(&self) -> Node<'_> {
        Node::new(self, 0)
    }

    /// Resolves a slash-separated path to a node.
    ///
    /// Each segment must equal a child's full name, unit address included; the leading
    /// slash is optional and `""` or `"/"` names the root. Lookups are side-effect free.
    ///
    /// # Arguments
    ///
    /// * `path` - Path such as `"soc/serial@9000000"`.
    ///
    /// # Returns
    ///
    /// The node, or `SdfError::NodeNotFound` carrying the path.
    pub fn node(&self, path: &str) -> Result<Node<'_>> {
        let mut current = 0usize;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].name == segment)
                .ok_or_else(|| SdfError::NodeNotFound(path.to_string()))?;
        }
        Ok(Node::new(self, current))
    }

    /// Finds the node whose `phandle` (or legacy `linux,phandle`) equals `phandle`.
    pub fn node_by_phandle(&self, phandle: u32) -> Option<Node<'_>> {
        (0..self.nodes.len())
            .map(|index| Node::new(self, index))
            .find(|node| {
                node.property_u32("phandle") == Some(phandle)
                    || node.property_u32("linux,phandle") == Some(phandle)
            })
    }

    /// Iterates over every node in structure-block order.
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        (0..self.nodes.len()).map(|index| Node::new(self, index))
    }

    pub(crate) fn record(&self, index: usize) -> &NodeRecord<'a> {
        &self.nodes[index]
    }
}
