//! Error definitions.
//!
//! This module defines every failure the compiler reports. It provides:
//! 1. **Device-tree errors:** `DtbError`, the reason a blob failed to parse.
//! 2. **Compiler errors:** `SdfError`, one variant per distinguishable failure, each carrying
//!    the name or ID that identifies the offending entity.
//! 3. **Categories:** `ErrorKind`, the coarse taxonomy callers branch on.
//!
//! Nothing is retried internally; every error is surfaced to the caller of the operation
//! that introduced it.

use std::fmt;

use thiserror::Error;

/// Reason a flattened device-tree blob was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DtbError {
    /// The blob is shorter than the structure being read.
    #[error("truncated at offset {offset:#x} (need {needed} bytes)")]
    Truncated {
        /// Offset of the read that ran past the end.
        offset: usize,
        /// Number of bytes the read required.
        needed: usize,
    },

    /// The header magic is not `0xd00dfeed`.
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),

    /// The blob requires a newer parser than this one.
    #[error("unsupported last compatible version {0}")]
    UnsupportedVersion(u32),

    /// The header's total size disagrees with the buffer.
    #[error("header total size {header} exceeds buffer size {buffer}")]
    SizeMismatch {
        /// Size recorded in the header.
        header: usize,
        /// Size of the supplied buffer.
        buffer: usize,
    },

    /// An unknown or misplaced structure token.
    #[error("unexpected token {token:#x} at offset {offset:#x}")]
    BadToken {
        /// Offset of the token.
        offset: usize,
        /// Token value.
        token: u32,
    },

    /// A node or property name is not NUL-terminated UTF-8.
    #[error("invalid string at offset {0:#x}")]
    BadString(usize),

    /// The structure block ended before every node was closed.
    #[error("structure block ends inside an open node")]
    Unterminated,
}

/// Which per-domain ID space an allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Child protection domain IDs.
    Child,
    /// Channel-slot IDs (shared by channel ends and IRQs).
    Channel,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Child => write!(f, "child"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

/// Misuse of a subsystem builder's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// `connect` was called on an already connected subsystem.
    AlreadyConnected,
    /// A client was added after `connect`.
    MutationAfterConnect,
    /// Configuration blobs were requested before `connect`.
    NotConnected,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnected => write!(f, "connect called more than once"),
            Self::MutationAfterConnect => write!(f, "mutation attempted after connect"),
            Self::NotConnected => write!(f, "serialisation requested before connect"),
        }
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad device-tree blob, bad property, bad MAC text, bad configuration.
    MalformedInput,
    /// A path or handle does not resolve.
    NotFound,
    /// No free ID or physical range is left.
    ResourceExhausted,
    /// An explicit duplicate (ID, MAC, client, copier, region, mapping).
    Collision,
    /// Builder lifecycle misuse.
    ProtocolViolation,
}

/// Every failure reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdfError {
    /// The device-tree blob could not be parsed.
    #[error("malformed device tree blob: {0}")]
    MalformedBlob(#[from] DtbError),

    /// A device-tree property has an unexpected length or encoding.
    #[error("malformed property '{property}' on device tree node '{node}'")]
    MalformedProperty {
        /// Node carrying the property.
        node: String,
        /// Property name.
        property: String,
    },

    /// A MAC address is not of the form `xx:xx:xx:xx:xx:xx`.
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),

    /// A name does not fit the fixed-width field it is encoded into.
    #[error("name '{name}' is longer than {max} bytes")]
    NameTooLong {
        /// The offending name.
        name: String,
        /// Longest accepted length in bytes.
        max: usize,
    },

    /// A JSON system spec could not be read or names an unknown entity.
    #[error("invalid system configuration: {0}")]
    InvalidConfig(String),

    /// No device-tree node matches the path.
    #[error("device tree node '{0}' not found")]
    NodeNotFound(String),

    /// A protection-domain handle does not belong to this system.
    #[error("unknown protection domain handle {0}")]
    UnknownDomain(usize),

    /// A memory-region handle does not belong to this system.
    #[error("unknown memory region handle {0}")]
    UnknownRegion(usize),

    /// Every ID in the scope is taken.
    #[error("no free {kind} ID left in protection domain '{scope}'")]
    Exhausted {
        /// Name of the owning protection domain.
        scope: String,
        /// ID space that ran out.
        kind: IdKind,
    },

    /// Not enough physical address space below the current allocation floor.
    #[error("cannot allocate {size:#x} bytes of physical memory below {floor:#x}")]
    PhysicalExhausted {
        /// Requested size.
        size: u64,
        /// Current lowest allocated physical address.
        floor: u64,
    },

    /// An explicitly requested ID is already in use.
    #[error("{kind} ID {id} already in use in protection domain '{scope}'")]
    Collision {
        /// Name of the owning protection domain.
        scope: String,
        /// ID space of the request.
        kind: IdKind,
        /// Requested ID.
        id: u8,
    },

    /// The subsystem already has the maximum number of clients.
    #[error("{subsystem}: cannot add more than {max} clients")]
    TooManyClients {
        /// Subsystem class.
        subsystem: &'static str,
        /// Client array capacity.
        max: usize,
    },

    /// The client was already added to the subsystem.
    #[error("{subsystem}: client '{client}' already added")]
    DuplicateClient {
        /// Subsystem class.
        subsystem: &'static str,
        /// Client name.
        client: String,
    },

    /// The copier already serves another network client.
    #[error("net: copier '{0}' already in use")]
    DuplicateCopier(String),

    /// The MAC address is already assigned to another network client.
    #[error("net: MAC address '{mac}' already assigned to client '{owner}'")]
    DuplicateMac {
        /// The duplicated MAC text.
        mac: String,
        /// Client that holds it.
        owner: String,
    },

    /// The domain plays another role in the subsystem and cannot be a client.
    #[error("{subsystem}: '{name}' cannot be a client of its own subsystem")]
    InvalidClient {
        /// Subsystem class.
        subsystem: &'static str,
        /// Offending domain.
        name: String,
    },

    /// The same domain was bound to two roles of one subsystem or to both ends of a channel.
    #[error("protection domain '{0}' used twice where distinct domains are required")]
    SameDomain(String),

    /// A memory region with this name already exists.
    #[error("memory region '{0}' already exists")]
    DuplicateRegion(String),

    /// A physical range partially overlaps an existing physical region.
    #[error("physical range at {paddr:#x} overlaps memory region '{mr}'")]
    RegionOverlap {
        /// Existing region.
        mr: String,
        /// Base of the rejected range.
        paddr: u64,
    },

    /// The interrupt is already delivered to a protection domain.
    #[error("IRQ {irq} already delivered to protection domain '{pd}'")]
    IrqInUse {
        /// Interrupt number.
        irq: u32,
        /// Domain that receives it.
        pd: String,
    },

    /// A mapping overlaps an existing mapping in the same protection domain.
    #[error("mapping of '{mr}' at {vaddr:#x} overlaps an existing mapping in '{pd}'")]
    MapOverlap {
        /// Protection domain.
        pd: String,
        /// Memory region being mapped.
        mr: String,
        /// Requested virtual address.
        vaddr: u64,
    },

    /// The domain is already registered or already a child.
    #[error("protection domain '{0}' is already registered")]
    AlreadyRegistered(String),

    /// A subsystem lifecycle rule was broken.
    #[error("{subsystem}: {violation}")]
    ProtocolViolation {
        /// Subsystem class.
        subsystem: &'static str,
        /// Which rule.
        violation: Violation,
    },
}

impl SdfError {
    /// Returns the category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedBlob(_)
            | Self::MalformedProperty { .. }
            | Self::InvalidMac(_)
            | Self::NameTooLong { .. }
            | Self::InvalidConfig(_) => ErrorKind::MalformedInput,
            Self::NodeNotFound(_) | Self::UnknownDomain(_) | Self::UnknownRegion(_) => {
                ErrorKind::NotFound
            }
            Self::Exhausted { .. }
            | Self::PhysicalExhausted { .. }
            | Self::TooManyClients { .. } => ErrorKind::ResourceExhausted,
            Self::Collision { .. }
            | Self::DuplicateClient { .. }
            | Self::DuplicateCopier(_)
            | Self::DuplicateMac { .. }
            | Self::InvalidClient { .. }
            | Self::SameDomain(_)
            | Self::DuplicateRegion(_)
            | Self::RegionOverlap { .. }
            | Self::IrqInUse { .. }
            | Self::MapOverlap { .. }
            | Self::AlreadyRegistered(_) => ErrorKind::Collision,
            Self::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
        }
    }
}
