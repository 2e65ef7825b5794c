//! Memory regions and mappings.

use crate::common::constants::PAGE_SIZE;

/// Handle to a memory region inside a `SystemDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MrId(pub(crate) usize);

impl MrId {
    /// Returns the arena index behind this handle.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A named block of memory that protection domains can map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    name: String,
    size: u64,
    paddr: Option<u64>,
    page_size: u64,
}

impl MemoryRegion {
    /// Creates a region backed by memory the image builder allocates.
    ///
    /// The size is rounded up to a whole number of pages.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size: page_align_up(size),
            paddr: None,
            page_size: PAGE_SIZE,
        }
    }

    /// Creates a region pinned at a physical address (device registers, DMA buffers).
    pub fn physical(name: impl Into<String>, size: u64, paddr: u64) -> Self {
        Self {
            paddr: Some(paddr),
            ..Self::new(name, size)
        }
    }

    /// Returns the region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the page-rounded size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the fixed physical address, if any.
    pub const fn paddr(&self) -> Option<u64> {
        self.paddr
    }

    /// Returns the page size the region is mapped with.
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }
}

/// Access rights of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Perms {
    /// Readable.
    pub read: bool,
    /// Writable.
    pub write: bool,
    /// Executable.
    pub execute: bool,
}

impl Perms {
    /// Read only.
    pub const R: Self = Self {
        read: true,
        write: false,
        execute: false,
    };
    /// Read and write.
    pub const RW: Self = Self {
        read: true,
        write: true,
        execute: false,
    };
    /// Read, write, and execute.
    pub const RWX: Self = Self {
        read: true,
        write: true,
        execute: true,
    };

    /// Returns the `rwx` subset string used in the rendered description.
    pub fn as_string(self) -> String {
        let mut s = String::with_capacity(3);
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.execute {
            s.push('x');
        }
        s
    }
}

/// A memory region mapped into a protection domain's address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    /// Region being mapped.
    pub mr: MrId,
    /// Virtual address of the first byte.
    pub vaddr: u64,
    /// Access rights.
    pub perms: Perms,
    /// Whether the mapping is cacheable.
    pub cached: bool,
    /// Program symbol patched with `vaddr` by the image builder.
    pub setvar_vaddr: Option<String>,
    /// Program symbol patched with the region size by the image builder.
    pub setvar_size: Option<String>,
}

impl Map {
    /// Creates a cached mapping with no symbol patching.
    pub const fn new(mr: MrId, vaddr: u64, perms: Perms) -> Self {
        Self {
            mr,
            vaddr,
            perms,
            cached: true,
            setvar_vaddr: None,
            setvar_size: None,
        }
    }

    /// Sets whether the mapping is cacheable.
    #[must_use]
    pub const fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// Sets the symbol that receives the mapping's virtual address.
    #[must_use]
    pub fn with_setvar_vaddr(mut self, symbol: impl Into<String>) -> Self {
        self.setvar_vaddr = Some(symbol.into());
        self
    }

    /// Sets the symbol that receives the region size.
    #[must_use]
    pub fn with_setvar_size(mut self, symbol: impl Into<String>) -> Self {
        self.setvar_size = Some(symbol.into());
        self
    }
}

/// Rounds `value` up to the next page boundary, saturating at the top of the address space.
pub const fn page_align_up(value: u64) -> u64 {
    match value.checked_add(PAGE_SIZE - 1) {
        Some(v) => v & !(PAGE_SIZE - 1),
        None => u64::MAX & !(PAGE_SIZE - 1),
    }
}

/// Rounds `value` down to a page boundary.
pub const fn page_align_down(value: u64) -> u64 {
    value & !(PAGE_SIZE - 1)
}
