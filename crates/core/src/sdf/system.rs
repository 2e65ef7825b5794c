//! The system description arena.
//!
//! `SystemDescription` owns every protection domain, channel, and memory region of one
//! system. Entities refer to each other through index handles (`PdId`, `ChannelId`, `MrId`)
//! resolved against the arena, never through shared references. It provides:
//! 1. **Registration:** Domains are created into the arena and listed at top level or linked
//!    under a parent; listing order is the order of the rendered description.
//! 2. **Wiring:** Channels, IRQs, and mappings, each consuming IDs or address space from the
//!    domains involved.
//! 3. **Memory:** Named regions and a downward physical allocator for DMA buffers.
//! 4. **Transactions:** `transaction` restores the prior state when a multi-step operation fails.

use super::arch::Arch;
use super::channel::{Channel, ChannelId, ChannelOptions};
use super::mr::{Map, MemoryRegion, MrId, Perms, page_align_up};
use super::pd::{Irq, IrqTrigger, PdId, ProtectionDomain};
use crate::common::constants::PAGE_SIZE;
use crate::common::{Result, SdfError};

/// A complete system: architecture, physical bound, domains, channels, and memory regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDescription {
    arch: Arch,
    paddr_top: u64,
    paddr_floor: u64,
    pds: Vec<ProtectionDomain>,
    registered: Vec<PdId>,
    channels: Vec<Channel>,
    mrs: Vec<MemoryRegion>,
}

impl SystemDescription {
    /// Creates an empty system.
    ///
    /// # Arguments
    ///
    /// * `arch` - Target architecture.
    /// * `paddr_top` - Upper bound of the physical memory available for allocated regions.
    pub const fn new(arch: Arch, paddr_top: u64) -> Self {
        Self {
            arch,
            paddr_top,
            paddr_floor: paddr_top,
            pds: Vec::new(),
            registered: Vec::new(),
            channels: Vec::new(),
            mrs: Vec::new(),
        }
    }

    /// Returns the target architecture.
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    /// Returns the physical address bound.
    pub const fn paddr_top(&self) -> u64 {
        self.paddr_top
    }

    /// Moves a domain into the arena without listing it.
    ///
    /// The domain becomes part of the rendered description once it is registered with
    /// `register_pd` or linked under a parent with `adopt_child`.
    pub fn create_pd(&mut self, pd: ProtectionDomain) -> PdId {
        let id = PdId(self.pds.len());
        self.pds.push(pd);
        id
    }

    /// Lists a created domain at top level.
    ///
    /// # Returns
    ///
    /// `SdfError::UnknownDomain` for a foreign handle, or `SdfError::AlreadyRegistered` if the
    /// domain is already listed or is a child.
    pub fn register_pd(&mut self, id: PdId) -> Result<()> {
        let pd = self.pd(id)?;
        if pd.parent.is_some() || self.registered.contains(&id) {
            return Err(SdfError::AlreadyRegistered(pd.name().to_string()));
        }
        self.registered.push(id);
        Ok(())
    }

    /// Moves a domain into the arena and lists it at top level.
    pub fn add_pd(&mut self, pd: ProtectionDomain) -> PdId {
        let id = self.create_pd(pd);
        self.registered.push(id);
        id
    }

    /// Moves a domain into the arena as a child of `parent`.
    ///
    /// # Arguments
    ///
    /// * `parent` - The parent domain.
    /// * `child` - The new child.
    /// * `child_id` - Child ID to claim in the parent, or `None` for the lowest free one.
    ///
    /// # Returns
    ///
    /// The child's handle and its ID within the parent. On failure the arena is unchanged.
    pub fn add_child(
        &mut self,
        parent: PdId,
        child: ProtectionDomain,
        child_id: Option<u8>,
    ) -> Result<(PdId, u8)> {
        self.transaction(|sdf| {
            let id = sdf.create_pd(child);
            let allocated = sdf.adopt_child(parent, id, child_id)?;
            Ok((id, allocated))
        })
    }

    /// Links a created, unlisted domain under `parent`.
    ///
    /// # Returns
    ///
    /// The child ID within the parent, `SdfError::SameDomain` if `child == parent`,
    /// `SdfError::AlreadyRegistered` if the child is already listed or has a parent, or an
    /// allocation error from the parent's child-ID space.
    pub fn adopt_child(&mut self, parent: PdId, child: PdId, child_id: Option<u8>) -> Result<u8> {
        let child_pd = self.pd(child)?;
        if parent == child {
            return Err(SdfError::SameDomain(child_pd.name().to_string()));
        }
        if child_pd.parent.is_some() || self.registered.contains(&child) {
            return Err(SdfError::AlreadyRegistered(child_pd.name().to_string()));
        }
        if self.is_ancestor(child, parent) {
            return Err(SdfError::SameDomain(child_pd.name().to_string()));
        }
        let id = self.pd_mut(parent)?.allocate_child_id(child_id)?;
        self.pd_mut(parent)?.children.push((id, child));
        self.pd_mut(child)?.parent = Some(parent);
        Ok(id)
    }

    /// Returns `true` if `ancestor` is `pd` or one of its ancestors.
    fn is_ancestor(&self, ancestor: PdId, pd: PdId) -> bool {
        let mut current = Some(pd);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.pds.get(id.0).and_then(|p| p.parent);
        }
        false
    }

    /// Returns the domain behind a handle.
    pub fn pd(&self, id: PdId) -> Result<&ProtectionDomain> {
        self.pds.get(id.0).ok_or(SdfError::UnknownDomain(id.0))
    }

    pub(crate) fn pd_mut(&mut self, id: PdId) -> Result<&mut ProtectionDomain> {
        self.pds.get_mut(id.0).ok_or(SdfError::UnknownDomain(id.0))
    }

    /// Returns the name of the domain behind a handle.
    pub fn pd_name(&self, id: PdId) -> Result<&str> {
        self.pd(id).map(ProtectionDomain::name)
    }

    /// Finds a domain by name (first match in creation order).
    pub fn find_pd(&self, name: &str) -> Option<PdId> {
        self.pds.iter().position(|pd| pd.name() == name).map(PdId)
    }

    /// Returns the top-level domains in registration order.
    pub fn registered(&self) -> &[PdId] {
        &self.registered
    }

    /// Returns `true` if the domain is listed, directly or through its ancestors.
    pub fn is_registered(&self, id: PdId) -> bool {
        let mut current = Some(id);
        while let Some(pd) = current {
            if self.registered.contains(&pd) {
                return true;
            }
            current = self.pds.get(pd.0).and_then(|p| p.parent);
        }
        false
    }

    /// Creates a channel between two distinct domains.
    ///
    /// Each end claims a slot in its domain's channel ID space. The operation is atomic: if
    /// the second end cannot be allocated, the first end's slot is released.
    ///
    /// # Returns
    ///
    /// The committed channel, or `SdfError::SameDomain`, `SdfError::UnknownDomain`,
    /// `SdfError::Collision`, or `SdfError::Exhausted`.
    pub fn add_channel(&mut self, a: PdId, b: PdId, options: ChannelOptions) -> Result<Channel> {
        let a_name = self.pd(a)?.name().to_string();
        let _ = self.pd(b)?;
        if a == b {
            return Err(SdfError::SameDomain(a_name));
        }

        let a_id = self.pd_mut(a)?.allocate_channel_id(options.a_id)?;
        let b_id = match self.pd_mut(b)?.allocate_channel_id(options.b_id) {
            Ok(id) => id,
            Err(err) => {
                self.pd_mut(a)?.release_channel_id(a_id);
                return Err(err);
            }
        };

        let channel = Channel {
            a,
            b,
            a_id,
            b_id,
            pp_a: options.pp_a,
            pp_b: options.pp_b,
            notify_a: options.notify_a,
            notify_b: options.notify_b,
        };
        self.channels.push(channel);
        Ok(channel)
    }

    /// Returns the channel behind a handle.
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0)
    }

    /// Finds the first channel connecting `x` and `y` in either direction.
    pub fn find_channel(&self, x: PdId, y: PdId) -> Option<ChannelId> {
        self.channels
            .iter()
            .position(|c| c.connects(x, y))
            .map(ChannelId)
    }

    /// Returns every channel in creation order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Delivers an interrupt to a domain on one of its channel slots.
    ///
    /// # Returns
    ///
    /// The slot ID, which shares the space of the domain's channel ends, or
    /// `SdfError::IrqInUse` if any domain already receives `irq`.
    pub fn add_irq(
        &mut self,
        pd: PdId,
        irq: u32,
        trigger: IrqTrigger,
        id: Option<u8>,
    ) -> Result<u8> {
        if let Some(owner) = self
            .pds
            .iter()
            .find(|domain| domain.irqs.iter().any(|i| i.irq == irq))
        {
            return Err(SdfError::IrqInUse {
                irq,
                pd: owner.name().to_string(),
            });
        }
        let domain = self.pd_mut(pd)?;
        let id = domain.allocate_channel_id(id)?;
        domain.irqs.push(Irq { irq, trigger, id });
        Ok(id)
    }

    /// Adds a named memory region.
    ///
    /// # Returns
    ///
    /// The region handle, or `SdfError::DuplicateRegion` if the name is taken.
    pub fn add_mr(&mut self, mr: MemoryRegion) -> Result<MrId> {
        if self.find_mr(mr.name()).is_some() {
            return Err(SdfError::DuplicateRegion(mr.name().to_string()));
        }
        tracing::debug!(mr = mr.name(), size = mr.size(), paddr = ?mr.paddr(), "added memory region");
        let id = MrId(self.mrs.len());
        self.mrs.push(mr);
        Ok(id)
    }

    /// Returns the region behind a handle.
    pub fn mr(&self, id: MrId) -> Result<&MemoryRegion> {
        self.mrs.get(id.0).ok_or(SdfError::UnknownRegion(id.0))
    }

    /// Finds a region by name.
    pub fn find_mr(&self, name: &str) -> Option<MrId> {
        self.mrs.iter().position(|mr| mr.name() == name).map(MrId)
    }

    /// Returns every memory region in creation order.
    pub fn mrs(&self) -> &[MemoryRegion] {
        &self.mrs
    }

    /// Maps a region into a domain at an explicit virtual address.
    ///
    /// # Returns
    ///
    /// `SdfError::MapOverlap` if the mapping intersects an existing mapping of the domain.
    pub fn add_map(&mut self, pd: PdId, map: Map) -> Result<()> {
        let size = self.mr(map.mr)?.size();
        if self.overlapping_map(pd, map.vaddr, size)?.is_some() {
            return Err(SdfError::MapOverlap {
                pd: self.pd(pd)?.name().to_string(),
                mr: self.mr(map.mr)?.name().to_string(),
                vaddr: map.vaddr,
            });
        }
        self.pd_mut(pd)?.maps.push(map);
        Ok(())
    }

    /// Maps a region into a domain at the next free address of the domain's map cursor.
    ///
    /// # Returns
    ///
    /// The chosen virtual address.
    pub fn map_region(&mut self, pd: PdId, mr: MrId, perms: Perms, cached: bool) -> Result<u64> {
        let size = self.mr(mr)?.size();
        let mut vaddr = self.pd(pd)?.vaddr_cursor;
        while let Some(end) = self.overlapping_map(pd, vaddr, size)? {
            vaddr = page_align_up(end);
        }
        let Some(end) = vaddr.checked_add(size) else {
            return Err(SdfError::MapOverlap {
                pd: self.pd(pd)?.name().to_string(),
                mr: self.mr(mr)?.name().to_string(),
                vaddr,
            });
        };

        let domain = self.pd_mut(pd)?;
        domain.maps.push(Map::new(mr, vaddr, perms).with_cached(cached));
        domain.vaddr_cursor = end;
        tracing::debug!(pd = domain.name(), vaddr, size, "mapped region");
        Ok(vaddr)
    }

    /// Returns the end address of the first mapping of `pd` intersecting `[vaddr, vaddr + size)`.
    fn overlapping_map(&self, pd: PdId, vaddr: u64, size: u64) -> Result<Option<u64>> {
        let end = vaddr.saturating_add(size);
        let domain = self.pd(pd)?;
        for map in &domain.maps {
            let map_size = self.mr(map.mr)?.size();
            let map_end = map.vaddr.saturating_add(map_size);
            if vaddr < map_end && map.vaddr < end {
                return Ok(Some(map_end));
            }
        }
        Ok(None)
    }

    /// Reserves physical memory below everything allocated so far.
    ///
    /// The size is rounded up to a page. Power-of-two sizes are aligned to their size, other
    /// sizes to a page.
    ///
    /// # Returns
    ///
    /// The base address, or `SdfError::PhysicalExhausted` if the range would go below zero.
    pub fn allocate_paddr(&mut self, size: u64) -> Result<u64> {
        let size = page_align_up(size);
        let align = if size.is_power_of_two() { size } else { PAGE_SIZE };
        let floor = self.paddr_floor;
        let base = floor
            .checked_sub(size)
            .map(|base| base & !(align - 1))
            .ok_or(SdfError::PhysicalExhausted { size, floor })?;
        self.paddr_floor = base;
        tracing::debug!(base, size, "allocated physical memory");
        Ok(base)
    }

    /// Runs `f` against the system, restoring the prior state if it fails.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}
