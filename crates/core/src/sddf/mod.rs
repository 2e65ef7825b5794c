//! sDDF subsystem builders.
//!
//! A subsystem is a device driver, the virtualizers that multiplex it, and the clients that
//! use it. Each builder binds those domains (and optionally a device-tree device), collects
//! clients with incremental validation, and on `connect` commits the channels and shared
//! memory regions into a `SystemDescription`. After connecting it can emit the binary
//! configuration blobs the components read at boot.
//!
//! Every builder follows the same lifecycle, tracked by `SubsystemState`:
//! 1. **Declared:** Constructed with its device, driver, and virtualizers.
//! 2. **Populated:** At least one client added.
//! 3. **Connected:** Topology committed; further mutation is rejected.
//! 4. **Serialised:** Blobs written; may be repeated.

/// Packed binary configuration blobs.
pub mod blob;
/// Block subsystem.
pub mod blk;
/// GPU subsystem.
pub mod gpu;
/// I2C subsystem.
pub mod i2c;
/// Network subsystem.
pub mod net;
/// Serial subsystem.
pub mod serial;
/// Timer subsystem.
pub mod timer;

use std::path::Path;

pub use blk::Block;
pub use blob::{ConfigBlob, ConfigClass, Connection, DeviceResources, RegionResource};
pub use gpu::Gpu;
pub use i2c::I2c;
pub use net::Network;
pub use serial::Serial;
pub use timer::Timer;

use self::blob::DeviceRegion;
use crate::common::constants::{DEVICE_MAX_IRQS, DEVICE_MAX_REGIONS, MAX_CLIENTS};
use crate::common::{Result, SdfError, Violation};
use crate::dtb::Device;
use crate::sdf::mr::{page_align_down, page_align_up};
use crate::sdf::{ChannelOptions, MemoryRegion, MrId, Perms, PdId, SystemDescription};

/// Lifecycle state of a subsystem builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    /// Constructed; no clients yet.
    Declared,
    /// At least one client added.
    Populated,
    /// Channels and regions committed.
    Connected,
    /// Configuration blobs written at least once.
    Serialised,
}

/// Operations shared by every subsystem builder.
pub trait Subsystem {
    /// Header class of the subsystem's blobs.
    const CLASS: ConfigClass;

    /// Returns the current lifecycle state.
    fn state(&self) -> SubsystemState;

    /// Commits the subsystem's channels, regions, and IRQs into `sdf`.
    ///
    /// Single use and all-or-nothing: on error `sdf` is left exactly as it was.
    ///
    /// # Returns
    ///
    /// `Ok(true)` once connected, or `SdfError::ProtocolViolation` if already connected.
    fn connect(&mut self, sdf: &mut SystemDescription) -> Result<bool>;

    /// Encodes one blob per protection domain of the subsystem, plus a device blob for a
    /// driver bound to a device.
    ///
    /// # Returns
    ///
    /// `SdfError::ProtocolViolation` before `connect`.
    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>>;

    /// Writes the configuration blobs into `dir`.
    ///
    /// # Returns
    ///
    /// `Err(SdfError::ProtocolViolation)` before `connect`, `Ok(false)` if a file cannot be
    /// written (the cause is logged), `Ok(true)` otherwise.
    fn serialise_config(&mut self, sdf: &SystemDescription, dir: &Path) -> Result<bool>;
}

/// Lifecycle guard shared by the builders.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lifecycle {
    class: ConfigClass,
    state: SubsystemState,
}

impl Lifecycle {
    pub(crate) const fn new(class: ConfigClass) -> Self {
        Self {
            class,
            state: SubsystemState::Declared,
        }
    }

    pub(crate) const fn state(self) -> SubsystemState {
        self.state
    }

    pub(crate) fn violation(self, violation: Violation) -> SdfError {
        SdfError::ProtocolViolation {
            subsystem: self.class.as_str(),
            violation,
        }
    }

    pub(crate) const fn is_connected(self) -> bool {
        matches!(
            self.state,
            SubsystemState::Connected | SubsystemState::Serialised
        )
    }

    /// Fails unless clients may still be added.
    pub(crate) fn check_mutable(self) -> Result<()> {
        if self.is_connected() {
            return Err(self.violation(Violation::MutationAfterConnect));
        }
        Ok(())
    }

    /// Fails if `connect` already ran.
    pub(crate) fn check_connectable(self) -> Result<()> {
        if self.is_connected() {
            return Err(self.violation(Violation::AlreadyConnected));
        }
        Ok(())
    }

    pub(crate) fn populated(&mut self) {
        self.state = SubsystemState::Populated;
    }

    pub(crate) fn connected(&mut self) {
        self.state = SubsystemState::Connected;
    }

    pub(crate) fn serialised(&mut self) {
        self.state = SubsystemState::Serialised;
    }
}

/// Both sides of one channel plus the regions shared over it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Link {
    /// The channel's first end.
    pub(crate) a: Connection,
    /// The channel's second end.
    pub(crate) b: Connection,
}

/// Fails unless every domain exists and no two are the same.
pub(crate) fn check_distinct(sdf: &SystemDescription, pds: &[PdId]) -> Result<()> {
    for (index, &pd) in pds.iter().enumerate() {
        let name = sdf.pd_name(pd)?;
        if pds[..index].contains(&pd) {
            return Err(SdfError::SameDomain(name.to_string()));
        }
    }
    Ok(())
}

/// Fails unless `client` can join a subsystem whose roles are `roles` and whose current
/// clients are `clients`.
pub(crate) fn check_client(
    class: ConfigClass,
    sdf: &SystemDescription,
    client: PdId,
    roles: &[PdId],
    clients: &[PdId],
) -> Result<()> {
    let name = sdf.pd_name(client)?;
    if roles.contains(&client) {
        return Err(SdfError::InvalidClient {
            subsystem: class.as_str(),
            name: name.to_string(),
        });
    }
    if clients.contains(&client) {
        return Err(SdfError::DuplicateClient {
            subsystem: class.as_str(),
            client: name.to_string(),
        });
    }
    if clients.len() >= MAX_CLIENTS {
        return Err(SdfError::TooManyClients {
            subsystem: class.as_str(),
            max: MAX_CLIENTS,
        });
    }
    Ok(())
}

/// Fails if the device has an empty register window or more resources than a device blob
/// can describe.
pub(crate) fn check_device(device: &Device) -> Result<()> {
    let property = if device.regs.len() > DEVICE_MAX_REGIONS
        || device.regs.iter().any(|reg| reg.size == 0)
    {
        "reg"
    } else if device.irqs.len() > DEVICE_MAX_IRQS {
        "interrupts"
    } else {
        return Ok(());
    };
    Err(SdfError::MalformedProperty {
        node: device.name.clone(),
        property: property.to_string(),
    })
}

/// Returns `<class>_<owner>_<purpose>`.
pub(crate) fn region_name(class: ConfigClass, owner: &str, purpose: &str) -> String {
    format!("{}_{owner}_{purpose}", class.as_str())
}

/// Creates a region and maps it read-write and cached into every domain in `users`.
///
/// # Returns
///
/// The mapping of each user, in `users` order.
pub(crate) fn shared_region(
    sdf: &mut SystemDescription,
    name: String,
    size: u64,
    users: &[PdId],
) -> Result<Vec<RegionResource>> {
    let mr = sdf.add_mr(MemoryRegion::new(name, size))?;
    map_into(sdf, mr, users)
}

/// Creates a region at a freshly allocated physical address and maps it into `users`.
///
/// # Returns
///
/// The physical address and the mapping of each user, in `users` order.
pub(crate) fn dma_region(
    sdf: &mut SystemDescription,
    name: String,
    size: u64,
    users: &[PdId],
) -> Result<(u64, Vec<RegionResource>)> {
    let paddr = sdf.allocate_paddr(size)?;
    let mr = sdf.add_mr(MemoryRegion::physical(name, size, paddr))?;
    Ok((paddr, map_into(sdf, mr, users)?))
}

fn map_into(
    sdf: &mut SystemDescription,
    mr: MrId,
    users: &[PdId],
) -> Result<Vec<RegionResource>> {
    let size = sdf.mr(mr)?.size();
    users
        .iter()
        .map(|&pd| {
            let vaddr = sdf.map_region(pd, mr, Perms::RW, true)?;
            Ok(RegionResource { vaddr, size })
        })
        .collect()
}

/// Creates a channel between `a` and `b` and one shared region per `(purpose, size)` pair.
///
/// Regions are named after `owner` and mapped into both ends.
pub(crate) fn link(
    sdf: &mut SystemDescription,
    class: ConfigClass,
    (a, b): (PdId, PdId),
    options: ChannelOptions,
    owner: &str,
    regions: &[(&str, u64)],
) -> Result<Link> {
    let channel = sdf.add_channel(a, b, options)?;
    let mut link = Link {
        a: Connection {
            regions: Vec::with_capacity(regions.len()),
            id: channel.a_id,
        },
        b: Connection {
            regions: Vec::with_capacity(regions.len()),
            id: channel.b_id,
        },
    };
    for &(purpose, size) in regions {
        let mapped = shared_region(sdf, region_name(class, owner, purpose), size, &[a, b])?;
        if let [in_a, in_b] = mapped[..] {
            link.a.regions.push(in_a);
            link.b.regions.push(in_b);
        }
    }
    Ok(link)
}

/// Maps a device's register windows uncached into its driver and routes its IRQs there.
///
/// Windows sharing a page are covered by one physical region. A physical region already
/// covering exactly the same pages is reused, and mapped into the driver only if it is not
/// mapped there yet.
pub(crate) fn map_device(
    sdf: &mut SystemDescription,
    class: ConfigClass,
    device: &Device,
    driver: PdId,
) -> Result<DeviceResources> {
    let driver_name = sdf.pd_name(driver)?.to_string();
    let spans = page_spans(device);
    let mut mapped = Vec::with_capacity(spans.len());
    for (index, &(start, end)) in spans.iter().enumerate() {
        let name = region_name(
            class,
            &driver_name,
            &format!("{}_regs_{index}", device.base_name()),
        );
        let mr = device_region(sdf, name, start, end - start)?;
        let existing = sdf
            .pd(driver)?
            .maps()
            .iter()
            .find(|map| map.mr == mr)
            .map(|map| map.vaddr);
        let vaddr = match existing {
            Some(vaddr) => vaddr,
            None => sdf.map_region(driver, mr, Perms::RW, false)?,
        };
        mapped.push((start, end, vaddr));
    }

    let mut resources = DeviceResources::default();
    for reg in &device.regs {
        let Some(&(start, _, vaddr)) = mapped
            .iter()
            .find(|&&(start, end, _)| start <= reg.addr && reg.addr < end)
        else {
            return Err(SdfError::MalformedProperty {
                node: device.name.clone(),
                property: "reg".to_string(),
            });
        };
        resources.regions.push(DeviceRegion {
            region: RegionResource {
                vaddr: vaddr + (reg.addr - start),
                size: reg.size,
            },
            io_addr: reg.addr,
        });
    }

    for irq in &device.irqs {
        let id = sdf.add_irq(driver, irq.number, irq.trigger, None)?;
        resources.irqs.push(id);
    }

    tracing::debug!(
        device = %device.name,
        driver = %driver_name,
        regions = mapped.len(),
        windows = resources.regions.len(),
        irqs = resources.irqs.len(),
        "mapped device into driver"
    );
    Ok(resources)
}

/// Returns the page ranges `[start, end)` covering a device's windows, ascending.
///
/// Windows touching a common page share one range; windows in adjacent pages do not.
fn page_spans(device: &Device) -> Vec<(u64, u64)> {
    let mut pages: Vec<(u64, u64)> = device
        .regs
        .iter()
        .map(|reg| {
            (
                page_align_down(reg.addr),
                page_align_up(reg.addr.saturating_add(reg.size)),
            )
        })
        .collect();
    pages.sort_unstable();

    let mut spans: Vec<(u64, u64)> = Vec::with_capacity(pages.len());
    for (start, end) in pages {
        match spans.last_mut() {
            Some(last) if start < last.1 => last.1 = last.1.max(end),
            _ => spans.push((start, end)),
        }
    }
    spans
}

/// Returns the physical region pinned at exactly `[paddr, paddr + size)`, creating it under
/// `name` if none exists.
///
/// # Returns
///
/// `SdfError::RegionOverlap` if the range partially overlaps another physical region.
fn device_region(
    sdf: &mut SystemDescription,
    name: String,
    paddr: u64,
    size: u64,
) -> Result<MrId> {
    let end = paddr.saturating_add(size);
    for (index, mr) in sdf.mrs().iter().enumerate() {
        let Some(base) = mr.paddr() else {
            continue;
        };
        if base == paddr && mr.size() == size {
            tracing::debug!(mr = mr.name(), paddr, "reusing device region");
            return Ok(MrId(index));
        }
        if base < end && paddr < base.saturating_add(mr.size()) {
            return Err(SdfError::RegionOverlap {
                mr: mr.name().to_string(),
                paddr,
            });
        }
    }
    sdf.add_mr(MemoryRegion::physical(name, size, paddr))
}
