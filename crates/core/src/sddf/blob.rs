//! Packed binary configuration blobs.
//!
//! Every blob starts with an 8-byte header: the magic `sDDF`, a class byte, the layout
//! version, and two reserved zero bytes. The body is a sequence of little-endian fields with
//! explicit widths:
//! - a region is `vaddr: u64, size: u64`;
//! - a connection is its regions followed by `id: u8` and 7 padding bytes;
//! - a client array is `num_clients: u64` followed by exactly `MAX_CLIENTS` entries, unused
//!   entries zero filled;
//! - a name is a 64-byte NUL-padded field.
//!
//! Absent connections are encoded as zeros of the same size, so the size of a blob depends
//! only on its class and role.

use std::fs;
use std::io;
use std::path::Path;

use crate::common::constants::{
    CONFIG_MAGIC, CONFIG_VERSION, DEVICE_MAX_IRQS, DEVICE_MAX_REGIONS, MAX_CLIENTS, NAME_FIELD_LEN,
};

/// Class byte of a blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConfigClass {
    /// Block subsystem.
    Blk = 1,
    /// I2C subsystem.
    I2c = 2,
    /// Network subsystem.
    Net = 3,
    /// Serial subsystem.
    Serial = 4,
    /// Timer subsystem.
    Timer = 5,
    /// Device resources of a driver.
    Device = 6,
    /// GPU subsystem.
    Gpu = 7,
}

impl ConfigClass {
    /// Returns the prefix used in region and file names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blk => "blk",
            Self::I2c => "i2c",
            Self::Net => "net",
            Self::Serial => "serial",
            Self::Timer => "timer",
            Self::Device => "device",
            Self::Gpu => "gpu",
        }
    }
}

/// A region as seen from one protection domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionResource {
    /// Virtual address in the domain.
    pub vaddr: u64,
    /// Size in bytes.
    pub size: u64,
}

/// One side of a channel plus the regions shared over it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    /// Shared regions as mapped on this side.
    pub regions: Vec<RegionResource>,
    /// This side's channel slot.
    pub id: u8,
}

/// A device register window as mapped into its driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceRegion {
    /// Mapping in the driver, offset to the first register.
    pub region: RegionResource,
    /// Physical address of the first register.
    pub io_addr: u64,
}

/// Resources a driver receives from the device it is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceResources {
    /// Register windows in `reg` order.
    pub regions: Vec<DeviceRegion>,
    /// Channel slots of the device's IRQs in `interrupts` order.
    pub irqs: Vec<u8>,
}

/// A finished blob and the file name it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlob {
    /// File name inside the output directory.
    pub file_name: String,
    /// Header class.
    pub class: ConfigClass,
    /// Encoded bytes, header included.
    pub bytes: Vec<u8>,
}

impl ConfigBlob {
    /// Writes the blob into `dir`, replacing any existing file of the same name.
    pub fn write_to(&self, dir: &Path) -> io::Result<()> {
        fs::write(dir.join(&self.file_name), &self.bytes)
    }
}

/// Little-endian field encoder.
#[derive(Debug)]
pub struct ConfigWriter {
    bytes: Vec<u8>,
}

impl ConfigWriter {
    /// Starts a blob with the header for `class`.
    pub fn new(class: ConfigClass) -> Self {
        let mut bytes = Vec::with_capacity(256);
        bytes.extend_from_slice(&CONFIG_MAGIC);
        bytes.push(class as u8);
        bytes.push(CONFIG_VERSION);
        bytes.extend_from_slice(&[0; 2]);
        Self { bytes }
    }

    /// Appends a byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    /// Appends a `u32`.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends a `u64`.
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Appends `count` zero bytes.
    pub fn pad(&mut self, count: usize) -> &mut Self {
        self.bytes.resize(self.bytes.len() + count, 0);
        self
    }

    /// Appends a `bool` as one byte followed by 7 padding bytes.
    pub fn flag(&mut self, value: bool) -> &mut Self {
        self.u8(u8::from(value)).pad(7)
    }

    /// Appends a region, or zeros when absent.
    pub fn region(&mut self, region: Option<&RegionResource>) -> &mut Self {
        let region = region.copied().unwrap_or_default();
        self.u64(region.vaddr).u64(region.size)
    }

    /// Appends a connection with exactly `regions` region slots, or zeros when absent.
    pub fn connection(&mut self, conn: Option<&Connection>, regions: usize) -> &mut Self {
        for index in 0..regions {
            let _ = self.region(conn.and_then(|c| c.regions.get(index)));
        }
        self.u8(conn.map_or(0, |c| c.id)).pad(7)
    }

    /// Appends a fixed 64-byte name field.
    ///
    /// Builders reject longer names up front; a name that still does not fit is truncated so
    /// a terminating NUL always fits, and the truncation is logged.
    pub fn name(&mut self, name: &str) -> &mut Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_FIELD_LEN - 1);
        if len < bytes.len() {
            tracing::warn!(name, max = NAME_FIELD_LEN - 1, "truncated name field");
        }
        self.bytes.extend_from_slice(&bytes[..len]);
        self.pad(NAME_FIELD_LEN - len)
    }

    /// Appends a MAC address followed by 2 padding bytes.
    pub fn mac(&mut self, mac: &[u8; 6]) -> &mut Self {
        self.bytes.extend_from_slice(mac);
        self.pad(2)
    }

    /// Appends a client array: the count, then `MAX_CLIENTS` entries.
    ///
    /// `entry` is called once per slot with `Some` for occupied slots and `None` for unused
    /// ones, and must write the same number of bytes in both cases.
    pub fn clients<T>(
        &mut self,
        items: &[T],
        mut entry: impl FnMut(&mut Self, Option<&T>),
    ) -> &mut Self {
        let _ = self.u64(items.len() as u64);
        for index in 0..MAX_CLIENTS {
            entry(self, items.get(index));
        }
        self
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if nothing has been written, which never holds after `new`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Finishes the blob under `file_name`.
    pub fn finish(self, class: ConfigClass, file_name: String) -> ConfigBlob {
        ConfigBlob {
            file_name,
            class,
            bytes: self.bytes,
        }
    }
}

/// Returns `<class>_<pd>.data`.
pub fn file_name(class: ConfigClass, pd: &str) -> String {
    format!("{}_{pd}.data", class.as_str())
}

/// Encodes the device blob of a driver bound to a device.
///
/// The body is `num_regions: u8, num_irqs: u8`, 6 padding bytes, `DEVICE_MAX_REGIONS`
/// entries of `region, io_addr: u64`, then `DEVICE_MAX_IRQS` entries of `id: u8` plus 7
/// padding bytes.
pub fn device_blob(class: ConfigClass, pd: &str, device: &DeviceResources) -> ConfigBlob {
    let mut w = ConfigWriter::new(ConfigClass::Device);
    let num_regions = device.regions.len().min(DEVICE_MAX_REGIONS);
    let num_irqs = device.irqs.len().min(DEVICE_MAX_IRQS);
    let _ = w
        .u8(u8::try_from(num_regions).unwrap_or(u8::MAX))
        .u8(u8::try_from(num_irqs).unwrap_or(u8::MAX))
        .pad(6);
    for index in 0..DEVICE_MAX_REGIONS {
        let entry = device.regions.get(index).copied().unwrap_or_default();
        let _ = w.region(Some(&entry.region)).u64(entry.io_addr);
    }
    for index in 0..DEVICE_MAX_IRQS {
        let _ = w.u8(device.irqs.get(index).copied().unwrap_or(0)).pad(7);
    }
    w.finish(
        ConfigClass::Device,
        format!("{}_{pd}_device.data", class.as_str()),
    )
}

/// Writes every blob into `dir`.
///
/// # Returns
///
/// `false` (after logging the cause) as soon as one blob cannot be written.
pub fn write_all(blobs: &[ConfigBlob], dir: &Path) -> bool {
    for blob in blobs {
        if let Err(err) = blob.write_to(dir) {
            tracing::warn!(
                file = %blob.file_name,
                dir = %dir.display(),
                error = %err,
                "failed to write configuration blob"
            );
            return false;
        }
    }
    tracing::info!(count = blobs.len(), dir = %dir.display(), "wrote configuration blobs");
    true
}
