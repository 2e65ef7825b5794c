//! Shared constants.
//!
//! Values in this module are part of external contracts: the ID ranges bound what the kernel
//! image builder accepts, and the blob layout values are read by boot-time components built
//! independently of this crate. Changing a blob constant requires bumping `CONFIG_VERSION`.

/// Smallest mappable unit (4 KiB) on every supported architecture.
pub const PAGE_SIZE: u64 = 0x1000;

/// Highest legal child-domain and channel-slot ID within one protection domain.
pub const MAX_ID: u8 = u8::MAX;

/// First virtual address handed out by a protection domain's map cursor.
pub const VADDR_BASE: u64 = 0x2000_0000;

/// Default physical address bound when none is configured.
pub const DEFAULT_PADDR_TOP: u64 = 0xa000_0000;

/// Size of every shared queue region.
pub const QUEUE_REGION_SIZE: u64 = 0x1000;

/// Size of a serial data region.
pub const SERIAL_DATA_REGION_SIZE: u64 = 0x2000;

/// Size of an I2C client data region.
pub const I2C_DATA_REGION_SIZE: u64 = 0x1000;

/// Size of a block storage-info region.
pub const BLK_STORAGE_INFO_REGION_SIZE: u64 = 0x1000;

/// Size of a block data region.
pub const BLK_DATA_REGION_SIZE: u64 = 0x20_0000;

/// Size of a GPU events region.
pub const GPU_EVENTS_REGION_SIZE: u64 = 0x1000;

/// Size of a GPU data region.
pub const GPU_DATA_REGION_SIZE: u64 = 0x20_0000;

/// Size of the network RX DMA region and of each client's TX data region.
pub const NET_DATA_REGION_SIZE: u64 = 0x20_0000;

/// Magic bytes at the start of every configuration blob.
pub const CONFIG_MAGIC: [u8; 4] = *b"sDDF";

/// Layout version written into every configuration blob header.
pub const CONFIG_VERSION: u8 = 1;

/// Number of client slots in every fixed-size client array.
pub const MAX_CLIENTS: usize = 61;

/// Width of a fixed NUL-padded name field.
pub const NAME_FIELD_LEN: usize = 64;

/// Length of a textual MAC address (`xx:xx:xx:xx:xx:xx`).
pub const MAC_TEXT_LEN: usize = 17;

/// Prefix of generated locally-administered MAC addresses.
pub const GENERATED_MAC_PREFIX: [u8; 5] = [0x52, 0x54, 0x01, 0x00, 0x00];

/// Number of register-window slots in a device blob.
pub const DEVICE_MAX_REGIONS: usize = 64;

/// Number of IRQ slots in a device blob.
pub const DEVICE_MAX_IRQS: usize = 64;
