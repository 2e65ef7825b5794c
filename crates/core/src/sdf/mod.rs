//! Topology model.
//!
//! This module describes the static structure of a system. It provides:
//! 1. **Architecture:** `Arch`, the target the description is rendered for.
//! 2. **Identifiers:** `IdAllocator`, the per-domain allocator for child and channel-slot IDs.
//! 3. **Entities:** `ProtectionDomain`, `Channel`, `MemoryRegion`, `Map`, and `Irq`.
//! 4. **Arena:** `SystemDescription`, which owns every entity and hands out index handles.
//! 5. **Rendering:** The XML description consumed by the image builder.

/// Target architectures.
pub mod arch;
/// Channels between protection domains.
pub mod channel;
/// Scope-local ID allocation.
pub mod ids;
/// Memory regions and mappings.
pub mod mr;
/// Protection domains and IRQs.
pub mod pd;
/// XML rendering.
pub mod render;
/// The system description arena.
pub mod system;

pub use arch::Arch;
pub use channel::{Channel, ChannelId, ChannelOptions};
pub use ids::{AllocError, IdAllocator};
pub use mr::{Map, MemoryRegion, MrId, Perms};
pub use pd::{Irq, IrqTrigger, PdId, ProtectionDomain};
pub use system::SystemDescription;
