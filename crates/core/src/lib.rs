//! Resource-topology compiler for statically-configured microkernel systems.
//!
//! This crate turns a declarative description of protection domains, devices, and channels
//! into the artifacts a Microkit-style system needs at build and boot time:
//! 1. **Device tree:** Parsing of flattened device-tree blobs and path lookup of device nodes.
//! 2. **Topology:** The `SystemDescription` arena of protection domains, channels, memory
//!    regions, and the per-domain ID allocators that keep slot numbers unique.
//! 3. **sDDF subsystems:** Serial, I2C, block, network, GPU, and timer builders that wire
//!    drivers, virtualizers, and clients onto the topology.
//! 4. **Serialization:** The XML system description and the packed binary configuration
//!    blobs read by drivers and virtualizers at boot.
//! 5. **Configuration:** A JSON system spec that builds a topology without code.

/// Common types (errors, constants).
pub mod common;
/// JSON system spec (arch, protection domains, channels) and its builder.
pub mod config;
/// Flattened device-tree reader and device resource resolution.
pub mod dtb;
/// sDDF subsystem builders and binary configuration blobs.
pub mod sddf;
/// Topology model: system description, protection domains, channels, memory regions.
pub mod sdf;

/// Crate-wide error type; see [`common::error`].
pub use crate::common::error::{ErrorKind, SdfError};
/// Root configuration type; deserialize from JSON and call `build`.
pub use crate::config::SystemSpec;
/// Parsed device tree; construct with `DeviceTree::parse`.
pub use crate::dtb::DeviceTree;
/// Top-level topology type; construct with `SystemDescription::new`.
pub use crate::sdf::SystemDescription;
