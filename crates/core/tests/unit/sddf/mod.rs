//! Subsystem builder tests.

/// Block subsystem.
pub mod blk;


/// Device register and interrupt binding.
pub mod device;

/// GPU subsystem.
pub mod gpu;



/// Network subsystem.
pub mod net;

/// Serial subsystem.
pub mod serial;
