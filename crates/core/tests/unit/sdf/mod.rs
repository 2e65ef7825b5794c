//! Topology model tests.

/// Per-domain ID uniqueness, collisions, and exhaustion.
pub mod allocator;

/// Domain registration, children, maps, and physical allocation.
pub mod system;
