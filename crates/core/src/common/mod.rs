//! Common types and constants.
//!
//! This module groups the definitions shared by the device-tree reader, the topology model,
//! and the sDDF builders:
//! 1. **Errors:** The crate-wide `SdfError` and its `ErrorKind` taxonomy.
//! 2. **Constants:** Page size, ID ranges, region sizes, and blob layout parameters.

/// Page size, ID limits, region sizes, and blob layout constants.
pub mod constants;
/// Crate-wide error type and error categories.
pub mod error;

pub use error::{DtbError, ErrorKind, IdKind, SdfError, Violation};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SdfError>;
