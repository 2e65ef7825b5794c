//! System fixtures.

use sdfgen_core::sdf::{Arch, PdId, ProtectionDomain, SystemDescription};
use tracing_subscriber::EnvFilter;

/// Physical bound used by most fixtures.
pub const PADDR_TOP: u64 = 0xa000_0000;

/// Installs a test-friendly log subscriber once per process (filter from `SDFGEN_LOG`).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("SDFGEN_LOG"))
        .with_test_writer()
        .try_init();
}

/// Creates an AArch64 system with one registered domain per `(name, priority)` pair.
pub fn system_with(pds: &[(&str, u8)]) -> (SystemDescription, Vec<PdId>) {
    init_logging();
    let mut sdf = SystemDescription::new(Arch::Aarch64, PADDR_TOP);
    let ids = pds
        .iter()
        .map(|&(name, priority)| {
            sdf.add_pd(ProtectionDomain::new(name, format!("{name}.elf")).with_priority(priority))
        })
        .collect();
    (sdf, ids)
}

/// Counts the `<channel>` elements of a rendered description.
pub fn channel_count(xml: &str) -> usize {
    xml.matches("<channel>").count()
}
