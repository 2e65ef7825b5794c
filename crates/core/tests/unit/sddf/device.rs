//! Device Binding.
//!
//! Verifies how a device's register windows become physical regions: windows sharing a
//! page share a region, empty windows are rejected, and a device bound twice reuses its
//! regions but never its interrupts.

use sdfgen_core::common::constants::VADDR_BASE;
use sdfgen_core::dtb::{Device, DeviceTree, RegEntry};
use sdfgen_core::sddf::{Serial, Subsystem, Timer};
use sdfgen_core::{ErrorKind, SdfError};

use crate::common::fdt::sample_tree;
use crate::common::fixtures::system_with;

fn mmio(name: &str, regs: &[(u64, u64)]) -> Device {
    Device {
        name: name.to_string(),
        compatible: Vec::new(),
        regs: regs
            .iter()
            .map(|&(addr, size)| RegEntry { addr, size })
            .collect(),
        irqs: Vec::new(),
    }
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

#[test]
fn test_windows_in_one_page_share_a_region() {
    let device = mmio("timer@9100000", &[(0x910_0000, 0x100), (0x910_0800, 0x100)]);
    let (mut sdf, pds) = system_with(&[("timer", 254)]);
    let mut timer = Timer::new(&sdf, Some(device), pds[0]).unwrap();
    let _ = timer.connect(&mut sdf).unwrap();

    assert_eq!(sdf.mrs().len(), 1);
    let mr = &sdf.mrs()[0];
    assert_eq!(mr.name(), "timer_timer_timer_regs_0");
    assert_eq!(mr.paddr(), Some(0x910_0000));
    assert_eq!(mr.size(), 0x1000);
    assert_eq!(sdf.pd(pds[0]).unwrap().maps().len(), 1);

    let blobs = timer.config_blobs(&sdf).unwrap();
    let device = &blobs[1].bytes;
    assert_eq!(device[8], 2);
    assert_eq!(le_u64(device, 16), VADDR_BASE);
    assert_eq!(le_u64(device, 16 + 24), VADDR_BASE + 0x800);
    assert_eq!(le_u64(device, 16 + 24 + 16), 0x910_0800);
}

#[test]
fn test_window_spanning_pages_merges_with_its_neighbour() {
    let device = mmio("gpu@9200000", &[(0x920_0800, 0x1000), (0x920_1400, 0x100)]);
    let (mut sdf, pds) = system_with(&[("timer", 254)]);
    let mut timer = Timer::new(&sdf, Some(device), pds[0]).unwrap();
    let _ = timer.connect(&mut sdf).unwrap();

    assert_eq!(sdf.mrs().len(), 1);
    assert_eq!(sdf.mrs()[0].paddr(), Some(0x920_0000));
    assert_eq!(sdf.mrs()[0].size(), 0x2000);
}

#[test]
fn test_empty_window_is_rejected() {
    let device = mmio("timer@9100000", &[(0x910_0000, 0x100), (0x910_1000, 0)]);
    let (sdf, pds) = system_with(&[("timer", 254)]);
    let err = Timer::new(&sdf, Some(device), pds[0]).unwrap_err();
    assert_eq!(
        err,
        SdfError::MalformedProperty {
            node: "timer@9100000".into(),
            property: "reg".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn test_device_without_irqs_is_shared_between_drivers() {
    let device = mmio("counter@9300000", &[(0x930_0000, 0x40)]);
    let (mut sdf, pds) = system_with(&[("timer_a", 254), ("timer_b", 253)]);
    let mut first = Timer::new(&sdf, Some(device.clone()), pds[0]).unwrap();
    let mut second = Timer::new(&sdf, Some(device), pds[1]).unwrap();
    assert_eq!(first.connect(&mut sdf), Ok(true));
    assert_eq!(second.connect(&mut sdf), Ok(true));

    assert_eq!(sdf.mrs().len(), 1);
    let mr = sdf.find_mr("timer_timer_a_counter_regs_0").unwrap();
    for &pd in &pds {
        let maps = sdf.pd(pd).unwrap().maps();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].mr, mr);
    }
}

#[test]
fn test_partial_overlap_with_another_region_is_rejected() {
    let (mut sdf, pds) = system_with(&[("timer_a", 254), ("timer_b", 253)]);
    let wide = mmio("a@9400000", &[(0x940_0000, 0x2000)]);
    let narrow = mmio("b@9401000", &[(0x940_1000, 0x100)]);
    let mut first = Timer::new(&sdf, Some(wide), pds[0]).unwrap();
    let mut second = Timer::new(&sdf, Some(narrow), pds[1]).unwrap();
    let _ = first.connect(&mut sdf).unwrap();
    let before = sdf.clone();

    let err = second.connect(&mut sdf).unwrap_err();
    assert_eq!(
        err,
        SdfError::RegionOverlap {
            mr: "timer_timer_a_a_regs_0".into(),
            paddr: 0x940_1000
        }
    );
    assert_eq!(sdf, before);
}

#[test]
fn test_uart_bound_twice_is_rejected_without_changes() {
    let blob = sample_tree();
    let tree = DeviceTree::parse(&blob).unwrap();
    let uart = Device::from_node(tree.node("pl011@9000000").unwrap()).unwrap();

    let (mut sdf, pds) = system_with(&[
        ("uart", 254),
        ("virt_tx", 253),
        ("uart2", 252),
        ("virt_tx2", 251),
    ]);
    let mut first = Serial::new(&sdf, Some(uart.clone()), pds[0], pds[1], None, false).unwrap();
    let mut second = Serial::new(&sdf, Some(uart), pds[2], pds[3], None, false).unwrap();
    assert_eq!(first.connect(&mut sdf), Ok(true));
    let before = sdf.clone();

    let err = second.connect(&mut sdf).unwrap_err();
    assert_eq!(
        err,
        SdfError::IrqInUse {
            irq: 33,
            pd: "uart".into()
        }
    );
    assert_eq!(sdf, before);
    let regs = sdf
        .mrs()
        .iter()
        .filter(|mr| mr.paddr() == Some(0x900_0000))
        .count();
    assert_eq!(regs, 1);
}
