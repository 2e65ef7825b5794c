//! System Description Operations.
//!
//! Verifies domain registration, child nesting, memory-region bookkeeping, virtual
//! address assignment, and downward physical allocation.

use rstest::rstest;
use sdfgen_core::common::constants::{PAGE_SIZE, VADDR_BASE};
use sdfgen_core::sdf::{
    Arch, ChannelOptions, Map, MemoryRegion, Perms, ProtectionDomain, SystemDescription,
};
use sdfgen_core::{ErrorKind, SdfError};

use crate::common::fixtures::{PADDR_TOP, system_with};

// ──────────────────────────────────────────────────────────
// Domains
// ──────────────────────────────────────────────────────────

#[test]
fn test_add_pd_registers_in_order() {
    let (sdf, pds) = system_with(&[("first", 10), ("second", 20)]);
    assert_eq!(sdf.registered(), pds.as_slice());
    assert_eq!(sdf.pd_name(pds[1]).unwrap(), "second");
    assert_eq!(sdf.pd(pds[0]).unwrap().priority(), Some(10));
    assert_eq!(sdf.find_pd("second"), Some(pds[1]));
}

#[test]
fn test_created_pd_is_not_listed_until_registered() {
    let mut sdf = SystemDescription::new(Arch::Aarch64, PADDR_TOP);
    let pd = sdf.create_pd(ProtectionDomain::new("late", "late.elf"));
    assert!(!sdf.is_registered(pd));
    assert!(!sdf.render().contains("late"));

    sdf.register_pd(pd).unwrap();
    assert!(sdf.is_registered(pd));
    assert_eq!(
        sdf.register_pd(pd),
        Err(SdfError::AlreadyRegistered("late".into()))
    );
}

#[test]
fn test_foreign_handle_is_not_found() {
    let (mut sdf, _) = system_with(&[("a", 1)]);
    let (_, foreign) = system_with(&[("x", 1), ("y", 1), ("z", 1)]);
    let err = sdf.register_pd(foreign[2]).unwrap_err();
    assert_eq!(err, SdfError::UnknownDomain(2));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_children_nest_with_ids() {
    let (mut sdf, pds) = system_with(&[("parent", 100)]);
    let (child, id) = sdf
        .add_child(pds[0], ProtectionDomain::new("child", "child.elf"), Some(4))
        .unwrap();
    let (grandchild, grand_id) = sdf
        .add_child(child, ProtectionDomain::new("grandchild", "gc.elf"), None)
        .unwrap();

    assert_eq!(id, 4);
    assert_eq!(grand_id, 0);
    assert_eq!(sdf.pd(pds[0]).unwrap().children(), &[(4, child)]);
    assert_eq!(sdf.pd(grandchild).unwrap().parent(), Some(child));
    assert!(sdf.is_registered(grandchild));
    assert_eq!(sdf.registered(), pds.as_slice());
}

#[test]
fn test_adopt_child_rejects_self_and_cycles() {
    let mut sdf = SystemDescription::new(Arch::Aarch64, PADDR_TOP);
    let root = sdf.add_pd(ProtectionDomain::new("root", "root.elf"));
    let (child, _) = sdf
        .add_child(root, ProtectionDomain::new("child", "child.elf"), None)
        .unwrap();

    assert_eq!(
        sdf.adopt_child(root, root, None),
        Err(SdfError::SameDomain("root".into()))
    );
    assert_eq!(
        sdf.adopt_child(child, root, None),
        Err(SdfError::AlreadyRegistered("root".into()))
    );

    let floating = sdf.create_pd(ProtectionDomain::new("floating", "f.elf"));
    let (leaf, _) = sdf
        .add_child(floating, ProtectionDomain::new("leaf", "leaf.elf"), None)
        .unwrap();
    let err = sdf.adopt_child(leaf, floating, None).unwrap_err();
    assert_eq!(err, SdfError::SameDomain("floating".into()));
}

#[test]
fn test_adopt_child_twice_is_rejected() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 1)]);
    let orphan = sdf.create_pd(ProtectionDomain::new("orphan", "orphan.elf"));
    assert_eq!(sdf.adopt_child(pds[0], orphan, Some(9)), Ok(9));
    assert_eq!(
        sdf.adopt_child(pds[1], orphan, None),
        Err(SdfError::AlreadyRegistered("orphan".into()))
    );
}

#[test]
fn test_channel_to_self_is_rejected() {
    let (mut sdf, pds) = system_with(&[("solo", 1)]);
    let err = sdf
        .add_channel(pds[0], pds[0], ChannelOptions::default())
        .unwrap_err();
    assert_eq!(err, SdfError::SameDomain("solo".into()));
    assert!(sdf.pd(pds[0]).unwrap().channel_ids().is_empty());
}

#[test]
fn test_find_channel_either_direction() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 1), ("c", 1)]);
    let _ = sdf.add_channel(pds[0], pds[1], ChannelOptions::default()).unwrap();
    let _ = sdf.add_channel(pds[2], pds[1], ChannelOptions::pp_a()).unwrap();

    let found = sdf.find_channel(pds[1], pds[2]).unwrap();
    assert_eq!(found.index(), 1);
    let channel = sdf.channel(found).unwrap();
    assert!(channel.pp_a);
    assert_eq!(channel.id_of(pds[1]), Some(1));
    assert_eq!(channel.id_of(pds[0]), None);
    assert!(sdf.find_channel(pds[0], pds[2]).is_none());
}

// ──────────────────────────────────────────────────────────
// Memory
// ──────────────────────────────────────────────────────────

#[test]
fn test_duplicate_region_name() {
    let (mut sdf, _) = system_with(&[]);
    let _ = sdf.add_mr(MemoryRegion::new("shared", PAGE_SIZE)).unwrap();
    let err = sdf.add_mr(MemoryRegion::new("shared", 2 * PAGE_SIZE)).unwrap_err();
    assert_eq!(err, SdfError::DuplicateRegion("shared".into()));
    assert_eq!(sdf.mrs().len(), 1);
}

#[rstest]
#[case(1, PAGE_SIZE)]
#[case(PAGE_SIZE, PAGE_SIZE)]
#[case(PAGE_SIZE + 1, 2 * PAGE_SIZE)]
#[case(0x20_0000, 0x20_0000)]
fn test_region_size_is_page_rounded(#[case] requested: u64, #[case] expected: u64) {
    assert_eq!(MemoryRegion::new("r", requested).size(), expected);
}

#[test]
fn test_map_region_advances_cursor() {
    let (mut sdf, pds) = system_with(&[("pd", 1)]);
    let small = sdf.add_mr(MemoryRegion::new("small", PAGE_SIZE)).unwrap();
    let large = sdf.add_mr(MemoryRegion::new("large", 3 * PAGE_SIZE)).unwrap();

    assert_eq!(sdf.map_region(pds[0], small, Perms::RW, true), Ok(VADDR_BASE));
    assert_eq!(
        sdf.map_region(pds[0], large, Perms::R, false),
        Ok(VADDR_BASE + PAGE_SIZE)
    );
    let maps = sdf.pd(pds[0]).unwrap().maps();
    assert_eq!(maps.len(), 2);
    assert!(!maps[1].cached);
    assert_eq!(maps[1].perms, Perms::R);
}

#[test]
fn test_explicit_map_overlap() {
    let (mut sdf, pds) = system_with(&[("pd", 1)]);
    let a = sdf.add_mr(MemoryRegion::new("a", 2 * PAGE_SIZE)).unwrap();
    let b = sdf.add_mr(MemoryRegion::new("b", PAGE_SIZE)).unwrap();
    sdf.add_map(pds[0], Map::new(a, 0x4000_0000, Perms::RW)).unwrap();

    let err = sdf
        .add_map(pds[0], Map::new(b, 0x4000_1000, Perms::RW))
        .unwrap_err();
    assert_eq!(
        err,
        SdfError::MapOverlap {
            pd: "pd".into(),
            mr: "b".into(),
            vaddr: 0x4000_1000
        }
    );
    sdf.add_map(pds[0], Map::new(b, 0x4000_2000, Perms::RW)).unwrap();
}

#[test]
fn test_same_region_in_two_domains() {
    let (mut sdf, pds) = system_with(&[("x", 1), ("y", 1)]);
    let mr = sdf.add_mr(MemoryRegion::new("shared", PAGE_SIZE)).unwrap();
    let vx = sdf.map_region(pds[0], mr, Perms::RW, true).unwrap();
    let vy = sdf.map_region(pds[1], mr, Perms::R, true).unwrap();
    assert_eq!(vx, VADDR_BASE);
    assert_eq!(vy, VADDR_BASE);
}

#[test]
fn test_physical_allocation_grows_down() {
    let (mut sdf, _) = system_with(&[]);
    let first = sdf.allocate_paddr(0x20_0000).unwrap();
    let second = sdf.allocate_paddr(0x1800).unwrap();
    let third = sdf.allocate_paddr(0x1000).unwrap();

    assert_eq!(first, PADDR_TOP - 0x20_0000);
    assert_eq!(second, first - 0x2000);
    assert_eq!(third, second - 0x1000);
    assert_eq!(first % 0x20_0000, 0);
}

#[test]
fn test_physical_allocation_exhausted() {
    let mut sdf = SystemDescription::new(Arch::Riscv64, 0x3000);
    let _ = sdf.allocate_paddr(0x2000).unwrap();
    let before = sdf.clone();
    let err = sdf.allocate_paddr(0x4000).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(matches!(err, SdfError::PhysicalExhausted { size: 0x4000, .. }));
    assert_eq!(sdf, before);
}

#[test]
fn test_transaction_commits_on_success() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 1)]);
    let channel = sdf
        .transaction(|sdf| sdf.add_channel(pds[0], pds[1], ChannelOptions::default()))
        .unwrap();
    assert_eq!(sdf.channels(), &[channel]);
}
