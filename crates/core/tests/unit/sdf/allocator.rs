//! Per-Domain ID Allocation.
//!
//! Verifies that channel slots and child IDs are unique within their domain, that
//! explicit collisions leave the allocator untouched, and that IRQs share the channel
//! slot space with channel ends.

use proptest::prelude::*;
use sdfgen_core::common::IdKind;
use sdfgen_core::sdf::{AllocError, ChannelOptions, IdAllocator, IrqTrigger, ProtectionDomain};
use sdfgen_core::{ErrorKind, SdfError};

use crate::common::fixtures::system_with;

// ──────────────────────────────────────────────────────────
// IdAllocator
// ──────────────────────────────────────────────────────────

#[test]
fn test_lowest_free_first() {
    let mut ids = IdAllocator::new();
    assert_eq!(ids.allocate(None), Ok(0));
    assert_eq!(ids.allocate(Some(2)), Ok(2));
    assert_eq!(ids.allocate(None), Ok(1));
    assert_eq!(ids.allocate(None), Ok(3));
    assert_eq!(ids.len(), 4);
}

#[test]
fn test_collision_leaves_state_unchanged() {
    let mut ids = IdAllocator::new();
    let _ = ids.allocate(Some(7)).unwrap();
    let before = ids.clone();
    assert_eq!(ids.allocate(Some(7)), Err(AllocError::Collision(7)));
    assert_eq!(ids, before);
}

#[test]
fn test_full_range_then_exhausted() {
    let mut ids = IdAllocator::new();
    for expected in 0..=u8::MAX {
        assert_eq!(ids.allocate(None), Ok(expected));
    }
    assert_eq!(ids.len(), 256);
    assert_eq!(ids.allocate(None), Err(AllocError::Exhausted));
    assert_eq!(ids.allocate(Some(255)), Err(AllocError::Collision(255)));
}

proptest! {
    #[test]
    fn prop_allocated_ids_are_unique(requests in proptest::collection::vec(proptest::option::of(any::<u8>()), 0..300)) {
        let mut ids = IdAllocator::new();
        let mut seen = std::collections::BTreeSet::new();
        for request in requests {
            match ids.allocate(request) {
                Ok(id) => {
                    prop_assert!(seen.insert(id), "id {} handed out twice", id);
                    if let Some(requested) = request {
                        prop_assert_eq!(id, requested);
                    }
                }
                Err(AllocError::Collision(id)) => {
                    prop_assert_eq!(Some(id), request);
                    prop_assert!(seen.contains(&id));
                }
                Err(AllocError::Exhausted) => {
                    prop_assert!(request.is_none());
                    prop_assert_eq!(seen.len(), 256);
                }
            }
            prop_assert_eq!(ids.len(), seen.len());
        }
    }
}

// ──────────────────────────────────────────────────────────
// Channel slots through SystemDescription
// ──────────────────────────────────────────────────────────

#[test]
fn test_channel_ids_unique_per_domain() {
    let (mut sdf, pds) = system_with(&[("hub", 100), ("a", 90), ("b", 80), ("c", 70)]);
    let hub = pds[0];
    let mut hub_ids = Vec::new();
    for &other in &pds[1..] {
        let channel = sdf.add_channel(hub, other, ChannelOptions::default()).unwrap();
        hub_ids.push(channel.a_id);
        assert_eq!(channel.b_id, 0);
    }
    assert_eq!(hub_ids, vec![0, 1, 2]);
    assert_eq!(sdf.pd(hub).unwrap().channel_ids().len(), 3);
}

#[test]
fn test_explicit_channel_id_collision() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 2), ("c", 3)]);
    let _ = sdf
        .add_channel(
            pds[0],
            pds[1],
            ChannelOptions {
                a_id: Some(5),
                ..ChannelOptions::default()
            },
        )
        .unwrap();
    let before = sdf.clone();

    let err = sdf
        .add_channel(
            pds[0],
            pds[2],
            ChannelOptions {
                a_id: Some(5),
                ..ChannelOptions::default()
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        SdfError::Collision {
            scope: "a".into(),
            kind: IdKind::Channel,
            id: 5
        }
    );
    assert_eq!(err.kind(), ErrorKind::Collision);
    assert_eq!(sdf, before);
}

#[test]
fn test_second_end_collision_releases_first_end() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 2), ("c", 3)]);
    let _ = sdf.add_channel(pds[2], pds[1], ChannelOptions::default()).unwrap();
    let before = sdf.clone();

    let err = sdf
        .add_channel(
            pds[0],
            pds[1],
            ChannelOptions {
                b_id: Some(0),
                ..ChannelOptions::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, SdfError::Collision { id: 0, .. }));
    assert!(sdf.pd(pds[0]).unwrap().channel_ids().is_empty());
    assert_eq!(sdf, before);
}

#[test]
fn test_channel_slot_exhaustion() {
    let (mut sdf, pds) = system_with(&[("a", 1), ("b", 2)]);
    for id in 0..=u8::MAX {
        let _ = sdf.add_irq(pds[0], u32::from(id) + 32, IrqTrigger::Level, Some(id)).unwrap();
    }
    let err = sdf
        .add_channel(pds[0], pds[1], ChannelOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        SdfError::Exhausted {
            scope: "a".into(),
            kind: IdKind::Channel
        }
    );
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(sdf.channels().is_empty());
}

#[test]
fn test_irqs_share_channel_slots() {
    let (mut sdf, pds) = system_with(&[("driver", 200), ("client", 100)]);
    let channel = sdf.add_channel(pds[0], pds[1], ChannelOptions::default()).unwrap();
    assert_eq!(channel.a_id, 0);

    let irq = sdf.add_irq(pds[0], 33, IrqTrigger::Level, None).unwrap();
    assert_eq!(irq, 1);

    let err = sdf.add_irq(pds[0], 34, IrqTrigger::Edge, Some(0)).unwrap_err();
    assert!(matches!(err, SdfError::Collision { kind: IdKind::Channel, id: 0, .. }));
    assert_eq!(sdf.pd(pds[0]).unwrap().irqs().len(), 1);
}

#[test]
fn test_irq_delivered_to_one_domain_only() {
    let (mut sdf, pds) = system_with(&[("uart", 200), ("other", 100)]);
    let _ = sdf.add_irq(pds[0], 33, IrqTrigger::Level, None).unwrap();
    let before = sdf.clone();

    let err = sdf.add_irq(pds[1], 33, IrqTrigger::Level, None).unwrap_err();
    assert_eq!(
        err,
        SdfError::IrqInUse {
            irq: 33,
            pd: "uart".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::Collision);
    assert_eq!(sdf, before);
}

#[test]
fn test_child_ids_are_separate_from_channel_slots() {
    let (mut sdf, pds) = system_with(&[("parent", 100), ("peer", 50)]);
    let _ = sdf.add_channel(pds[0], pds[1], ChannelOptions::default()).unwrap();
    let (_, child_id) = sdf
        .add_child(pds[0], ProtectionDomain::new("child", "child.elf"), None)
        .unwrap();
    assert_eq!(child_id, 0);

    let err = sdf
        .add_child(pds[0], ProtectionDomain::new("other", "other.elf"), Some(0))
        .unwrap_err();
    assert_eq!(
        err,
        SdfError::Collision {
            scope: "parent".into(),
            kind: IdKind::Child,
            id: 0
        }
    );
    assert!(sdf.find_pd("other").is_none());
}
