//! Error Taxonomy.
//!
//! Verifies that every error maps to its category and that messages name the offending
//! entity.

use rstest::rstest;
use sdfgen_core::common::{DtbError, IdKind, Violation};
use sdfgen_core::{ErrorKind, SdfError};

#[rstest]
#[case(SdfError::MalformedBlob(DtbError::Unterminated), ErrorKind::MalformedInput)]
#[case(SdfError::InvalidMac("x".into()), ErrorKind::MalformedInput)]
#[case(SdfError::InvalidConfig("x".into()), ErrorKind::MalformedInput)]
#[case(SdfError::NameTooLong { name: "x".into(), max: 63 }, ErrorKind::MalformedInput)]
#[case(SdfError::NodeNotFound("/soc".into()), ErrorKind::NotFound)]
#[case(SdfError::UnknownDomain(4), ErrorKind::NotFound)]
#[case(SdfError::Exhausted { scope: "pd".into(), kind: IdKind::Child }, ErrorKind::ResourceExhausted)]
#[case(SdfError::PhysicalExhausted { size: 0x1000, floor: 0 }, ErrorKind::ResourceExhausted)]
#[case(SdfError::TooManyClients { subsystem: "net", max: 61 }, ErrorKind::ResourceExhausted)]
#[case(SdfError::DuplicateCopier("c".into()), ErrorKind::Collision)]
#[case(SdfError::SameDomain("pd".into()), ErrorKind::Collision)]
#[case(SdfError::RegionOverlap { mr: "uart".into(), paddr: 0x900_0000 }, ErrorKind::Collision)]
#[case(SdfError::IrqInUse { irq: 33, pd: "uart".into() }, ErrorKind::Collision)]
#[case(
    SdfError::ProtocolViolation { subsystem: "blk", violation: Violation::NotConnected },
    ErrorKind::ProtocolViolation
)]
fn test_error_kinds(#[case] err: SdfError, #[case] kind: ErrorKind) {
    assert_eq!(err.kind(), kind);
}

#[test]
fn test_messages_name_the_entity() {
    let err = SdfError::Collision {
        scope: "serial_virt".into(),
        kind: IdKind::Channel,
        id: 3,
    };
    assert_eq!(
        err.to_string(),
        "channel ID 3 already in use in protection domain 'serial_virt'"
    );

    let err = SdfError::DuplicateMac {
        mac: "52:54:00:00:00:01".into(),
        owner: "client0".into(),
    };
    assert!(err.to_string().contains("client0"));

    let err = SdfError::ProtocolViolation {
        subsystem: "timer",
        violation: Violation::AlreadyConnected,
    };
    assert_eq!(err.to_string(), "timer: connect called more than once");
}

#[test]
fn test_dtb_errors_convert() {
    let err: SdfError = DtbError::BadMagic(0xdead_beef).into();
    assert_eq!(err.to_string(), "malformed device tree blob: bad magic 0xdeadbeef");
}
