//! Serial Subsystem.
//!
//! Verifies TX-only and TX/RX consoles, client naming in the TX virtualizer blob, and the
//! colour flag.

use rstest::rstest;
use sdfgen_core::common::constants::{MAX_CLIENTS, NAME_FIELD_LEN};
use sdfgen_core::dtb::{Device, DeviceTree};
use sdfgen_core::sddf::{Serial, Subsystem};
use sdfgen_core::{ErrorKind, SdfError};

use crate::common::fdt::sample_tree;
use crate::common::fixtures::{channel_count, system_with};

/// Header, then one connection of two regions.
const CONN: usize = 2 * 16 + 8;

#[rstest]
#[case(false, 3)]
#[case(true, 6)]
fn test_channel_count_per_layout(#[case] rx: bool, #[case] expected: usize) {
    let (mut sdf, pds) = system_with(&[
        ("uart", 254),
        ("virt_tx", 253),
        ("virt_rx", 252),
        ("client0", 100),
        ("client1", 99),
    ]);
    let virt_rx = rx.then_some(pds[2]);
    let mut serial = Serial::new(&sdf, None, pds[0], pds[1], virt_rx, false).unwrap();
    assert_eq!(serial.has_rx(), rx);
    serial.add_client(&sdf, pds[3]).unwrap();
    serial.add_client(&sdf, pds[4]).unwrap();
    assert_eq!(serial.connect(&mut sdf), Ok(true));
    assert_eq!(channel_count(&sdf.render()), expected);
}

#[test]
fn test_region_names_follow_direction() {
    let (mut sdf, pds) = system_with(&[("uart", 254), ("virt_tx", 253), ("virt_rx", 252), ("client", 1)]);
    let mut serial = Serial::new(&sdf, None, pds[0], pds[1], Some(pds[2]), false).unwrap();
    serial.add_client(&sdf, pds[3]).unwrap();
    let _ = serial.connect(&mut sdf).unwrap();

    for name in [
        "serial_uart_tx_queue",
        "serial_uart_tx_data",
        "serial_uart_rx_queue",
        "serial_uart_rx_data",
        "serial_client_tx_queue",
        "serial_client_tx_data",
        "serial_client_rx_queue",
        "serial_client_rx_data",
    ] {
        assert!(sdf.find_mr(name).is_some(), "missing region {name}");
    }
    assert_eq!(sdf.mrs().len(), 8);
}

#[test]
fn test_blobs_for_tx_only_console() {
    let (mut sdf, pds) = system_with(&[("uart", 254), ("virt_tx", 253), ("client", 1)]);
    let mut serial = Serial::new(&sdf, None, pds[0], pds[1], None, true).unwrap();
    serial.add_client(&sdf, pds[2]).unwrap();
    let _ = serial.connect(&mut sdf).unwrap();

    let blobs = serial.config_blobs(&sdf).unwrap();
    let names: Vec<_> = blobs.iter().map(|b| b.file_name.as_str()).collect();
    assert_eq!(names, ["serial_uart.data", "serial_virt_tx.data", "serial_client.data"]);

    // rx_enabled follows both connections in the driver blob.
    let driver = &blobs[0].bytes;
    assert_eq!(driver.len(), 8 + 2 * CONN + 8);
    assert_eq!(driver[8 + 2 * CONN], 0);

    // enable_color follows the driver connection, then the client array.
    let virt_tx = &blobs[1].bytes;
    assert_eq!(virt_tx[8 + CONN], 1);
    assert_eq!(virt_tx.len(), 8 + CONN + 8 + 8 + MAX_CLIENTS * (CONN + NAME_FIELD_LEN));
    let first_name = 8 + CONN + 8 + 8 + CONN;
    assert_eq!(&virt_tx[first_name..first_name + 7], b"client\0");

    // The client's absent RX connection is zero filled.
    let client = &blobs[2].bytes;
    assert_eq!(client.len(), 8 + 2 * CONN);
    assert!(client[8..8 + CONN].iter().all(|&b| b == 0));
}

#[test]
fn test_rx_virtualizer_gets_a_blob() {
    let (mut sdf, pds) = system_with(&[("uart", 254), ("virt_tx", 253), ("virt_rx", 252), ("client", 1)]);
    let mut serial = Serial::new(&sdf, None, pds[0], pds[1], Some(pds[2]), false).unwrap();
    serial.add_client(&sdf, pds[3]).unwrap();
    let _ = serial.connect(&mut sdf).unwrap();

    let blobs = serial.config_blobs(&sdf).unwrap();
    assert!(blobs.iter().any(|b| b.file_name == "serial_virt_rx.data"));
    let driver = &blobs[0].bytes;
    assert_eq!(driver[8 + 2 * CONN], 1);
}

#[test]
fn test_uart_device_mapping() {
    let blob = sample_tree();
    let tree = DeviceTree::parse(&blob).unwrap();
    let device = Device::from_node(tree.node("pl011@9000000").unwrap()).unwrap();

    let (mut sdf, pds) = system_with(&[("uart", 254), ("virt_tx", 253), ("client", 1)]);
    let mut serial = Serial::new(&sdf, Some(device), pds[0], pds[1], None, false).unwrap();
    serial.add_client(&sdf, pds[2]).unwrap();
    let _ = serial.connect(&mut sdf).unwrap();

    let xml = sdf.render();
    assert!(xml.contains("<irq irq=\"33\" id=\"0\" trigger=\"level\" />"));
    assert!(sdf.find_mr("serial_uart_pl011_regs_0").is_some());
    let blobs = serial.config_blobs(&sdf).unwrap();
    assert_eq!(blobs[1].file_name, "serial_uart_device.data");
}

#[test]
fn test_shared_virtualizer_is_rejected() {
    let (sdf, pds) = system_with(&[("uart", 254), ("virt", 253)]);
    assert_eq!(
        Serial::new(&sdf, None, pds[0], pds[1], Some(pds[1]), false).unwrap_err(),
        SdfError::SameDomain("virt".into())
    );
}

#[test]
fn test_client_name_must_fit_the_name_field() {
    let longest = "c".repeat(NAME_FIELD_LEN - 1);
    let too_long = "c".repeat(NAME_FIELD_LEN);
    let (sdf, pds) = system_with(&[
        ("uart", 254),
        ("virt_tx", 253),
        (longest.as_str(), 2),
        (too_long.as_str(), 1),
    ]);
    let mut serial = Serial::new(&sdf, None, pds[0], pds[1], None, false).unwrap();
    serial.add_client(&sdf, pds[2]).unwrap();

    let err = serial.add_client(&sdf, pds[3]).unwrap_err();
    assert_eq!(
        err,
        SdfError::NameTooLong {
            name: too_long,
            max: NAME_FIELD_LEN - 1
        }
    );
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert_eq!(serial.clients(), &pds[2..3]);
}
