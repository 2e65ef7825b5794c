//! Network Subsystem.
//!
//! Verifies client/copier validation, MAC uniqueness, generated addresses, and the copier
//! topology committed at connect.

use rstest::rstest;
use sdfgen_core::sddf::net::{format_mac, parse_mac};
use sdfgen_core::sddf::{Network, Subsystem, SubsystemState};
use sdfgen_core::sdf::{MemoryRegion, PdId};
use sdfgen_core::{ErrorKind, SdfError, SystemDescription};

use crate::common::fixtures::{channel_count, system_with};

/// `driver, virt_rx, virt_tx, client0, copier0, client1, copier1`.
fn net_system() -> (SystemDescription, Vec<PdId>, Network) {
    let (sdf, pds) = system_with(&[
        ("eth", 254),
        ("virt_rx", 253),
        ("virt_tx", 252),
        ("client0", 100),
        ("copier0", 101),
        ("client1", 98),
        ("copier1", 99),
    ]);
    let net = Network::new(&sdf, None, pds[0], pds[1], pds[2]).unwrap();
    (sdf, pds, net)
}

#[test]
fn test_duplicate_mac_ignores_case() {
    let (sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], Some("52:54:00:aa:bb:cc"))
        .unwrap();
    let err = net
        .add_client_with_copier(&sdf, pds[5], pds[6], Some("52:54:00:AA:BB:CC"))
        .unwrap_err();
    assert_eq!(
        err,
        SdfError::DuplicateMac {
            mac: "52:54:00:AA:BB:CC".into(),
            owner: "client0".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::Collision);
    assert_eq!(net.clients().len(), 1);
}

#[test]
fn test_duplicate_client_and_copier() {
    let (sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();

    assert_eq!(
        net.add_client_with_copier(&sdf, pds[3], pds[6], None),
        Err(SdfError::DuplicateClient {
            subsystem: "net",
            client: "client0".into()
        })
    );
    assert_eq!(
        net.add_client_with_copier(&sdf, pds[5], pds[4], None),
        Err(SdfError::DuplicateCopier("copier0".into()))
    );
}

#[rstest]
#[case::copier_is_client(5, 5)]
#[case::copier_is_driver(5, 0)]
#[case::copier_is_virtualizer(5, 2)]
#[case::copier_is_existing_client(5, 3)]
#[case::client_is_existing_copier(4, 6)]
#[case::client_is_virtualizer(1, 6)]
fn test_role_conflicts_are_invalid(#[case] client: usize, #[case] copier: usize) {
    let (sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();
    let err = net
        .add_client_with_copier(&sdf, pds[client], pds[copier], None)
        .unwrap_err();
    assert!(
        matches!(err, SdfError::InvalidClient { subsystem: "net", .. }),
        "unexpected {err:?}"
    );
    assert_eq!(net.clients().len(), 1);
}

#[rstest]
#[case("52:54:00:aa:bb")]
#[case("52:54:00:aa:bb:cc:dd")]
#[case("52-54-00-aa-bb-cc")]
#[case("52:54:00:aa:bb:zz")]
#[case("")]
fn test_invalid_mac_is_rejected(#[case] mac: &str) {
    let (sdf, pds, mut net) = net_system();
    let err = net
        .add_client_with_copier(&sdf, pds[3], pds[4], Some(mac))
        .unwrap_err();
    assert_eq!(err, SdfError::InvalidMac(mac.to_string()));
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
    assert!(net.clients().is_empty());
}

#[test]
fn test_mac_round_trips_through_text() {
    let octets = parse_mac("DE:AD:be:ef:00:01").unwrap();
    assert_eq!(format_mac(&octets), "de:ad:be:ef:00:01");
}

#[test]
fn test_connect_topology() {
    let (mut sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();
    net.add_client_with_copier(&sdf, pds[5], pds[6], None).unwrap();
    assert_eq!(net.connect(&mut sdf), Ok(true));

    // driver: 2, plus three per client.
    assert_eq!(channel_count(&sdf.render()), 8);
    assert!(sdf.find_channel(pds[4], pds[1]).is_some());
    assert!(sdf.find_channel(pds[4], pds[3]).is_some());
    assert!(sdf.find_channel(pds[3], pds[2]).is_some());
    assert!(sdf.find_channel(pds[3], pds[1]).is_none());

    let dma = sdf.find_mr("net_eth_rx_dma").unwrap();
    assert!(sdf.mr(dma).unwrap().paddr().is_some());
    for pd in [pds[1], pds[4], pds[6]] {
        assert!(sdf.pd(pd).unwrap().maps().iter().any(|m| m.mr == dma));
    }
    assert!(!sdf.pd(pds[3]).unwrap().maps().iter().any(|m| m.mr == dma));

    let tx_data = sdf.find_mr("net_client1_tx_data").unwrap();
    assert!(sdf.mr(tx_data).unwrap().paddr().is_some());
    assert!(sdf.find_mr("net_client1_rx_data").is_some());
}

#[test]
fn test_generated_macs_skip_explicit_ones() {
    let (mut sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();
    net.add_client_with_copier(&sdf, pds[5], pds[6], Some("52:54:01:00:00:00"))
        .unwrap();
    let _ = net.connect(&mut sdf).unwrap();

    let blobs = net.config_blobs(&sdf).unwrap();
    let mac_of = |name: &str| {
        let blob = blobs.iter().find(|b| b.file_name == name).unwrap();
        let at = blob.bytes.len() - 8;
        blob.bytes[at..at + 6].to_vec()
    };
    assert_eq!(mac_of("net_client0.data"), vec![0x52, 0x54, 0x01, 0, 0, 1]);
    assert_eq!(mac_of("net_client1.data"), vec![0x52, 0x54, 0x01, 0, 0, 0]);
}

#[test]
fn test_blob_file_names() {
    let (mut sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();
    let _ = net.connect(&mut sdf).unwrap();

    let names: Vec<_> = net
        .config_blobs(&sdf)
        .unwrap()
        .into_iter()
        .map(|b| b.file_name)
        .collect();
    assert_eq!(
        names,
        vec![
            "net_eth.data",
            "net_virt_rx.data",
            "net_virt_tx.data",
            "net_copier0.data",
            "net_client0.data",
        ]
    );
}

#[test]
fn test_failed_connect_leaves_system_unchanged() {
    let (mut sdf, pds, mut net) = net_system();
    net.add_client_with_copier(&sdf, pds[3], pds[4], None).unwrap();
    net.add_client_with_copier(&sdf, pds[5], pds[6], None).unwrap();
    // Collides with the last region the second client needs.
    let _ = sdf
        .add_mr(MemoryRegion::new("net_client1_tx_data", 0x1000))
        .unwrap();
    let before = sdf.clone();
    let rendered = sdf.render();

    let err = net.connect(&mut sdf).unwrap_err();
    assert_eq!(err, SdfError::DuplicateRegion("net_client1_tx_data".into()));
    assert_eq!(sdf, before);
    assert_eq!(sdf.render(), rendered);
    assert_eq!(net.state(), SubsystemState::Populated);
    assert!(net.config_blobs(&sdf).is_err());
}
