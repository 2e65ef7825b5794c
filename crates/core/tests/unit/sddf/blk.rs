//! Block Subsystem.
//!
//! Verifies the four shared regions per connection and the partition table carried in the
//! virtualizer blob.

use sdfgen_core::common::constants::{BLK_DATA_REGION_SIZE, MAX_CLIENTS};
use sdfgen_core::sddf::blk::BlockClient;
use sdfgen_core::sddf::{Block, Subsystem};
use sdfgen_core::SdfError;

use crate::common::fixtures::{channel_count, system_with};

/// One connection of four regions.
const CONN: usize = 4 * 16 + 8;

#[test]
fn test_clients_keep_their_partitions() {
    let (mut sdf, pds) = system_with(&[("blk", 254), ("virt", 253), ("fs", 100), ("db", 99)]);
    let mut blk = Block::new(&sdf, None, pds[0], pds[1]).unwrap();
    blk.add_client(&sdf, pds[2], 0).unwrap();
    blk.add_client(&sdf, pds[3], 2).unwrap();
    assert_eq!(
        blk.clients(),
        &[
            BlockClient {
                pd: pds[2],
                partition: 0
            },
            BlockClient {
                pd: pds[3],
                partition: 2
            },
        ]
    );

    assert_eq!(blk.connect(&mut sdf), Ok(true));
    assert_eq!(channel_count(&sdf.render()), 3);
    assert_eq!(sdf.mrs().len(), 12);
    assert_eq!(
        sdf.mr(sdf.find_mr("blk_fs_data").unwrap()).unwrap().size(),
        BLK_DATA_REGION_SIZE
    );
}

#[test]
fn test_virtualizer_blob_carries_partitions() {
    let (mut sdf, pds) = system_with(&[("blk", 254), ("virt", 253), ("fs", 100), ("db", 99)]);
    let mut blk = Block::new(&sdf, None, pds[0], pds[1]).unwrap();
    blk.add_client(&sdf, pds[2], 1).unwrap();
    blk.add_client(&sdf, pds[3], 3).unwrap();
    let _ = blk.connect(&mut sdf).unwrap();

    let blobs = blk.config_blobs(&sdf).unwrap();
    let names: Vec<_> = blobs.iter().map(|b| b.file_name.as_str()).collect();
    assert_eq!(names, ["blk_blk.data", "blk_virt.data", "blk_fs.data", "blk_db.data"]);

    let virt = &blobs[1].bytes;
    let entry = CONN + 8;
    let clients = 8 + CONN;
    assert_eq!(virt.len(), clients + 8 + MAX_CLIENTS * entry);
    assert_eq!(virt[clients..clients + 8], 2u64.to_le_bytes());

    let partition = |index: usize| {
        let at = clients + 8 + index * entry + CONN;
        u32::from_le_bytes(virt[at..at + 4].try_into().unwrap())
    };
    assert_eq!(partition(0), 1);
    assert_eq!(partition(1), 3);
    assert_eq!(partition(2), 0);

    assert_eq!(blobs[2].bytes.len(), 8 + CONN);
}

#[test]
fn test_duplicate_client_is_rejected() {
    let (sdf, pds) = system_with(&[("blk", 254), ("virt", 253), ("fs", 100)]);
    let mut blk = Block::new(&sdf, None, pds[0], pds[1]).unwrap();
    blk.add_client(&sdf, pds[2], 0).unwrap();
    assert_eq!(
        blk.add_client(&sdf, pds[2], 1),
        Err(SdfError::DuplicateClient {
            subsystem: "blk",
            client: "fs".into()
        })
    );
    assert_eq!(blk.clients().len(), 1);
}

#[test]
fn test_client_capacity() {
    let mut names: Vec<String> = vec!["blk".into(), "virt".into()];
    names.extend((0..=MAX_CLIENTS).map(|i| format!("client{i}")));
    let specs: Vec<(&str, u8)> = names.iter().map(|n| (n.as_str(), 1)).collect();
    let (sdf, pds) = system_with(&specs);

    let mut blk = Block::new(&sdf, None, pds[0], pds[1]).unwrap();
    for (partition, &pd) in pds[2..2 + MAX_CLIENTS].iter().enumerate() {
        blk.add_client(&sdf, pd, partition as u32).unwrap();
    }
    let err = blk.add_client(&sdf, pds[2 + MAX_CLIENTS], 0).unwrap_err();
    assert_eq!(
        err,
        SdfError::TooManyClients {
            subsystem: "blk",
            max: MAX_CLIENTS
        }
    );
}
