//! GPU Subsystem.
//!
//! Verifies the four shared regions per connection, the blob set, and role validation.

use sdfgen_core::common::constants::{GPU_DATA_REGION_SIZE, MAX_CLIENTS};
use sdfgen_core::sddf::{ConfigClass, Gpu, Subsystem, SubsystemState};
use sdfgen_core::SdfError;

use crate::common::fixtures::{channel_count, system_with};

/// One connection of four regions.
const CONN: usize = 4 * 16 + 8;

#[test]
fn test_connect_shares_four_regions_per_connection() {
    let (mut sdf, pds) = system_with(&[("gpu", 254), ("virt", 253), ("ui", 100), ("game", 99)]);
    let mut gpu = Gpu::new(&sdf, None, pds[0], pds[1]).unwrap();
    gpu.add_client(&sdf, pds[2]).unwrap();
    gpu.add_client(&sdf, pds[3]).unwrap();
    assert_eq!(gpu.state(), SubsystemState::Populated);

    assert_eq!(gpu.connect(&mut sdf), Ok(true));
    assert_eq!(channel_count(&sdf.render()), 3);
    assert_eq!(sdf.mrs().len(), 12);
    for name in ["gpu_gpu_events", "gpu_ui_request", "gpu_game_response"] {
        assert!(sdf.find_mr(name).is_some(), "missing region {name}");
    }
    assert_eq!(
        sdf.mr(sdf.find_mr("gpu_ui_data").unwrap()).unwrap().size(),
        GPU_DATA_REGION_SIZE
    );
}

#[test]
fn test_blobs_per_role() {
    let (mut sdf, pds) = system_with(&[("gpu", 254), ("virt", 253), ("ui", 100)]);
    let mut gpu = Gpu::new(&sdf, None, pds[0], pds[1]).unwrap();
    gpu.add_client(&sdf, pds[2]).unwrap();
    let _ = gpu.connect(&mut sdf).unwrap();

    let blobs = gpu.config_blobs(&sdf).unwrap();
    let names: Vec<_> = blobs.iter().map(|b| b.file_name.as_str()).collect();
    assert_eq!(names, ["gpu_gpu.data", "gpu_virt.data", "gpu_ui.data"]);
    assert!(blobs.iter().all(|b| b.class == ConfigClass::Gpu && b.bytes[4] == 7));

    assert_eq!(blobs[0].bytes.len(), 8 + CONN);
    let virt = &blobs[1].bytes;
    assert_eq!(virt.len(), 8 + CONN + 8 + MAX_CLIENTS * CONN);
    assert_eq!(virt[8 + CONN..8 + CONN + 8], 1u64.to_le_bytes());
    assert_eq!(blobs[2].bytes.len(), 8 + CONN);
}

#[test]
fn test_roles_are_validated() {
    let (sdf, pds) = system_with(&[("gpu", 254), ("virt", 253), ("ui", 100)]);
    assert_eq!(
        Gpu::new(&sdf, None, pds[0], pds[0]).unwrap_err(),
        SdfError::SameDomain("gpu".into())
    );

    let mut gpu = Gpu::new(&sdf, None, pds[0], pds[1]).unwrap();
    assert_eq!(
        gpu.add_client(&sdf, pds[1]),
        Err(SdfError::InvalidClient {
            subsystem: "gpu",
            name: "virt".into()
        })
    );
    gpu.add_client(&sdf, pds[2]).unwrap();
    assert_eq!(
        gpu.add_client(&sdf, pds[2]),
        Err(SdfError::DuplicateClient {
            subsystem: "gpu",
            client: "ui".into()
        })
    );
    assert_eq!(gpu.clients(), &pds[2..]);
}
