//! Block subsystem.
//!
//! The virtualizer multiplexes one storage device across clients, each restricted to one
//! partition. Every connection (driver to virtualizer and client to virtualizer) shares a
//! storage-info region, request and response queues, and a data region.

use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources};
use super::{
    Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, check_distinct, link,
    map_device,
};
use crate::common::constants::{
    BLK_DATA_REGION_SIZE, BLK_STORAGE_INFO_REGION_SIZE, QUEUE_REGION_SIZE,
};
use crate::common::{Result, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Regions per block connection: storage info, request queue, response queue, data.
const REGIONS: usize = 4;

const QUARTET: [(&str, u64); REGIONS] = [
    ("storage_info", BLK_STORAGE_INFO_REGION_SIZE),
    ("request", QUEUE_REGION_SIZE),
    ("response", QUEUE_REGION_SIZE),
    ("data", BLK_DATA_REGION_SIZE),
];

/// A block client and the partition it may access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockClient {
    /// The client domain.
    pub pd: PdId,
    /// Index of the partition the client sees as its whole disk.
    pub partition: u32,
}

/// Builder for a block subsystem.
#[derive(Debug, Clone)]
pub struct Block {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    virt: PdId,
    clients: Vec<BlockClient>,
    wiring: Option<BlockWiring>,
}

#[derive(Debug, Clone)]
struct BlockWiring {
    device: Option<DeviceResources>,
    /// driver (a) ↔ virtualizer (b).
    driver: Link,
    /// client (a) ↔ virtualizer (b), in client order.
    clients: Vec<Link>,
}

impl Block {
    /// Binds a block driver and its virtualizer.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `device` - The storage controller, or `None` when it is emulated.
    /// * `driver` - The driver domain.
    /// * `virt` - The virtualizer domain.
    pub fn new(
        sdf: &SystemDescription,
        device: Option<Device>,
        driver: PdId,
        virt: PdId,
    ) -> Result<Self> {
        check_distinct(sdf, &[driver, virt])?;
        if let Some(device) = &device {
            check_device(device)?;
        }
        Ok(Self {
            lifecycle: Lifecycle::new(ConfigClass::Blk),
            device,
            driver,
            virt,
            clients: Vec::new(),
            wiring: None,
        })
    }

    /// Adds a client restricted to `partition`.
    ///
    /// # Returns
    ///
    /// `SdfError::InvalidClient` for the driver or virtualizer, `SdfError::DuplicateClient`
    /// for a client added before, or `SdfError::ProtocolViolation` after `connect`.
    pub fn add_client(
        &mut self,
        sdf: &SystemDescription,
        client: PdId,
        partition: u32,
    ) -> Result<()> {
        self.lifecycle.check_mutable()?;
        let existing: Vec<PdId> = self.clients.iter().map(|c| c.pd).collect();
        check_client(
            Self::CLASS,
            sdf,
            client,
            &[self.driver, self.virt],
            &existing,
        )?;
        self.clients.push(BlockClient {
            pd: client,
            partition,
        });
        self.lifecycle.populated();
        Ok(())
    }

    /// Returns the clients in insertion order.
    pub fn clients(&self) -> &[BlockClient] {
        &self.clients
    }

    fn wire(&self, sdf: &mut SystemDescription) -> Result<BlockWiring> {
        let device = match &self.device {
            Some(device) => Some(map_device(sdf, Self::CLASS, device, self.driver)?),
            None => None,
        };
        let driver_name = sdf.pd_name(self.driver)?.to_string();
        let driver = link(
            sdf,
            Self::CLASS,
            (self.driver, self.virt),
            ChannelOptions::default(),
            &driver_name,
            &QUARTET,
        )?;

        let mut clients = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            let owner = sdf.pd_name(client.pd)?.to_string();
            clients.push(link(
                sdf,
                Self::CLASS,
                (client.pd, self.virt),
                ChannelOptions::default(),
                &owner,
                &QUARTET,
            )?);
        }
        Ok(BlockWiring {
            device,
            driver,
            clients,
        })
    }
}

impl Subsystem for Block {
    const CLASS: ConfigClass = ConfigClass::Blk;

    fn state(&self) -> SubsystemState {
        self.lifecycle.state()
    }

    fn connect(&mut self, sdf: &mut SystemDescription) -> Result<bool> {
        self.lifecycle.check_connectable()?;
        let wiring = sdf.transaction(|sdf| self.wire(sdf))?;
        self.wiring = Some(wiring);
        self.lifecycle.connected();
        tracing::info!(
            subsystem = Self::CLASS.as_str(),
            clients = self.clients.len(),
            "connected subsystem"
        );
        Ok(true)
    }

    /// Blob bodies:
    /// - driver: `virt: conn`;
    /// - virtualizer: `driver: conn, clients[]: { conn, partition: u32, 4 pad }`;
    /// - client: `virt: conn`.
    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>> {
        let Some(wiring) = &self.wiring else {
            return Err(self.lifecycle.violation(Violation::NotConnected));
        };
        let class = Self::CLASS;
        let mut blobs = Vec::with_capacity(self.clients.len() + 3);

        let driver = sdf.pd_name(self.driver)?;
        let mut w = ConfigWriter::new(class);
        let _ = w.connection(Some(&wiring.driver.a), REGIONS);
        blobs.push(w.finish(class, blob::file_name(class, driver)));
        if let Some(device) = &wiring.device {
            blobs.push(blob::device_blob(class, driver, device));
        }

        let entries: Vec<_> = self.clients.iter().zip(&wiring.clients).collect();
        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.driver.b), REGIONS)
            .clients(&entries, |w, entry| {
                let _ = w
                    .connection(entry.map(|(_, link)| &link.b), REGIONS)
                    .u32(entry.map_or(0, |(client, _)| client.partition))
                    .pad(4);
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt)?)));

        for (client, link) in &entries {
            let mut w = ConfigWriter::new(class);
            let _ = w.connection(Some(&link.a), REGIONS);
            blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(client.pd)?)));
        }
        Ok(blobs)
    }

    fn serialise_config(&mut self, sdf: &SystemDescription, dir: &Path) -> Result<bool> {
        let blobs = self.config_blobs(sdf)?;
        let written = blob::write_all(&blobs, dir);
        if written {
            self.lifecycle.serialised();
        }
        Ok(written)
    }
}
