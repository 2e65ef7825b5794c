//! GPU subsystem.
//!
//! The virtualizer arbitrates one display device between clients. Every connection (driver
//! to virtualizer and client to virtualizer) shares an events region, request and response
//! queues, and a data region for framebuffers and resource uploads.

use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources};
use super::{
    Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, check_distinct, link,
    map_device,
};
use crate::common::constants::{GPU_DATA_REGION_SIZE, GPU_EVENTS_REGION_SIZE, QUEUE_REGION_SIZE};
use crate::common::{Result, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Regions per GPU connection: events, request queue, response queue, data.
const REGIONS: usize = 4;

const REGION_SET: [(&str, u64); REGIONS] = [
    ("events", GPU_EVENTS_REGION_SIZE),
    ("request", QUEUE_REGION_SIZE),
    ("response", QUEUE_REGION_SIZE),
    ("data", GPU_DATA_REGION_SIZE),
];

/// Builder for a GPU subsystem.
#[derive(Debug, Clone)]
pub struct Gpu {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    virt: PdId,
    clients: Vec<PdId>,
    wiring: Option<GpuWiring>,
}

#[derive(Debug, Clone)]
struct GpuWiring {
    device: Option<DeviceResources>,
    /// driver (a) ↔ virtualizer (b).
    driver: Link,
    /// client (a) ↔ virtualizer (b), in client order.
    clients: Vec<Link>,
}

impl Gpu {
    /// Binds a GPU driver and its virtualizer.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `device` - The display controller, or `None` when it is emulated.
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
            lifecycle: Lifecycle::new(ConfigClass::Gpu),
            device,
            driver,
            virt,
            clients: Vec::new(),
            wiring: None,
        })
    }

    /// Adds a client.
    ///
    /// # Returns
    ///
    /// `SdfError::InvalidClient` for the driver or virtualizer, `SdfError::DuplicateClient`
    /// for a client added before, or `SdfError::ProtocolViolation` after `connect`.
    pub fn add_client(&mut self, sdf: &SystemDescription, client: PdId) -> Result<()> {
        self.lifecycle.check_mutable()?;
        check_client(
            Self::CLASS,
            sdf,
            client,
            &[self.driver, self.virt],
            &self.clients,
        )?;
        self.clients.push(client);
        self.lifecycle.populated();
        Ok(())
    }

    /// Returns the clients in insertion order.
    pub fn clients(&self) -> &[PdId] {
        &self.clients
    }

    fn wire(&self, sdf: &mut SystemDescription) -> Result<GpuWiring> {
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
            &REGION_SET,
        )?;

        let mut clients = Vec::with_capacity(self.clients.len());
        for &client in &self.clients {
            let owner = sdf.pd_name(client)?.to_string();
            clients.push(link(
                sdf,
                Self::CLASS,
                (client, self.virt),
                ChannelOptions::default(),
                &owner,
                &REGION_SET,
            )?);
        }
        Ok(GpuWiring {
            device,
            driver,
            clients,
        })
    }
}

impl Subsystem for Gpu {
    const CLASS: ConfigClass = ConfigClass::Gpu;

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
    /// - virtualizer: `driver: conn, clients[]: conn`;
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

        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.driver.b), REGIONS)
            .clients(&wiring.clients, |w, client| {
                let _ = w.connection(client.map(|l| &l.b), REGIONS);
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt)?)));

        for (&client, link) in self.clients.iter().zip(&wiring.clients) {
            let mut w = ConfigWriter::new(class);
            let _ = w.connection(Some(&link.a), REGIONS);
            blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(client)?)));
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
