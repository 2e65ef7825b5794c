//! I2C subsystem.
//!
//! Clients queue requests with the virtualizer, which forwards them to the driver. Each
//! connection shares a request queue and a response queue. Every client also gets a data
//! region mapped into both the client and the driver, so the driver can copy bus data
//! without going through the virtualizer.

use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources, RegionResource};
use super::{
    Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, check_distinct, link,
    map_device, region_name, shared_region,
};
use crate::common::constants::{I2C_DATA_REGION_SIZE, QUEUE_REGION_SIZE};
use crate::common::{Result, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Regions per I2C connection: request queue, then response queue.
const REGIONS: usize = 2;

const QUEUES: [(&str, u64); REGIONS] = [
    ("request", QUEUE_REGION_SIZE),
    ("response", QUEUE_REGION_SIZE),
];

/// Builder for an I2C subsystem.
#[derive(Debug, Clone)]
pub struct I2c {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    virt: PdId,
    clients: Vec<PdId>,
    wiring: Option<I2cWiring>,
}

#[derive(Debug, Clone)]
struct I2cWiring {
    device: Option<DeviceResources>,
    /// driver (a) ↔ virtualizer (b).
    driver: Link,
    clients: Vec<I2cClient>,
}

#[derive(Debug, Clone)]
struct I2cClient {
    /// client (a) ↔ virtualizer (b).
    link: Link,
    data_in_client: RegionResource,
    data_in_driver: RegionResource,
}

impl I2c {
    /// Binds an I2C driver and its virtualizer.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `device` - The controller, or `None` when the bus is emulated.
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
            lifecycle: Lifecycle::new(ConfigClass::I2c),
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

    fn wire(&self, sdf: &mut SystemDescription) -> Result<I2cWiring> {
        let device = match &self.device {
            Some(device) => Some(map_device(sdf, Self::CLASS, device, self.driver)?),
            None => None,
        };
        let driver_name = sdf.pd_name(self.driver)?.to_string();
        let driver = link(
            sdf,
            Self::CLASS,
            (self.driver, self.virt),
            ChannelOptions::pp_b(),
            &driver_name,
            &QUEUES,
        )?;

        let mut clients = Vec::with_capacity(self.clients.len());
        for &client in &self.clients {
            let owner = sdf.pd_name(client)?.to_string();
            let client_link = link(
                sdf,
                Self::CLASS,
                (client, self.virt),
                ChannelOptions::pp_a(),
                &owner,
                &QUEUES,
            )?;
            let data = shared_region(
                sdf,
                region_name(Self::CLASS, &owner, "data"),
                I2C_DATA_REGION_SIZE,
                &[client, self.driver],
            )?;
            if let [data_in_client, data_in_driver] = data[..] {
                clients.push(I2cClient {
                    link: client_link,
                    data_in_client,
                    data_in_driver,
                });
            }
        }
        Ok(I2cWiring {
            device,
            driver,
            clients,
        })
    }
}

impl Subsystem for I2c {
    const CLASS: ConfigClass = ConfigClass::I2c;

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
            device = self.device.is_some(),
            "connected subsystem"
        );
        Ok(true)
    }

    /// Blob bodies:
    /// - driver: `virt: conn, clients[]: data region as mapped in the driver`;
    /// - virtualizer: `driver: conn, clients[]: { conn, data region as mapped in the driver }`;
    /// - client: `virt: conn, data region`.
    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>> {
        let Some(wiring) = &self.wiring else {
            return Err(self.lifecycle.violation(Violation::NotConnected));
        };
        let class = Self::CLASS;
        let mut blobs = Vec::with_capacity(self.clients.len() + 3);

        let driver = sdf.pd_name(self.driver)?;
        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.driver.a), REGIONS)
            .clients(&wiring.clients, |w, client| {
                let _ = w.region(client.map(|c| &c.data_in_driver));
            });
        blobs.push(w.finish(class, blob::file_name(class, driver)));
        if let Some(device) = &wiring.device {
            blobs.push(blob::device_blob(class, driver, device));
        }

        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.driver.b), REGIONS)
            .clients(&wiring.clients, |w, client| {
                let _ = w
                    .connection(client.map(|c| &c.link.b), REGIONS)
                    .region(client.map(|c| &c.data_in_driver));
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt)?)));

        for (&pd, client) in self.clients.iter().zip(&wiring.clients) {
            let mut w = ConfigWriter::new(class);
            let _ = w
                .connection(Some(&client.link.a), REGIONS)
                .region(Some(&client.data_in_client));
            blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(pd)?)));
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
