//! Timer subsystem.
//!
//! A timer driver serves each client directly: one channel per client, no virtualizer and
//! no shared memory. Clients make protected procedure calls into the driver.

use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources};
use super::{Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, link, map_device};
use crate::common::{Result, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Builder for a timer subsystem.
#[derive(Debug, Clone)]
pub struct Timer {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    clients: Vec<PdId>,
    wiring: Option<TimerWiring>,
}

#[derive(Debug, Clone)]
struct TimerWiring {
    device: Option<DeviceResources>,
    clients: Vec<Link>,
}

impl Timer {
    /// Binds a timer driver and, when memory mapped, its device.
    pub fn new(sdf: &SystemDescription, device: Option<Device>, driver: PdId) -> Result<Self> {
        let _ = sdf.pd(driver)?;
        if let Some(device) = &device {
            check_device(device)?;
        }
        Ok(Self {
            lifecycle: Lifecycle::new(ConfigClass::Timer),
            device,
            driver,
            clients: Vec::new(),
            wiring: None,
        })
    }

    /// Adds a client.
    ///
    /// # Returns
    ///
    /// `SdfError::InvalidClient` for the driver itself, `SdfError::DuplicateClient` for a
    /// client added before, or `SdfError::ProtocolViolation` after `connect`.
    pub fn add_client(&mut self, sdf: &SystemDescription, client: PdId) -> Result<()> {
        self.lifecycle.check_mutable()?;
        check_client(Self::CLASS, sdf, client, &[self.driver], &self.clients)?;
        self.clients.push(client);
        self.lifecycle.populated();
        Ok(())
    }

    /// Returns the driver domain.
    pub const fn driver(&self) -> PdId {
        self.driver
    }

    /// Returns the clients in insertion order.
    pub fn clients(&self) -> &[PdId] {
        &self.clients
    }

    fn wire(&self, sdf: &mut SystemDescription) -> Result<TimerWiring> {
        let device = match &self.device {
            Some(device) => Some(map_device(sdf, Self::CLASS, device, self.driver)?),
            None => None,
        };
        let mut clients = Vec::with_capacity(self.clients.len());
        for &client in &self.clients {
            let owner = sdf.pd_name(client)?.to_string();
            clients.push(link(
                sdf,
                Self::CLASS,
                (self.driver, client),
                ChannelOptions::pp_b(),
                &owner,
                &[],
            )?);
        }
        Ok(TimerWiring { device, clients })
    }
}

impl Subsystem for Timer {
    const CLASS: ConfigClass = ConfigClass::Timer;

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

    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>> {
        let Some(wiring) = &self.wiring else {
            return Err(self.lifecycle.violation(Violation::NotConnected));
        };
        let driver = sdf.pd_name(self.driver)?;
        let mut blobs = Vec::with_capacity(self.clients.len() + 2);

        let mut w = ConfigWriter::new(Self::CLASS);
        let _ = w.clients(&wiring.clients, |w, link| {
            let _ = w.connection(link.map(|l| &l.a), 0);
        });
        blobs.push(w.finish(Self::CLASS, blob::file_name(Self::CLASS, driver)));
        if let Some(device) = &wiring.device {
            blobs.push(blob::device_blob(Self::CLASS, driver, device));
        }

        for (&client, link) in self.clients.iter().zip(&wiring.clients) {
            let mut w = ConfigWriter::new(Self::CLASS);
            let _ = w.connection(Some(&link.b), 0);
            blobs.push(w.finish(Self::CLASS, blob::file_name(Self::CLASS, sdf.pd_name(client)?)));
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
