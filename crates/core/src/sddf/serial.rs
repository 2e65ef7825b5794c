//! Serial subsystem.
//!
//! The driver talks to a TX virtualizer and, for devices that accept input, an RX
//! virtualizer. Every client is connected to the TX virtualizer and, when present, the RX
//! virtualizer. Each connection shares a queue region and a data region.

use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources};
use super::{
    Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, check_distinct, link,
    map_device,
};
use crate::common::constants::{NAME_FIELD_LEN, QUEUE_REGION_SIZE, SERIAL_DATA_REGION_SIZE};
use crate::common::{Result, SdfError, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Regions per serial connection: queue, then data.
const REGIONS: usize = 2;

/// Builder for a serial subsystem.
#[derive(Debug, Clone)]
pub struct Serial {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    virt_tx: PdId,
    virt_rx: Option<PdId>,
    enable_color: bool,
    clients: Vec<PdId>,
    wiring: Option<SerialWiring>,
}

#[derive(Debug, Clone)]
struct SerialWiring {
    device: Option<DeviceResources>,
    /// driver (a) ↔ TX virtualizer (b).
    tx: Link,
    /// driver (a) ↔ RX virtualizer (b).
    rx: Option<Link>,
    clients: Vec<SerialClient>,
}

#[derive(Debug, Clone)]
struct SerialClient {
    /// client (a) ↔ TX virtualizer (b).
    tx: Link,
    /// client (a) ↔ RX virtualizer (b).
    rx: Option<Link>,
}

impl Serial {
    /// Binds a serial driver and its virtualizers.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `device` - The UART, or `None` for an emulated one.
    /// * `driver` - The driver domain.
    /// * `virt_tx` - The transmit virtualizer.
    /// * `virt_rx` - The receive virtualizer, or `None` for output-only consoles.
    /// * `enable_color` - Whether the TX virtualizer colours each client's output.
    ///
    /// # Returns
    ///
    /// The builder, or `SdfError::SameDomain` if a domain is bound to two roles.
    pub fn new(
        sdf: &SystemDescription,
        device: Option<Device>,
        driver: PdId,
        virt_tx: PdId,
        virt_rx: Option<PdId>,
        enable_color: bool,
    ) -> Result<Self> {
        let mut roles = vec![driver, virt_tx];
        roles.extend(virt_rx);
        check_distinct(sdf, &roles)?;
        if let Some(device) = &device {
            check_device(device)?;
        }
        Ok(Self {
            lifecycle: Lifecycle::new(ConfigClass::Serial),
            device,
            driver,
            virt_tx,
            virt_rx,
            enable_color,
            clients: Vec::new(),
            wiring: None,
        })
    }

    /// Adds a client.
    ///
    /// # Returns
    ///
    /// `SdfError::InvalidClient` for the driver or a virtualizer, `SdfError::DuplicateClient`
    /// for a client added before, `SdfError::NameTooLong` for a name that does not fit the TX
    /// virtualizer's name field, or `SdfError::ProtocolViolation` after `connect`.
    pub fn add_client(&mut self, sdf: &SystemDescription, client: PdId) -> Result<()> {
        self.lifecycle.check_mutable()?;
        check_client(Self::CLASS, sdf, client, &self.roles(), &self.clients)?;
        let name = sdf.pd_name(client)?;
        if name.len() >= NAME_FIELD_LEN {
            return Err(SdfError::NameTooLong {
                name: name.to_string(),
                max: NAME_FIELD_LEN - 1,
            });
        }
        self.clients.push(client);
        self.lifecycle.populated();
        Ok(())
    }

    /// Returns the clients in insertion order.
    pub fn clients(&self) -> &[PdId] {
        &self.clients
    }

    /// Returns `true` if the subsystem has an RX virtualizer.
    pub const fn has_rx(&self) -> bool {
        self.virt_rx.is_some()
    }

    fn roles(&self) -> Vec<PdId> {
        let mut roles = vec![self.driver, self.virt_tx];
        roles.extend(self.virt_rx);
        roles
    }

    fn serial_link(
        sdf: &mut SystemDescription,
        ends: (PdId, PdId),
        owner: &str,
        direction: &str,
    ) -> Result<Link> {
        let queue = format!("{direction}_queue");
        let data = format!("{direction}_data");
        link(
            sdf,
            Self::CLASS,
            ends,
            ChannelOptions::default(),
            owner,
            &[
                (queue.as_str(), QUEUE_REGION_SIZE),
                (data.as_str(), SERIAL_DATA_REGION_SIZE),
            ],
        )
    }

    fn wire(&self, sdf: &mut SystemDescription) -> Result<SerialWiring> {
        let device = match &self.device {
            Some(device) => Some(map_device(sdf, Self::CLASS, device, self.driver)?),
            None => None,
        };
        let driver = sdf.pd_name(self.driver)?.to_string();
        let tx = Self::serial_link(sdf, (self.driver, self.virt_tx), &driver, "tx")?;
        let rx = match self.virt_rx {
            Some(virt_rx) => Some(Self::serial_link(sdf, (self.driver, virt_rx), &driver, "rx")?),
            None => None,
        };

        let mut clients = Vec::with_capacity(self.clients.len());
        for &client in &self.clients {
            let owner = sdf.pd_name(client)?.to_string();
            let tx = Self::serial_link(sdf, (client, self.virt_tx), &owner, "tx")?;
            let rx = match self.virt_rx {
                Some(virt_rx) => Some(Self::serial_link(sdf, (client, virt_rx), &owner, "rx")?),
                None => None,
            };
            clients.push(SerialClient { tx, rx });
        }
        Ok(SerialWiring {
            device,
            tx,
            rx,
            clients,
        })
    }
}

impl Subsystem for Serial {
    const CLASS: ConfigClass = ConfigClass::Serial;

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
            rx = self.has_rx(),
            "connected subsystem"
        );
        Ok(true)
    }

    /// Blob bodies:
    /// - driver: `rx: conn, tx: conn, rx_enabled: flag`;
    /// - TX virtualizer: `driver: conn, enable_color: flag, clients[]: { conn, name }`;
    /// - RX virtualizer: `driver: conn, clients[]: conn`;
    /// - client: `rx: conn, tx: conn`.
    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>> {
        let Some(wiring) = &self.wiring else {
            return Err(self.lifecycle.violation(Violation::NotConnected));
        };
        let class = Self::CLASS;
        let mut blobs = Vec::new();

        let driver = sdf.pd_name(self.driver)?;
        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(wiring.rx.as_ref().map(|l| &l.a), REGIONS)
            .connection(Some(&wiring.tx.a), REGIONS)
            .flag(wiring.rx.is_some());
        blobs.push(w.finish(class, blob::file_name(class, driver)));
        if let Some(device) = &wiring.device {
            blobs.push(blob::device_blob(class, driver, device));
        }

        let names = self
            .clients
            .iter()
            .map(|&c| sdf.pd_name(c))
            .collect::<Result<Vec<_>>>()?;
        let entries: Vec<_> = wiring.clients.iter().zip(&names).collect();

        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.tx.b), REGIONS)
            .flag(self.enable_color)
            .clients(&entries, |w, entry| {
                let _ = w
                    .connection(entry.map(|(c, _)| &c.tx.b), REGIONS)
                    .name(entry.map_or("", |&(_, name)| *name));
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt_tx)?)));

        if let (Some(virt_rx), Some(rx)) = (self.virt_rx, &wiring.rx) {
            let mut w = ConfigWriter::new(class);
            let _ = w
                .connection(Some(&rx.b), REGIONS)
                .clients(&wiring.clients, |w, client| {
                    let _ = w.connection(client.and_then(|c| c.rx.as_ref()).map(|l| &l.b), REGIONS);
                });
            blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(virt_rx)?)));
        }

        for (client, name) in wiring.clients.iter().zip(&names) {
            let mut w = ConfigWriter::new(class);
            let _ = w
                .connection(client.rx.as_ref().map(|l| &l.a), REGIONS)
                .connection(Some(&client.tx.a), REGIONS);
            blobs.push(w.finish(class, blob::file_name(class, name)));
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
