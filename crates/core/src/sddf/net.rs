//! Network subsystem.
//!
//! The driver receives into a DMA region owned by the RX virtualizer and transmits from
//! client buffers handed over by the TX virtualizer. Each client is isolated on the receive
//! path by a dedicated copier, which copies packets from the shared DMA region into the
//! client's own receive buffer.
//!
//! Every connection shares a free queue and an active queue. Per client:
//! 1. copier ↔ RX virtualizer, with the DMA region mapped into the copier;
//! 2. copier ↔ client, with the client's receive buffer mapped into both;
//! 3. client ↔ TX virtualizer, with the client's transmit buffer (physically allocated)
//!    mapped into both.

use std::fmt::Write as _;
use std::path::Path;

use super::blob::{self, ConfigBlob, ConfigClass, ConfigWriter, DeviceResources, RegionResource};
use super::{
    Lifecycle, Link, Subsystem, SubsystemState, check_client, check_device, check_distinct,
    dma_region, link, map_device, region_name, shared_region,
};
use crate::common::constants::{
    GENERATED_MAC_PREFIX, MAC_TEXT_LEN, NET_DATA_REGION_SIZE, QUEUE_REGION_SIZE,
};
use crate::common::{Result, SdfError, Violation};
use crate::dtb::Device;
use crate::sdf::{ChannelOptions, PdId, SystemDescription};

/// Regions per network connection: free queue, then active queue.
const REGIONS: usize = 2;

/// Parses and validates a textual MAC address of the form `xx:xx:xx:xx:xx:xx`.
///
/// # Returns
///
/// The six octets, or `SdfError::InvalidMac` carrying the input.
pub fn parse_mac(text: &str) -> Result<[u8; 6]> {
    let invalid = || SdfError::InvalidMac(text.to_string());
    if text.len() != MAC_TEXT_LEN {
        return Err(invalid());
    }
    let mut octets = [0u8; 6];
    let mut parts = text.split(':');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(octets)
}

/// Formats six octets as lowercase `xx:xx:xx:xx:xx:xx`.
pub fn format_mac(octets: &[u8; 6]) -> String {
    let mut text = String::with_capacity(MAC_TEXT_LEN);
    for (index, octet) in octets.iter().enumerate() {
        if index > 0 {
            text.push(':');
        }
        let _ = write!(text, "{octet:02x}");
    }
    text
}

/// A network client, its copier, and its MAC address if one was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetClient {
    /// The client domain.
    pub pd: PdId,
    /// The copier dedicated to the client.
    pub copier: PdId,
    /// The validated MAC address, as given.
    pub mac: Option<String>,
}

/// Builder for a network subsystem.
#[derive(Debug, Clone)]
pub struct Network {
    lifecycle: Lifecycle,
    device: Option<Device>,
    driver: PdId,
    virt_rx: PdId,
    virt_tx: PdId,
    clients: Vec<NetClient>,
    wiring: Option<NetWiring>,
}

#[derive(Debug, Clone)]
struct NetWiring {
    device: Option<DeviceResources>,
    /// driver (a) ↔ RX virtualizer (b).
    rx: Link,
    /// driver (a) ↔ TX virtualizer (b).
    tx: Link,
    dma_paddr: u64,
    dma_in_virt_rx: RegionResource,
    clients: Vec<NetClientWiring>,
}

#[derive(Debug, Clone)]
struct NetClientWiring {
    mac: [u8; 6],
    /// copier (a) ↔ RX virtualizer (b).
    virt_rx: Link,
    /// copier (a) ↔ client (b).
    copier: Link,
    /// client (a) ↔ TX virtualizer (b).
    virt_tx: Link,
    dma_in_copier: RegionResource,
    rx_data_in_copier: RegionResource,
    rx_data_in_client: RegionResource,
    tx_data_paddr: u64,
    tx_data_in_client: RegionResource,
    tx_data_in_virt_tx: RegionResource,
}

impl Network {
    /// Binds a network driver and its virtualizers.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `device` - The network controller, or `None` when it is emulated.
    /// * `driver` - The driver domain.
    /// * `virt_rx` - The receive virtualizer.
    /// * `virt_tx` - The transmit virtualizer.
    pub fn new(
        sdf: &SystemDescription,
        device: Option<Device>,
        driver: PdId,
        virt_rx: PdId,
        virt_tx: PdId,
    ) -> Result<Self> {
        check_distinct(sdf, &[driver, virt_rx, virt_tx])?;
        if let Some(device) = &device {
            check_device(device)?;
        }
        Ok(Self {
            lifecycle: Lifecycle::new(ConfigClass::Net),
            device,
            driver,
            virt_rx,
            virt_tx,
            clients: Vec::new(),
            wiring: None,
        })
    }

    /// Adds a client with its dedicated copier.
    ///
    /// # Arguments
    ///
    /// * `sdf` - The system the domains belong to.
    /// * `client` - The client domain.
    /// * `copier` - A copier not used by any other client.
    /// * `mac` - The client's MAC address, or `None` to generate one at connect.
    ///
    /// # Returns
    ///
    /// `SdfError::InvalidClient` when the client or copier plays another role,
    /// `SdfError::DuplicateClient`, `SdfError::DuplicateCopier`, `SdfError::InvalidMac`,
    /// `SdfError::DuplicateMac`, or `SdfError::ProtocolViolation` after `connect`. A failed
    /// call leaves the builder unchanged.
    pub fn add_client_with_copier(
        &mut self,
        sdf: &SystemDescription,
        client: PdId,
        copier: PdId,
        mac: Option<&str>,
    ) -> Result<()> {
        self.lifecycle.check_mutable()?;
        let roles = [self.driver, self.virt_rx, self.virt_tx];
        let existing: Vec<PdId> = self.clients.iter().map(|c| c.pd).collect();
        check_client(Self::CLASS, sdf, client, &roles, &existing)?;

        let copier_name = sdf.pd_name(copier)?;
        if copier == client || roles.contains(&copier) || existing.contains(&copier) {
            return Err(SdfError::InvalidClient {
                subsystem: Self::CLASS.as_str(),
                name: copier_name.to_string(),
            });
        }
        if self.clients.iter().any(|c| c.copier == client) {
            return Err(SdfError::InvalidClient {
                subsystem: Self::CLASS.as_str(),
                name: sdf.pd_name(client)?.to_string(),
            });
        }
        if self.clients.iter().any(|c| c.copier == copier) {
            return Err(SdfError::DuplicateCopier(copier_name.to_string()));
        }

        if let Some(mac) = mac {
            let _ = parse_mac(mac)?;
            if let Some(owner) = self
                .clients
                .iter()
                .find(|c| c.mac.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(mac)))
            {
                return Err(SdfError::DuplicateMac {
                    mac: mac.to_string(),
                    owner: sdf.pd_name(owner.pd)?.to_string(),
                });
            }
        }

        self.clients.push(NetClient {
            pd: client,
            copier,
            mac: mac.map(str::to_string),
        });
        self.lifecycle.populated();
        Ok(())
    }

    /// Returns the clients in insertion order.
    pub fn clients(&self) -> &[NetClient] {
        &self.clients
    }

    /// Returns each client's MAC address: the given one, or a generated
    /// `52:54:01:00:00:NN` address not used by any other client.
    fn resolve_macs(&self) -> Result<Vec<[u8; 6]>> {
        let mut taken = self
            .clients
            .iter()
            .filter_map(|c| c.mac.as_deref())
            .map(parse_mac)
            .collect::<Result<Vec<_>>>()?;
        let mut next = 0u8;
        let mut macs = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            if let Some(mac) = &client.mac {
                macs.push(parse_mac(mac)?);
                continue;
            }
            let generated = loop {
                let [a, b, c, d, e] = GENERATED_MAC_PREFIX;
                let candidate = [a, b, c, d, e, next];
                next = next.wrapping_add(1);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.push(generated);
            macs.push(generated);
        }
        Ok(macs)
    }

    fn queues(name: &str) -> [(String, u64); REGIONS] {
        [
            (format!("{name}_free"), QUEUE_REGION_SIZE),
            (format!("{name}_active"), QUEUE_REGION_SIZE),
        ]
    }

    fn net_link(
        sdf: &mut SystemDescription,
        ends: (PdId, PdId),
        owner: &str,
        direction: &str,
    ) -> Result<Link> {
        let [(free, free_size), (active, active_size)] = Self::queues(direction);
        link(
            sdf,
            Self::CLASS,
            ends,
            ChannelOptions::default(),
            owner,
            &[(free.as_str(), free_size), (active.as_str(), active_size)],
        )
    }

    fn wire(&self, sdf: &mut SystemDescription) -> Result<NetWiring> {
        let macs = self.resolve_macs()?;
        let device = match &self.device {
            Some(device) => Some(map_device(sdf, Self::CLASS, device, self.driver)?),
            None => None,
        };
        let driver_name = sdf.pd_name(self.driver)?.to_string();
        let rx = Self::net_link(sdf, (self.driver, self.virt_rx), &driver_name, "rx")?;
        let tx = Self::net_link(sdf, (self.driver, self.virt_tx), &driver_name, "tx")?;

        let mut dma_users = vec![self.virt_rx];
        dma_users.extend(self.clients.iter().map(|c| c.copier));
        let (dma_paddr, dma) = dma_region(
            sdf,
            region_name(Self::CLASS, &driver_name, "rx_dma"),
            NET_DATA_REGION_SIZE,
            &dma_users,
        )?;
        let Some((&dma_in_virt_rx, dma_in_copiers)) = dma.split_first() else {
            return Err(SdfError::UnknownDomain(self.virt_rx.index()));
        };

        let mut clients = Vec::with_capacity(self.clients.len());
        for ((client, mac), &dma_in_copier) in self.clients.iter().zip(macs).zip(dma_in_copiers) {
            let client_name = sdf.pd_name(client.pd)?.to_string();
            let copier_name = sdf.pd_name(client.copier)?.to_string();

            let virt_rx = Self::net_link(sdf, (client.copier, self.virt_rx), &copier_name, "rx")?;
            let copier = Self::net_link(sdf, (client.copier, client.pd), &client_name, "rx")?;
            let rx_data = shared_region(
                sdf,
                region_name(Self::CLASS, &client_name, "rx_data"),
                NET_DATA_REGION_SIZE,
                &[client.copier, client.pd],
            )?;

            let virt_tx = Self::net_link(sdf, (client.pd, self.virt_tx), &client_name, "tx")?;
            let (tx_data_paddr, tx_data) = dma_region(
                sdf,
                region_name(Self::CLASS, &client_name, "tx_data"),
                NET_DATA_REGION_SIZE,
                &[client.pd, self.virt_tx],
            )?;

            if let (
                &[rx_data_in_copier, rx_data_in_client],
                &[tx_data_in_client, tx_data_in_virt_tx],
            ) = (rx_data.as_slice(), tx_data.as_slice())
            {
                clients.push(NetClientWiring {
                    mac,
                    virt_rx,
                    copier,
                    virt_tx,
                    dma_in_copier,
                    rx_data_in_copier,
                    rx_data_in_client,
                    tx_data_paddr,
                    tx_data_in_client,
                    tx_data_in_virt_tx,
                });
            }
        }

        Ok(NetWiring {
            device,
            rx,
            tx,
            dma_paddr,
            dma_in_virt_rx,
            clients,
        })
    }
}

impl Subsystem for Network {
    const CLASS: ConfigClass = ConfigClass::Net;

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
    /// - driver: `virt_rx: conn, virt_tx: conn`;
    /// - RX virtualizer: `driver: conn, dma: region, dma_paddr: u64,
    ///   clients[]: { conn, mac }`;
    /// - TX virtualizer: `driver: conn, clients[]: { conn, data: region, data_paddr: u64 }`;
    /// - copier: `virt_rx: conn, client: conn, dma: region, client_data: region`;
    /// - client: `rx: conn, tx: conn, rx_data: region, tx_data: region, mac`.
    fn config_blobs(&self, sdf: &SystemDescription) -> Result<Vec<ConfigBlob>> {
        let Some(wiring) = &self.wiring else {
            return Err(self.lifecycle.violation(Violation::NotConnected));
        };
        let class = Self::CLASS;
        let mut blobs = Vec::with_capacity(2 * self.clients.len() + 4);

        let driver = sdf.pd_name(self.driver)?;
        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.rx.a), REGIONS)
            .connection(Some(&wiring.tx.a), REGIONS);
        blobs.push(w.finish(class, blob::file_name(class, driver)));
        if let Some(device) = &wiring.device {
            blobs.push(blob::device_blob(class, driver, device));
        }

        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.rx.b), REGIONS)
            .region(Some(&wiring.dma_in_virt_rx))
            .u64(wiring.dma_paddr)
            .clients(&wiring.clients, |w, client| {
                let _ = w
                    .connection(client.map(|c| &c.virt_rx.b), REGIONS)
                    .mac(&client.map_or([0; 6], |c| c.mac));
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt_rx)?)));

        let mut w = ConfigWriter::new(class);
        let _ = w
            .connection(Some(&wiring.tx.b), REGIONS)
            .clients(&wiring.clients, |w, client| {
                let _ = w
                    .connection(client.map(|c| &c.virt_tx.b), REGIONS)
                    .region(client.map(|c| &c.tx_data_in_virt_tx))
                    .u64(client.map_or(0, |c| c.tx_data_paddr));
            });
        blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(self.virt_tx)?)));

        for (client, wired) in self.clients.iter().zip(&wiring.clients) {
            let mut w = ConfigWriter::new(class);
            let _ = w
                .connection(Some(&wired.virt_rx.a), REGIONS)
                .connection(Some(&wired.copier.a), REGIONS)
                .region(Some(&wired.dma_in_copier))
                .region(Some(&wired.rx_data_in_copier));
            blobs.push(w.finish(class, blob::file_name(class, sdf.pd_name(client.copier)?)));

            let mut w = ConfigWriter::new(class);
            let _ = w
                .connection(Some(&wired.copier.b), REGIONS)
                .connection(Some(&wired.virt_tx.a), REGIONS)
                .region(Some(&wired.rx_data_in_client))
                .region(Some(&wired.tx_data_in_client))
                .mac(&wired.mac);
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
