//! JSON system specification.
//!
//! This module describes a topology as data instead of API calls. It provides:
//! 1. **Structures:** `SystemSpec` with its protection domains and channels.
//! 2. **Defaults:** Architecture and physical bound used when a field is omitted.
//! 3. **Building:** `SystemSpec::build`, which replays the spec against a fresh
//!    `SystemDescription` through the same operations a caller would use.
//!
//! Building a spec produces the same description as the equivalent sequence of calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::constants::DEFAULT_PADDR_TOP;
use crate::common::{Result, SdfError};
use crate::sdf::{Arch, ChannelOptions, PdId, ProtectionDomain, SystemDescription};

/// A complete system: architecture, physical bound, domains, and channels.
///
/// # Example
///
/// ```
/// use sdfgen_core::config::SystemSpec;
///
/// let json = r#"{
///     "arch": "riscv64",
///     "protection_domains": [
///         { "name": "server", "program_image": "server.elf", "priority": 200 },
///         {
///             "name": "client",
///             "program_image": "client.elf",
///             "children": [{ "id": 3, "name": "worker", "program_image": "worker.elf" }]
///         }
///     ],
///     "channels": [{ "a": "client", "b": "server", "pp_a": true }]
/// }"#;
///
/// let spec = SystemSpec::from_json(json).unwrap();
/// let (sdf, pds) = spec.build().unwrap();
/// assert_eq!(sdf.paddr_top(), 0xa000_0000);
/// assert!(sdf.render().contains("<protection_domain name=\"worker\" id=\"3\">"));
/// assert_eq!(pds.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSpec {
    /// Target architecture.
    #[serde(default)]
    pub arch: Arch,

    /// Upper bound of allocatable physical memory.
    #[serde(default = "SystemSpec::default_paddr_top")]
    pub paddr_top: u64,

    /// Top-level protection domains in registration order.
    #[serde(default)]
    pub protection_domains: Vec<PdSpec>,

    /// Channels in creation order.
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
}

impl SystemSpec {
    /// Returns the default physical address bound.
    const fn default_paddr_top() -> u64 {
        DEFAULT_PADDR_TOP
    }

    /// Parses a spec from JSON text.
    ///
    /// # Returns
    ///
    /// The spec, or `SdfError::InvalidConfig` describing the parse error.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| SdfError::InvalidConfig(err.to_string()))
    }

    /// Builds the described system.
    ///
    /// # Returns
    ///
    /// The system and a map from every domain name (children included) to its handle, or
    /// `SdfError::InvalidConfig` for duplicate domain names and channels naming unknown
    /// domains. Allocation errors are returned as is.
    pub fn build(&self) -> Result<(SystemDescription, BTreeMap<String, PdId>)> {
        let mut sdf = SystemDescription::new(self.arch, self.paddr_top);
        let mut names = BTreeMap::new();

        for pd in &self.protection_domains {
            let id = sdf.add_pd(pd.to_domain());
            insert_name(&mut names, &pd.name, id)?;
            add_children(&mut sdf, &mut names, id, &pd.children)?;
        }

        for channel in &self.channels {
            let a = lookup(&names, &channel.a)?;
            let b = lookup(&names, &channel.b)?;
            let _ = sdf.add_channel(a, b, channel.options())?;
        }

        tracing::debug!(
            pds = names.len(),
            channels = self.channels.len(),
            "built system from spec"
        );
        Ok((sdf, names))
    }
}

impl Default for SystemSpec {
    fn default() -> Self {
        Self {
            arch: Arch::default(),
            paddr_top: DEFAULT_PADDR_TOP,
            protection_domains: Vec::new(),
            channels: Vec::new(),
        }
    }
}

/// One protection domain and its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdSpec {
    /// Unique domain name.
    pub name: String,
    /// Program image file name.
    pub program_image: String,
    /// Child ID within the parent; ignored for top-level domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u8>,
    /// Scheduling priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Scheduling budget in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u32>,
    /// Scheduling period in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
    /// Stack size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<u32>,
    /// CPU core the domain is pinned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u8>,
    /// Whether the domain is passive.
    #[serde(default)]
    pub passive: bool,
    /// Child domains.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PdSpec>,
}

impl PdSpec {
    fn to_domain(&self) -> ProtectionDomain {
        let mut pd =
            ProtectionDomain::new(&self.name, &self.program_image).with_passive(self.passive);
        if let Some(priority) = self.priority {
            pd = pd.with_priority(priority);
        }
        if let Some(budget) = self.budget {
            pd = pd.with_budget(budget);
        }
        if let Some(period) = self.period {
            pd = pd.with_period(period);
        }
        if let Some(stack_size) = self.stack_size {
            pd = pd.with_stack_size(stack_size);
        }
        if let Some(cpu) = self.cpu {
            pd = pd.with_cpu(cpu);
        }
        pd
    }
}

/// One channel between two named domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Name of the first end.
    pub a: String,
    /// Name of the second end.
    pub b: String,
    /// Slot ID to claim in `a`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_id: Option<u8>,
    /// Slot ID to claim in `b`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_id: Option<u8>,
    /// End `a` may make protected procedure calls.
    #[serde(default)]
    pub pp_a: bool,
    /// End `b` may make protected procedure calls.
    #[serde(default)]
    pub pp_b: bool,
    /// End `a` may notify.
    #[serde(default = "ChannelSpec::default_notify")]
    pub notify_a: bool,
    /// End `b` may notify.
    #[serde(default = "ChannelSpec::default_notify")]
    pub notify_b: bool,
}

impl ChannelSpec {
    /// Notifications are enabled unless turned off.
    const fn default_notify() -> bool {
        true
    }

    const fn options(&self) -> ChannelOptions {
        ChannelOptions {
            pp_a: self.pp_a,
            pp_b: self.pp_b,
            notify_a: self.notify_a,
            notify_b: self.notify_b,
            a_id: self.a_id,
            b_id: self.b_id,
        }
    }
}

fn add_children(
    sdf: &mut SystemDescription,
    names: &mut BTreeMap<String, PdId>,
    parent: PdId,
    children: &[PdSpec],
) -> Result<()> {
    for child in children {
        let (id, _) = sdf.add_child(parent, child.to_domain(), child.id)?;
        insert_name(names, &child.name, id)?;
        add_children(sdf, names, id, &child.children)?;
    }
    Ok(())
}

fn insert_name(names: &mut BTreeMap<String, PdId>, name: &str, id: PdId) -> Result<()> {
    if names.insert(name.to_string(), id).is_some() {
        return Err(SdfError::InvalidConfig(format!(
            "protection domain '{name}' defined twice"
        )));
    }
    Ok(())
}

fn lookup(names: &BTreeMap<String, PdId>, name: &str) -> Result<PdId> {
    names.get(name).copied().ok_or_else(|| {
        SdfError::InvalidConfig(format!("channel references unknown protection domain '{name}'"))
    })
}
