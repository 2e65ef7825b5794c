//! XML rendering of a system description.
//!
//! The output is a pure function of the arena: memory regions in creation order, top-level
//! domains in registration order (children nested in child-ID insertion order), then channels
//! in creation order. Rendering the same system twice yields identical bytes.

use std::fmt;

use super::pd::PdId;
use super::system::SystemDescription;

const INDENT: &str = "    ";

impl SystemDescription {
    /// Renders the Microkit-style XML system description.
    ///
    /// Channels whose ends are not registered are still rendered, but logged, since the
    /// image builder will reject them.
    pub fn render(&self) -> String {
        for channel in self.channels() {
            for end in [channel.a, channel.b] {
                if !self.is_registered(end) {
                    tracing::warn!(
                        pd = self.pd_name(end).unwrap_or("?"),
                        "channel references an unregistered protection domain"
                    );
                }
            }
        }
        self.to_string()
    }

    fn write_pd(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: PdId,
        child_id: Option<u8>,
        depth: usize,
    ) -> fmt::Result {
        let Ok(pd) = self.pd(id) else {
            return Ok(());
        };
        let indent = INDENT.repeat(depth);

        write!(f, "{indent}<protection_domain name=\"{}\"", escape(pd.name()))?;
        if let Some(priority) = pd.priority() {
            write!(f, " priority=\"{priority}\"")?;
        }
        if let Some(budget) = pd.budget() {
            write!(f, " budget=\"{budget}\"")?;
        }
        if let Some(period) = pd.period() {
            write!(f, " period=\"{period}\"")?;
        }
        if pd.passive() {
            f.write_str(" passive=\"true\"")?;
        }
        if let Some(stack_size) = pd.stack_size() {
            write!(f, " stack_size=\"{stack_size:#x}\"")?;
        }
        if let Some(cpu) = pd.cpu() {
            write!(f, " cpu=\"{cpu}\"")?;
        }
        if let Some(child_id) = child_id {
            write!(f, " id=\"{child_id}\"")?;
        }
        f.write_str(">\n")?;

        writeln!(
            f,
            "{indent}{INDENT}<program_image path=\"{}\" />",
            escape(pd.program_image())
        )?;

        for map in pd.maps() {
            let Ok(mr) = self.mr(map.mr) else {
                continue;
            };
            write!(
                f,
                "{indent}{INDENT}<map mr=\"{}\" vaddr=\"{:#x}\" perms=\"{}\"",
                escape(mr.name()),
                map.vaddr,
                map.perms.as_string()
            )?;
            if !map.cached {
                f.write_str(" cached=\"false\"")?;
            }
            if let Some(symbol) = &map.setvar_vaddr {
                write!(f, " setvar_vaddr=\"{}\"", escape(symbol))?;
            }
            if let Some(symbol) = &map.setvar_size {
                write!(f, " setvar_size=\"{}\"", escape(symbol))?;
            }
            f.write_str(" />\n")?;
        }

        for irq in pd.irqs() {
            writeln!(
                f,
                "{indent}{INDENT}<irq irq=\"{}\" id=\"{}\" trigger=\"{}\" />",
                irq.irq,
                irq.id,
                irq.trigger.as_str()
            )?;
        }

        for &(child_id, child) in pd.children() {
            self.write_pd(f, child, Some(child_id), depth + 1)?;
        }

        writeln!(f, "{indent}</protection_domain>")
    }
}

impl fmt::Display for SystemDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        writeln!(
            f,
            "<system arch=\"{}\" paddr_top=\"{:#x}\">",
            self.arch(),
            self.paddr_top()
        )?;

        for mr in self.mrs() {
            write!(
                f,
                "{INDENT}<memory_region name=\"{}\" size=\"{:#x}\"",
                escape(mr.name()),
                mr.size()
            )?;
            if let Some(paddr) = mr.paddr() {
                write!(f, " phys_addr=\"{paddr:#x}\"")?;
            }
            f.write_str(" />\n")?;
        }

        for &id in self.registered() {
            self.write_pd(f, id, None, 1)?;
        }

        for channel in self.channels() {
            writeln!(f, "{INDENT}<channel>")?;
            for (end, id, pp, notify) in [
                (channel.a, channel.a_id, channel.pp_a, channel.notify_a),
                (channel.b, channel.b_id, channel.pp_b, channel.notify_b),
            ] {
                let name = self.pd_name(end).unwrap_or_default();
                write!(f, "{INDENT}{INDENT}<end pd=\"{}\" id=\"{id}\"", escape(name))?;
                if pp {
                    f.write_str(" pp=\"true\"")?;
                }
                if !notify {
                    f.write_str(" notify=\"false\"")?;
                }
                f.write_str(" />\n")?;
            }
            writeln!(f, "{INDENT}</channel>")?;
        }

        f.write_str("</system>\n")
    }
}

/// Escapes the five XML special characters in an attribute value.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
