//! Channels between protection domains.

use super::pd::PdId;

/// Handle to a channel inside a `SystemDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
    /// Returns the position of the channel in the system's channel list.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Per-end flags and requested slot IDs for a new channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// End `a` may make protected procedure calls over the channel.
    pub pp_a: bool,
    /// End `b` may make protected procedure calls over the channel.
    pub pp_b: bool,
    /// End `a` may notify end `b`.
    pub notify_a: bool,
    /// End `b` may notify end `a`.
    pub notify_b: bool,
    /// Slot ID to claim in `a`, or `None` for the lowest free one.
    pub a_id: Option<u8>,
    /// Slot ID to claim in `b`, or `None` for the lowest free one.
    pub b_id: Option<u8>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            pp_a: false,
            pp_b: false,
            notify_a: true,
            notify_b: true,
            a_id: None,
            b_id: None,
        }
    }
}

impl ChannelOptions {
    /// Options with protected procedure calls permitted from end `a`.
    pub fn pp_a() -> Self {
        Self {
            pp_a: true,
            ..Self::default()
        }
    }

    /// Options with protected procedure calls permitted from end `b`.
    pub fn pp_b() -> Self {
        Self {
            pp_b: true,
            ..Self::default()
        }
    }
}

/// A committed channel: both ends, their slot IDs, and the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// First end.
    pub a: PdId,
    /// Second end.
    pub b: PdId,
    /// Slot ID in `a`.
    pub a_id: u8,
    /// Slot ID in `b`.
    pub b_id: u8,
    /// End `a` may make protected procedure calls.
    pub pp_a: bool,
    /// End `b` may make protected procedure calls.
    pub pp_b: bool,
    /// End `a` may notify.
    pub notify_a: bool,
    /// End `b` may notify.
    pub notify_b: bool,
}

impl Channel {
    /// Returns the slot ID `pd` uses for this channel, or `None` if `pd` is not an end.
    pub fn id_of(&self, pd: PdId) -> Option<u8> {
        if pd == self.a {
            Some(self.a_id)
        } else if pd == self.b {
            Some(self.b_id)
        } else {
            None
        }
    }

    /// Returns `true` if the channel connects `x` and `y` in either direction.
    pub fn connects(&self, x: PdId, y: PdId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}
