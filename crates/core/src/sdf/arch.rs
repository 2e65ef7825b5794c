//! Target architectures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Target architecture of the system being described.
///
/// The discriminants are fixed: host-language callers pass them as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Arch {
    /// 32-bit Arm.
    #[serde(rename = "aarch32", alias = "arm")]
    Aarch32 = 0,
    /// 64-bit Arm.
    #[default]
    #[serde(rename = "aarch64", alias = "arm64")]
    Aarch64 = 1,
    /// 32-bit RISC-V.
    #[serde(rename = "riscv32")]
    Riscv32 = 2,
    /// 64-bit RISC-V.
    #[serde(rename = "riscv64")]
    Riscv64 = 3,
    /// 32-bit x86.
    #[serde(rename = "x86")]
    X86 = 4,
    /// 64-bit x86.
    #[serde(rename = "x86_64")]
    X86_64 = 5,
}

impl Arch {
    /// Every supported architecture, in discriminant order.
    pub const ALL: [Self; 6] = [
        Self::Aarch32,
        Self::Aarch64,
        Self::Riscv32,
        Self::Riscv64,
        Self::X86,
        Self::X86_64,
    ];

    /// Returns the lowercase name used in the rendered system description.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aarch32 => "aarch32",
            Self::Aarch64 => "aarch64",
            Self::Riscv32 => "riscv32",
            Self::Riscv64 => "riscv64",
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
        }
    }

    /// Returns the native word size in bytes.
    pub const fn word_size(self) -> u64 {
        match self {
            Self::Aarch32 | Self::Riscv32 | Self::X86 => 4,
            Self::Aarch64 | Self::Riscv64 | Self::X86_64 => 8,
        }
    }

    /// Returns `true` for little-endian targets (all of them).
    pub const fn is_little_endian(self) -> bool {
        true
    }

    /// Converts a raw discriminant back into an architecture.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Aarch32),
            1 => Some(Self::Aarch64),
            2 => Some(Self::Riscv32),
            3 => Some(Self::Riscv64),
            4 => Some(Self::X86),
            5 => Some(Self::X86_64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
