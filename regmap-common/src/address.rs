//! Modbus region types and the internal ↔ protocol address mapping.
//!
//! Internal addresses are zero-based offsets into one of the four Modbus data
//! spaces. The protocol-facing ("mapped") address adds the region base and a
//! one-based adjustment:
//!
//! ```text
//! Coil              1 + internal
//! Discrete Input    10001 + internal
//! Input Register    30001 + internal
//! Holding Register  40001 + internal
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four Modbus data spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    /// Read/write single bits (0x).
    Coil,
    /// Read-only single bits (1x).
    DiscreteInput,
    /// Read-only 16-bit words (3x).
    InputRegister,
    /// Read/write 16-bit words (4x).
    HoldingRegister,
}

impl RegionType {
    /// All region types in ascending protocol code order.
    pub const ALL: [RegionType; 4] = [
        RegionType::Coil,
        RegionType::DiscreteInput,
        RegionType::InputRegister,
        RegionType::HoldingRegister,
    ];

    /// Position in the region list (0-3), as stored in the `type` field of
    /// persisted register objects.
    pub fn ordinal(self) -> u8 {
        match self {
            RegionType::Coil => 0,
            RegionType::DiscreteInput => 1,
            RegionType::InputRegister => 2,
            RegionType::HoldingRegister => 3,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Protocol region code used in the generated range table.
    ///
    /// Code 2 is reserved by the protocol and never produced.
    pub fn code(self) -> u8 {
        match self {
            RegionType::Coil => 0,
            RegionType::DiscreteInput => 1,
            RegionType::InputRegister => 3,
            RegionType::HoldingRegister => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RegionType::Coil),
            1 => Some(RegionType::DiscreteInput),
            3 => Some(RegionType::InputRegister),
            4 => Some(RegionType::HoldingRegister),
            _ => None,
        }
    }

    /// Offset added to `internal + 1` to get the protocol address.
    pub fn base(self) -> u32 {
        match self {
            RegionType::Coil => 0,
            RegionType::DiscreteInput => 10000,
            RegionType::InputRegister => 30000,
            RegionType::HoldingRegister => 40000,
        }
    }

    /// Short label shown next to a mapped address.
    pub fn label(self) -> &'static str {
        match self {
            RegionType::Coil => "Coil",
            RegionType::DiscreteInput => "DI",
            RegionType::InputRegister => "IR",
            RegionType::HoldingRegister => "HR",
        }
    }

    /// Prefix of auto-generated tag names.
    pub fn tag_prefix(self) -> &'static str {
        match self {
            RegionType::Coil => "COIL",
            RegionType::DiscreteInput => "DI",
            RegionType::InputRegister => "IR",
            RegionType::HoldingRegister => "HR",
        }
    }

    /// Region part of generated C identifiers (`MODBUS_<prefix>_0005`).
    pub fn identifier_prefix(self) -> &'static str {
        match self {
            RegionType::Coil => "COIL",
            RegionType::DiscreteInput => "DI",
            RegionType::InputRegister => "INPUT_REG",
            RegionType::HoldingRegister => "HOLDING_REG",
        }
    }

    pub fn from_identifier_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.identifier_prefix() == prefix)
    }

    /// Human-readable name, as stored in `type_name`.
    pub fn display_name(self) -> &'static str {
        match self {
            RegionType::Coil => "Coil (0x)",
            RegionType::DiscreteInput => "Discrete Input (1x)",
            RegionType::InputRegister => "Input Register (3x)",
            RegionType::HoldingRegister => "Holding Register (4x)",
        }
    }

    /// Plural name used in range comments of the generated source.
    pub fn range_name(self) -> &'static str {
        match self {
            RegionType::Coil => "Coils",
            RegionType::DiscreteInput => "DI",
            RegionType::InputRegister => "Input Regs",
            RegionType::HoldingRegister => "Holding Regs",
        }
    }

    /// Parse a user-supplied keyword (`coil`, `di`, `ir`, `hr` and long forms).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "coil" | "coils" | "0x" => Some(RegionType::Coil),
            "di" | "discrete" | "discrete_input" | "1x" => Some(RegionType::DiscreteInput),
            "ir" | "input" | "input_register" | "3x" => Some(RegionType::InputRegister),
            "hr" | "holding" | "holding_register" | "4x" => Some(RegionType::HoldingRegister),
            _ => None,
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Map an internal address to its protocol address and label.
pub fn map_address(internal: u16, region: RegionType) -> (u32, &'static str) {
    (region.base() + u32::from(internal) + 1, region.label())
}

/// Recover the internal address from a protocol address of a known region.
///
/// Returns `None` when `mapped` lies outside the region's window.
pub fn unmap_address(mapped: u32, region: RegionType) -> Option<u16> {
    let offset = mapped.checked_sub(region.base() + 1)?;
    u16::try_from(offset).ok()
}
