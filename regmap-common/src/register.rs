//! Register descriptors and their persisted representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{RegionType, map_address};
use crate::device::Role;
use crate::error::{Error, Result};

/// What a master does with a register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Write,
    #[default]
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "Read",
            Operation::Write => "Write",
            Operation::NotApplicable => "N/A",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "read" | "r" => Some(Operation::Read),
            "write" | "w" => Some(Operation::Write),
            "n/a" | "na" | "none" => Some(Operation::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a master writes a register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "One-time")]
    OneTime,
    Cyclic,
    #[default]
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::OneTime => "One-time",
            Mode::Cyclic => "Cyclic",
            Mode::NotApplicable => "N/A",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "one-time" | "onetime" | "once" => Some(Mode::OneTime),
            "cyclic" => Some(Mode::Cyclic),
            "n/a" | "na" | "none" => Some(Mode::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation and mode of a register, kept consistent with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Access {
    pub operation: Operation,
    pub mode: Mode,
}

impl Access {
    pub fn new(operation: Operation, mode: Mode) -> Self {
        Self { operation, mode }
    }

    /// Plain read access.
    pub fn read() -> Self {
        Self::new(Operation::Read, Mode::NotApplicable)
    }

    /// Write access with the given mode.
    pub fn write(mode: Mode) -> Self {
        Self::new(Operation::Write, mode).normalized_for(Role::Master)
    }

    /// The access a freshly added register gets for `role`.
    pub fn default_for(role: Role) -> Self {
        Self::default().normalized_for(role)
    }

    /// Apply the role rules.
    ///
    /// Slaves have no operation concept. Masters read unless told to write;
    /// only writes carry a mode, which defaults to one-time.
    pub fn normalized_for(self, role: Role) -> Self {
        match role {
            Role::Slave => Self::default(),
            Role::Master => match self.operation {
                Operation::Write => Self {
                    operation: Operation::Write,
                    mode: match self.mode {
                        Mode::NotApplicable => Mode::OneTime,
                        mode => mode,
                    },
                },
                Operation::Read | Operation::NotApplicable => Self {
                    operation: Operation::Read,
                    mode: Mode::NotApplicable,
                },
            },
        }
    }
}

/// Whether a tag name only uses `[A-Z0-9_]` and is non-empty.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Tag name given to registers the caller did not name, e.g. `HR_0005`.
pub fn default_tag_name(internal_address: u16, region: RegionType) -> String {
    format!("{}_{:04}", region.tag_prefix(), internal_address)
}

/// A single register of a device context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "RegisterRecord", try_from = "RegisterRecord")]
pub struct RegisterDescriptor {
    pub tag_name: String,
    pub internal_address: u16,
    pub region_type: RegionType,
    pub operation: Operation,
    pub mode: Mode,
}

impl RegisterDescriptor {
    /// Create a descriptor, generating the tag name when `tag` is blank.
    ///
    /// Supplied tags are trimmed and upper-cased before validation.
    pub fn new(tag: Option<&str>, internal_address: u16, region_type: RegionType) -> Result<Self> {
        let tag_name = match tag.map(|t| t.trim().to_ascii_uppercase()) {
            Some(t) if !t.is_empty() => {
                if !is_valid_tag(&t) {
                    return Err(Error::InvalidTagFormat(t));
                }
                t
            }
            _ => default_tag_name(internal_address, region_type),
        };

        Ok(Self {
            tag_name,
            internal_address,
            region_type,
            operation: Operation::NotApplicable,
            mode: Mode::NotApplicable,
        })
    }

    /// Create a descriptor with the generated tag name.
    pub fn with_default_tag(internal_address: u16, region_type: RegionType) -> Self {
        Self {
            tag_name: default_tag_name(internal_address, region_type),
            internal_address,
            region_type,
            operation: Operation::NotApplicable,
            mode: Mode::NotApplicable,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.set_access(access);
        self
    }

    pub fn access(&self) -> Access {
        Access::new(self.operation, self.mode)
    }

    pub fn set_access(&mut self, access: Access) {
        self.operation = access.operation;
        self.mode = access.mode;
    }

    /// Protocol-facing address, always derived from address and region.
    pub fn mapped_address(&self) -> u32 {
        map_address(self.internal_address, self.region_type).0
    }

    pub fn mapped_label(&self) -> &'static str {
        self.region_type.label()
    }

    /// Whether this register occupies the same slot as `other`.
    pub fn same_slot(&self, other: &RegisterDescriptor) -> bool {
        self.internal_address == other.internal_address && self.region_type == other.region_type
    }
}

/// Register object as written to configuration files.
///
/// `mapped_address`, `modbus_type` and `type_name` are informational and
/// recomputed when read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRecord {
    #[serde(default)]
    pub tag_name: Option<String>,
    pub internal_address: u16,
    #[serde(default)]
    pub mapped_address: Option<u32>,
    #[serde(rename = "type")]
    pub type_ordinal: u8,
    #[serde(default)]
    pub modbus_type: Option<u8>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub mode: Mode,
}

impl From<RegisterDescriptor> for RegisterRecord {
    fn from(reg: RegisterDescriptor) -> Self {
        Self {
            mapped_address: Some(reg.mapped_address()),
            internal_address: reg.internal_address,
            type_ordinal: reg.region_type.ordinal(),
            modbus_type: Some(reg.region_type.code()),
            type_name: Some(reg.region_type.display_name().to_string()),
            tag_name: Some(reg.tag_name),
            operation: reg.operation,
            mode: reg.mode,
        }
    }
}

impl TryFrom<RegisterRecord> for RegisterDescriptor {
    type Error = Error;

    fn try_from(record: RegisterRecord) -> Result<Self> {
        let region = RegionType::from_ordinal(record.type_ordinal).ok_or_else(|| {
            Error::malformed(format!(
                "register at {} has unknown type {}",
                record.internal_address, record.type_ordinal
            ))
        })?;

        match record.modbus_type {
            Some(code) if code != region.code() => {
                return Err(Error::malformed(format!(
                    "register at {} has type {} but modbus_type {}",
                    record.internal_address, record.type_ordinal, code
                )));
            }
            _ => {}
        }

        let mut reg = RegisterDescriptor::new(
            record.tag_name.as_deref(),
            record.internal_address,
            region,
        )
        .map_err(|e| Error::malformed(e.to_string()))?;
        reg.operation = record.operation;
        reg.mode = record.mode;
        Ok(reg)
    }
}
